//! Metrics collection for decorated operations.
//!
//! Provides in-memory metrics tracking with histograms for delay and
//! execution-time distribution.

use once_cell::sync::Lazy;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::report::{Event, Phase};

/// Global metrics instance.
pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// Centralized metrics collection, keyed by operation name.
pub struct Metrics {
    operations: Mutex<HashMap<String, OperationMetrics>>,
}

impl Metrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self {
            operations: Mutex::new(HashMap::new()),
        }
    }

    /// Fold one reported event into the operation's counters.
    pub fn record_event(&self, event: &Event) {
        let mut operations = self.operations.lock().expect("mutex poisoned");
        let entry = operations.entry(event.operation.clone()).or_default();
        match event.phase {
            Phase::Attempt => {
                entry.attempts += 1;
                if event.attempt == Some(1) {
                    entry.calls += 1;
                }
            }
            Phase::Success => entry.successes += 1,
            Phase::Failure => {
                entry.failures += 1;
                match event.delay {
                    Some(delay) => entry.delays.record(delay),
                    None => entry.gave_up += 1,
                }
            }
            Phase::Timeout => entry.timeouts += 1,
            Phase::Elapsed => {
                if let Some(elapsed) = event.elapsed {
                    entry.elapsed.record(elapsed);
                }
            }
            Phase::Parameters | Phase::Return => {}
        }
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let operations = self.operations.lock().expect("mutex poisoned").clone();
        MetricsSnapshot { operations }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        self.operations.lock().expect("mutex poisoned").clear();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters for one operation name.
#[derive(Debug, Clone, Default)]
pub struct OperationMetrics {
    /// Retry sequences started
    pub calls: u64,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    /// Failures not followed by another attempt (exhausted or not retryable)
    pub gave_up: u64,
    pub timeouts: u64,
    pub delays: Histogram,
    pub elapsed: Histogram,
}

impl OperationMetrics {
    /// Share of attempts that succeeded, as a percentage.
    pub fn success_rate(&self) -> f64 {
        let finished = self.successes + self.failures;
        if finished == 0 {
            100.0
        } else {
            (self.successes as f64 / finished as f64) * 100.0
        }
    }
}

/// Samples kept per histogram for percentiles; count and total cover every sample.
pub const HISTOGRAM_WINDOW: usize = 1024;

/// Latency distribution over the most recent samples.
///
/// Memory stays bounded however long the process records: percentiles are
/// computed over the last [`HISTOGRAM_WINDOW`] samples, while `count` and
/// `total` are running sums.
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    recent: VecDeque<Duration>,
    count: u64,
    total: Duration,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample, evicting the oldest once the window is full.
    pub fn record(&mut self, duration: Duration) {
        if self.recent.len() == HISTOGRAM_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(duration);
        self.count += 1;
        self.total = self.total.saturating_add(duration);
    }

    /// Samples recorded since creation.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sum of all samples recorded since creation.
    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn p50(&self) -> Option<Duration> {
        self.percentile(50)
    }

    pub fn p95(&self) -> Option<Duration> {
        self.percentile(95)
    }

    /// Percentile over the retained window.
    pub fn percentile(&self, p: u8) -> Option<Duration> {
        if self.recent.is_empty() {
            return None;
        }

        let mut sorted: Vec<Duration> = self.recent.iter().copied().collect();
        sorted.sort();

        let index = (p as f64 / 100.0 * (sorted.len() - 1) as f64).round() as usize;
        Some(sorted[index.min(sorted.len() - 1)])
    }
}

/// Snapshot of all metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub operations: HashMap<String, OperationMetrics>,
}

impl MetricsSnapshot {
    /// Format as a human-readable report.
    pub fn format_report(&self) -> String {
        let mut report = String::new();
        report.push_str("=== Metrics Report ===\n\n");

        let mut names: Vec<_> = self.operations.keys().collect();
        names.sort();
        for name in names {
            let metrics = &self.operations[name];
            report.push_str(&format!(
                "  {}: {} calls, {} attempts, {:.1}% success, {} timeouts, {:.2}s slept\n",
                name,
                metrics.calls,
                metrics.attempts,
                metrics.success_rate(),
                metrics.timeouts,
                metrics.delays.total().as_secs_f64()
            ));
        }

        report
    }
}
