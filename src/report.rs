//! Observability sink for the utilities.
//!
//! Every decorated call reports its transitions as [`Event`]s to a
//! [`Reporter`]. The default reporter logs through `tracing`; tests inject
//! a [`MemoryReporter`] and assert on what was emitted.

use colored::Colorize;
use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::telemetry::metrics::{Metrics, GLOBAL_METRICS};

/// Which transition an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// An attempt is about to run
    Attempt,
    /// The operation returned a value
    Success,
    /// The operation failed
    Failure,
    /// The timeout bound elapsed
    Timeout,
    /// A timer finished measuring
    Elapsed,
    /// Arguments of a call
    Parameters,
    /// Return value of a call
    Return,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Attempt => "attempt",
            Phase::Success => "success",
            Phase::Failure => "failure",
            Phase::Timeout => "timeout",
            Phase::Elapsed => "elapsed",
            Phase::Parameters => "parameters",
            Phase::Return => "return",
        };
        f.write_str(name)
    }
}

/// A structured notification emitted by a decorated call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub phase: Phase,
    pub operation: String,
    /// 1-based attempt index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Delay before the next attempt, `None` when no retry follows
    #[serde(skip_serializing_if = "Option::is_none", with = "opt_secs")]
    pub delay: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the failure matched the policy's retryable kinds
    #[serde(skip_serializing_if = "is_true")]
    pub retryable: bool,
    /// Timeout bound or measured execution time
    #[serde(skip_serializing_if = "Option::is_none", with = "opt_secs")]
    pub elapsed: Option<Duration>,
    /// Preformatted lines for parameter and timing events
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<String>,
}

impl Event {
    /// Create a bare event for the given phase and operation.
    pub fn new(phase: Phase, operation: impl Into<String>) -> Self {
        Self {
            phase,
            operation: operation.into(),
            attempt: None,
            max_attempts: None,
            delay: None,
            error: None,
            retryable: true,
            elapsed: None,
            lines: Vec::new(),
        }
    }

    pub fn with_attempt(mut self, attempt: u32, max_attempts: Option<u32>) -> Self {
        self.attempt = Some(attempt);
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Mark a failure as rejected by the retryable-kind filter.
    pub fn not_retryable(mut self) -> Self {
        self.retryable = false;
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    pub fn with_lines(mut self, lines: Vec<String>) -> Self {
        self.lines = lines;
        self
    }

    /// Whether this failure is followed by another attempt.
    pub fn will_retry(&self) -> bool {
        self.phase == Phase::Failure && self.delay.is_some()
    }

    /// Human-readable rendering of the event.
    pub fn message(&self) -> String {
        match self.phase {
            Phase::Attempt => match (self.attempt, self.max_attempts) {
                (Some(i), Some(n)) => {
                    format!("Attempt [{i}/{n}] to execute function \"{}\".", self.operation)
                }
                (Some(i), None) => {
                    format!("Attempt {i} to execute function \"{}\".", self.operation)
                }
                _ => format!("Executing function \"{}\".", self.operation),
            },
            Phase::Failure => {
                let error = self.error.as_deref().unwrap_or_default();
                let error = error.trim_end_matches('.');
                match self.delay {
                    _ if !self.retryable => {
                        format!("Function failed with error: \"{error}\". Not retryable.")
                    }
                    Some(delay) => format!(
                        "Function failed with error: \"{error}\". Retrying in {:.2} seconds ...",
                        delay.as_secs_f64()
                    ),
                    None if self.attempt.is_some() && self.attempt == self.max_attempts => {
                        format!("Function failed with error: \"{error}\". No more attempts.")
                    }
                    None => format!("Function failed with error: \"{error}\". Not retryable."),
                }
            }
            Phase::Success => match self.attempt {
                Some(i) => format!(
                    "Function \"{}\" succeeded on attempt {i}.",
                    self.operation
                ),
                None => format!("Function \"{}\" succeeded.", self.operation),
            },
            Phase::Timeout => format!(
                "Function {} exceeded the {} seconds timeout.",
                self.operation,
                self.elapsed.unwrap_or_default().as_secs_f64()
            ),
            Phase::Elapsed | Phase::Parameters | Phase::Return => self.lines.join("\n"),
        }
    }
}

fn is_true(value: &bool) -> bool {
    *value
}

mod opt_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_f64(d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }
}

/// Receives events from decorated calls.
pub trait Reporter: Send + Sync {
    fn report(&self, event: &Event);
}

impl<R: Reporter + ?Sized> Reporter for Arc<R> {
    fn report(&self, event: &Event) {
        (**self).report(event)
    }
}

/// Shared handle to a reporter, as stored by policies and guards.
pub type SharedReporter = Arc<dyn Reporter>;

/// The reporter used when none is injected.
pub fn default_reporter() -> SharedReporter {
    Arc::new(TracingReporter)
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: &Event) {
        let message = event.message();
        let delay_secs = event.delay.map(|d| d.as_secs_f64());
        match event.phase {
            Phase::Failure if event.will_retry() => tracing::warn!(
                target: "devtools::report",
                operation = %event.operation,
                attempt = ?event.attempt,
                max_attempts = ?event.max_attempts,
                delay_secs = ?delay_secs,
                "{message}"
            ),
            Phase::Failure | Phase::Timeout => tracing::error!(
                target: "devtools::report",
                operation = %event.operation,
                attempt = ?event.attempt,
                max_attempts = ?event.max_attempts,
                "{message}"
            ),
            Phase::Attempt | Phase::Success => tracing::debug!(
                target: "devtools::report",
                operation = %event.operation,
                attempt = ?event.attempt,
                max_attempts = ?event.max_attempts,
                "{message}"
            ),
            Phase::Elapsed | Phase::Parameters | Phase::Return => tracing::info!(
                target: "devtools::report",
                operation = %event.operation,
                phase = %event.phase,
                "{message}"
            ),
        }
    }
}

/// Prints the human-readable lines to stdout.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleReporter {
    color: bool,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self { color: true }
    }

    /// Plain output without ANSI colors.
    pub fn plain() -> Self {
        Self { color: false }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, event: &Event) {
        let message = event.message();
        if !self.color {
            println!("{message}");
            return;
        }
        match event.phase {
            Phase::Failure if event.will_retry() => println!("{}", message.yellow()),
            Phase::Failure | Phase::Timeout => println!("{}", message.red()),
            Phase::Success => println!("{}", message.green()),
            Phase::Attempt => println!("{}", message.dimmed()),
            _ => println!("{message}"),
        }
    }
}

/// Writes one JSON object per event.
pub struct JsonReporter<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonReporter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send> Reporter for JsonReporter<W> {
    fn report(&self, event: &Event) {
        let mut writer = self.writer.lock().expect("mutex poisoned");
        let written = serde_json::to_writer(&mut *writer, event)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"));
        if let Err(e) = written {
            tracing::warn!(target: "devtools::report", error = %e, "failed to write event");
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<Event>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the collected events.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("mutex poisoned").clone()
    }

    /// Collected events for one phase.
    pub fn phase(&self, phase: Phase) -> Vec<Event> {
        self.events
            .lock()
            .expect("mutex poisoned")
            .iter()
            .filter(|e| e.phase == phase)
            .cloned()
            .collect()
    }

    /// Rendered messages in emission order.
    pub fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .expect("mutex poisoned")
            .iter()
            .map(Event::message)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().expect("mutex poisoned").clear();
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, event: &Event) {
        self.events.lock().expect("mutex poisoned").push(event.clone());
    }
}

/// Aggregates events into a [`Metrics`] registry.
pub struct MetricsReporter {
    metrics: &'static Metrics,
}

impl MetricsReporter {
    /// Record into [`GLOBAL_METRICS`].
    pub fn global() -> Self {
        Self {
            metrics: &*GLOBAL_METRICS,
        }
    }

    /// Record into a caller-owned registry.
    pub fn new(metrics: &'static Metrics) -> Self {
        Self { metrics }
    }
}

impl Reporter for MetricsReporter {
    fn report(&self, event: &Event) {
        self.metrics.record_event(event);
    }
}

/// Forwards every event to several reporters.
#[derive(Default, Clone)]
pub struct FanoutReporter {
    reporters: Vec<SharedReporter>,
}

impl FanoutReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: SharedReporter) -> Self {
        self.reporters.push(reporter);
        self
    }
}

impl Reporter for FanoutReporter {
    fn report(&self, event: &Event) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_messages() {
        let bounded = Event::new(Phase::Attempt, "fetch").with_attempt(2, Some(3));
        assert_eq!(bounded.message(), "Attempt [2/3] to execute function \"fetch\".");

        let unbounded = Event::new(Phase::Attempt, "fetch").with_attempt(7, None);
        assert_eq!(unbounded.message(), "Attempt 7 to execute function \"fetch\".");
    }

    #[test]
    fn test_failure_messages() {
        let retrying = Event::new(Phase::Failure, "fetch")
            .with_attempt(1, Some(3))
            .with_error("connection reset.")
            .with_delay(Duration::from_millis(1250));
        assert_eq!(
            retrying.message(),
            "Function failed with error: \"connection reset\". Retrying in 1.25 seconds ..."
        );
        assert!(retrying.will_retry());

        let exhausted = Event::new(Phase::Failure, "fetch")
            .with_attempt(3, Some(3))
            .with_error("connection reset");
        assert_eq!(
            exhausted.message(),
            "Function failed with error: \"connection reset\". No more attempts."
        );
        assert!(!exhausted.will_retry());

        let rejected_last = Event::new(Phase::Failure, "fetch")
            .with_attempt(3, Some(3))
            .with_error("bad request")
            .not_retryable();
        assert_eq!(
            rejected_last.message(),
            "Function failed with error: \"bad request\". Not retryable."
        );
    }

    #[test]
    fn test_retryable_flag_serialized_only_when_false() {
        let retryable = serde_json::to_value(Event::new(Phase::Failure, "fetch")).unwrap();
        assert!(retryable.get("retryable").is_none());

        let rejected =
            serde_json::to_value(Event::new(Phase::Failure, "fetch").not_retryable()).unwrap();
        assert_eq!(rejected["retryable"], false);
    }

    #[test]
    fn test_json_reporter_writes_lines() {
        let reporter = JsonReporter::new(Vec::new());
        reporter.report(
            &Event::new(Phase::Failure, "fetch")
                .with_attempt(1, Some(2))
                .with_error("boom")
                .with_delay(Duration::from_millis(500)),
        );
        reporter.report(&Event::new(Phase::Success, "fetch").with_attempt(2, Some(2)));

        let output = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["phase"], "failure");
        assert_eq!(first["delay"], 0.5);
        assert_eq!(first["error"], "boom");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert!(second.get("delay").is_none());
    }

    #[test]
    fn test_memory_reporter_filters_by_phase() {
        let reporter = MemoryReporter::new();
        reporter.report(&Event::new(Phase::Attempt, "op").with_attempt(1, None));
        reporter.report(&Event::new(Phase::Success, "op").with_attempt(1, None));
        assert_eq!(reporter.events().len(), 2);
        assert_eq!(reporter.phase(Phase::Success).len(), 1);
        reporter.clear();
        assert!(reporter.events().is_empty());
    }

    #[test]
    fn test_fanout_reporter() {
        let a = Arc::new(MemoryReporter::new());
        let b = Arc::new(MemoryReporter::new());
        let fanout = FanoutReporter::new().with(a.clone()).with(b.clone());
        fanout.report(&Event::new(Phase::Timeout, "op").with_elapsed(Duration::from_secs(1)));
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events().len(), 1);
    }
}
