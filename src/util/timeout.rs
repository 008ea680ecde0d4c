//! Bounded waiting on an operation run by a separate worker
//!
//! A [`TimeoutGuard`] bounds how long the caller waits, not how long the
//! work runs: a worker that overruns is left to finish in the background and
//! its result is dropped.

use std::future::Future;
use std::panic;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{ConfigError, OperationTimedOut, TimeoutError};
use crate::report::{default_reporter, Event, Phase, SharedReporter};
use crate::telemetry::{OperationSpan, SpanExt};

/// Bound used when none is configured.
pub const DEFAULT_BOUND: Duration = Duration::from_secs(10);

/// Runs operations on a worker and waits for them up to a bound.
#[derive(Clone)]
pub struct TimeoutGuard {
    bound: Duration,
    drain_on_timeout: bool,
    reporter: SharedReporter,
}

impl TimeoutGuard {
    /// The bound must be strictly positive.
    pub fn new(bound: Duration) -> Result<Self, ConfigError> {
        if bound.is_zero() {
            return Err(ConfigError::invalid(
                "Timeout seconds must be greater than zero.",
            ));
        }
        Ok(Self {
            bound,
            drain_on_timeout: false,
            reporter: default_reporter(),
        })
    }

    /// Bound given in seconds; zero, negative and non-finite values are rejected.
    pub fn from_secs_f64(secs: f64) -> Result<Self, ConfigError> {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(ConfigError::invalid(format!(
                "Timeout seconds must be greater than zero. Got {secs} instead."
            )));
        }
        let bound =
            Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::invalid(e.to_string()))?;
        Self::new(bound)
    }

    pub fn bound(&self) -> Duration {
        self.bound
    }

    /// After the bound elapses, wait for the worker to finish before
    /// returning [`OperationTimedOut`]. Off by default.
    pub fn drain_on_timeout(mut self, drain: bool) -> Self {
        self.drain_on_timeout = drain;
        self
    }

    pub fn reporter(mut self, reporter: SharedReporter) -> Self {
        self.reporter = reporter;
        self
    }

    fn timed_out<E>(&self, name: &str) -> TimeoutError<E> {
        self.reporter
            .report(&Event::new(Phase::Timeout, name).with_elapsed(self.bound));
        TimeoutError::TimedOut(OperationTimedOut {
            operation: name.to_string(),
            bound: self.bound,
        })
    }

    /// Run `operation` on a new worker thread and wait up to the bound.
    ///
    /// A failure returned inside the bound comes back as
    /// [`TimeoutError::Failed`]; a panic on the worker is resumed on the
    /// caller.
    pub fn run<T, E, F>(&self, name: &str, operation: F) -> Result<T, TimeoutError<E>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let span = OperationSpan::new("timeout", name);
        let _enter = span.enter();
        let start = Instant::now();

        // Capacity one so a late worker never blocks on a receiver that is gone.
        let (cell, outcome) = mpsc::sync_channel::<Result<T, E>>(1);
        // Thread names may not contain NUL.
        let worker = thread::Builder::new()
            .name(format!("devtools-timeout-{}", name.replace('\0', "")))
            .spawn(move || {
                let _ = cell.send(operation());
            })
            .map_err(|e| TimeoutError::WorkerLost {
                operation: name.to_string(),
                reason: e.to_string(),
            })?;

        let result = match outcome.recv_timeout(self.bound) {
            Ok(finished) => {
                let _ = worker.join();
                finished.map_err(TimeoutError::Failed)
            }
            Err(RecvTimeoutError::Timeout) => {
                if self.drain_on_timeout {
                    let _ = worker.join();
                }
                Err(self.timed_out(name))
            }
            Err(RecvTimeoutError::Disconnected) => match worker.join() {
                Err(payload) => panic::resume_unwind(payload),
                Ok(()) => unreachable!("worker exits only after sending its outcome"),
            },
        };

        span.record_success(result.is_ok());
        span.record_duration_ms(start.elapsed().as_secs_f64() * 1000.0);
        result
    }

    /// Spawn `operation` on the tokio runtime and wait up to the bound.
    ///
    /// On timeout the task is detached, not aborted.
    pub async fn run_async<T, E, Fut>(
        &self,
        name: &str,
        operation: Fut,
    ) -> Result<T, TimeoutError<E>>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let waiting = self.wait_async(name, operation);

        #[cfg(feature = "telemetry")]
        let waiting = tracing::Instrument::instrument(waiting, OperationSpan::new("timeout", name));

        waiting.await
    }

    async fn wait_async<T, E, Fut>(&self, name: &str, operation: Fut) -> Result<T, TimeoutError<E>>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let mut worker = tokio::spawn(operation);
        match tokio::time::timeout(self.bound, &mut worker).await {
            Ok(Ok(finished)) => finished.map_err(TimeoutError::Failed),
            Ok(Err(join_error)) if join_error.is_panic() => {
                panic::resume_unwind(join_error.into_panic())
            }
            Ok(Err(join_error)) => Err(TimeoutError::WorkerLost {
                operation: name.to_string(),
                reason: join_error.to_string(),
            }),
            Err(_elapsed) => {
                if self.drain_on_timeout {
                    let _ = worker.await;
                }
                Err(self.timed_out(name))
            }
        }
    }

    /// Wrap `f` so every call runs under this guard.
    pub fn wrap<A, T, E, F>(
        &self,
        name: impl Into<String>,
        f: F,
    ) -> impl Fn(A) -> Result<T, TimeoutError<E>>
    where
        F: Fn(A) -> Result<T, E> + Send + Sync + 'static,
        A: Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let guard = self.clone();
        let name = name.into();
        let f = Arc::new(f);
        move |args: A| {
            let f = Arc::clone(&f);
            guard.run(&name, move || f(args))
        }
    }
}

impl Default for TimeoutGuard {
    fn default() -> Self {
        Self {
            bound: DEFAULT_BOUND,
            drain_on_timeout: false,
            reporter: default_reporter(),
        }
    }
}

impl std::fmt::Debug for TimeoutGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutGuard")
            .field("bound", &self.bound)
            .field("drain_on_timeout", &self.drain_on_timeout)
            .finish()
    }
}
