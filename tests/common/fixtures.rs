//! Test fixtures for exercising the wrappers offline and quickly.
//!
//! Provides scripted operations that fail a set number of times and
//! reporter plumbing that captures every event.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use devtools::report::MemoryReporter;
use devtools::{RetryPolicy, SharedReporter, TimeoutGuard};

/// Error produced by [`Flaky`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestError {
    /// Expected to go away on retry
    Transient(u32),
    /// Never goes away
    Fatal(String),
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestError::Transient(call) => write!(f, "transient failure on call {call}."),
            TestError::Fatal(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for TestError {}

/// An operation that fails `failures` times before returning `value`.
///
/// Shares its call counter across clones so workers and callers agree.
#[derive(Clone)]
pub struct Flaky<T> {
    failures: u32,
    value: T,
    calls: Arc<AtomicU32>,
}

impl<T: Clone> Flaky<T> {
    pub fn new(failures: u32, value: T) -> Self {
        Self {
            failures,
            value,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// An operation that never succeeds.
    pub fn always_failing(value: T) -> Self {
        Self::new(u32::MAX, value)
    }

    pub fn call(&self) -> Result<T, TestError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(TestError::Transient(call))
        } else {
            Ok(self.value.clone())
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// A capturing reporter and its shared handle.
pub fn capture() -> (Arc<MemoryReporter>, SharedReporter) {
    let reporter = Arc::new(MemoryReporter::new());
    let shared: SharedReporter = reporter.clone();
    (reporter, shared)
}

/// A retry policy with no delay that reports into `reporter`.
pub fn instant_retry(max_attempts: u32, reporter: SharedReporter) -> RetryPolicy<TestError> {
    RetryPolicy::builder()
        .max_attempts(max_attempts)
        .fixed_delay(Duration::ZERO)
        .reporter(reporter)
        .build()
        .expect("valid retry policy")
}

/// A timeout guard that reports into `reporter`.
pub fn guard(bound: Duration, reporter: SharedReporter) -> TimeoutGuard {
    TimeoutGuard::new(bound)
        .expect("valid timeout bound")
        .reporter(reporter)
}
