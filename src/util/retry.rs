//! Retry logic with fixed or randomized delays
//!
//! A [`RetryPolicy`] re-invokes an operation until it succeeds or the attempt
//! budget runs out. Between attempts the calling thread (or task, for
//! [`RetryPolicy::run_async`]) sleeps for a fixed delay or a delay sampled
//! uniformly from a range.

use rand::Rng;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::ConfigError;
use crate::report::{default_reporter, Event, Phase, SharedReporter};
use crate::telemetry::{OperationSpan, SpanExt};

/// Delay used when none is configured.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);

/// Wait between two attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    /// Always wait the same duration
    Fixed(Duration),
    /// Wait a duration sampled uniformly from `[low, high]`, re-sampled every attempt
    Range { low: Duration, high: Duration },
}

impl Delay {
    pub fn fixed(delay: Duration) -> Self {
        Delay::Fixed(delay)
    }

    /// A randomized delay; `low` must be strictly below `high`.
    pub fn range(low: Duration, high: Duration) -> Result<Self, ConfigError> {
        if low >= high {
            return Err(ConfigError::invalid(format!(
                "The first element of the delay range must be less than the second element. Got ({}, {}) instead.",
                low.as_secs_f64(),
                high.as_secs_f64()
            )));
        }
        Ok(Delay::Range { low, high })
    }

    /// A fixed delay given in seconds.
    pub fn fixed_secs(secs: f64) -> Result<Self, ConfigError> {
        Ok(Delay::Fixed(secs_to_duration(secs, "The delay")?))
    }

    /// A randomized delay given in seconds.
    pub fn range_secs(low: f64, high: f64) -> Result<Self, ConfigError> {
        let low = secs_to_duration(low, "Both elements of the delay range")?;
        let high = secs_to_duration(high, "Both elements of the delay range")?;
        Self::range(low, high)
    }

    /// The delay to wait before the next attempt.
    pub fn sample(&self) -> Duration {
        match *self {
            Delay::Fixed(delay) => delay,
            Delay::Range { low, high } => rand::thread_rng().gen_range(low..=high),
        }
    }
}

impl Default for Delay {
    fn default() -> Self {
        Delay::Fixed(DEFAULT_DELAY)
    }
}

fn secs_to_duration(secs: f64, what: &str) -> Result<Duration, ConfigError> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(ConfigError::invalid(format!(
            "{what} must be greater than or equal to 0. Got {secs} instead."
        )));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::invalid(e.to_string()))
}

/// A named class of failures that may be retried.
pub struct FailureKind<E> {
    name: String,
    matcher: Arc<dyn Fn(&E) -> bool + Send + Sync>,
}

impl<E> FailureKind<E> {
    /// A kind defined by a predicate over the operation's error.
    pub fn new<P>(name: impl Into<String>, matcher: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            matcher: Arc::new(matcher),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, error: &E) -> bool {
        (self.matcher)(error)
    }
}

impl<E> FailureKind<E>
where
    E: AsRef<dyn StdError + Send + Sync + 'static> + 'static,
{
    /// Matches boxed or `anyhow` errors whose source chain contains a `T`.
    pub fn of<T: StdError + 'static>() -> Self {
        Self::new(std::any::type_name::<T>(), |error: &E| {
            let error: &(dyn StdError + 'static) = error.as_ref();
            let mut current = Some(error);
            while let Some(err) = current {
                if err.is::<T>() {
                    return true;
                }
                current = err.source();
            }
            false
        })
    }
}

impl<E> Clone for FailureKind<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            matcher: Arc::clone(&self.matcher),
        }
    }
}

impl<E> fmt::Debug for FailureKind<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FailureKind").field(&self.name).finish()
    }
}

/// What to do after a failed attempt.
enum Step {
    /// Not retryable, hand the failure back untouched
    Propagate,
    /// Attempt budget consumed
    Exhausted,
    Retry(Duration),
}

/// Retries an operation until it succeeds or the attempt budget runs out.
///
/// Policies are immutable and validated when built; one policy may drive
/// any number of concurrent calls.
pub struct RetryPolicy<E> {
    max_attempts: Option<u32>,
    delay: Delay,
    propagate_on_exhaustion: bool,
    retryable: Option<Vec<FailureKind<E>>>,
    reporter: SharedReporter,
}

impl<E> RetryPolicy<E> {
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }

    /// `None` means attempts are unbounded.
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    pub fn delay(&self) -> Delay {
        self.delay
    }

    pub fn propagate_on_exhaustion(&self) -> bool {
        self.propagate_on_exhaustion
    }

    /// Whether `error` may be retried under this policy.
    pub fn is_retryable(&self, error: &E) -> bool {
        match &self.retryable {
            None => true,
            Some(kinds) => kinds.iter().any(|kind| kind.matches(error)),
        }
    }

    fn next_step(&self, name: &str, attempt: u32, error: &E) -> Step
    where
        E: fmt::Display,
    {
        let failure = Event::new(Phase::Failure, name)
            .with_attempt(attempt, self.max_attempts)
            .with_error(error.to_string());

        if !self.is_retryable(error) {
            self.reporter.report(&failure.not_retryable());
            return Step::Propagate;
        }

        if self.max_attempts == Some(attempt) {
            self.reporter.report(&failure);
            return Step::Exhausted;
        }

        let delay = self.delay.sample();
        self.reporter.report(&failure.with_delay(delay));
        Step::Retry(delay)
    }

    fn report_attempt(&self, name: &str, attempt: u32) {
        self.reporter
            .report(&Event::new(Phase::Attempt, name).with_attempt(attempt, self.max_attempts));
    }

    fn report_success(&self, name: &str, attempt: u32) {
        self.reporter
            .report(&Event::new(Phase::Success, name).with_attempt(attempt, self.max_attempts));
    }

    fn exhausted<T>(&self, error: E) -> Result<Option<T>, E> {
        if self.propagate_on_exhaustion {
            Err(error)
        } else {
            Ok(None)
        }
    }

    /// Run `operation` on the calling thread, sleeping between attempts.
    ///
    /// Returns `Ok(Some(value))` on success and `Ok(None)` when the attempt
    /// budget is exhausted and the policy does not propagate. Failures that
    /// are not retryable are returned immediately.
    pub fn run<T, F>(&self, name: &str, mut operation: F) -> Result<Option<T>, E>
    where
        F: FnMut() -> Result<T, E>,
        E: fmt::Display,
    {
        let span = OperationSpan::new("retry", name);
        let _enter = span.enter();
        let start = Instant::now();

        let mut attempt: u32 = 1;
        let outcome = loop {
            self.report_attempt(name, attempt);
            match operation() {
                Ok(value) => {
                    self.report_success(name, attempt);
                    break Ok(Some(value));
                }
                Err(error) => match self.next_step(name, attempt, &error) {
                    Step::Propagate => break Err(error),
                    Step::Exhausted => break self.exhausted(error),
                    Step::Retry(delay) => {
                        thread::sleep(delay);
                        attempt = attempt.saturating_add(1);
                    }
                },
            }
        };

        span.record_success(matches!(outcome, Ok(Some(_))));
        span.record_duration_ms(start.elapsed().as_secs_f64() * 1000.0);
        outcome
    }

    /// Async variant of [`run`](Self::run); sleeps with `tokio::time::sleep`.
    pub async fn run_async<T, F, Fut>(&self, name: &str, operation: F) -> Result<Option<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let attempts = self.attempts_async(name, operation);

        #[cfg(feature = "telemetry")]
        let attempts = tracing::Instrument::instrument(attempts, OperationSpan::new("retry", name));

        attempts.await
    }

    async fn attempts_async<T, F, Fut>(&self, name: &str, mut operation: F) -> Result<Option<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut attempt: u32 = 1;
        loop {
            self.report_attempt(name, attempt);
            match operation().await {
                Ok(value) => {
                    self.report_success(name, attempt);
                    return Ok(Some(value));
                }
                Err(error) => match self.next_step(name, attempt, &error) {
                    Step::Propagate => return Err(error),
                    Step::Exhausted => return self.exhausted(error),
                    Step::Retry(delay) => {
                        tokio::time::sleep(delay).await;
                        attempt = attempt.saturating_add(1);
                    }
                },
            }
        }
    }

    /// Wrap `f` so every attempt of a call reuses the same arguments.
    pub fn wrap<A, T, F>(&self, name: impl Into<String>, f: F) -> impl Fn(A) -> Result<Option<T>, E>
    where
        A: Clone,
        F: Fn(A) -> Result<T, E>,
        E: fmt::Display,
    {
        let policy = self.clone();
        let name = name.into();
        move |args: A| policy.run(&name, || f(args.clone()))
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            delay: self.delay,
            propagate_on_exhaustion: self.propagate_on_exhaustion,
            retryable: self.retryable.clone(),
            reporter: Arc::clone(&self.reporter),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .field("propagate_on_exhaustion", &self.propagate_on_exhaustion)
            .field("retryable", &self.retryable)
            .field("reporter", &"<reporter>")
            .finish()
    }
}

/// Builder for [`RetryPolicy`]; all validation happens in [`build`](Self::build).
pub struct RetryPolicyBuilder<E> {
    max_attempts: Option<u32>,
    delay: Result<Delay, ConfigError>,
    propagate_on_exhaustion: bool,
    retryable: Option<Vec<FailureKind<E>>>,
    reporter: Option<SharedReporter>,
}

impl<E> RetryPolicyBuilder<E> {
    /// Unbounded attempts, 5 second delay, failures propagate on exhaustion.
    pub fn new() -> Self {
        Self {
            max_attempts: None,
            delay: Ok(Delay::default()),
            propagate_on_exhaustion: true,
            retryable: None,
            reporter: None,
        }
    }

    /// Must be at least 1.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Retry until the operation succeeds.
    pub fn unbounded(mut self) -> Self {
        self.max_attempts = None;
        self
    }

    pub fn delay(mut self, delay: Delay) -> Self {
        self.delay = Ok(delay);
        self
    }

    /// Keeps a delay that failed validation so `build` can report it.
    pub(crate) fn checked_delay(mut self, delay: Result<Delay, ConfigError>) -> Self {
        self.delay = delay;
        self
    }

    pub fn fixed_delay(self, delay: Duration) -> Self {
        self.delay(Delay::Fixed(delay))
    }

    pub fn delay_range(mut self, low: Duration, high: Duration) -> Self {
        self.delay = Delay::range(low, high);
        self
    }

    pub fn delay_secs(mut self, secs: f64) -> Self {
        self.delay = Delay::fixed_secs(secs);
        self
    }

    pub fn delay_range_secs(mut self, low: f64, high: f64) -> Self {
        self.delay = Delay::range_secs(low, high);
        self
    }

    /// When false, exhaustion yields `Ok(None)` instead of the last failure.
    pub fn propagate_on_exhaustion(mut self, propagate: bool) -> Self {
        self.propagate_on_exhaustion = propagate;
        self
    }

    /// Only retry failures matching one of `kinds`; must not be empty.
    pub fn retry_on<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = FailureKind<E>>,
    {
        self.retryable = Some(kinds.into_iter().collect());
        self
    }

    /// Add a single predicate to the retryable kinds.
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retryable
            .get_or_insert_with(Vec::new)
            .push(FailureKind::new("predicate", predicate));
        self
    }

    pub fn reporter(mut self, reporter: SharedReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn build(self) -> Result<RetryPolicy<E>, ConfigError> {
        if self.max_attempts == Some(0) {
            return Err(ConfigError::invalid(
                "The number of attempts must be greater than 0. Got 0 instead.",
            ));
        }
        let delay = self.delay?;
        if let Some(kinds) = &self.retryable {
            if kinds.is_empty() {
                return Err(ConfigError::invalid(
                    "Retryable failure kinds must have at least one element.",
                ));
            }
        }

        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            delay,
            propagate_on_exhaustion: self.propagate_on_exhaustion,
            retryable: self.retryable,
            reporter: self.reporter.unwrap_or_else(default_reporter),
        })
    }
}

impl<E> Default for RetryPolicyBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}
