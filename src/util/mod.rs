//! Operation wrappers and helpers

pub mod params;
pub mod retry;
pub mod singleton;
pub mod timeout;
pub mod timing;

pub use retry::{Delay, FailureKind, RetryPolicy, RetryPolicyBuilder};
pub use singleton::Singleton;
pub use timeout::TimeoutGuard;
pub use timing::{ExecutionTime, ExecutionTimeBlock, Measurement, TimerGuard};
