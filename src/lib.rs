//! devtools - Reusable wrappers for unreliable and slow operations
//!
//! Retry with fixed or randomized delays, bounded waiting on a worker,
//! execution timing, parameter printing, argument exclusivity checks and a
//! lazily-created single instance holder. Every wrapper reports what it
//! does through a pluggable [`report::Reporter`].

pub mod config;
pub mod error;
pub mod report;
pub mod telemetry;
pub mod util;

pub use config::{RetryConfig, TimeoutConfig, ToolsConfig};
pub use error::{ArgumentError, ConfigError, OperationTimedOut, TimeoutError};
pub use report::{Event, Phase, Reporter, SharedReporter};
pub use util::params::{Argument, CallArgs, ExclusiveParameters, ParameterPrinter, Signature};
pub use util::retry::{Delay, FailureKind, RetryPolicy};
pub use util::singleton::Singleton;
pub use util::timeout::TimeoutGuard;
pub use util::timing::{ExecutionTime, ExecutionTimeBlock, Measurement};
