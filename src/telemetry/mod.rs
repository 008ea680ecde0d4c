//! Telemetry, tracing, and metrics for devtools.
//!
//! This module provides observability infrastructure:
//! - Structured logging with spans via the `tracing` crate
//! - Metrics collection for retried, guarded and timed operations
//!
//! # Feature Flags
//!
//! - `telemetry` (default): Tracing spans around decorated calls
//! - `release-logs`: Strip debug/trace at compile time
//! - `max-perf`: Disable all tracing for maximum performance

mod init;
pub mod metrics;
mod spans;

pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
pub use metrics::{Histogram, Metrics, MetricsSnapshot, OperationMetrics, GLOBAL_METRICS};
pub use spans::{OperationSpan, SpanExt};
