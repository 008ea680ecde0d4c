//! Error types shared by the utilities

use std::time::Duration;
use thiserror::Error;

/// Errors raised while building a policy, guard or timer.
///
/// These signal programmer error and are never raised mid-call.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }
}

/// Errors raised by the exclusivity validator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

/// The bound elapsed before the worker finished.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Function {operation} exceeded the {} seconds timeout.", .bound.as_secs_f64())]
pub struct OperationTimedOut {
    /// Name of the guarded operation
    pub operation: String,
    /// The bound that elapsed
    pub bound: Duration,
}

/// Outcome of a guarded call that did not succeed.
#[derive(Error, Debug)]
pub enum TimeoutError<E> {
    #[error(transparent)]
    TimedOut(#[from] OperationTimedOut),

    /// The operation finished inside the bound with its own failure.
    #[error("{0}")]
    Failed(E),

    /// The worker could not be started, or its runtime dropped it.
    #[error("Worker for {operation} did not run: {reason}")]
    WorkerLost { operation: String, reason: String },
}

impl<E> TimeoutError<E> {
    /// Whether the bound elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimeoutError::TimedOut(_))
    }

    /// The operation's own failure, if that is what happened.
    pub fn into_failure(self) -> Option<E> {
        match self {
            TimeoutError::Failed(e) => Some(e),
            TimeoutError::TimedOut(_) | TimeoutError::WorkerLost { .. } => None,
        }
    }
}
