//! Declarative policy configuration
//!
//! Retry and timeout settings can be written as YAML and turned into
//! validated [`RetryPolicy`] and [`TimeoutGuard`] values:
//!
//! ```yaml
//! retry:
//!   max_attempts: 3
//!   delay: [0.5, 1.5]
//!   propagate_on_exhaustion: false
//! timeout:
//!   seconds: 2.5
//! telemetry:
//!   default_level: debug
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::report::SharedReporter;
use crate::telemetry::TelemetryConfig;
use crate::util::retry::{Delay, RetryPolicy, RetryPolicyBuilder, DEFAULT_DELAY};
use crate::util::timeout::{TimeoutGuard, DEFAULT_BOUND};

/// Delay in seconds: a single number or a `[low, high]` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DelayConfig {
    Fixed(f64),
    Range(Vec<f64>),
}

impl DelayConfig {
    pub fn to_delay(&self) -> Result<Delay, ConfigError> {
        match self {
            DelayConfig::Fixed(secs) => Delay::fixed_secs(*secs),
            DelayConfig::Range(bounds) => match bounds.as_slice() {
                [low, high] => Delay::range_secs(*low, *high),
                _ => Err(ConfigError::InvalidConfiguration(format!(
                    "The delay range must have 2 elements. Got {} instead.",
                    bounds.len()
                ))),
            },
        }
    }
}

impl Default for DelayConfig {
    fn default() -> Self {
        DelayConfig::Fixed(DEFAULT_DELAY.as_secs_f64())
    }
}

/// Retry settings as written in a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Absent means retry until success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    pub delay: DelayConfig,
    pub propagate_on_exhaustion: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            delay: DelayConfig::default(),
            propagate_on_exhaustion: true,
        }
    }
}

impl RetryConfig {
    /// A builder preloaded with these settings, for adding failure kinds or a reporter.
    pub fn builder<E>(&self) -> RetryPolicyBuilder<E> {
        let builder = RetryPolicy::builder()
            .propagate_on_exhaustion(self.propagate_on_exhaustion)
            .checked_delay(self.delay.to_delay());
        match self.max_attempts {
            Some(attempts) => builder.max_attempts(attempts),
            None => builder.unbounded(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == Some(0) {
            return Err(ConfigError::InvalidConfiguration(
                "The number of attempts must be greater than 0. Got 0 instead.".to_string(),
            ));
        }
        self.delay.to_delay().map(|_| ())
    }
}

impl<E> RetryPolicy<E> {
    /// Build a policy from file settings, retrying every failure.
    pub fn from_config(
        config: &RetryConfig,
        reporter: Option<SharedReporter>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let builder = config.builder();
        match reporter {
            Some(reporter) => builder.reporter(reporter).build(),
            None => builder.build(),
        }
    }
}

/// Timeout settings as written in a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub seconds: f64,
    /// Wait for an overrunning worker before reporting the timeout
    pub drain_on_timeout: bool,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            seconds: DEFAULT_BOUND.as_secs_f64(),
            drain_on_timeout: false,
        }
    }
}

impl TimeoutGuard {
    pub fn from_config(
        config: &TimeoutConfig,
        reporter: Option<SharedReporter>,
    ) -> Result<Self, ConfigError> {
        let guard = TimeoutGuard::from_secs_f64(config.seconds)?
            .drain_on_timeout(config.drain_on_timeout);
        Ok(match reporter {
            Some(reporter) => guard.reporter(reporter),
            None => guard,
        })
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub retry: RetryConfig,
    pub timeout: TimeoutConfig,
    pub telemetry: TelemetryConfig,
}

impl ToolsConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a YAML string and validate it.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: ToolsConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;
        TimeoutGuard::from_secs_f64(self.timeout.seconds).map(|_| ())
    }

    pub fn retry_policy<E>(&self, reporter: Option<SharedReporter>) -> Result<RetryPolicy<E>, ConfigError> {
        RetryPolicy::from_config(&self.retry, reporter)
    }

    pub fn timeout_guard(&self, reporter: Option<SharedReporter>) -> Result<TimeoutGuard, ConfigError> {
        TimeoutGuard::from_config(&self.timeout, reporter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_full_document() {
        let yaml = r#"
retry:
  max_attempts: 3
  delay: [0.5, 1.5]
  propagate_on_exhaustion: false
timeout:
  seconds: 2.5
"#;
        let config = ToolsConfig::parse(yaml).unwrap();
        assert_eq!(config.retry.max_attempts, Some(3));
        assert_eq!(config.retry.delay, DelayConfig::Range(vec![0.5, 1.5]));

        let policy: RetryPolicy<String> = config.retry_policy(None).unwrap();
        assert_eq!(policy.max_attempts(), Some(3));
        assert!(!policy.propagate_on_exhaustion());
        assert_eq!(
            policy.delay(),
            Delay::Range {
                low: Duration::from_millis(500),
                high: Duration::from_millis(1500)
            }
        );

        let guard = config.timeout_guard(None).unwrap();
        assert_eq!(guard.bound(), Duration::from_millis(2500));
    }

    #[test]
    fn test_defaults_match_decorators() {
        let config = ToolsConfig::parse("{}").unwrap();
        assert_eq!(config.retry, RetryConfig::default());
        let policy: RetryPolicy<String> = config.retry_policy(None).unwrap();
        assert_eq!(policy.max_attempts(), None);
        assert_eq!(policy.delay(), Delay::Fixed(DEFAULT_DELAY));
        assert_eq!(config.timeout_guard(None).unwrap().bound(), DEFAULT_BOUND);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            ToolsConfig::parse("retry:\n  max_attempts: 0\n"),
            Err(ConfigError::InvalidConfiguration(_))
        ));
        assert!(ToolsConfig::parse("retry:\n  delay: [5, 5]\n").is_err());
        assert!(ToolsConfig::parse("retry:\n  delay: [1, 2, 3]\n").is_err());
        assert!(ToolsConfig::parse("retry:\n  delay: -1\n").is_err());
        assert!(ToolsConfig::parse("timeout:\n  seconds: 0\n").is_err());
        assert!(matches!(
            ToolsConfig::parse("retry: [not, a, map]"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devtools.yaml");
        std::fs::write(&path, "timeout:\n  seconds: 0.1\n  drain_on_timeout: true\n").unwrap();

        let config = ToolsConfig::load(&path).unwrap();
        assert!(config.timeout.drain_on_timeout);

        let missing = ToolsConfig::load(dir.path().join("missing.yaml"));
        assert!(matches!(missing, Err(ConfigError::IoError(_))));
    }
}
