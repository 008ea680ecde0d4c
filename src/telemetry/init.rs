//! Subscriber setup for applications that want the wrappers' logs.
//!
//! Reporters log under the `devtools::report` target and wrapped calls open
//! `devtools_call` spans, so one `devtools=<level>` directive controls both.

use serde::{Deserialize, Serialize};
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// How wrapper logs are rendered and filtered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Level for `devtools` targets and the fallback for everything else
    #[serde(with = "level_name")]
    pub default_level: Level,
    /// Log when each `devtools_call` span closes, with its timing
    pub log_call_spans: bool,
    pub include_file_line: bool,
    pub include_target: bool,
    pub ansi_colors: bool,
    pub compact: bool,
    /// Full `EnvFilter` directive; replaces `default_level` and `RUST_LOG`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_directive: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            log_call_spans: false,
            include_file_line: false,
            include_target: true,
            ansi_colors: true,
            compact: true,
            filter_directive: None,
        }
    }
}

impl TelemetryConfig {
    /// Every attempt, success and call span is logged.
    pub fn development() -> Self {
        Self {
            default_level: Level::DEBUG,
            log_call_spans: true,
            include_file_line: true,
            compact: false,
            ..Self::default()
        }
    }

    /// Only retried failures, exhaustion and timeouts.
    pub fn production() -> Self {
        Self {
            default_level: Level::WARN,
            include_target: false,
            ansi_colors: false,
            ..Self::default()
        }
    }

    fn env_filter(&self) -> anyhow::Result<EnvFilter> {
        if let Some(directive) = &self.filter_directive {
            return Ok(EnvFilter::try_new(directive)?);
        }
        Ok(EnvFilter::from_default_env()
            .add_directive(self.default_level.into())
            .add_directive(format!("devtools={}", self.default_level).parse()?))
    }

    /// Build the subscriber without installing it.
    pub fn subscriber(&self) -> anyhow::Result<impl Subscriber + Send + Sync + 'static> {
        let span_events = if self.log_call_spans {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let layer = fmt::layer()
            .with_ansi(self.ansi_colors)
            .with_target(self.include_target)
            .with_file(self.include_file_line)
            .with_line_number(self.include_file_line)
            .with_span_events(span_events);
        let layer = if self.compact {
            layer.compact().boxed()
        } else {
            layer.boxed()
        };

        Ok(tracing_subscriber::registry()
            .with(self.env_filter()?)
            .with(layer))
    }
}

mod level_name {
    use serde::{Deserialize, Deserializer, Serializer};
    use tracing::Level;

    pub fn serialize<S: Serializer>(level: &Level, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(level.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Level, D::Error> {
        let name = String::deserialize(d)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Returned by [`init_telemetry`]; hold it for the life of the process.
pub struct TelemetryGuard {
    _private: (),
}

/// Install the configured subscriber as the process-wide default.
///
/// Fails if a global subscriber is already set.
///
/// ```rust,ignore
/// use devtools::telemetry::{init_telemetry, TelemetryConfig};
///
/// fn main() -> anyhow::Result<()> {
///     let _guard = init_telemetry(&TelemetryConfig::development())?;
///     // Retry attempts and timeouts are now logged.
///     Ok(())
/// }
/// ```
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    tracing::subscriber::set_global_default(config.subscriber()?)?;
    Ok(TelemetryGuard { _private: () })
}
