//! Structured logging initialization.

use crate::error::{TelemetryError, TelemetryResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,wctp=debug";

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// JSON when `RUST_ENV=production`, pretty otherwise.
    pub fn from_env() -> Self {
        Self::for_environment(std::env::var("RUST_ENV").ok().as_deref())
    }

    fn for_environment(rust_env: Option<&str>) -> Self {
        match rust_env {
            Some("production") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directives; `None` reads `RUST_LOG`, falling back to
    /// [`DEFAULT_FILTER`].
    pub filter: Option<String>,
    pub format: LogFormat,
}

impl LoggingConfig {
    /// Settings taken from the process environment.
    pub fn from_env() -> Self {
        Self {
            filter: None,
            format: LogFormat::from_env(),
        }
    }

    fn env_filter(&self) -> TelemetryResult<EnvFilter> {
        match &self.filter {
            Some(directives) => EnvFilter::try_new(directives)
                .map_err(|e| TelemetryError::InvalidFilter(format!("{directives}: {e}"))),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Initialize structured logging.
///
/// Configures tracing with JSON output for production and
/// pretty output for development. Fails if a global subscriber is
/// already set.
pub fn init_logging(config: &LoggingConfig) -> TelemetryResult<()> {
    let env_filter = config.env_filter()?;

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_names(true),
            )
            .try_init(),
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}
