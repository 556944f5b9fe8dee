//! Structured logging for the WebCTP session client.
//!
//! JSON lines in production (`RUST_ENV=production`), pretty output
//! otherwise; `RUST_LOG` overrides the default filter.

pub mod error;
pub mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, LogFormat, LoggingConfig, DEFAULT_FILTER};
