//! Error types for wctp-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
