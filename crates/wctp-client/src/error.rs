//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Password variable {0} is not set")]
    MissingPassword(String),

    #[error("Session error: {0}")]
    Session(#[from] wctp_session::SessionError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] wctp_telemetry::TelemetryError),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Session driver error: {0}")]
    Driver(String),
}

pub type AppResult<T> = Result<T, AppError>;
