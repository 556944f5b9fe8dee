//! Session error types.

use thiserror::Error;
use wctp_core::CoreError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid login request: {0}")]
    InvalidRequest(#[from] CoreError),

    #[error("Session driver stopped")]
    DriverStopped,
}

pub type SessionResult<T> = Result<T, SessionError>;
