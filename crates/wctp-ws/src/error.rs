//! Relay transport error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Connect timed out")]
    ConnectTimeout,

    #[error("Handshake timed out")]
    HandshakeTimeout,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

pub type WsResult<T> = Result<T, WsError>;

/// Inbound payload could not be turned into a report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Malformed report: {0}")]
    Malformed(String),
}
