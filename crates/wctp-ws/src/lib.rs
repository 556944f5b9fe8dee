//! WebSocket transport for the trading relay.
//!
//! Provides:
//! - The instruction/report envelope codec
//! - A relay connection that completes the token handshake before
//!   letting any other instruction through
//! - A cloneable write handle that enforces the handshake gate
//! - The [`RelayTransport`] trait the session layer is written against

pub mod connection;
pub mod error;
pub mod message;
pub mod transport;
pub mod ws_write_handle;

pub use connection::{ConnectionConfig, ConnectionState, RelayConnection};
pub use error::{DecodeError, WsError, WsResult};
pub use message::{decode, encode, ActionName, Instruction, Report, ReportCode, RspError};
pub use transport::{RelayTransport, TransportEvent};
pub use ws_write_handle::{RelayWriteHandle, SendError};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any `wss` connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
