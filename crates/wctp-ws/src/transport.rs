//! Transport abstraction consumed by the session layer.

use crate::connection::ConnectionState;
use crate::error::WsResult;
use crate::message::{Instruction, Report};
use crate::ws_write_handle::SendError;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// Event surfaced by the transport after authentication.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Report received after the handshake, forwarded unmodified.
    Report(Report),
    /// Connection closed or errored after the handshake.
    Closed { reason: String },
}

/// Message-oriented duplex channel to the relay.
///
/// Implemented by [`crate::RelayConnection`]; the session layer only sees
/// this trait so it can run against an in-memory transport in tests.
pub trait RelayTransport: Send + Sync {
    /// Open the connection and complete the handshake.
    ///
    /// Resolves only once authenticated; rejects if the connection closes,
    /// errors or the relay refuses the handshake first.
    fn connect(&self) -> BoxFuture<'_, WsResult<()>>;

    /// Queue an instruction. Fails with `NotReady` before authentication
    /// unless the instruction is a handshake.
    fn send(&self, instruction: Instruction) -> Result<(), SendError>;

    /// Close the connection if open. Safe to call repeatedly.
    fn disconnect(&self);

    fn state(&self) -> ConnectionState;

    /// Token cancelled when the current connection closes for any reason.
    fn closed_token(&self) -> CancellationToken;

    fn is_authenticated(&self) -> bool {
        self.state() == ConnectionState::Authenticated
    }
}
