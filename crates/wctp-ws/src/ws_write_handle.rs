//! Relay write handle for sending instructions.
//!
//! Provides a fire-and-forget sending API gated on the handshake. Responses
//! arrive later as reports through the transport event stream.

use crate::connection::ConnectionState;
use crate::message::Instruction;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Error type for send operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Handshake not complete (or connection gone).
    NotReady,
    /// Channel closed (message loop gone or shutting down).
    ChannelClosed,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotReady => write!(f, "not ready"),
            Self::ChannelClosed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for SendError {}

/// Write handle for queueing instructions to the relay.
///
/// The handle is cheap to clone and reconnect-safe: the queue outlives
/// individual connections and each new connection discards what the
/// previous one left behind.
///
/// # Authentication gate
///
/// Only `Handshake` instructions pass while the connection is not
/// `Authenticated`. Rejected instructions never reach the queue, so they
/// produce no wire traffic.
#[derive(Clone)]
pub struct RelayWriteHandle {
    tx: mpsc::UnboundedSender<Instruction>,
    state: Arc<RwLock<ConnectionState>>,
}

impl RelayWriteHandle {
    /// Create a new write handle.
    pub fn new(tx: mpsc::UnboundedSender<Instruction>, state: Arc<RwLock<ConnectionState>>) -> Self {
        Self { tx, state }
    }

    /// Queue an instruction (fire-and-forget).
    ///
    /// # Errors
    ///
    /// - `SendError::NotReady`: handshake not complete and the instruction is not a handshake
    /// - `SendError::ChannelClosed`: the outbound queue is closed
    pub fn send(&self, instruction: Instruction) -> Result<(), SendError> {
        if !instruction.is_handshake() && !self.is_authenticated() {
            return Err(SendError::NotReady);
        }

        let action = instruction.action();
        self.tx
            .send(instruction)
            .map_err(|_| SendError::ChannelClosed)?;

        debug!(%action, "Instruction queued for sending");
        Ok(())
    }

    /// Check if the handshake completed and the queue is open.
    pub fn is_authenticated(&self) -> bool {
        *self.state.read() == ConnectionState::Authenticated && !self.tx.is_closed()
    }

    /// Get current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Check if the underlying queue is closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
