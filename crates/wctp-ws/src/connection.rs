//! Relay connection manager.
//!
//! Handles the connection lifecycle, the one-time token handshake that
//! gates every other instruction, and forwarding of reports once the
//! connection is authenticated. Reconnection policy belongs to the caller.

use crate::error::{WsError, WsResult};
use crate::message::{decode, encode, Instruction, Report, ReportCode};
use crate::transport::{RelayTransport, TransportEvent};
use crate::ws_write_handle::{RelayWriteHandle, SendError};
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex as TokioMutex};
use tokio_tungstenite::{
    connect_async_tls_with_config, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Relay host.
    pub host: String,
    /// Relay port.
    pub port: u16,
    /// Use `wss` instead of `ws`.
    pub tls: bool,
    /// Maximum time for the socket + WebSocket upgrade.
    pub connect_timeout_ms: u64,
    /// Maximum time from upgrade to handshake success.
    pub handshake_timeout_ms: u64,
}

impl ConnectionConfig {
    /// Target URL (`scheme://host:port/`).
    pub fn url(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        format!("{scheme}://{}:{}/", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8888,
            tls: false,
            connect_timeout_ms: 10_000,
            handshake_timeout_ms: 10_000,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    HandshakeWait,
    Authenticated,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::HandshakeWait => write!(f, "HANDSHAKE_WAIT"),
            Self::Authenticated => write!(f, "AUTHENTICATED"),
        }
    }
}

/// What the message loop does with one inbound report.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HandshakeAction {
    /// Write this handshake echo straight to the socket.
    Echo(Instruction),
    /// Handshake complete; resolve the pending connect.
    Authenticated,
    /// Relay refused; reject the pending connect and close.
    Rejected(String),
    /// Hand the report to subscribers.
    Forward(Report),
    /// Not meaningful in the current state.
    Ignore(&'static str),
}

/// Advance the handshake state machine by one report.
///
/// Pure so the handshake rules can be tested without a socket.
pub(crate) fn handshake_step(
    state: ConnectionState,
    report: Report,
) -> (ConnectionState, HandshakeAction) {
    if state == ConnectionState::Authenticated {
        return (state, HandshakeAction::Forward(report));
    }

    match report.code {
        ReportCode::Handshake => match report.token() {
            Some(token) => (
                ConnectionState::HandshakeWait,
                HandshakeAction::Echo(Instruction::handshake(token)),
            ),
            None => (
                state,
                HandshakeAction::Rejected("handshake report without token".to_string()),
            ),
        },
        ReportCode::Success if state == ConnectionState::HandshakeWait => (
            ConnectionState::Authenticated,
            HandshakeAction::Authenticated,
        ),
        ReportCode::AuthenticateFailed => {
            let message = if report.message.is_empty() {
                "authentication failed".to_string()
            } else {
                report.message
            };
            (state, HandshakeAction::Rejected(message))
        }
        _ => (state, HandshakeAction::Ignore("report before authentication")),
    }
}

type RelayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// State shared between the manager and its message loop task.
#[derive(Clone)]
struct LoopShared {
    state: Arc<RwLock<ConnectionState>>,
    outbound_rx: Arc<TokioMutex<mpsc::UnboundedReceiver<Instruction>>>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
}

/// Relay connection manager.
pub struct RelayConnection {
    config: ConnectionConfig,
    state: Arc<RwLock<ConnectionState>>,
    /// Outbound instruction sender (for RelayWriteHandle).
    outbound_tx: mpsc::UnboundedSender<Instruction>,
    /// Outbound instruction receiver (owned by the live message loop).
    outbound_rx: Arc<TokioMutex<mpsc::UnboundedReceiver<Instruction>>>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    /// Cancelled when the current connection ends.
    connection_token: Mutex<CancellationToken>,
}

impl RelayConnection {
    /// Create a new connection manager. Reports received after the
    /// handshake, and the close event, are delivered on `event_tx`.
    pub fn new(config: ConnectionConfig, event_tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let idle_token = CancellationToken::new();
        idle_token.cancel();
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outbound_tx,
            outbound_rx: Arc::new(TokioMutex::new(outbound_rx)),
            event_tx,
            connection_token: Mutex::new(idle_token),
        }
    }

    /// Get a write handle for queueing instructions.
    pub fn write_handle(&self) -> RelayWriteHandle {
        RelayWriteHandle::new(self.outbound_tx.clone(), self.state.clone())
    }

    /// Get current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Connect and complete the handshake.
    ///
    /// A no-op when already authenticated. Fails with `NotReady` while
    /// another connect is in flight.
    pub async fn connect(&self) -> WsResult<()> {
        {
            let mut state = self.state.write();
            match *state {
                ConnectionState::Authenticated => return Ok(()),
                ConnectionState::Connecting | ConnectionState::HandshakeWait => {
                    return Err(WsError::NotReady("connect already in progress".to_string()));
                }
                ConnectionState::Disconnected => *state = ConnectionState::Connecting,
            }
        }

        let result = self.open().await;
        if let Err(ref e) = result {
            error!(error = %e, "Relay connect failed");
            *self.state.write() = ConnectionState::Disconnected;
        }
        result
    }

    async fn open(&self) -> WsResult<()> {
        let url = self.config.url();
        info!(%url, "Connecting to relay");

        let upgrade = connect_async_tls_with_config(url.as_str(), None, true, None);
        let (ws_stream, _response) = tokio::time::timeout(self.config.connect_timeout(), upgrade)
            .await
            .map_err(|_| WsError::ConnectTimeout)?
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;
        debug!("WebSocket upgraded, awaiting handshake");

        let token = CancellationToken::new();
        *self.connection_token.lock() = token.clone();

        let (auth_tx, auth_rx) = oneshot::channel();
        tokio::spawn(run_message_loop(
            ws_stream,
            self.shared(),
            auth_tx,
            token.clone(),
        ));

        match tokio::time::timeout(self.config.handshake_timeout(), auth_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(WsError::ConnectionClosed {
                code: 1006,
                reason: "message loop ended during handshake".to_string(),
            }),
            Err(_) => {
                warn!(
                    timeout_ms = self.config.handshake_timeout_ms,
                    "Handshake timed out"
                );
                token.cancel();
                Err(WsError::HandshakeTimeout)
            }
        }
    }

    /// Close the connection if open. Safe to call when already closed.
    pub fn disconnect(&self) {
        let token = self.connection_token.lock().clone();
        if token.is_cancelled() {
            debug!("Disconnect requested but relay connection already closed");
            return;
        }
        info!("Relay disconnect requested");
        token.cancel();
    }

    /// Token cancelled when the current connection ends.
    pub fn closed_token(&self) -> CancellationToken {
        self.connection_token.lock().clone()
    }

    fn shared(&self) -> LoopShared {
        LoopShared {
            state: self.state.clone(),
            outbound_rx: self.outbound_rx.clone(),
            event_tx: self.event_tx.clone(),
        }
    }
}

impl RelayTransport for RelayConnection {
    fn connect(&self) -> BoxFuture<'_, WsResult<()>> {
        Box::pin(RelayConnection::connect(self))
    }

    fn send(&self, instruction: Instruction) -> Result<(), SendError> {
        self.write_handle().send(instruction)
    }

    fn disconnect(&self) {
        RelayConnection::disconnect(self);
    }

    fn state(&self) -> ConnectionState {
        RelayConnection::state(self)
    }

    fn closed_token(&self) -> CancellationToken {
        RelayConnection::closed_token(self)
    }
}

/// Drive one connection until it closes.
async fn run_message_loop(
    ws_stream: RelayStream,
    shared: LoopShared,
    auth_tx: oneshot::Sender<WsResult<()>>,
    token: CancellationToken,
) {
    let (mut write, mut read) = ws_stream.split();

    // Exclusive for the lifetime of this connection.
    let mut outbound = shared.outbound_rx.lock().await;
    let mut stale = 0usize;
    while outbound.try_recv().is_ok() {
        stale += 1;
    }
    if stale > 0 {
        debug!(stale, "Discarded instructions queued for a previous connection");
    }

    let mut auth_tx = Some(auth_tx);
    let mut authenticated = false;

    let reason = loop {
        tokio::select! {
            biased;

            () = token.cancelled() => {
                // Instructions queued before the disconnect (logout) still go out.
                let mut flushed = 0usize;
                while authenticated {
                    let Ok(instruction) = outbound.try_recv() else {
                        break;
                    };
                    if write.send(Message::Text(encode(&instruction))).await.is_err() {
                        break;
                    }
                    flushed += 1;
                }
                if flushed > 0 {
                    debug!(flushed, "Flushed queued instructions before close");
                }
                if let Err(e) = write.send(Message::Close(None)).await {
                    warn!(?e, "Failed to send Close frame");
                }
                break "disconnect requested".to_string();
            }

            msg = read.next() => {
                let decoded = match msg {
                    Some(Ok(Message::Text(text))) => decode(text.as_bytes()),
                    Some(Ok(Message::Binary(bytes))) => decode(&bytes),
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            break format!("pong failed: {e}");
                        }
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason): (u16, String) = frame
                            .map(|f| (f.code.into(), f.reason.to_string()))
                            .unwrap_or((1000, "Normal close".to_string()));
                        warn!(code, %reason, "Relay closed the connection");
                        break format!("closed by relay: code={code}, reason={reason}");
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        error!(?e, "Relay read error");
                        break format!("read error: {e}");
                    }
                    None => {
                        warn!("Relay stream ended");
                        break "stream ended".to_string();
                    }
                };

                let report = match decoded {
                    Ok(report) => report,
                    Err(e) => {
                        warn!(error = %e, "Dropping malformed report");
                        continue;
                    }
                };

                let current = *shared.state.read();
                let (next, action) = handshake_step(current, report);
                *shared.state.write() = next;

                match action {
                    HandshakeAction::Echo(instruction) => {
                        debug!("Echoing handshake token");
                        if let Err(e) = write.send(Message::Text(encode(&instruction))).await {
                            break format!("handshake echo failed: {e}");
                        }
                    }
                    HandshakeAction::Authenticated => {
                        info!("Relay handshake complete");
                        authenticated = true;
                        if let Some(tx) = auth_tx.take() {
                            let _ = tx.send(Ok(()));
                        }
                    }
                    HandshakeAction::Rejected(message) => {
                        warn!(%message, "Relay rejected handshake");
                        if let Some(tx) = auth_tx.take() {
                            let _ = tx.send(Err(WsError::AuthenticationFailed(message.clone())));
                        }
                        let _ = write.send(Message::Close(None)).await;
                        break format!("authentication failed: {message}");
                    }
                    HandshakeAction::Forward(report) => {
                        if shared.event_tx.send(TransportEvent::Report(report)).is_err() {
                            debug!("Transport event receiver dropped");
                        }
                    }
                    HandshakeAction::Ignore(why) => {
                        debug!(why, "Ignoring report");
                    }
                }
            }

            outbound_msg = outbound.recv() => {
                match outbound_msg {
                    Some(instruction) => {
                        let action = instruction.action();
                        if let Err(e) = write.send(Message::Text(encode(&instruction))).await {
                            error!(?e, %action, "Relay write error");
                            break format!("write error: {e}");
                        }
                        debug!(%action, "Instruction sent to relay");
                    }
                    None => break "outbound queue closed".to_string(),
                }
            }
        }
    };

    *shared.state.write() = ConnectionState::Disconnected;
    token.cancel();

    if let Some(tx) = auth_tx.take() {
        let _ = tx.send(Err(WsError::ConnectionClosed {
            code: 1006,
            reason: reason.clone(),
        }));
    }

    if authenticated {
        info!(%reason, "Relay connection closed");
        if shared
            .event_tx
            .send(TransportEvent::Closed { reason })
            .is_err()
        {
            debug!("Transport event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn handshake(token: &str) -> Report {
        Report::new(ReportCode::Handshake, "handshake", json!({ "token": token }))
    }

    fn success() -> Report {
        Report::new(ReportCode::Success, "ok", serde_json::Value::Null)
    }

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.url(), "ws://127.0.0.1:8888/");
        assert_eq!(config.handshake_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_tls_url_scheme() {
        let config = ConnectionConfig {
            host: "relay.example".to_string(),
            port: 443,
            tls: true,
            ..Default::default()
        };
        assert_eq!(config.url(), "wss://relay.example:443/");
    }

    #[test]
    fn test_handshake_echoes_token() {
        let (state, action) = handshake_step(ConnectionState::Connecting, handshake("abc123"));
        assert_eq!(state, ConnectionState::HandshakeWait);
        assert_eq!(action, HandshakeAction::Echo(Instruction::handshake("abc123")));
    }

    #[test]
    fn test_success_after_echo_authenticates() {
        let (state, action) = handshake_step(ConnectionState::HandshakeWait, success());
        assert_eq!(state, ConnectionState::Authenticated);
        assert_eq!(action, HandshakeAction::Authenticated);
    }

    #[test]
    fn test_success_before_handshake_is_ignored() {
        let (state, action) = handshake_step(ConnectionState::Connecting, success());
        assert_eq!(state, ConnectionState::Connecting);
        assert!(matches!(action, HandshakeAction::Ignore(_)));
    }

    #[test]
    fn test_authenticate_failed_rejects_with_message() {
        let report = Report::new(
            ReportCode::AuthenticateFailed,
            "invalid token",
            serde_json::Value::Null,
        );
        let (_, action) = handshake_step(ConnectionState::HandshakeWait, report);
        assert_eq!(action, HandshakeAction::Rejected("invalid token".to_string()));
    }

    #[test]
    fn test_handshake_without_token_rejects() {
        let report = Report::new(ReportCode::Handshake, "handshake", json!({}));
        let (_, action) = handshake_step(ConnectionState::Connecting, report);
        assert!(matches!(action, HandshakeAction::Rejected(_)));
    }

    #[test]
    fn test_reports_after_authentication_are_forwarded_unmodified() {
        for report in [
            success(),
            handshake("again"),
            Report::new(ReportCode::TradeEvent, "", json!({"event": "login"})),
        ] {
            let (state, action) =
                handshake_step(ConnectionState::Authenticated, report.clone());
            assert_eq!(state, ConnectionState::Authenticated);
            assert_eq!(action, HandshakeAction::Forward(report));
        }
    }

    #[test]
    fn test_pre_auth_channel_events_are_not_forwarded() {
        let report = Report::new(ReportCode::TradeEvent, "", json!({"event": "login"}));
        let (_, action) = handshake_step(ConnectionState::HandshakeWait, report);
        assert!(matches!(action, HandshakeAction::Ignore(_)));
    }

    #[tokio::test]
    async fn test_disconnect_when_never_connected_is_noop() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let connection = RelayConnection::new(ConnectionConfig::default(), event_tx);

        connection.disconnect();
        connection.disconnect();

        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(connection.closed_token().is_cancelled());
        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_before_connect_is_not_ready() {
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let connection = RelayConnection::new(ConnectionConfig::default(), event_tx);

        let result = RelayTransport::send(&connection, Instruction::trade_disconnect());
        assert_eq!(result, Err(SendError::NotReady));
    }
}
