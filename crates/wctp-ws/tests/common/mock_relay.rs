//! Mock relay server for integration tests.
//!
//! Provides a WebSocket server that can:
//! - Open each connection with a handshake token and check the echo
//! - Accept or refuse the handshake
//! - Record received messages
//! - Push reports to, and close, the live connection

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use wctp_ws::ConnectionConfig;

/// How the relay answers the handshake echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeMode {
    Accept,
    Refuse,
    /// Send the token, then never answer.
    Silent,
}

#[derive(Default)]
struct Shared {
    messages: Vec<String>,
    connections: u32,
    live: Option<mpsc::UnboundedSender<Message>>,
}

/// A mock relay for testing.
pub struct MockRelay {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    shared: Arc<Mutex<Shared>>,
}

impl MockRelay {
    /// Start a relay on an available port.
    pub async fn start(mode: HandshakeMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Mutex::new(Shared::default()));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let shared_clone = shared.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(stream, mode, shared_clone.clone()));
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            shared,
        }
    }

    /// Client configuration pointing at this relay.
    pub fn config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            tls: false,
            connect_timeout_ms: 2_000,
            handshake_timeout_ms: 500,
        }
    }

    pub async fn connection_count(&self) -> u32 {
        self.shared.lock().await.connections
    }

    pub async fn received_messages(&self) -> Vec<String> {
        self.shared.lock().await.messages.clone()
    }

    /// Wait until at least `n` messages were received.
    pub async fn wait_for_messages(&self, n: usize) -> Vec<String> {
        for _ in 0..100 {
            let messages = self.received_messages().await;
            if messages.len() >= n {
                return messages;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.received_messages().await
    }

    /// Push a report to the live connection.
    pub async fn push(&self, report: Value) {
        if let Some(tx) = self.shared.lock().await.live.as_ref() {
            let _ = tx.send(Message::Text(report.to_string()));
        }
    }

    /// Push raw text to the live connection.
    pub async fn push_raw(&self, text: &str) {
        if let Some(tx) = self.shared.lock().await.live.as_ref() {
            let _ = tx.send(Message::Text(text.to_string()));
        }
    }

    /// Close the live connection from the relay side.
    pub async fn close_live(&self) {
        if let Some(tx) = self.shared.lock().await.live.take() {
            let _ = tx.send(Message::Close(None));
        }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(stream: TcpStream, mode: HandshakeMode, shared: Arc<Mutex<Shared>>) {
    let connection_no = {
        let mut shared = shared.lock().await;
        shared.connections += 1;
        shared.connections
    };

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let token = format!("tok-{connection_no}");
    let hello = json!({"code": 1, "message": "handshake", "data": {"token": token}});
    if write.send(Message::Text(hello.to_string())).await.is_err() {
        return;
    }

    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<Message>();
    shared.lock().await.live = Some(push_tx);

    loop {
        tokio::select! {
            pushed = push_rx.recv() => {
                let Some(msg) = pushed else { break };
                let closing = matches!(msg, Message::Close(_));
                let _ = write.send(msg).await;
                if closing {
                    break;
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        shared.lock().await.messages.push(text.clone());

                        let Ok(parsed) = serde_json::from_str::<Value>(&text) else {
                            continue;
                        };
                        if parsed["action"] != "Handshake" {
                            continue;
                        }
                        let echoed = parsed["data"]["token"].as_str() == Some(token.as_str());
                        let reply = match mode {
                            HandshakeMode::Accept if echoed => {
                                json!({"code": 0, "message": "ok", "data": null})
                            }
                            HandshakeMode::Silent => continue,
                            _ => json!({"code": -2, "message": "invalid token", "data": null}),
                        };
                        let _ = write.send(Message::Text(reply.to_string())).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }
}
