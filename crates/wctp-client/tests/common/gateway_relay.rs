//! Scripted relay for end-to-end tests.
//!
//! Performs the token handshake, then answers every instruction with the
//! reports its script returns for that action, the way a healthy relay and
//! gateway would.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Maps an inbound action name to the reports sent back.
pub type Script = fn(&str) -> Vec<Value>;

/// A relay that follows a script.
pub struct GatewayRelay {
    addr: SocketAddr,
    actions: Arc<Mutex<Vec<String>>>,
}

impl GatewayRelay {
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let actions = Arc::new(Mutex::new(Vec::new()));

        let recorded = actions.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle_connection(stream, script, recorded.clone()));
            }
        });

        Self { addr, actions }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Actions received after the handshake, in order.
    pub async fn actions(&self) -> Vec<String> {
        self.actions.lock().await.clone()
    }

    pub async fn count(&self, action: &str) -> usize {
        self.actions().await.iter().filter(|a| *a == action).count()
    }

    /// Wait until `action` was received at least `n` times.
    pub async fn wait_for(&self, action: &str, n: usize) -> bool {
        for _ in 0..200 {
            if self.count(action).await >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

async fn handle_connection(stream: TcpStream, script: Script, actions: Arc<Mutex<Vec<String>>>) {
    let Ok(ws_stream) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws_stream.split();

    let hello = json!({"code": 1, "message": "handshake", "data": {"token": "abc123"}});
    if write.send(Message::Text(hello.to_string())).await.is_err() {
        return;
    }

    while let Some(Ok(msg)) = read.next().await {
        let Message::Text(text) = msg else {
            continue;
        };
        let Ok(instruction) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        let action = instruction["action"].as_str().unwrap_or_default().to_string();

        let replies = if action == "Handshake" {
            vec![json!({"code": 0, "message": "ok", "data": null})]
        } else {
            actions.lock().await.push(action.clone());
            script(&action)
        };

        for reply in replies {
            if write.send(Message::Text(reply.to_string())).await.is_err() {
                return;
            }
        }
    }
}

// ============================================================================
// Report builders
// ============================================================================

pub fn relay_ack(tag: &str) -> Value {
    json!({"code": 4, "message": "", "data": {"event": tag}})
}

pub fn trade_event(tag: &str, body: Value) -> Value {
    json!({"code": 3, "message": "", "data": {"event": tag, "err": null, "body": body}})
}

pub fn trade_error(tag: &str, code: i32, msg: &str) -> Value {
    json!({
        "code": 3,
        "message": "",
        "data": {"event": tag, "err": {"code": code, "msg": msg}, "body": null}
    })
}

pub fn md_event(tag: &str) -> Value {
    json!({"code": 2, "message": "", "data": {"event": tag, "err": null, "body": null}})
}

/// Relay and gateway that accept every step.
pub fn healthy(action: &str) -> Vec<Value> {
    match action {
        "TradeConnect" => vec![relay_ack("trade_connected")],
        "MarketDataConnect" => vec![relay_ack("md_connected")],
        "TradeConnectFront" => vec![trade_event("front_connected", Value::Null)],
        "TradeAuth" => vec![trade_event("authenticate", Value::Null)],
        "TradeLogin" => vec![trade_event(
            "login",
            json!({
                "TradingDay": "20240105",
                "LoginTime": "09:00:01",
                "BrokerID": "9999",
                "UserID": "000001",
                "FrontID": 1,
                "SessionID": 12345,
                "MaxOrderRef": "1"
            }),
        )],
        "MarketDataConnectFront" => vec![md_event("front_connected")],
        "MarketDataLogin" => vec![md_event("login")],
        "TradeQueryTradingAccount" => vec![trade_event(
            "trading_account",
            json!({
                "BrokerID": "9999",
                "AccountID": "000001",
                "PreBalance": 1000000.0,
                "Balance": 1000250.5,
                "Available": 990000.0,
                "CurrMargin": 10000.0,
                "TradingDay": "20240105"
            }),
        )],
        "TradeLogout" => vec![trade_event("logout", Value::Null)],
        _ => Vec::new(),
    }
}

/// Gateway that rejects the trade password.
pub fn wrong_password(action: &str) -> Vec<Value> {
    match action {
        "TradeLogin" => vec![trade_error("login", -3, "bad password")],
        other => healthy(other),
    }
}
