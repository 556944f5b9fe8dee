//! In-memory relay transport and report builders for session tests.

#![allow(dead_code)]

use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wctp_core::{FrontAddress, GatewaySettings, LoginRequest};
use wctp_ws::{
    ActionName, ConnectionState, Instruction, RelayTransport, RelayWriteHandle, Report,
    ReportCode, SendError, TransportEvent, WsError, WsResult,
};

/// Scripted answers to instructions, pushed as transport events.
pub type Responder = Box<dyn Fn(&Instruction) -> Vec<Report> + Send + Sync>;

/// Relay transport double.
///
/// Sends go through a real [`RelayWriteHandle`], so the handshake gate
/// applies; accepted instructions are recorded and optionally answered.
pub struct FakeTransport {
    state: Arc<RwLock<ConnectionState>>,
    handle: RelayWriteHandle,
    outbound: Mutex<mpsc::UnboundedReceiver<Instruction>>,
    sent: Mutex<Vec<Instruction>>,
    closed: Mutex<CancellationToken>,
    events: mpsc::UnboundedSender<TransportEvent>,
    responder: Mutex<Option<Responder>>,
    connect_error: Mutex<Option<String>>,
    connects: Mutex<u32>,
}

impl FakeTransport {
    /// Create a transport in `state`, with the receiving end of its event stream.
    pub fn new(state: ConnectionState) -> (Arc<Self>, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(state));
        let closed = CancellationToken::new();
        if *state.read() != ConnectionState::Authenticated {
            closed.cancel();
        }
        let transport = Self {
            handle: RelayWriteHandle::new(tx, state.clone()),
            state,
            outbound: Mutex::new(rx),
            sent: Mutex::new(Vec::new()),
            closed: Mutex::new(closed),
            events,
            responder: Mutex::new(None),
            connect_error: Mutex::new(None),
            connects: Mutex::new(0),
        };
        (Arc::new(transport), event_rx)
    }

    pub fn authenticated() -> (Arc<Self>, mpsc::UnboundedReceiver<TransportEvent>) {
        Self::new(ConnectionState::Authenticated)
    }

    pub fn respond_with(&self, responder: Responder) {
        *self.responder.lock() = Some(responder);
    }

    pub fn fail_connect(&self, reason: &str) {
        *self.connect_error.lock() = Some(reason.to_string());
    }

    /// Push a report as if the relay sent it.
    pub fn push(&self, report: Report) {
        let _ = self.events.send(TransportEvent::Report(report));
    }

    /// Drop the connection: state, token and close event.
    pub fn close(&self, reason: &str) {
        *self.state.write() = ConnectionState::Disconnected;
        self.closed.lock().cancel();
        let _ = self.events.send(TransportEvent::Closed {
            reason: reason.to_string(),
        });
    }

    pub fn sent(&self) -> Vec<Instruction> {
        self.sent.lock().clone()
    }

    pub fn actions(&self) -> Vec<ActionName> {
        self.sent.lock().iter().map(Instruction::action).collect()
    }

    pub fn count(&self, action: ActionName) -> usize {
        self.actions().into_iter().filter(|a| *a == action).count()
    }

    pub fn connects(&self) -> u32 {
        *self.connects.lock()
    }
}

impl RelayTransport for FakeTransport {
    fn connect(&self) -> BoxFuture<'_, WsResult<()>> {
        Box::pin(async move {
            *self.connects.lock() += 1;
            if let Some(reason) = self.connect_error.lock().clone() {
                return Err(WsError::ConnectionFailed(reason));
            }
            *self.state.write() = ConnectionState::Authenticated;
            *self.closed.lock() = CancellationToken::new();
            Ok(())
        })
    }

    fn send(&self, instruction: Instruction) -> Result<(), SendError> {
        self.handle.send(instruction)?;
        let Ok(instruction) = self.outbound.lock().try_recv() else {
            return Err(SendError::ChannelClosed);
        };
        let replies = self
            .responder
            .lock()
            .as_ref()
            .map(|respond| respond(&instruction))
            .unwrap_or_default();
        self.sent.lock().push(instruction);
        for report in replies {
            self.push(report);
        }
        Ok(())
    }

    fn disconnect(&self) {
        *self.state.write() = ConnectionState::Disconnected;
        self.closed.lock().cancel();
    }

    fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn closed_token(&self) -> CancellationToken {
        self.closed.lock().clone()
    }
}

// ============================================================================
// Reports
// ============================================================================

pub fn relay_ack(tag: &str) -> Report {
    Report::new(ReportCode::OperationAck, "", json!({ "event": tag }))
}

pub fn relay_ack_error(tag: &str, code: i32, msg: &str) -> Report {
    Report::new(
        ReportCode::OperationAck,
        "",
        json!({ "event": tag, "err": { "code": code, "msg": msg } }),
    )
}

pub fn trade_event(tag: &str) -> Report {
    Report::new(
        ReportCode::TradeEvent,
        "",
        json!({ "event": tag, "err": null, "body": null }),
    )
}

pub fn trade_event_with_body(tag: &str, body: Value) -> Report {
    Report::new(
        ReportCode::TradeEvent,
        "",
        json!({ "event": tag, "err": null, "body": body }),
    )
}

pub fn trade_error(tag: &str, code: i32, msg: &str) -> Report {
    Report::new(
        ReportCode::TradeEvent,
        "",
        json!({ "event": tag, "err": { "code": code, "msg": msg }, "body": null }),
    )
}

pub fn md_event(tag: &str) -> Report {
    Report::new(
        ReportCode::MarketDataEvent,
        "",
        json!({ "event": tag, "err": null, "body": null }),
    )
}

pub fn md_error(tag: &str, code: i32, msg: &str) -> Report {
    Report::new(
        ReportCode::MarketDataEvent,
        "",
        json!({ "event": tag, "err": { "code": code, "msg": msg }, "body": null }),
    )
}

pub fn login_body() -> Value {
    json!({
        "TradingDay": "20240105",
        "LoginTime": "09:00:01",
        "BrokerID": "9999",
        "UserID": "000001",
        "FrontID": 1,
        "SessionID": 12345,
        "MaxOrderRef": "1"
    })
}

pub fn account_body(balance: f64) -> Value {
    json!({
        "BrokerID": "9999",
        "AccountID": "000001",
        "PreBalance": 1000000.0,
        "Balance": balance,
        "Available": 990000.0,
        "CurrMargin": 10000.0,
        "TradingDay": "20240105"
    })
}

// ============================================================================
// Requests and scripts
// ============================================================================

pub fn settings() -> GatewaySettings {
    GatewaySettings {
        trade_url: "tcp://180.168.146.187:10130".to_string(),
        market_data_url: "tcp://180.168.146.187:10131".to_string(),
        broker_id: "9999".to_string(),
        user_id: "000001".to_string(),
        investor_id: None,
        app_id: "simnow_client_test".to_string(),
        auth_code: "0000000000000000".to_string(),
        trade_front: FrontAddress::new("180.168.146.187", 10130),
        market_data_front: FrontAddress::new("180.168.146.187", 10131),
    }
}

pub fn request() -> LoginRequest {
    LoginRequest::new(settings(), "s3cret")
}

/// The bootstrap instructions, in order.
pub const BOOTSTRAP: [ActionName; 8] = [
    ActionName::TradeConnect,
    ActionName::MarketDataConnect,
    ActionName::TradeConnectFront,
    ActionName::TradeSet,
    ActionName::TradeAuth,
    ActionName::TradeLogin,
    ActionName::MarketDataConnectFront,
    ActionName::MarketDataLogin,
];

/// Answer every instruction the way a healthy relay does.
pub fn healthy_relay(instruction: &Instruction) -> Vec<Report> {
    match instruction.action() {
        ActionName::TradeConnect => vec![relay_ack("trade_connected")],
        ActionName::MarketDataConnect => vec![relay_ack("md_connected")],
        ActionName::TradeConnectFront => vec![trade_event("front_connected")],
        ActionName::TradeAuth => vec![trade_event("authenticate")],
        ActionName::TradeLogin => vec![trade_event_with_body("login", login_body())],
        ActionName::MarketDataConnectFront => vec![md_event("front_connected")],
        ActionName::MarketDataLogin => vec![md_event("login")],
        ActionName::TradeQueryTradingAccount => {
            vec![trade_event_with_body("trading_account", account_body(1000250.5))]
        }
        ActionName::TradeLogout => vec![trade_event("logout")],
        _ => Vec::new(),
    }
}
