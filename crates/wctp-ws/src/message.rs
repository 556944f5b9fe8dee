//! Relay envelope codec.
//!
//! Outbound instructions are `{"action": <name>, "data": {...}}`; inbound
//! reports are `{"code": <int>, "message": <text>, "data": <any>}`.

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wctp_core::FrontAddress;
use zeroize::Zeroizing;

// ============================================================================
// Instruction (Outgoing)
// ============================================================================

/// Outbound instruction envelope.
///
/// Every variant carries a payload object so the envelope always has `data`;
/// parameterless actions use [`Empty`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data")]
pub enum Instruction {
    Handshake(HandshakePayload),

    MarketDataConnect(RelayConnectPayload),
    MarketDataConnectFront(FrontPayload),
    MarketDataLogin(MarketDataLoginPayload),
    MarketDataSubscribe(InstrumentsPayload),
    MarketDataUnsubscribe(InstrumentsPayload),
    MarketDataDisconnect(Empty),

    TradeConnect(RelayConnectPayload),
    TradeConnectFront(FrontPayload),
    TradeSet(TradeSetPayload),
    TradeAuth(TradeAuthPayload),
    TradeLogin(TradeLoginPayload),
    TradeLogout(TradeLogoutPayload),
    TradeQueryTradingAccount(QueryTradingAccountPayload),
    TradeQueryOrder(QueryOrderPayload),
    TradeInsertOrder(InsertOrderPayload),
    TradeDeleteOrder(DeleteOrderPayload),
    TradeDisconnect(Empty),

    BacktestRequest(BacktestRequestPayload),
    BacktestCancel(BacktestTaskPayload),
    BacktestQuery(BacktestTaskPayload),
}

impl Instruction {
    pub fn handshake(token: impl Into<String>) -> Self {
        Self::Handshake(HandshakePayload {
            token: token.into(),
        })
    }

    pub fn trade_connect(url: &str, broker_id: &str, user_id: &str) -> Self {
        Self::TradeConnect(RelayConnectPayload::new(url, broker_id, user_id))
    }

    pub fn market_data_connect(url: &str, broker_id: &str, user_id: &str) -> Self {
        Self::MarketDataConnect(RelayConnectPayload::new(url, broker_id, user_id))
    }

    pub fn trade_connect_front(front: &FrontAddress) -> Self {
        Self::TradeConnectFront(front.into())
    }

    pub fn market_data_connect_front(front: &FrontAddress) -> Self {
        Self::MarketDataConnectFront(front.into())
    }

    pub fn trade_set(broker_id: &str, investor_id: &str) -> Self {
        Self::TradeSet(TradeSetPayload {
            broker_id: broker_id.to_string(),
            investor_id: investor_id.to_string(),
        })
    }

    pub fn trade_auth(app_id: &str, auth_code: &str, user_id: &str) -> Self {
        Self::TradeAuth(TradeAuthPayload {
            app_id: app_id.to_string(),
            auth_code: auth_code.to_string(),
            user_id: user_id.to_string(),
        })
    }

    pub fn trade_login(user_id: &str, password: &str) -> Self {
        Self::TradeLogin(TradeLoginPayload {
            user_id: user_id.to_string(),
            password: Zeroizing::new(password.to_string()),
        })
    }

    pub fn market_data_login(password: &str) -> Self {
        Self::MarketDataLogin(MarketDataLoginPayload {
            password: Zeroizing::new(password.to_string()),
        })
    }

    pub fn trade_logout(user_id: &str) -> Self {
        Self::TradeLogout(TradeLogoutPayload {
            user_id: user_id.to_string(),
        })
    }

    pub fn trade_query_trading_account(broker_id: &str, investor_id: &str, op_ref: u64) -> Self {
        Self::TradeQueryTradingAccount(QueryTradingAccountPayload {
            broker_id: broker_id.to_string(),
            investor_id: investor_id.to_string(),
            op_ref,
        })
    }

    pub fn trade_disconnect() -> Self {
        Self::TradeDisconnect(Empty {})
    }

    pub fn market_data_disconnect() -> Self {
        Self::MarketDataDisconnect(Empty {})
    }

    /// Action name of this instruction.
    pub fn action(&self) -> ActionName {
        match self {
            Self::Handshake(_) => ActionName::Handshake,
            Self::MarketDataConnect(_) => ActionName::MarketDataConnect,
            Self::MarketDataConnectFront(_) => ActionName::MarketDataConnectFront,
            Self::MarketDataLogin(_) => ActionName::MarketDataLogin,
            Self::MarketDataSubscribe(_) => ActionName::MarketDataSubscribe,
            Self::MarketDataUnsubscribe(_) => ActionName::MarketDataUnsubscribe,
            Self::MarketDataDisconnect(_) => ActionName::MarketDataDisconnect,
            Self::TradeConnect(_) => ActionName::TradeConnect,
            Self::TradeConnectFront(_) => ActionName::TradeConnectFront,
            Self::TradeSet(_) => ActionName::TradeSet,
            Self::TradeAuth(_) => ActionName::TradeAuth,
            Self::TradeLogin(_) => ActionName::TradeLogin,
            Self::TradeLogout(_) => ActionName::TradeLogout,
            Self::TradeQueryTradingAccount(_) => ActionName::TradeQueryTradingAccount,
            Self::TradeQueryOrder(_) => ActionName::TradeQueryOrder,
            Self::TradeInsertOrder(_) => ActionName::TradeInsertOrder,
            Self::TradeDeleteOrder(_) => ActionName::TradeDeleteOrder,
            Self::TradeDisconnect(_) => ActionName::TradeDisconnect,
            Self::BacktestRequest(_) => ActionName::BacktestRequest,
            Self::BacktestCancel(_) => ActionName::BacktestCancel,
            Self::BacktestQuery(_) => ActionName::BacktestQuery,
        }
    }

    pub fn is_handshake(&self) -> bool {
        matches!(self, Self::Handshake(_))
    }
}

/// Closed set of action names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionName {
    Handshake,
    MarketDataConnect,
    MarketDataConnectFront,
    MarketDataLogin,
    MarketDataSubscribe,
    MarketDataUnsubscribe,
    MarketDataDisconnect,
    TradeConnect,
    TradeConnectFront,
    TradeSet,
    TradeAuth,
    TradeLogin,
    TradeLogout,
    TradeQueryTradingAccount,
    TradeQueryOrder,
    TradeInsertOrder,
    TradeDeleteOrder,
    TradeDisconnect,
    BacktestRequest,
    BacktestCancel,
    BacktestQuery,
}

impl ActionName {
    /// Wire name (identical to the `action` field).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Handshake => "Handshake",
            Self::MarketDataConnect => "MarketDataConnect",
            Self::MarketDataConnectFront => "MarketDataConnectFront",
            Self::MarketDataLogin => "MarketDataLogin",
            Self::MarketDataSubscribe => "MarketDataSubscribe",
            Self::MarketDataUnsubscribe => "MarketDataUnsubscribe",
            Self::MarketDataDisconnect => "MarketDataDisconnect",
            Self::TradeConnect => "TradeConnect",
            Self::TradeConnectFront => "TradeConnectFront",
            Self::TradeSet => "TradeSet",
            Self::TradeAuth => "TradeAuth",
            Self::TradeLogin => "TradeLogin",
            Self::TradeLogout => "TradeLogout",
            Self::TradeQueryTradingAccount => "TradeQueryTradingAccount",
            Self::TradeQueryOrder => "TradeQueryOrder",
            Self::TradeInsertOrder => "TradeInsertOrder",
            Self::TradeDeleteOrder => "TradeDeleteOrder",
            Self::TradeDisconnect => "TradeDisconnect",
            Self::BacktestRequest => "BacktestRequest",
            Self::BacktestCancel => "BacktestCancel",
            Self::BacktestQuery => "BacktestQuery",
        }
    }
}

impl std::fmt::Display for ActionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Empty payload object (`{}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakePayload {
    pub token: String,
}

/// Ask the relay to open one of its channels towards an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConnectPayload {
    pub url: String,
    pub broker_id: String,
    pub user_id: String,
}

impl RelayConnectPayload {
    pub fn new(url: &str, broker_id: &str, user_id: &str) -> Self {
        Self {
            url: url.to_string(),
            broker_id: broker_id.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontPayload {
    pub addr: String,
    pub port: u16,
}

impl From<&FrontAddress> for FrontPayload {
    fn from(front: &FrontAddress) -> Self {
        Self {
            addr: front.addr.clone(),
            port: front.port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeSetPayload {
    pub broker_id: String,
    pub investor_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeAuthPayload {
    pub app_id: String,
    pub auth_code: String,
    pub user_id: String,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeLoginPayload {
    pub user_id: String,
    /// Wiped when the instruction is dropped after encoding.
    pub password: Zeroizing<String>,
}

impl std::fmt::Debug for TradeLoginPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeLoginPayload")
            .field("user_id", &self.user_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketDataLoginPayload {
    pub password: Zeroizing<String>,
}

impl std::fmt::Debug for MarketDataLoginPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataLoginPayload")
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentsPayload {
    pub instrument_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeLogoutPayload {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTradingAccountPayload {
    pub broker_id: String,
    pub investor_id: String,
    /// Correlation field; responses are routed by event tag, not by this.
    pub op_ref: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOrderPayload {
    pub broker_id: String,
    pub investor_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub instrument_id: Option<String>,
    pub op_ref: u64,
}

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

/// Position effect of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Offset {
    Open,
    Close,
    CloseToday,
    CloseYesterday,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOrderPayload {
    pub broker_id: String,
    pub investor_id: String,
    pub exchange_id: String,
    pub instrument_id: String,
    pub direction: Direction,
    pub offset: Offset,
    pub limit_price: f64,
    pub volume: u32,
    pub op_ref: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOrderPayload {
    pub broker_id: String,
    pub investor_id: String,
    pub exchange_id: String,
    pub instrument_id: String,
    pub order_sys_id: String,
    pub op_ref: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestRequestPayload {
    pub strategy: String,
    pub instrument_ids: Vec<String>,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestTaskPayload {
    pub task_id: String,
}

// ============================================================================
// Report (Incoming)
// ============================================================================

/// Closed set of report codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum ReportCode {
    AuthenticateFailed,
    GeneralError,
    Success,
    Handshake,
    MarketDataEvent,
    TradeEvent,
    OperationAck,
}

impl ReportCode {
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::AuthenticateFailed => -2,
            Self::GeneralError => -1,
            Self::Success => 0,
            Self::Handshake => 1,
            Self::MarketDataEvent => 2,
            Self::TradeEvent => 3,
            Self::OperationAck => 4,
        }
    }
}

impl TryFrom<i64> for ReportCode {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -2 => Ok(Self::AuthenticateFailed),
            -1 => Ok(Self::GeneralError),
            0 => Ok(Self::Success),
            1 => Ok(Self::Handshake),
            2 => Ok(Self::MarketDataEvent),
            3 => Ok(Self::TradeEvent),
            4 => Ok(Self::OperationAck),
            other => Err(format!("unknown report code {other}")),
        }
    }
}

impl From<ReportCode> for i64 {
    fn from(code: ReportCode) -> Self {
        code.as_i64()
    }
}

/// Error pair embedded in channel event reports.
///
/// Accepts both the relay's `{code, msg}` and the exchange's
/// `{ErrorID, ErrorMsg}` spellings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RspError {
    #[serde(alias = "ErrorID")]
    pub code: i32,
    #[serde(alias = "ErrorMsg", default)]
    pub msg: String,
}

impl RspError {
    pub fn new(code: i32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

impl std::fmt::Display for RspError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.msg, self.code)
    }
}

/// Inbound report envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub code: ReportCode,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl Report {
    pub fn new(code: ReportCode, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    /// Handshake token (`data.token`).
    pub fn token(&self) -> Option<&str> {
        self.data.get("token").and_then(Value::as_str)
    }

    /// Event tag (`data.event`).
    pub fn event_tag(&self) -> Option<&str> {
        self.data.get("event").and_then(Value::as_str)
    }

    /// Channel scope of a general error (`data.channel`).
    pub fn channel_tag(&self) -> Option<&str> {
        self.data.get("channel").and_then(Value::as_str)
    }

    /// Embedded error pair (`data.err`). `null` or absent means none.
    ///
    /// # Errors
    /// `DecodeError::Malformed` when `err` is present but is not an error
    /// pair; callers must treat that as a failure, not as success.
    pub fn rsp_error(&self) -> Result<Option<RspError>, DecodeError> {
        match self.data.get("err") {
            None | Some(Value::Null) => Ok(None),
            Some(err) => serde_json::from_value(err.clone())
                .map(Some)
                .map_err(|e| DecodeError::Malformed(format!("{err}: {e}"))),
        }
    }

    /// Event payload (`data.body`), if present and not null.
    pub fn body(&self) -> Option<&Value> {
        self.data.get("body").filter(|v| !v.is_null())
    }

    /// Check if the report carries a nonzero or unreadable error.
    pub fn is_failure(&self) -> bool {
        match self.rsp_error() {
            Ok(err) => err.is_some_and(|e| !e.is_ok()),
            Err(_) => true,
        }
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Encode an instruction to its wire text.
///
/// # Panics
/// Never in practice: every payload is a plain record of strings, numbers
/// and sequences, which serde_json always serializes.
pub fn encode(instruction: &Instruction) -> String {
    serde_json::to_string(instruction).expect("instruction payloads always serialize")
}

/// Decode a report from wire bytes.
pub fn decode(bytes: &[u8]) -> Result<Report, DecodeError> {
    serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_handshake_encoding_matches_wire_example() {
        let text = encode(&Instruction::handshake("abc123"));
        assert_eq!(text, r#"{"action":"Handshake","data":{"token":"abc123"}}"#);
    }

    #[test]
    fn test_parameterless_action_carries_empty_data() {
        let text = encode(&Instruction::trade_disconnect());
        assert_eq!(text, r#"{"action":"TradeDisconnect","data":{}}"#);
    }

    #[test]
    fn test_payload_fields_are_camel_case() {
        let value: Value = serde_json::from_str(&encode(&Instruction::trade_auth(
            "client_app",
            "0000000000000000",
            "000001",
        )))
        .unwrap();
        assert_eq!(value["action"], "TradeAuth");
        assert_eq!(value["data"]["appId"], "client_app");
        assert_eq!(value["data"]["authCode"], "0000000000000000");
        assert_eq!(value["data"]["userId"], "000001");
    }

    #[test]
    fn test_login_payload_debug_redacts_password() {
        let debug = format!("{:?}", Instruction::trade_login("000001", "hunter2"));
        assert!(!debug.contains("hunter2"));
        let debug = format!("{:?}", Instruction::market_data_login("hunter2"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_decode_handshake_report() {
        let report =
            decode(br#"{"code":1,"message":"handshake","data":{"token":"abc123"}}"#).unwrap();
        assert_eq!(report.code, ReportCode::Handshake);
        assert_eq!(report.token(), Some("abc123"));
    }

    #[test]
    fn test_decode_success_with_null_data() {
        let report = decode(br#"{"code":0,"message":"ok","data":null}"#).unwrap();
        assert_eq!(report.code, ReportCode::Success);
        assert!(report.data.is_null());
        assert_eq!(report.rsp_error(), Ok(None));
    }

    #[test]
    fn test_decode_rejects_garbage_and_unknown_codes() {
        assert!(matches!(decode(b"not json"), Err(DecodeError::Malformed(_))));
        assert!(matches!(
            decode(br#"{"code":42,"message":"?","data":null}"#),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode(br#"{"message":"no code"}"#),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_event_accessors() {
        let report = Report::new(
            ReportCode::TradeEvent,
            "",
            json!({
                "event": "login",
                "err": {"code": -3, "msg": "bad password"},
                "body": null
            }),
        );
        assert_eq!(report.event_tag(), Some("login"));
        assert_eq!(report.rsp_error(), Ok(Some(RspError::new(-3, "bad password"))));
        assert!(report.is_failure());
        assert!(report.body().is_none());
        assert_eq!(
            report.rsp_error().unwrap().map(|e| e.to_string()).as_deref(),
            Some("bad password (-3)")
        );
    }

    #[test]
    fn test_exchange_error_spelling() {
        let report = Report::new(
            ReportCode::TradeEvent,
            "",
            json!({"event": "authenticate", "err": {"ErrorID": 63, "ErrorMsg": "auth rejected"}}),
        );
        assert_eq!(report.rsp_error(), Ok(Some(RspError::new(63, "auth rejected"))));
    }

    #[test]
    fn test_unreadable_error_pair_is_a_failure() {
        for err in [
            json!({"ErrorID": "-3", "ErrorMsg": "bad password"}),
            json!({"msg": "no code"}),
            json!("bad password"),
        ] {
            let report = Report::new(
                ReportCode::TradeEvent,
                "",
                json!({"event": "login", "err": err, "body": null}),
            );
            assert!(matches!(report.rsp_error(), Err(DecodeError::Malformed(_))));
            assert!(report.is_failure());
        }
    }

    #[test]
    fn test_login_password_encodes_as_plain_string() {
        let text = encode(&Instruction::market_data_login("s3cret"));
        assert_eq!(text, r#"{"action":"MarketDataLogin","data":{"password":"s3cret"}}"#);
    }

    #[test]
    fn test_zero_error_code_is_success() {
        let report = Report::new(
            ReportCode::MarketDataEvent,
            "",
            json!({"event": "login", "err": {"code": 0, "msg": ""}}),
        );
        assert!(!report.is_failure());
    }

    #[test]
    fn test_action_names() {
        assert_eq!(
            Instruction::trade_query_trading_account("9999", "000001", 7).action(),
            ActionName::TradeQueryTradingAccount
        );
        assert_eq!(ActionName::MarketDataLogin.to_string(), "MarketDataLogin");
        assert!(Instruction::handshake("t").is_handshake());
    }
}
