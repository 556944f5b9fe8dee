//! Login status as observed by the presentation layer.

use crate::channel::Channel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bootstrap step the session is currently on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginStep {
    Idle,
    /// Transport connect and handshake.
    ConnectingRelay,
    TradeRelayConnect,
    MarketDataRelayConnect,
    TradeFrontConnect,
    TradeAuthenticate,
    TradeLogin,
    MarketDataFrontConnect,
    MarketDataLogin,
    Ready,
    LoggingOut,
    LoggedOut,
    Failed,
}

impl LoginStep {
    /// Bootstrap sequence number (1-8) for the step-issuing states.
    pub fn number(&self) -> Option<u8> {
        match self {
            Self::TradeRelayConnect => Some(1),
            Self::MarketDataRelayConnect => Some(2),
            Self::TradeFrontConnect => Some(3),
            Self::TradeAuthenticate => Some(4),
            Self::TradeLogin => Some(5),
            Self::MarketDataFrontConnect => Some(6),
            Self::MarketDataLogin => Some(7),
            Self::Ready => Some(8),
            _ => None,
        }
    }

    /// Human-readable step description.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Idle => "not logged in",
            Self::ConnectingRelay => "connecting to relay",
            Self::TradeRelayConnect => "opening trade channel",
            Self::MarketDataRelayConnect => "opening market data channel",
            Self::TradeFrontConnect => "connecting trade front",
            Self::TradeAuthenticate => "authenticating trade client",
            Self::TradeLogin => "logging in to trade front",
            Self::MarketDataFrontConnect => "connecting market data front",
            Self::MarketDataLogin => "logging in to market data front",
            Self::Ready => "ready",
            Self::LoggingOut => "logging out",
            Self::LoggedOut => "logged out",
            Self::Failed => "login failed",
        }
    }
}

impl std::fmt::Display for LoginStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Status line colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// One status transition published to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginStatus {
    pub step: LoginStep,
    pub severity: Severity,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl LoginStatus {
    pub fn new(step: LoginStep, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            step,
            severity,
            message: message.into(),
            at: Utc::now(),
        }
    }

    /// Informational status using the step description as message.
    pub fn progress(step: LoginStep) -> Self {
        Self::new(step, Severity::Info, step.description())
    }

    pub fn idle() -> Self {
        Self::progress(LoginStep::Idle)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl Default for LoginStatus {
    fn default() -> Self {
        Self::idle()
    }
}

/// Why a login session (or one of its channels) failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Connection failed, closed or errored.
    Transport(String),
    /// Relay or exchange answered a step with a nonzero error code.
    Rejected {
        channel: Channel,
        code: i32,
        msg: String,
    },
    /// Relay reported a protocol-level error scoped to the current step.
    Protocol(String),
    /// Exchange front dropped while the channel was in use.
    FrontDisconnected(Channel),
    /// Step report never arrived.
    Timeout(LoginStep),
    /// Instruction could not be queued.
    SendFailed(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(reason) => write!(f, "connection lost: {reason}"),
            Self::Rejected { code, msg, .. } => write!(f, "{msg} ({code})"),
            Self::Protocol(message) => write!(f, "relay error: {message}"),
            Self::FrontDisconnected(channel) => {
                write!(f, "{} front disconnected", channel.label())
            }
            Self::Timeout(step) => write!(f, "timed out: {step}"),
            Self::SendFailed(reason) => write!(f, "send failed: {reason}"),
        }
    }
}
