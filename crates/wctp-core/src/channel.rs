//! Logical channels and their lifecycle states.
//!
//! The relay multiplexes two independent functional paths over one
//! connection. Each path walks its own connect → front → login ladder;
//! only the trade channel has a separate authenticate rung.

use crate::error::CoreError;
use crate::status::FailureReason;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One of the two logical channels carried by the relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Trade channel (orders, account queries).
    Trade,
    /// Market-data channel (ticks, subscriptions).
    #[serde(rename = "md")]
    MarketData,
}

impl Channel {
    /// Wire name used by the relay in scoped error reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::MarketData => "md",
        }
    }

    /// Human-readable label for status lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::MarketData => "market data",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Channel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trade" => Ok(Self::Trade),
            "md" | "market_data" => Ok(Self::MarketData),
            other => Err(CoreError::InvalidChannel(other.to_string())),
        }
    }
}

/// Phase reported by the relay for a channel.
///
/// Decided once when a report is routed; downstream code never looks at
/// the event tag string again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelPhase {
    /// Relay opened its side of the channel.
    RelayConnected,
    /// Relay closed its side of the channel.
    RelayDisconnected,
    /// Exchange front is reachable.
    FrontConnected,
    /// Exchange front dropped.
    FrontDisconnected,
    /// Client authentication answered (trade only).
    Authenticated,
    /// Login answered.
    LoggedIn,
    /// Logout answered.
    LoggedOut,
    /// Trading account query answered (trade only).
    TradingAccount,
    /// Generic error response on the channel.
    Error,
}

impl ChannelPhase {
    /// Event tag as it appears on the wire.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::RelayConnected => "connected",
            Self::RelayDisconnected => "disconnected",
            Self::FrontConnected => "front_connected",
            Self::FrontDisconnected => "front_disconnected",
            Self::Authenticated => "authenticate",
            Self::LoggedIn => "login",
            Self::LoggedOut => "logout",
            Self::TradingAccount => "trading_account",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ChannelPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// `(channel, phase)` pair identifying a routed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub channel: Channel,
    pub phase: ChannelPhase,
}

impl EventKey {
    pub const fn new(channel: Channel, phase: ChannelPhase) -> Self {
        Self { channel, phase }
    }

    pub const fn trade(phase: ChannelPhase) -> Self {
        Self::new(Channel::Trade, phase)
    }

    pub const fn market_data(phase: ChannelPhase) -> Self {
        Self::new(Channel::MarketData, phase)
    }
}

impl std::fmt::Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.channel, self.phase)
    }
}

/// Lifecycle state of one channel.
///
/// States are ordered; `Failed` is absorbing and sits outside the order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Idle,
    RelayConnecting,
    RelayConnected,
    FrontConnecting,
    FrontConnected,
    /// Trade channel only.
    Authenticating,
    LoggingIn,
    LoggedIn,
    Failed(FailureReason),
}

impl ChannelState {
    /// Position in the bootstrap ladder. `None` for `Failed`.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Self::Idle => Some(0),
            Self::RelayConnecting => Some(1),
            Self::RelayConnected => Some(2),
            Self::FrontConnecting => Some(3),
            Self::FrontConnected => Some(4),
            Self::Authenticating => Some(5),
            Self::LoggingIn => Some(6),
            Self::LoggedIn => Some(7),
            Self::Failed(_) => None,
        }
    }

    /// Check if this state is at or past `other` in the ladder.
    ///
    /// A failed state has reached nothing.
    pub fn has_reached(&self, other: &ChannelState) -> bool {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => a >= b,
            _ => false,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self, Self::LoggedIn)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Idle, logged in and failed channels have nothing in flight.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Idle | Self::LoggedIn | Self::Failed(_))
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::RelayConnecting => write!(f, "RELAY_CONNECTING"),
            Self::RelayConnected => write!(f, "RELAY_CONNECTED"),
            Self::FrontConnecting => write!(f, "FRONT_CONNECTING"),
            Self::FrontConnected => write!(f, "FRONT_CONNECTED"),
            Self::Authenticating => write!(f, "AUTHENTICATING"),
            Self::LoggingIn => write!(f, "LOGGING_IN"),
            Self::LoggedIn => write!(f, "LOGGED_IN"),
            Self::Failed(reason) => write!(f, "FAILED({reason})"),
        }
    }
}
