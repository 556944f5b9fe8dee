//! Report router.
//!
//! Stateless dispatch of inbound reports. Event tag strings are looked at
//! here and nowhere else; everything downstream works on [`EventKey`].

use serde_json::Value;
use std::fmt;
use wctp_core::{Channel, ChannelPhase, EventKey, FailureReason};
use wctp_ws::{DecodeError, Report, ReportCode, RspError};

/// Legacy relay-ack prose, still sent by older relays in `message`.
const LEGACY_TRADE_CONNECTED: &str = "webctp trade connected";
const LEGACY_MD_CONNECTED: &str = "webctp md connected";

/// Why a channel event counts as a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum EventError {
    /// Nonzero error pair.
    Rejected(RspError),
    /// `err` was present but not an error pair.
    Unreadable(String),
}

impl EventError {
    fn from_report(report: &Report) -> Option<Self> {
        match report.rsp_error() {
            Ok(Some(err)) if !err.is_ok() => Some(Self::Rejected(err)),
            Ok(_) => None,
            Err(DecodeError::Malformed(detail)) => Some(Self::Unreadable(detail)),
        }
    }

    pub fn into_failure(self, channel: Channel) -> FailureReason {
        match self {
            Self::Rejected(err) => FailureReason::Rejected {
                channel,
                code: err.code,
                msg: err.msg,
            },
            Self::Unreadable(detail) => {
                FailureReason::Protocol(format!("{channel} unreadable err: {detail}"))
            }
        }
    }
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(err) => write!(f, "{err}"),
            Self::Unreadable(detail) => write!(f, "unreadable err: {detail}"),
        }
    }
}

/// A channel event with its outcome already extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    pub key: EventKey,
    /// Set when the event reports a failure.
    pub error: Option<EventError>,
    pub body: Option<Value>,
}

impl ChannelEvent {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Where a report goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// Handshake challenge arriving on an authenticated connection.
    Handshake(Report),
    /// Relay ack or channel event keyed by `(channel, phase)`.
    Channel(ChannelEvent),
    /// Ack for an operation outside the bootstrap (orders, backtests).
    Operation(Report),
    /// Relay-level error, scoped to a step when the report says which.
    GeneralError {
        scope: Option<EventKey>,
        message: String,
    },
    /// Anything else; goes to the catch-all observer.
    Unmatched(Report),
}

/// Dispatch one report.
pub fn route(report: Report) -> Routed {
    match report.code {
        ReportCode::Handshake => Routed::Handshake(report),
        ReportCode::OperationAck => match relay_ack(&report) {
            Some(key) => channel_event(key, &report),
            None => Routed::Operation(report),
        },
        ReportCode::TradeEvent => match report.event_tag().and_then(trade_phase) {
            Some(phase) => channel_event(EventKey::trade(phase), &report),
            None => Routed::Unmatched(report),
        },
        ReportCode::MarketDataEvent => match report.event_tag().and_then(market_data_phase) {
            Some(phase) => channel_event(EventKey::market_data(phase), &report),
            None => Routed::Unmatched(report),
        },
        ReportCode::GeneralError => Routed::GeneralError {
            scope: error_scope(&report),
            message: error_message(&report),
        },
        ReportCode::Success | ReportCode::AuthenticateFailed => Routed::Unmatched(report),
    }
}

fn channel_event(key: EventKey, report: &Report) -> Routed {
    Routed::Channel(ChannelEvent {
        key,
        error: EventError::from_report(report),
        body: report.body().cloned(),
    })
}

/// Relay-side channel acks, by event tag or legacy message text.
fn relay_ack(report: &Report) -> Option<EventKey> {
    let by_tag = report.event_tag().and_then(|tag| match tag {
        "trade_connected" => Some(EventKey::trade(ChannelPhase::RelayConnected)),
        "md_connected" => Some(EventKey::market_data(ChannelPhase::RelayConnected)),
        "trade_disconnected" => Some(EventKey::trade(ChannelPhase::RelayDisconnected)),
        "md_disconnected" => Some(EventKey::market_data(ChannelPhase::RelayDisconnected)),
        _ => None,
    });
    by_tag.or_else(|| match report.message.as_str() {
        LEGACY_TRADE_CONNECTED => Some(EventKey::trade(ChannelPhase::RelayConnected)),
        LEGACY_MD_CONNECTED => Some(EventKey::market_data(ChannelPhase::RelayConnected)),
        _ => None,
    })
}

fn trade_phase(tag: &str) -> Option<ChannelPhase> {
    match tag {
        "front_connected" => Some(ChannelPhase::FrontConnected),
        "front_disconnected" => Some(ChannelPhase::FrontDisconnected),
        "authenticate" => Some(ChannelPhase::Authenticated),
        "login" => Some(ChannelPhase::LoggedIn),
        "logout" => Some(ChannelPhase::LoggedOut),
        "trading_account" => Some(ChannelPhase::TradingAccount),
        "error" => Some(ChannelPhase::Error),
        _ => None,
    }
}

fn market_data_phase(tag: &str) -> Option<ChannelPhase> {
    match tag {
        "front_connected" => Some(ChannelPhase::FrontConnected),
        "front_disconnected" => Some(ChannelPhase::FrontDisconnected),
        "login" => Some(ChannelPhase::LoggedIn),
        "logout" => Some(ChannelPhase::LoggedOut),
        "error" => Some(ChannelPhase::Error),
        _ => None,
    }
}

fn error_scope(report: &Report) -> Option<EventKey> {
    let channel: Channel = report.channel_tag()?.parse().ok()?;
    let tag = report.event_tag()?;
    let phase = match channel {
        Channel::Trade => trade_phase(tag),
        Channel::MarketData => market_data_phase(tag),
    }
    .or(match tag {
        "connected" | "trade_connected" | "md_connected" => Some(ChannelPhase::RelayConnected),
        _ => None,
    })?;
    Some(EventKey::new(channel, phase))
}

fn error_message(report: &Report) -> String {
    match EventError::from_report(report) {
        Some(err @ EventError::Rejected(_)) => err.to_string(),
        _ if !report.message.is_empty() => report.message.clone(),
        Some(err) => err.to_string(),
        None => "unspecified relay error".to_string(),
    }
}
