//! Core domain types for the WebCTP gateway session client.
//!
//! This crate provides the types shared by the transport and session layers:
//! - `Channel`, `ChannelPhase`, `ChannelState`: the two logical channels and their lifecycle
//! - `Credentials`, `GatewaySettings`, `LoginRequest`: what the settings collaborator supplies
//! - `LoginStatus`, `LoginStep`, `FailureReason`: what the presentation layer observes
//! - `AccountSnapshot`, `TradeLoginSnapshot`: read models filled from relay reports

pub mod account;
pub mod channel;
pub mod credentials;
pub mod error;
pub mod status;

pub use account::{AccountSnapshot, TradeLoginSnapshot};
pub use channel::{Channel, ChannelPhase, ChannelState, EventKey};
pub use credentials::{Credentials, FrontAddress, GatewaySettings, LoginRequest};
pub use error::{CoreError, Result};
pub use status::{FailureReason, LoginStatus, LoginStep, Severity};
