//! Login session aggregate.

use crate::poller::AccountPoller;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;
use wctp_core::{
    AccountSnapshot, Channel, ChannelState, Credentials, EventKey, FailureReason, GatewaySettings,
    LoginRequest, LoginStep, TradeLoginSnapshot,
};

/// Overall session status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    InProgress(LoginStep),
    Ready,
    Failed(FailureReason),
    LoggingOut,
    LoggedOut,
}

impl SessionStatus {
    /// In progress or ready: the states a logout applies to.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress(_) | Self::Ready)
    }

    /// Failed or logged out; nothing more will happen.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::LoggedOut)
    }

    pub fn step(&self) -> LoginStep {
        match self {
            Self::InProgress(step) => *step,
            Self::Ready => LoginStep::Ready,
            Self::Failed(_) => LoginStep::Failed,
            Self::LoggingOut => LoginStep::LoggingOut,
            Self::LoggedOut => LoginStep::LoggedOut,
        }
    }
}

/// Monotonic `opRef` source shared with the account poller.
#[derive(Debug, Clone, Default)]
pub struct OpRefs(Arc<AtomicU64>);

impl OpRefs {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn last(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// One login attempt, from "begin login" until it fails or logs out.
///
/// Owned by the orchestrator and replaced wholesale on every new login.
/// The password lives only in `credentials` and is wiped when the session
/// fails, logs out or is dropped.
pub struct LoginSession {
    pub(crate) id: Uuid,
    pub(crate) trade: ChannelState,
    pub(crate) market_data: ChannelState,
    pub(crate) status: SessionStatus,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) settings: GatewaySettings,
    pub(crate) trade_login: Option<TradeLoginSnapshot>,
    pub(crate) account_snapshot: Option<Arc<AccountSnapshot>>,
    /// `Some` iff the market-data channel is logged in.
    pub(crate) poll_handle: Option<AccountPoller>,
    /// Event the current step waits for.
    pub(crate) awaiting: Option<EventKey>,
    pub(crate) deadline: Option<Instant>,
    pub(crate) op_refs: OpRefs,
}

impl LoginSession {
    pub(crate) fn new(request: LoginRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            trade: ChannelState::Idle,
            market_data: ChannelState::Idle,
            status: SessionStatus::InProgress(LoginStep::Idle),
            credentials: Some(request.credentials),
            settings: request.settings,
            trade_login: None,
            account_snapshot: None,
            poll_handle: None,
            awaiting: None,
            deadline: None,
            op_refs: OpRefs::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn trade(&self) -> &ChannelState {
        &self.trade
    }

    pub fn market_data(&self) -> &ChannelState {
        &self.market_data
    }

    pub fn channel(&self, channel: Channel) -> &ChannelState {
        match channel {
            Channel::Trade => &self.trade,
            Channel::MarketData => &self.market_data,
        }
    }

    pub(crate) fn channel_mut(&mut self, channel: Channel) -> &mut ChannelState {
        match channel {
            Channel::Trade => &mut self.trade,
            Channel::MarketData => &mut self.market_data,
        }
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn trade_login(&self) -> Option<&TradeLoginSnapshot> {
        self.trade_login.as_ref()
    }

    pub fn account_snapshot(&self) -> Option<&Arc<AccountSnapshot>> {
        self.account_snapshot.as_ref()
    }

    pub fn is_polling(&self) -> bool {
        self.poll_handle.is_some()
    }

    pub fn awaiting(&self) -> Option<EventKey> {
        self.awaiting
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Last `opRef` handed out.
    pub fn last_op_ref(&self) -> u64 {
        self.op_refs.last()
    }

    /// Stop the poller if running. Safe to call repeatedly.
    pub(crate) fn stop_polling(&mut self) -> bool {
        match self.poll_handle.take() {
            Some(poller) => {
                poller.cancel();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for LoginSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginSession")
            .field("id", &self.id)
            .field("trade", &self.trade)
            .field("market_data", &self.market_data)
            .field("status", &self.status)
            .field("has_credentials", &self.credentials.is_some())
            .field("polling", &self.poll_handle.is_some())
            .field("awaiting", &self.awaiting)
            .finish()
    }
}
