//! Gateway login orchestrator.
//!
//! Drives the eight-step bootstrap that brings up the trade and market-data
//! channels, fails the whole session on the first error, and owns the
//! account poller once the market-data channel is logged in.
//!
//! Every handler is synchronous and runs to completion before the next
//! input is taken; the session driver is the only caller.

use crate::poller::{AccountPoller, PollTick};
use crate::router::{route, ChannelEvent, Routed};
use crate::session::{LoginSession, SessionStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use wctp_core::{
    AccountSnapshot, Channel, ChannelPhase, ChannelState, EventKey, FailureReason, LoginRequest,
    LoginStatus, LoginStep, Severity, TradeLoginSnapshot,
};
use wctp_ws::{Instruction, RelayTransport, Report};

/// Timing knobs for a login session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long each bootstrap step may wait for its report.
    pub step_timeout: Duration,
    /// Account query period once ready.
    pub poll_interval: Duration,
}

impl SessionConfig {
    pub fn from_millis(step_timeout_ms: u64, poll_interval_ms: u64) -> Self {
        Self {
            step_timeout: Duration::from_millis(step_timeout_ms),
            poll_interval: Duration::from_millis(poll_interval_ms),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_millis(10_000, 500)
    }
}

/// What the caller must do after `begin_login`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStart {
    /// Step 1 issued.
    Started,
    /// Transport not authenticated; connect it, then report back through
    /// [`Orchestrator::on_relay_authenticated`] or
    /// [`Orchestrator::on_connect_failed`].
    NeedsConnect,
}

/// Gateway login orchestrator.
pub struct Orchestrator {
    transport: Arc<dyn RelayTransport>,
    config: SessionConfig,
    session: Option<LoginSession>,
    status_tx: watch::Sender<LoginStatus>,
    snapshot_tx: watch::Sender<Option<Arc<AccountSnapshot>>>,
    unhandled_tx: mpsc::UnboundedSender<Report>,
}

impl Orchestrator {
    /// Create an orchestrator. Reports no workflow claims are sent to
    /// `unhandled_tx`.
    pub fn new(
        transport: Arc<dyn RelayTransport>,
        config: SessionConfig,
        unhandled_tx: mpsc::UnboundedSender<Report>,
    ) -> Self {
        let (status_tx, _) = watch::channel(LoginStatus::idle());
        let (snapshot_tx, _) = watch::channel(None);
        Self {
            transport,
            config,
            session: None,
            status_tx,
            snapshot_tx,
            unhandled_tx,
        }
    }

    pub fn subscribe_status(&self) -> watch::Receiver<LoginStatus> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Option<Arc<AccountSnapshot>>> {
        self.snapshot_tx.subscribe()
    }

    pub fn session(&self) -> Option<&LoginSession> {
        self.session.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Deadline of the step in flight.
    pub fn deadline(&self) -> Option<Instant> {
        self.session.as_ref().and_then(|s| s.deadline)
    }

    pub(crate) fn poller_mut(&mut self) -> Option<&mut AccountPoller> {
        self.session.as_mut().and_then(|s| s.poll_handle.as_mut())
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Replace any existing session and start a new login.
    pub fn begin_login(&mut self, request: LoginRequest) -> LoginStart {
        if let Some(mut old) = self.session.take() {
            old.stop_polling();
            info!(session_id = %old.id, status = ?old.status, "Replacing login session");
        }
        self.snapshot_tx.send_replace(None);

        let session = LoginSession::new(request);
        info!(
            session_id = %session.id,
            broker_id = %session.settings.broker_id,
            user_id = %session.settings.user_id,
            "Login requested"
        );
        self.session = Some(session);

        if self.transport.is_authenticated() {
            self.issue_trade_connect();
            LoginStart::Started
        } else {
            if let Some(session) = self.session.as_mut() {
                session.status = SessionStatus::InProgress(LoginStep::ConnectingRelay);
            }
            self.publish(LoginStatus::progress(LoginStep::ConnectingRelay));
            LoginStart::NeedsConnect
        }
    }

    /// Transport connected after [`LoginStart::NeedsConnect`].
    pub fn on_relay_authenticated(&mut self) {
        let waiting = self.session.as_ref().is_some_and(|s| {
            s.status == SessionStatus::InProgress(LoginStep::ConnectingRelay)
        });
        if waiting {
            self.issue_trade_connect();
        } else {
            debug!("Relay authenticated with no login waiting for it");
        }
    }

    /// Transport connect failed after [`LoginStart::NeedsConnect`].
    pub fn on_connect_failed(&mut self, reason: &str) {
        error!(%reason, "Relay connect failed");
        self.fail(FailureReason::Transport(reason.to_string()));
    }

    /// Log out of both channels. No-op unless a session is in progress or ready.
    pub fn logout(&mut self) {
        let step_timeout = self.config.step_timeout;
        let Some(session) = self.session.as_mut() else {
            debug!("Logout ignored: no session");
            return;
        };
        if !session.status.is_active() {
            debug!(session_id = %session.id, status = ?session.status, "Logout ignored");
            return;
        }

        info!(session_id = %session.id, "Logging out");
        if session.market_data.is_logged_in() {
            session.stop_polling();
            if let Err(e) = self.transport.send(Instruction::market_data_disconnect()) {
                warn!(error = %e, "MarketDataDisconnect not sent");
            }
        }
        session.stop_polling();

        let logout = Instruction::trade_logout(&session.settings.user_id);
        session.trade = ChannelState::Idle;
        session.market_data = ChannelState::Idle;
        session.credentials = None;

        match self.transport.send(logout) {
            Ok(()) => {
                session.status = SessionStatus::LoggingOut;
                session.awaiting = Some(EventKey::trade(ChannelPhase::LoggedOut));
                session.deadline = Some(Instant::now() + step_timeout);
                self.publish(LoginStatus::progress(LoginStep::LoggingOut));
            }
            Err(e) => {
                warn!(error = %e, "TradeLogout not sent; finishing logout locally");
                self.finish_logout();
            }
        }
    }

    /// Drop the session without any wire traffic.
    pub fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop_polling();
            debug!(session_id = %session.id, "Session dropped on shutdown");
        }
    }

    // ------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------

    /// Handle one report forwarded by the transport.
    pub fn on_report(&mut self, report: Report) {
        match route(report) {
            Routed::Channel(event) => self.on_channel_event(event),
            Routed::GeneralError { scope, message } => self.on_general_error(scope, message),
            Routed::Handshake(report) => {
                warn!("Handshake report on an authenticated connection");
                self.forward_unhandled(report);
            }
            Routed::Operation(report) | Routed::Unmatched(report) => {
                debug!(code = report.code.as_i64(), "Unhandled report");
                self.forward_unhandled(report);
            }
        }
    }

    /// Transport closed after authentication.
    pub fn on_transport_closed(&mut self, reason: &str) {
        let Some((id, status)) = self.session.as_ref().map(|s| (s.id, s.status.clone())) else {
            return;
        };
        match status {
            SessionStatus::LoggingOut => {
                debug!(%reason, "Transport closed while logging out");
                self.finish_logout();
            }
            status if status.is_active() => {
                error!(session_id = %id, %reason, "Transport closed during session");
                self.fail(FailureReason::Transport(reason.to_string()));
            }
            _ => debug!(%reason, "Transport closed after session ended"),
        }
    }

    /// The step deadline passed.
    pub fn on_deadline(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.deadline.map_or(true, |deadline| deadline > Instant::now()) {
            return;
        }
        let (id, status, awaiting) = (session.id, session.status.clone(), session.awaiting);
        match status {
            SessionStatus::InProgress(step) => {
                warn!(session_id = %id, ?step, ?awaiting, "Step timed out");
                self.fail(FailureReason::Timeout(step));
            }
            SessionStatus::LoggingOut => {
                warn!(session_id = %id, "Logout ack timed out");
                self.finish_logout();
            }
            _ => session.deadline = None,
        }
    }

    /// Result of one poller tick.
    pub fn on_poll_tick(&mut self, tick: PollTick) {
        match tick {
            PollTick::Sent => {
                if let Some(session) = self.session.as_ref() {
                    debug!(
                        session_id = %session.id,
                        op_ref = session.op_refs.last(),
                        "Trading account queried"
                    );
                }
            }
            PollTick::SendFailed(e) => warn!(error = %e, "Trading account query not sent"),
            PollTick::Stopped => {
                let ready = self
                    .session
                    .as_ref()
                    .is_some_and(|s| s.status == SessionStatus::Ready);
                if ready {
                    self.fail(FailureReason::Transport("connection closed".to_string()));
                } else if let Some(session) = self.session.as_mut() {
                    session.stop_polling();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Channel events
    // ------------------------------------------------------------------

    fn on_channel_event(&mut self, event: ChannelEvent) {
        let Some(session) = self.session.as_ref() else {
            debug!(key = %event.key, "Channel event without session");
            return;
        };

        if session.status == SessionStatus::LoggingOut {
            if event.key == EventKey::trade(ChannelPhase::LoggedOut) {
                if let Some(err) = &event.error {
                    warn!(error = %err, "Logout answered with error");
                }
                self.finish_logout();
            } else {
                debug!(key = %event.key, "Ignoring event while logging out");
            }
            return;
        }

        if !session.status.is_active() {
            debug!(key = %event.key, status = ?session.status, "Ignoring event for ended session");
            return;
        }

        let key = event.key;
        match key.phase {
            ChannelPhase::TradingAccount => self.on_trading_account(event),
            ChannelPhase::FrontDisconnected
                if session.channel(key.channel).has_reached(&ChannelState::FrontConnecting) =>
            {
                warn!(session_id = %session.id, channel = %key.channel, "Front disconnected");
                self.fail(FailureReason::FrontDisconnected(key.channel));
            }
            ChannelPhase::Error if session.awaiting.map(|k| k.channel) == Some(key.channel) => {
                let reason = match event.error {
                    Some(err) => err.into_failure(key.channel),
                    None => FailureReason::Protocol(format!("{} channel error", key.channel)),
                };
                self.fail(reason);
            }
            _ if session.awaiting == Some(key) => match event.error {
                Some(err) => {
                    warn!(
                        session_id = %session.id,
                        channel = %key.channel,
                        error = %err,
                        "Step rejected"
                    );
                    self.fail(err.into_failure(key.channel));
                }
                None => self.advance(key, event.body),
            },
            _ => {
                debug!(
                    session_id = %session.id,
                    key = %key,
                    awaiting = ?session.awaiting,
                    "Out-of-sequence event ignored"
                );
            }
        }
    }

    fn on_general_error(&mut self, scope: Option<EventKey>, message: String) {
        let awaiting = self
            .session
            .as_ref()
            .filter(|s| s.status.is_active())
            .and_then(|s| s.awaiting);
        match (scope, awaiting) {
            (Some(scope), Some(awaiting)) if scope == awaiting => {
                warn!(%scope, %message, "Relay error on current step");
                self.fail(FailureReason::Protocol(message));
            }
            _ => warn!(?scope, %message, "Relay error ignored"),
        }
    }

    fn on_trading_account(&mut self, event: ChannelEvent) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.market_data.is_logged_in() {
            debug!("Trading account report before ready; ignored");
            return;
        }
        if let Some(err) = event.error {
            warn!(error = %err, "Account query failed; keeping last snapshot");
            return;
        }
        let Some(body) = event.body else {
            warn!("Account report without body; keeping last snapshot");
            return;
        };
        match AccountSnapshot::from_body(&body) {
            Ok(snapshot) => {
                debug!(
                    account_id = %snapshot.account_id,
                    balance = %snapshot.balance,
                    available = %snapshot.available,
                    "Account snapshot updated"
                );
                let snapshot = Arc::new(snapshot);
                session.account_snapshot = Some(snapshot.clone());
                self.snapshot_tx.send_replace(Some(snapshot));
            }
            Err(e) => warn!(error = %e, "Unreadable account report; keeping last snapshot"),
        }
    }

    // ------------------------------------------------------------------
    // Bootstrap steps
    // ------------------------------------------------------------------

    fn issue_trade_connect(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(credentials) = session.credentials.as_ref() else {
            return;
        };
        let instruction = Instruction::trade_connect(
            &session.settings.trade_url,
            credentials.broker_id(),
            credentials.user_id(),
        );
        session.trade = ChannelState::RelayConnecting;
        self.step(
            LoginStep::TradeRelayConnect,
            EventKey::trade(ChannelPhase::RelayConnected),
            vec![instruction],
        );
    }

    /// Apply the awaited event and issue the next step.
    fn advance(&mut self, key: EventKey, body: Option<serde_json::Value>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(credentials) = session.credentials.as_ref() else {
            self.fail(FailureReason::Protocol("credentials already discarded".to_string()));
            return;
        };
        let settings = &session.settings;

        let (step, next, instructions) = match (key.channel, key.phase) {
            (Channel::Trade, ChannelPhase::RelayConnected) => {
                let instruction = Instruction::market_data_connect(
                    &settings.market_data_url,
                    credentials.broker_id(),
                    credentials.user_id(),
                );
                session.trade = ChannelState::RelayConnected;
                session.market_data = ChannelState::RelayConnecting;
                (
                    LoginStep::MarketDataRelayConnect,
                    EventKey::market_data(ChannelPhase::RelayConnected),
                    vec![instruction],
                )
            }
            (Channel::MarketData, ChannelPhase::RelayConnected) => {
                let instruction = Instruction::trade_connect_front(&settings.trade_front);
                session.market_data = ChannelState::RelayConnected;
                session.trade = ChannelState::FrontConnecting;
                (
                    LoginStep::TradeFrontConnect,
                    EventKey::trade(ChannelPhase::FrontConnected),
                    vec![instruction],
                )
            }
            (Channel::Trade, ChannelPhase::FrontConnected) => {
                let instructions = vec![
                    Instruction::trade_set(credentials.broker_id(), settings.investor_id()),
                    Instruction::trade_auth(
                        &settings.app_id,
                        &settings.auth_code,
                        credentials.user_id(),
                    ),
                ];
                session.trade = ChannelState::Authenticating;
                (
                    LoginStep::TradeAuthenticate,
                    EventKey::trade(ChannelPhase::Authenticated),
                    instructions,
                )
            }
            (Channel::Trade, ChannelPhase::Authenticated) => {
                let instruction =
                    Instruction::trade_login(credentials.user_id(), credentials.password());
                session.trade = ChannelState::LoggingIn;
                (
                    LoginStep::TradeLogin,
                    EventKey::trade(ChannelPhase::LoggedIn),
                    vec![instruction],
                )
            }
            (Channel::Trade, ChannelPhase::LoggedIn) => {
                let snapshot = TradeLoginSnapshot::from_body(body.as_ref());
                info!(
                    session_id = %session.id,
                    trading_day = ?snapshot.trading_day,
                    front_id = ?snapshot.front_id,
                    session = ?snapshot.session_id,
                    "Trade channel logged in"
                );
                session.trade_login = Some(snapshot);
                let instruction = Instruction::market_data_connect_front(&settings.market_data_front);
                session.trade = ChannelState::LoggedIn;
                session.market_data = ChannelState::FrontConnecting;
                (
                    LoginStep::MarketDataFrontConnect,
                    EventKey::market_data(ChannelPhase::FrontConnected),
                    vec![instruction],
                )
            }
            (Channel::MarketData, ChannelPhase::FrontConnected) => {
                let instruction = Instruction::market_data_login(credentials.password());
                session.market_data = ChannelState::LoggingIn;
                (
                    LoginStep::MarketDataLogin,
                    EventKey::market_data(ChannelPhase::LoggedIn),
                    vec![instruction],
                )
            }
            (Channel::MarketData, ChannelPhase::LoggedIn) => {
                session.market_data = ChannelState::LoggedIn;
                self.become_ready();
                return;
            }
            _ => {
                debug!(%key, "No step follows this event");
                return;
            }
        };

        self.step(step, next, instructions);
    }

    /// Send a step's instructions and wait for `next`.
    fn step(&mut self, step: LoginStep, next: EventKey, instructions: Vec<Instruction>) {
        for instruction in instructions {
            let action = instruction.action();
            if let Err(e) = self.transport.send(instruction) {
                error!(%action, error = %e, "Step instruction not sent");
                self.fail(FailureReason::SendFailed(format!("{action}: {e}")));
                return;
            }
        }

        let step_timeout = self.config.step_timeout;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.status = SessionStatus::InProgress(step);
        session.awaiting = Some(next);
        session.deadline = Some(Instant::now() + step_timeout);
        info!(
            session_id = %session.id,
            step = step.number().unwrap_or_default(),
            awaiting = %next,
            "{}",
            step.description()
        );
        self.publish(LoginStatus::progress(step));
    }

    fn become_ready(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let transport = self.transport.clone();
        let op_refs = session.op_refs.clone();
        let broker_id = session.settings.broker_id.clone();
        let investor_id = session.settings.investor_id().to_string();
        let query = Box::new(move || {
            transport.send(Instruction::trade_query_trading_account(
                &broker_id,
                &investor_id,
                op_refs.next(),
            ))
        });

        session.stop_polling();
        session.poll_handle = Some(AccountPoller::start(
            query,
            self.config.poll_interval,
            &self.transport.closed_token(),
        ));
        session.status = SessionStatus::Ready;
        session.awaiting = None;
        session.deadline = None;
        info!(session_id = %session.id, "Gateway session ready");
        self.publish(LoginStatus::new(
            LoginStep::Ready,
            Severity::Success,
            "logged in to trade and market data fronts",
        ));
    }

    fn finish_logout(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.stop_polling();
        if self.transport.is_authenticated() {
            if let Err(e) = self.transport.send(Instruction::trade_disconnect()) {
                warn!(error = %e, "TradeDisconnect not sent");
            }
        }
        session.trade = ChannelState::Idle;
        session.market_data = ChannelState::Idle;
        session.credentials = None;
        session.status = SessionStatus::LoggedOut;
        session.awaiting = None;
        session.deadline = None;
        info!(session_id = %session.id, "Logged out");
        self.publish(LoginStatus::progress(LoginStep::LoggedOut));
    }

    /// Move the session to `Failed`. No further steps are issued.
    fn fail(&mut self, reason: FailureReason) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.status.is_finished() {
            return;
        }

        let failed = ChannelState::Failed(reason.clone());
        if matches!(reason, FailureReason::Transport(_)) {
            for channel in [Channel::Trade, Channel::MarketData] {
                let state = session.channel_mut(channel);
                if !state.is_idle() {
                    *state = failed.clone();
                }
            }
        } else {
            let channel = match &reason {
                FailureReason::Rejected { channel, .. }
                | FailureReason::FrontDisconnected(channel) => Some(*channel),
                _ => session.awaiting.map(|k| k.channel),
            };
            if let Some(channel) = channel {
                *session.channel_mut(channel) = failed.clone();
            }
            // A failed session never leaves a channel looking logged in.
            for channel in [Channel::Trade, Channel::MarketData] {
                let state = session.channel_mut(channel);
                if state.is_logged_in() {
                    *state = failed.clone();
                }
            }
        }

        session.stop_polling();
        session.credentials = None;
        session.status = SessionStatus::Failed(reason.clone());
        session.awaiting = None;
        session.deadline = None;
        warn!(session_id = %session.id, %reason, "Login session failed");
        self.publish(LoginStatus::new(
            LoginStep::Failed,
            Severity::Error,
            reason.to_string(),
        ));
    }

    fn publish(&self, status: LoginStatus) {
        self.status_tx.send_replace(status);
    }

    fn forward_unhandled(&self, report: Report) {
        if self.unhandled_tx.send(report).is_err() {
            debug!("Unhandled report observer dropped");
        }
    }
}
