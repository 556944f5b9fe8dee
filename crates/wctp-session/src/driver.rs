//! Session driver.
//!
//! One task owns the [`Orchestrator`] and feeds it every input in turn:
//! presentation commands, transport events, step deadlines and poll ticks.
//! The presentation layer talks to it through a [`SessionHandle`].

use crate::error::{SessionError, SessionResult};
use crate::orchestrator::{LoginStart, Orchestrator, SessionConfig};
use crate::poller::PollTick;
use parking_lot::Mutex;
use std::future::pending;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use wctp_core::{AccountSnapshot, LoginRequest, LoginStatus};
use wctp_ws::{RelayTransport, Report, TransportEvent};

// ============================================================================
// SessionCommand
// ============================================================================

/// Commands from the presentation layer.
#[derive(Debug)]
pub enum SessionCommand {
    /// Replace the session and log in.
    BeginLogin(LoginRequest),
    /// Log out of both channels.
    Logout,
    /// Stop the driver and close the transport.
    Shutdown,
}

// ============================================================================
// SessionDriver
// ============================================================================

/// Session driver task.
pub struct SessionDriver {
    orchestrator: Orchestrator,
    transport: Arc<dyn RelayTransport>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
}

impl SessionDriver {
    /// Run until `Shutdown` or until every handle is dropped.
    pub async fn run(mut self) {
        info!("Session driver started");

        loop {
            let deadline = self.orchestrator.deadline();

            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(SessionCommand::BeginLogin(request)) => self.begin_login(request).await,
                    Some(SessionCommand::Logout) => self.orchestrator.logout(),
                    Some(SessionCommand::Shutdown) | None => break,
                },

                event = self.events.recv() => match event {
                    Some(TransportEvent::Report(report)) => self.orchestrator.on_report(report),
                    Some(TransportEvent::Closed { reason }) => {
                        self.orchestrator.on_transport_closed(&reason);
                    }
                    None => {
                        warn!("Transport event stream ended");
                        break;
                    }
                },

                () = wait_until(deadline) => self.orchestrator.on_deadline(),

                tick = next_poll(&mut self.orchestrator) => self.orchestrator.on_poll_tick(tick),
            }
        }

        self.orchestrator.shutdown();
        self.transport.disconnect();
        info!("Session driver stopped");
    }

    async fn begin_login(&mut self, request: LoginRequest) {
        if self.orchestrator.begin_login(request) != LoginStart::NeedsConnect {
            return;
        }

        let mut stale = 0usize;
        while self.events.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!(stale, "Discarded transport events from a previous connection");
        }

        match self.transport.connect().await {
            Ok(()) => self.orchestrator.on_relay_authenticated(),
            Err(e) => self.orchestrator.on_connect_failed(&e.to_string()),
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn next_poll(orchestrator: &mut Orchestrator) -> PollTick {
    match orchestrator.poller_mut() {
        Some(poller) => poller.tick().await,
        None => pending().await,
    }
}

// ============================================================================
// SessionHandle
// ============================================================================

/// Presentation-side handle to a running session driver.
///
/// Status and account snapshot are read-only views; the only ways to
/// influence the session are [`begin_login`](Self::begin_login) and
/// [`logout`](Self::logout).
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    status: watch::Receiver<LoginStatus>,
    snapshot: watch::Receiver<Option<Arc<AccountSnapshot>>>,
    unhandled: Arc<Mutex<Option<mpsc::UnboundedReceiver<Report>>>>,
}

impl SessionHandle {
    /// Start a login, replacing any current session.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidRequest`: settings incomplete
    /// - `SessionError::DriverStopped`: the driver is gone
    pub fn begin_login(&self, request: LoginRequest) -> SessionResult<()> {
        request.settings.validate()?;
        self.send(SessionCommand::BeginLogin(request))
    }

    pub fn logout(&self) -> SessionResult<()> {
        self.send(SessionCommand::Logout)
    }

    pub fn shutdown(&self) -> SessionResult<()> {
        self.send(SessionCommand::Shutdown)
    }

    /// Latest status.
    pub fn status(&self) -> LoginStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<LoginStatus> {
        self.status.clone()
    }

    /// Last successfully queried account figures.
    pub fn account_snapshot(&self) -> Option<Arc<AccountSnapshot>> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Option<Arc<AccountSnapshot>>> {
        self.snapshot.clone()
    }

    /// Take the stream of reports no workflow handled. Only the first
    /// caller gets it.
    pub fn take_unhandled_reports(&self) -> Option<mpsc::UnboundedReceiver<Report>> {
        self.unhandled.lock().take()
    }

    fn send(&self, command: SessionCommand) -> SessionResult<()> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::DriverStopped)
    }
}

/// Spawn a session driver over `transport`.
///
/// `events` must be the receiving end of the channel the transport
/// delivers its [`TransportEvent`]s on.
#[must_use]
pub fn spawn_session_driver(
    transport: Arc<dyn RelayTransport>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    config: SessionConfig,
) -> (SessionHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (unhandled_tx, unhandled_rx) = mpsc::unbounded_channel();

    let orchestrator = Orchestrator::new(transport.clone(), config, unhandled_tx);
    let handle = SessionHandle {
        commands: command_tx,
        status: orchestrator.subscribe_status(),
        snapshot: orchestrator.subscribe_snapshot(),
        unhandled: Arc::new(Mutex::new(Some(unhandled_rx))),
    };

    let driver = SessionDriver {
        orchestrator,
        transport,
        events,
        commands: command_rx,
    };
    let join_handle = tokio::spawn(driver.run());

    (handle, join_handle)
}
