//! Main application orchestration.
//!
//! Coordinates the components of one client process:
//! - Relay connection (transport + handshake)
//! - Session driver (login bootstrap, account polling, logout)
//! - Console rendering of status and account snapshots
//! - Graceful logout on shutdown

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use wctp_core::{AccountSnapshot, LoginRequest, LoginStatus, LoginStep, Severity};
use wctp_session::{spawn_session_driver, SessionHandle};
use wctp_ws::{ConnectionState, RelayConnection, Report};

/// Extra time allowed for logout beyond the step timeout.
const LOGOUT_GRACE: Duration = Duration::from_secs(1);

/// Main application.
pub struct Application {
    config: AppConfig,
    connection: Arc<RelayConnection>,
    session: SessionHandle,
    driver: JoinHandle<()>,
}

impl Application {
    /// Build the relay connection and spawn the session driver.
    ///
    /// Must be called from within a Tokio runtime. Nothing is sent until
    /// [`login`](Self::login).
    pub fn start(config: AppConfig) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let connection = Arc::new(RelayConnection::new(config.connection(), event_tx));
        let (session, driver) =
            spawn_session_driver(connection.clone(), event_rx, config.session_config());

        info!(
            relay = %connection.config().url(),
            broker_id = %config.gateway.broker_id,
            user_id = %config.gateway.user_id,
            "Application started"
        );

        Self {
            config,
            connection,
            session,
            driver,
        }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Start a login with the configured gateway settings.
    pub fn login(&self, password: &str) -> AppResult<()> {
        let request = LoginRequest::new(self.config.gateway.clone(), password);
        self.session.begin_login(request)?;
        Ok(())
    }

    /// Log in and render progress until Ctrl-C or a failed login, then
    /// log out and stop.
    pub async fn run(self, password: &str) -> AppResult<()> {
        let mut status = self.session.subscribe_status();
        let mut snapshot = self.session.subscribe_snapshot();
        let mut unhandled = self.session.take_unhandled_reports();
        let mut view = ConsoleView::default();

        self.login(password)?;

        let outcome = loop {
            tokio::select! {
                changed = status.changed() => {
                    if changed.is_err() {
                        break Err(AppError::Driver("session driver stopped".to_string()));
                    }
                    let current = status.borrow_and_update().clone();
                    view.status(&current);
                    if current.step == LoginStep::Failed {
                        break Err(AppError::LoginFailed(current.message));
                    }
                }

                Ok(()) = snapshot.changed() => {
                    let current = snapshot.borrow_and_update().clone();
                    if let Some(account) = current {
                        view.snapshot(&account);
                    }
                }

                Some(report) = next_unhandled(&mut unhandled) => {
                    debug!(code = ?report.code, message = %report.message, "Unhandled report");
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break Ok(());
                }
            }
        };

        self.shutdown().await?;
        outcome
    }

    /// Log out (bounded wait), then stop the driver and the transport.
    pub async fn shutdown(self) -> AppResult<()> {
        let mut status = self.session.subscribe_status();
        let grace = self.config.session_config().step_timeout + LOGOUT_GRACE;

        if self.session.logout().is_ok() {
            let settled = matches!(
                tokio::time::timeout(grace, status.wait_for(|s| is_settled(s.step))).await,
                Ok(Ok(_))
            );
            if settled {
                debug!(step = %self.session.status().step, "Logout settled");
            } else {
                let grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
                warn!(grace_ms, "Logout did not settle in time");
            }
        }

        if self.session.shutdown().is_err() {
            debug!("Session driver already stopped");
        }
        self.driver
            .await
            .map_err(|e| AppError::Driver(e.to_string()))?;

        info!(state = %self.connection.state(), "Application stopped");
        Ok(())
    }
}

/// Nothing left to wait for after a logout request.
fn is_settled(step: LoginStep) -> bool {
    matches!(step, LoginStep::LoggedOut | LoginStep::Failed | LoginStep::Idle)
}

async fn next_unhandled(rx: &mut Option<mpsc::UnboundedReceiver<Report>>) -> Option<Report> {
    match rx {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

// ============================================================================
// Console rendering
// ============================================================================

/// Renders status transitions and account changes to the log.
#[derive(Default)]
struct ConsoleView {
    last_account: Option<Arc<AccountSnapshot>>,
}

impl ConsoleView {
    fn status(&self, status: &LoginStatus) {
        let step = status.step.number().map_or_else(|| "-".to_string(), |n| format!("{n}/8"));
        match status.severity {
            Severity::Error => error!(step = %step, "{}", status.message),
            Severity::Warning => warn!(step = %step, "{}", status.message),
            Severity::Info | Severity::Success => info!(step = %step, "{}", status.message),
        }
    }

    /// Polls repeat every interval; only changed figures are logged at info.
    fn snapshot(&mut self, account: &Arc<AccountSnapshot>) {
        let changed = self.last_account.as_ref().map_or(true, |last| {
            last.balance != account.balance
                || last.available != account.available
                || last.curr_margin != account.curr_margin
        });

        if changed {
            info!(
                account_id = %account.account_id,
                trading_day = %account.trading_day,
                balance = %account.balance,
                available = %account.available,
                margin = %account.curr_margin,
                position_profit = %account.position_profit,
                "Account"
            );
        } else {
            debug!(account_id = %account.account_id, "Account unchanged");
        }
        self.last_account = Some(account.clone());
    }
}
