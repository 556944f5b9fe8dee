//! Periodic trading-account query.
//!
//! The poller owns a timer and a query closure but no task: whoever owns it
//! drives [`AccountPoller::tick`], so a tick can never race the transition
//! that stops polling.

use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use wctp_ws::SendError;

/// Issues one account query.
pub type QueryFn = Box<dyn FnMut() -> Result<(), SendError> + Send>;

/// Outcome of one poll tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollTick {
    /// Query queued.
    Sent,
    /// Query could not be queued.
    SendFailed(SendError),
    /// Poller cancelled or transport closed; no further ticks.
    Stopped,
}

/// Cancellable periodic account query.
pub struct AccountPoller {
    interval: Interval,
    stop: CancellationToken,
    query: QueryFn,
    sent: u64,
}

impl AccountPoller {
    /// Start polling. The first query fires one full `period` from now;
    /// missed ticks are delayed rather than burst.
    ///
    /// The poller stops on its own once `closed` is cancelled.
    pub fn start(query: QueryFn, period: Duration, closed: &CancellationToken) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(period_ms = period_ms(period), "Account poller started");
        Self {
            interval,
            stop: closed.child_token(),
            query,
            sent: 0,
        }
    }

    /// Wait for the next tick and issue the query.
    ///
    /// Cancel safe. Returns `Stopped` immediately once cancelled.
    pub async fn tick(&mut self) -> PollTick {
        if self.stop.is_cancelled() {
            return PollTick::Stopped;
        }
        tokio::select! {
            biased;

            () = self.stop.cancelled() => PollTick::Stopped,

            _ = self.interval.tick() => match (self.query)() {
                Ok(()) => {
                    self.sent += 1;
                    PollTick::Sent
                }
                Err(e) => PollTick::SendFailed(e),
            },
        }
    }

    /// Stop polling. Idempotent.
    pub fn cancel(&self) {
        if !self.stop.is_cancelled() {
            debug!(queries_sent = self.sent, "Account poller cancelled");
            self.stop.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn queries_sent(&self) -> u64 {
        self.sent
    }
}

/// Milliseconds for logging, saturating instead of truncating.
fn period_ms(period: Duration) -> u64 {
    u64::try_from(period.as_millis()).unwrap_or(u64::MAX)
}

impl Drop for AccountPoller {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
