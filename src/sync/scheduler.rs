//! Periodic background refresh.
//!
//! The scheduler is an explicit object with a start/stop lifecycle, not a
//! free-floating task. Stopping signals the loop through a watch channel
//! and waits for the select to notice; it never aborts, so an in-flight
//! fetch always runs to completion.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::engine::FeedSync;
use crate::feed::FeedSource;

/// Default wall-clock interval between background refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Why a scheduled tick did or did not fetch. Used for logging and tests;
/// the loop itself only cares about `Fetch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    Fetch,
    Offline,
    InFlight,
    TooRecent,
}

/// Pure tick gate: fetch only when online, not already fetching, and the
/// last successful refresh is at least one interval old. `None` for
/// `last_refresh` means never refreshed, which always qualifies.
pub fn tick_decision(
    online: bool,
    in_flight: bool,
    last_refresh: Option<i64>,
    now: i64,
    interval: Duration,
) -> TickDecision {
    if !online {
        return TickDecision::Offline;
    }
    if in_flight {
        return TickDecision::InFlight;
    }
    match last_refresh {
        Some(at) if now.saturating_sub(at) < interval.as_secs() as i64 => TickDecision::TooRecent,
        _ => TickDecision::Fetch,
    }
}

pub struct RefreshScheduler {
    interval: Duration,
    running: Option<(watch::Sender<bool>, JoinHandle<()>)>,
}

impl RefreshScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Start the periodic loop against an engine. Idempotent: starting a
    /// running scheduler is a no-op.
    pub fn start<S>(&mut self, engine: Arc<FeedSync<S>>)
    where
        S: FeedSource + 'static,
    {
        if self.running.is_some() {
            return;
        }

        let interval = self.interval;
        let (tx, mut rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval() fires immediately; consume that tick so starting
            // the scheduler does not itself trigger a refresh.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_tick(&engine, interval).await;
                    }
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            tracing::debug!("Refresh scheduler stopping");
                            break;
                        }
                    }
                }
            }
        });

        tracing::info!(interval_secs = interval.as_secs(), "Refresh scheduler started");
        self.running = Some((tx, handle));
    }

    /// Signal the loop to stop. Idempotent; does not wait for the task and
    /// never interrupts a fetch already underway.
    pub fn stop(&mut self) {
        if let Some((tx, _handle)) = self.running.take() {
            let _ = tx.send(true);
            tracing::info!("Refresh scheduler stopped");
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_tick<S: FeedSource>(engine: &FeedSync<S>, interval: Duration) {
    let decision = tick_decision(
        engine.is_online(),
        engine.is_fetching(),
        engine.last_refresh(),
        chrono::Utc::now().timestamp(),
        interval,
    );
    match decision {
        TickDecision::Fetch => {
            if let Err(e) = engine.fetch_feed().await {
                tracing::warn!(error = %e, "Scheduled refresh failed");
            }
        }
        skipped => {
            tracing::debug!(reason = ?skipped, "Scheduled refresh skipped");
        }
    }
}
