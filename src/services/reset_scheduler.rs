//! Daily quota reset.
//!
//! [`DailyResetScheduler`] zeroes `used_today` on every active key at the next
//! local midnight and every 24 hours after that. It is an owned object with an
//! explicit `start()` / `stop()` lifecycle; the clock is injected so the
//! midnight arithmetic can be tested.
//!
//! # Failure Handling
//!
//! A failed reset is logged and skipped. The loop keeps running and the next
//! tick proceeds normally; there is no retry in between.
//!
//! # Deployment
//!
//! Assumes a single running instance. Several instances would each run the
//! reset, which is harmless because it always writes the same value.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Local, NaiveTime, TimeDelta, TimeZone};
use tokio::{sync::watch, task::JoinHandle, time::Instant};

use crate::{
    clock::Clock,
    store::{KeyStore, StoreResult},
};

const RESET_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Time left until the next midnight in `now`'s time zone.
///
/// A start exactly at midnight waits a full day. If a DST transition skips
/// midnight, the reset runs at the first valid instant one hour later.
pub fn until_next_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    let tz = now.timezone();
    let today = now.date_naive();
    let Some(tomorrow) = today.succ_opt() else {
        return RESET_PERIOD;
    };
    let midnight = tomorrow.and_time(NaiveTime::MIN);

    let next = tz
        .from_local_datetime(&midnight)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(midnight + TimeDelta::hours(1)))
                .earliest()
        });

    match next {
        Some(next) => (next - now.clone()).to_std().unwrap_or(Duration::ZERO),
        None => RESET_PERIOD,
    }
}

pub struct DailyResetScheduler {
    store: Arc<dyn KeyStore>,
    clock: Arc<dyn Clock>,
    running: Option<Running>,
}

/// Dropping `stop_tx` closes the channel, which ends the loop as well.
struct Running {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl DailyResetScheduler {
    pub fn new(store: Arc<dyn KeyStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            running: None,
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Schedule the first reset at the next local midnight, then every 24h.
    ///
    /// Calling `start` on a running scheduler does nothing.
    pub fn start(&mut self) {
        if self.running.is_some() {
            return;
        }

        let delay = until_next_midnight(&self.clock.now().with_timezone(&Local));
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(self.store.clone(), delay, stop_rx));

        tracing::info!(
            first_reset_in_secs = delay.as_secs(),
            "Daily reset scheduler activated"
        );

        self.running = Some(Running { stop_tx, handle });
    }

    /// Stop the loop and wait for it to exit. A reset already in flight finishes first.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let _ = running.stop_tx.send(true);
        if let Err(e) = running.handle.await {
            tracing::error!(error = %e, "Daily reset task ended abnormally");
        }

        tracing::info!("Daily reset scheduler stopped");
    }

    /// Run one reset now.
    #[cfg(test)]
    pub async fn run_once(&self) -> StoreResult<u64> {
        reset_daily_usage(self.store.as_ref()).await
    }
}

async fn reset_daily_usage(store: &dyn KeyStore) -> StoreResult<u64> {
    let reset = store.reset_daily_usage().await?;
    tracing::info!(keys = reset, "Daily API usage reset completed");
    Ok(reset)
}

async fn run_loop(store: Arc<dyn KeyStore>, delay: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval_at(Instant::now() + delay, RESET_PERIOD);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = reset_daily_usage(store.as_ref()).await {
                    tracing::error!(error = %e, "Error resetting daily usage");
                }
            }
            _ = stop_rx.changed() => break,
        }
    }
}
