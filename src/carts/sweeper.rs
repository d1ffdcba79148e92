// Abandonment sweeper
//
// Periodic batch job: demotes stale active carts to abandoned in one bulk
// update, then removes carts whose expiry has passed.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};

use crate::carts::store::{CartStore, StoreError};

#[derive(Debug, Clone)]
pub struct SweeperSettings {
    pub interval: std::time::Duration,
    /// Active carts idle longer than this become abandoned
    pub abandon_after: Duration,
    pub run_timeout: std::time::Duration,
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            interval: std::time::Duration::from_secs(60 * 60),
            abandon_after: Duration::hours(24),
            run_timeout: std::time::Duration::from_secs(30),
        }
    }
}

/// What a single sweep changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub abandoned: u64,
    pub purged: u64,
}

#[derive(Clone)]
pub struct AbandonmentSweeper {
    store: Arc<dyn CartStore>,
    settings: SweeperSettings,
}

impl AbandonmentSweeper {
    pub fn new(store: Arc<dyn CartStore>, settings: SweeperSettings) -> Self {
        Self { store, settings }
    }

    /// One sweep as of `now`.
    ///
    /// Only `active` carts are demoted and their expiry is left alone.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let cutoff = now - self.settings.abandon_after;
        let abandoned = self.store.mark_abandoned(cutoff).await?;
        let purged = self.store.purge_expired(now).await?;

        Ok(SweepReport { abandoned, purged })
    }

    /// Run forever on the configured interval. The first sweep happens one
    /// interval after start.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.settings.interval;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(
                "Abandonment sweeper started (interval {:?}, threshold {})",
                period,
                self.settings.abandon_after
            );

            loop {
                ticker.tick().await;

                match timeout(self.settings.run_timeout, self.run_once(Utc::now())).await {
                    Ok(Ok(report)) => tracing::info!(
                        "Sweep finished: {} carts abandoned, {} expired carts purged",
                        report.abandoned,
                        report.purged
                    ),
                    Ok(Err(e)) => tracing::error!("Sweep failed: {}", e),
                    Err(_) => tracing::error!(
                        "Sweep timed out after {:?}",
                        self.settings.run_timeout
                    ),
                }
            }
        })
    }
}
