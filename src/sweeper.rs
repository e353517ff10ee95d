//! Periodic cleanup of expired renewal records and abandoned rate windows.

use chrono::Duration;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::clock::Clock;
use crate::config::RetentionConfig;
use crate::db::{RateWindowStore, RenewalStore};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// `None` when that purge failed.
    pub renewals_removed: Option<u64>,
    pub rate_windows_removed: Option<u64>,
}

pub struct RetentionSweeper {
    renewals: Arc<dyn RenewalStore>,
    rate_windows: Arc<dyn RateWindowStore>,
    clock: Arc<dyn Clock>,
    interval: StdDuration,
    rate_window_retention: Duration,
}

impl RetentionSweeper {
    pub fn new(
        renewals: Arc<dyn RenewalStore>,
        rate_windows: Arc<dyn RateWindowStore>,
        clock: Arc<dyn Clock>,
        config: &RetentionConfig,
    ) -> Self {
        Self {
            renewals,
            rate_windows,
            clock,
            interval: StdDuration::from_secs(config.interval_secs),
            rate_window_retention: Duration::seconds(config.rate_window_retention_secs),
        }
    }

    /// Runs both purges. A failure in one is logged and does not stop the other.
    pub async fn sweep_once(&self) -> SweepReport {
        let now = self.clock.now();

        let renewals_removed = match self.renewals.purge_expired(now).await {
            Ok(n) => Some(n),
            Err(e) => {
                error!(error = %e, "failed to purge expired renewal tokens");
                None
            }
        };

        let cutoff = now - self.rate_window_retention;
        let rate_windows_removed = match self.rate_windows.purge_before(cutoff).await {
            Ok(n) => Some(n),
            Err(e) => {
                error!(error = %e, "failed to purge stale rate windows");
                None
            }
        };

        info!(?renewals_removed, ?rate_windows_removed, "retention sweep finished");
        SweepReport {
            renewals_removed,
            rate_windows_removed,
        }
    }

    /// Sweeps on a fixed interval until the task is aborted. The first sweep
    /// runs one interval after start.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep_once().await;
            }
        })
    }
}
