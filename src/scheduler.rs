//! # Ingest Scheduler
//!
//! Background task that runs an ingestion cycle on a fixed period until
//! shutdown. Cycle failures are logged and the loop carries on.

use std::sync::Arc;

use metrics::counter;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::TrackerError;
use crate::tracker::Tracker;

pub struct IngestScheduler {
    tracker: Arc<Tracker>,
    period: Duration,
}

impl IngestScheduler {
    pub fn new(tracker: Arc<Tracker>, period: Duration) -> Self {
        Self { tracker, period }
    }

    /// Run the scheduler loop until the provided shutdown token fires.
    #[instrument(skip_all, fields(period_secs = self.period.as_secs()))]
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Starting ingest scheduler");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Ingest scheduler shutdown requested");
                    break;
                }
                _ = sleep(self.period) => {
                    self.tick().await;
                }
            }
        }

        info!("Ingest scheduler stopped");
    }

    async fn tick(&self) {
        match self.tracker.fetch_events().await {
            Ok(report) => {
                info!(repositories = report.repositories.len(), "Scheduled ingestion finished");
            }
            Err(TrackerError::NoRepositoriesConfigured) => {
                warn!("Scheduled ingestion skipped, no repositories configured");
            }
            Err(err) => {
                counter!("tracker_scheduled_cycle_failures_total").increment(1);
                error!(error = %err, "Scheduled ingestion failed");
            }
        }
    }
}
