use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::store::{ReportStore, StoreError};

/// Marks reports stuck in `processing` as failed so they stop looking alive.
pub struct StaleReportSweeper {
    store: Arc<dyn ReportStore>,
    stale_after: Duration,
}

impl StaleReportSweeper {
    pub fn new(store: Arc<dyn ReportStore>, stale_after: Duration) -> Self {
        Self { store, stale_after }
    }

    /// Sweep every `interval` until `cancel` fires.
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        info!(
            stale_after_secs = self.stale_after.as_secs(),
            interval_secs = interval.as_secs(),
            "Starting stale report sweeper"
        );

        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.sweep().await {
                error!(error = %e, "Stale report sweep failed");
            }
        }
    }

    /// Fail every report processing for longer than `stale_after`. Returns how many were marked.
    pub async fn sweep(&self) -> Result<usize, StoreError> {
        let stale_after = chrono::Duration::from_std(self.stale_after)
            .unwrap_or_else(|_| chrono::Duration::MAX);
        let now = Utc::now();
        let cutoff = now.checked_sub_signed(stale_after).unwrap_or(now);

        let stale = self.store.find_stale_processing(cutoff).await?;
        if stale.is_empty() {
            return Ok(0);
        }
        info!(count = stale.len(), "Found stale reports");

        let message = format!(
            "build abandoned: processing for over {} seconds",
            self.stale_after.as_secs()
        );
        let mut marked = 0;
        for report in stale {
            let Some(started_at) = report.started_at else {
                continue;
            };
            match self
                .store
                .mark_stale(report.user_id, report.id, started_at, &message)
                .await
            {
                Ok(true) => marked += 1,
                Ok(false) => debug!(report_id = %report.id, "Report moved on before it was swept"),
                Err(e) => warn!(report_id = %report.id, error = %e, "Failed to mark stale report"),
            }
        }
        Ok(marked)
    }
}
