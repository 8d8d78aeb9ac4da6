//! Executes one report job against its collaborators.
//!
//! The record moves `requested -> processing -> completed | failed`. The
//! `processing` transition is persisted before any external I/O, and every
//! error after that point leaves the record failed before it is returned.

pub mod artifact;

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use common::storage::{BlobStore, keys};
use common::{Report, ReportStatus};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::RedeliveryPolicy;
use crate::error::BuildError;
use crate::source::ArtifactSource;
use crate::store::{ReportStore, StoreError};

pub use artifact::encode_rows;

pub struct ReportBuilder {
    store: Arc<dyn ReportStore>,
    source: Arc<dyn ArtifactSource>,
    blobs: Arc<dyn BlobStore>,
    redelivery: RedeliveryPolicy,
}

/// Run `fut` unless `cancel` fires first.
async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, BuildError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BuildError::Cancelled),
        out = fut => Ok(out),
    }
}

impl ReportBuilder {
    pub fn new(
        store: Arc<dyn ReportStore>,
        source: Arc<dyn ArtifactSource>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            store,
            source,
            blobs,
            redelivery: RedeliveryPolicy::default(),
        }
    }

    pub fn with_redelivery(mut self, policy: RedeliveryPolicy) -> Self {
        self.redelivery = policy;
        self
    }

    pub async fn build(
        &self,
        cancel: &CancellationToken,
        user_id: Uuid,
        report_id: Uuid,
    ) -> Result<Report, BuildError> {
        let mut report = match self.store.get_by_key(user_id, report_id).await {
            Ok(report) => report,
            Err(StoreError::NotFound { .. }) => {
                return Err(BuildError::NotFound { user_id, report_id });
            }
            Err(e) => return Err(e.into()),
        };

        if !self.should_build(&report) {
            info!(
                %report_id,
                status = %report.status(),
                "Report already started, skipping"
            );
            return Ok(report);
        }

        info!(%report_id, %user_id, report_type = %report.report_type, "Building report");

        match self.attempt(cancel, &mut report).await {
            Ok(()) => Ok(report),
            Err(err) => {
                self.record_failure(&mut report, &err).await;
                Err(err)
            }
        }
    }

    fn should_build(&self, report: &Report) -> bool {
        if !report.is_started() {
            return true;
        }
        match self.redelivery {
            RedeliveryPolicy::SkipStarted => false,
            RedeliveryPolicy::RetryFailed => report.status() == ReportStatus::Failed,
        }
    }

    async fn attempt(
        &self,
        cancel: &CancellationToken,
        report: &mut Report,
    ) -> Result<(), BuildError> {
        report.begin_attempt(Utc::now());
        let stored = self.store.update(report).await?;
        *report = stored;

        let rows = cancellable(cancel, self.source.fetch_rows()).await??;
        if rows.is_empty() {
            return Err(BuildError::EmptySource);
        }

        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        let row_count = rows.len();
        let artifact = tokio::task::spawn_blocking(move || encode_rows(&rows)).await??;

        let key = keys::report_artifact(report.user_id, report.id);
        cancellable(cancel, self.blobs.put(&key, &artifact)).await??;

        report.complete(key.as_str(), Utc::now());
        let stored = self.store.update(report).await?;
        *report = stored;

        info!(
            report_id = %report.id,
            rows = row_count,
            bytes = artifact.len(),
            key = %key,
            "Report completed"
        );
        Ok(())
    }

    /// Mark the record failed. A failing write is logged, the caller keeps the original error.
    async fn record_failure(&self, report: &mut Report, err: &BuildError) {
        warn!(
            report_id = %report.id,
            kind = %err.kind(),
            error = %err,
            "Report build failed"
        );

        report.fail(err.to_string(), Utc::now());
        match self.store.update(report).await {
            Ok(stored) => *report = stored,
            Err(e) => error!(
                report_id = %report.id,
                error = %e,
                "Failed to record report failure"
            ),
        }
    }
}
