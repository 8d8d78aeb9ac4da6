use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::storage::{BlobStore, StorageError};
use common::{Report, ReportJob, ReportStatus};
use mq::{JobQueue, MqError};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::store::{ReportStore, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("report_type is required")]
    MissingReportType,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("enqueueing job failed: {0}")]
    Queue(#[from] MqError),

    #[error("encoding job failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("download link unavailable: {0}")]
    Storage(#[from] StorageError),
}

/// Producer and read side of the pipeline, as used by the HTTP layer.
pub struct ReportService {
    store: Arc<dyn ReportStore>,
    queue: Arc<dyn JobQueue>,
    blobs: Arc<dyn BlobStore>,
    download_ttl: Duration,
}

impl ReportService {
    pub fn new(
        store: Arc<dyn ReportStore>,
        queue: Arc<dyn JobQueue>,
        blobs: Arc<dyn BlobStore>,
        download_ttl: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            blobs,
            download_ttl,
        }
    }

    /// Create a report record and enqueue the job that builds it.
    pub async fn request_report(
        &self,
        user_id: Uuid,
        report_type: &str,
    ) -> Result<Report, ServiceError> {
        let report_type = report_type.trim();
        if report_type.is_empty() {
            return Err(ServiceError::MissingReportType);
        }

        let report = self.store.create(user_id, report_type).await?;
        let body = ReportJob::for_report(&report).to_body()?;
        let message_id = self.queue.send(body).await?;

        info!(
            report_id = %report.id,
            %user_id,
            %message_id,
            "Report requested"
        );
        Ok(report)
    }

    /// Load a report, refreshing its download link when completed and the link is missing or expired.
    pub async fn get_report(&self, user_id: Uuid, report_id: Uuid) -> Result<Report, ServiceError> {
        let mut report = self.store.get_by_key(user_id, report_id).await?;

        let now = Utc::now();
        if report.status() != ReportStatus::Completed || report.download_handle_is_fresh(now) {
            return Ok(report);
        }
        let Some(key) = report.output_location.clone() else {
            return Ok(report);
        };

        let handle = self.blobs.presign_get(&key, self.download_ttl).await?;
        report.set_download_handle(handle.url, handle.expires_at);

        match self.store.update(&report).await {
            Ok(stored) => Ok(stored),
            Err(e) => {
                warn!(%report_id, error = %e, "Failed to persist refreshed download link");
                Ok(report)
            }
        }
    }
}
