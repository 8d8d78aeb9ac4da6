mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Report;
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

pub use postgres::SeaOrmReportStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("report {report_id} of user {user_id} not found")]
    NotFound { user_id: Uuid, report_id: Uuid },

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

/// Persistence of report records, keyed by `(user_id, report_id)`.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Insert a new record in the `requested` state.
    async fn create(&self, user_id: Uuid, report_type: &str) -> Result<Report, StoreError>;

    /// Replace every mutable field of an existing record and bump `updated_at`.
    ///
    /// `id`, `user_id`, `report_type` and `created_at` are never rewritten.
    async fn update(&self, report: &Report) -> Result<Report, StoreError>;

    async fn get_by_key(&self, user_id: Uuid, report_id: Uuid) -> Result<Report, StoreError>;

    /// Records still processing whose attempt started before `cutoff`.
    async fn find_stale_processing(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Report>, StoreError>;

    /// Fail a record only if it is still processing the attempt that began at `started_at`.
    ///
    /// Returns `false` when the row has moved on since it was read.
    async fn mark_stale(
        &self,
        user_id: Uuid,
        report_id: Uuid,
        started_at: DateTime<Utc>,
        message: &str,
    ) -> Result<bool, StoreError>;
}
