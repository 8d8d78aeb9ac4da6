use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Report;
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use tracing::debug;
use uuid::Uuid;

use super::{ReportStore, StoreError};
use crate::entity::report;

/// [`ReportStore`] over a SeaORM connection.
#[derive(Clone)]
pub struct SeaOrmReportStore {
    db: DatabaseConnection,
}

impl SeaOrmReportStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReportStore for SeaOrmReportStore {
    async fn create(&self, user_id: Uuid, report_type: &str) -> Result<Report, StoreError> {
        let report = Report::new(user_id, report_type);
        let active = report::ActiveModel {
            id: Set(report.id),
            user_id: Set(report.user_id),
            report_type: Set(report.report_type.clone()),
            output_location: Set(None),
            download_url: Set(None),
            download_url_expires_at: Set(None),
            error_message: Set(None),
            created_at: Set(report.created_at),
            started_at: Set(None),
            completed_at: Set(None),
            failed_at: Set(None),
            updated_at: Set(report.updated_at),
        };

        let model = active.insert(&self.db).await?;
        debug!(report_id = %model.id, user_id = %model.user_id, "Created report");
        Ok(model.into())
    }

    async fn update(&self, report: &Report) -> Result<Report, StoreError> {
        let mut stored = report.clone();
        stored.updated_at = Utc::now();

        let changes = report::ActiveModel {
            id: NotSet,
            user_id: NotSet,
            report_type: NotSet,
            created_at: NotSet,
            output_location: Set(stored.output_location.clone()),
            download_url: Set(stored.download_url.clone()),
            download_url_expires_at: Set(stored.download_url_expires_at),
            error_message: Set(stored.error_message.clone()),
            started_at: Set(stored.started_at),
            completed_at: Set(stored.completed_at),
            failed_at: Set(stored.failed_at),
            updated_at: Set(stored.updated_at),
        };

        let result = report::Entity::update_many()
            .set(changes)
            .filter(report::Column::Id.eq(report.id))
            .filter(report::Column::UserId.eq(report.user_id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound {
                user_id: report.user_id,
                report_id: report.id,
            });
        }
        Ok(stored)
    }

    async fn get_by_key(&self, user_id: Uuid, report_id: Uuid) -> Result<Report, StoreError> {
        report::Entity::find_by_id(report_id)
            .filter(report::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?
            .map(Report::from)
            .ok_or(StoreError::NotFound { user_id, report_id })
    }

    async fn find_stale_processing(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Report>, StoreError> {
        let models = report::Entity::find()
            .filter(report::Column::StartedAt.lt(cutoff))
            .filter(report::Column::CompletedAt.is_null())
            .filter(report::Column::FailedAt.is_null())
            .order_by_asc(report::Column::StartedAt)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Report::from).collect())
    }

    async fn mark_stale(
        &self,
        user_id: Uuid,
        report_id: Uuid,
        started_at: DateTime<Utc>,
        message: &str,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        let changes = report::ActiveModel {
            id: NotSet,
            user_id: NotSet,
            report_type: NotSet,
            created_at: NotSet,
            started_at: NotSet,
            completed_at: NotSet,
            failed_at: Set(Some(now)),
            error_message: Set(Some(message.to_string())),
            output_location: Set(None),
            download_url: Set(None),
            download_url_expires_at: Set(None),
            updated_at: Set(now),
        };

        let result = report::Entity::update_many()
            .set(changes)
            .filter(report::Column::Id.eq(report_id))
            .filter(report::Column::UserId.eq(user_id))
            .filter(report::Column::StartedAt.eq(started_at))
            .filter(report::Column::CompletedAt.is_null())
            .filter(report::Column::FailedAt.is_null())
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn model(user_id: Uuid) -> report::Model {
        let report = Report::new(user_id, common::MONSTERS_REPORT_TYPE);
        report::Model::from(&report)
    }

    #[tokio::test]
    async fn get_by_key_maps_row() {
        let user_id = Uuid::new_v4();
        let row = model(user_id);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row.clone()]])
            .into_connection();
        let store = SeaOrmReportStore::new(db);

        let report = store.get_by_key(user_id, row.id).await.unwrap();
        assert_eq!(report.id, row.id);
        assert_eq!(report.user_id, user_id);
        assert_eq!(report.status(), common::ReportStatus::Requested);
    }

    #[tokio::test]
    async fn get_by_key_missing_row() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<report::Model>::new()])
            .into_connection();
        let store = SeaOrmReportStore::new(db);

        let result = store.get_by_key(Uuid::new_v4(), Uuid::new_v4()).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn update_bumps_updated_at() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let store = SeaOrmReportStore::new(db);

        let mut report = Report::new(Uuid::new_v4(), common::MONSTERS_REPORT_TYPE);
        let before = report.updated_at;
        report.begin_attempt(Utc::now());

        let stored = store.update(&report).await.unwrap();
        assert!(stored.updated_at >= before);
        assert_eq!(stored.started_at, report.started_at);
    }

    #[tokio::test]
    async fn update_of_missing_row_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let store = SeaOrmReportStore::new(db);

        let report = Report::new(Uuid::new_v4(), common::MONSTERS_REPORT_TYPE);
        let result = store.update(&report).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn find_stale_processing_maps_rows() {
        let mut row = model(Uuid::new_v4());
        row.started_at = Some(Utc::now() - chrono::Duration::minutes(10));
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row.clone()]])
            .into_connection();
        let store = SeaOrmReportStore::new(db);

        let stale = store.find_stale_processing(Utc::now()).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].status(), common::ReportStatus::Processing);
    }

    #[tokio::test]
    async fn mark_stale_reports_whether_row_matched() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
            ])
            .into_connection();
        let store = SeaOrmReportStore::new(db);
        let started_at = Utc::now() - chrono::Duration::minutes(10);

        assert!(
            store
                .mark_stale(Uuid::new_v4(), Uuid::new_v4(), started_at, "abandoned")
                .await
                .unwrap()
        );
        assert!(
            !store
                .mark_stale(Uuid::new_v4(), Uuid::new_v4(), started_at, "abandoned")
                .await
                .unwrap()
        );
    }
}
