use common::Report;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Persisted report record. Status is derived from the timestamps, never stored.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "report")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(indexed)]
    pub user_id: Uuid,

    pub report_type: String,

    pub output_location: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub download_url: Option<String>,

    pub download_url_expires_at: Option<DateTimeUtc>,

    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    pub created_at: DateTimeUtc,

    #[sea_orm(indexed)]
    pub started_at: Option<DateTimeUtc>,

    pub completed_at: Option<DateTimeUtc>,

    pub failed_at: Option<DateTimeUtc>,

    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Report {
    fn from(m: Model) -> Self {
        Report {
            id: m.id,
            user_id: m.user_id,
            report_type: m.report_type,
            output_location: m.output_location,
            download_url: m.download_url,
            download_url_expires_at: m.download_url_expires_at,
            error_message: m.error_message,
            created_at: m.created_at,
            started_at: m.started_at,
            completed_at: m.completed_at,
            failed_at: m.failed_at,
            updated_at: m.updated_at,
        }
    }
}

impl From<&Report> for Model {
    fn from(r: &Report) -> Self {
        Model {
            id: r.id,
            user_id: r.user_id,
            report_type: r.report_type.clone(),
            output_location: r.output_location.clone(),
            download_url: r.download_url.clone(),
            download_url_expires_at: r.download_url_expires_at,
            error_message: r.error_message.clone(),
            created_at: r.created_at,
            started_at: r.started_at,
            completed_at: r.completed_at,
            failed_at: r.failed_at,
            updated_at: r.updated_at,
        }
    }
}
