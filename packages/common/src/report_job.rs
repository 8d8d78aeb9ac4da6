use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::report::Report;

/// Queue payload pointing at the report to build.
///
/// Carries identity only; the builder always re-reads the record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportJob {
    pub user_id: Uuid,
    pub report_id: Uuid,
}

#[derive(Debug, Error)]
pub enum JobParseError {
    #[error("message body is empty")]
    Empty,

    #[error("message body is invalid: {0}")]
    Invalid(#[from] serde_json::Error),
}

impl ReportJob {
    pub fn new(user_id: Uuid, report_id: Uuid) -> Self {
        Self { user_id, report_id }
    }

    pub fn for_report(report: &Report) -> Self {
        Self::new(report.user_id, report.id)
    }

    /// Serialize into the JSON queue body `{"user_id": ..., "report_id": ...}`.
    pub fn to_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn parse(body: &str) -> Result<Self, JobParseError> {
        if body.trim().is_empty() {
            return Err(JobParseError::Empty);
        }
        Ok(serde_json::from_str(body)?)
    }
}
