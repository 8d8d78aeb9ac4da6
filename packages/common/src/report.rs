use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Report type produced by the monsters compendium export.
pub const MONSTERS_REPORT_TYPE: &str = "monsters";

/// Observable state of a report job.
///
/// Never stored: always derived from the lifecycle timestamps of a [`Report`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Created, no build attempt yet.
    Requested,
    /// A build attempt has started and not reached a terminal state.
    Processing,
    /// Artifact stored, download available.
    Completed,
    /// Last build attempt failed.
    Failed,
}

impl ReportStatus {
    /// Returns true if no further transition happens without a retry.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// All possible status values.
    pub const ALL: &'static [ReportStatus] = &[
        Self::Requested,
        Self::Processing,
        Self::Completed,
        Self::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing an invalid status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError {
    invalid: String,
}

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid status '{}'. Valid values: {}",
            self.invalid,
            ReportStatus::ALL
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for ReportStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(Self::Requested),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseStatusError {
                invalid: s.to_string(),
            }),
        }
    }
}

/// Persisted job/status record for one requested export.
///
/// Lifecycle: `created_at` -> `started_at` -> exactly one of `completed_at` /
/// `failed_at`. A retried job clears both terminal timestamps before running.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub user_id: Uuid,
    pub report_type: String,
    /// Blob store key of the finished artifact. Set only on completion.
    pub output_location: Option<String>,
    /// Time-limited download handle. Derived data, may be stale or absent.
    pub download_url: Option<String>,
    pub download_url_expires_at: Option<DateTime<Utc>>,
    /// Set only alongside `failed_at`.
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    /// Create a fresh record in the `requested` state.
    pub fn new(user_id: Uuid, report_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            report_type: report_type.into(),
            output_location: None,
            download_url: None,
            download_url_expires_at: None,
            error_message: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            failed_at: None,
            updated_at: now,
        }
    }

    pub fn status(&self) -> ReportStatus {
        match (self.started_at, self.completed_at, self.failed_at) {
            (None, _, _) => ReportStatus::Requested,
            (Some(_), Some(_), _) => ReportStatus::Completed,
            (Some(_), None, Some(_)) => ReportStatus::Failed,
            (Some(_), None, None) => ReportStatus::Processing,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Enter `processing`, discarding every result of a previous attempt.
    pub fn begin_attempt(&mut self, now: DateTime<Utc>) {
        self.started_at = Some(now);
        self.completed_at = None;
        self.failed_at = None;
        self.error_message = None;
        self.output_location = None;
        self.clear_download_handle();
    }

    pub fn complete(&mut self, output_location: impl Into<String>, now: DateTime<Utc>) {
        self.started_at.get_or_insert(now);
        self.output_location = Some(output_location.into());
        self.completed_at = Some(now);
        self.failed_at = None;
        self.error_message = None;
    }

    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.started_at.get_or_insert(now);
        self.failed_at = Some(now);
        self.error_message = Some(message.into());
        self.completed_at = None;
        self.output_location = None;
        self.clear_download_handle();
    }

    /// Whether the cached download handle can still be handed out at `now`.
    pub fn download_handle_is_fresh(&self, now: DateTime<Utc>) -> bool {
        match (&self.download_url, self.download_url_expires_at) {
            (Some(_), Some(expires_at)) => expires_at > now,
            _ => false,
        }
    }

    pub fn set_download_handle(&mut self, url: impl Into<String>, expires_at: DateTime<Utc>) {
        self.download_url = Some(url.into());
        self.download_url_expires_at = Some(expires_at);
    }

    pub fn clear_download_handle(&mut self) {
        self.download_url = None;
        self.download_url_expires_at = None;
    }

    /// Checks the lifecycle invariants that every persisted record must hold.
    pub fn lifecycle_is_consistent(&self) -> bool {
        let terminal = usize::from(self.completed_at.is_some()) + usize::from(self.failed_at.is_some());
        let timestamps_ok = match self.started_at {
            None => terminal == 0,
            Some(_) => terminal <= 1,
        };
        timestamps_ok
            && (self.error_message.is_none() || self.failed_at.is_some())
            && (self.output_location.is_none() || self.completed_at.is_some())
    }
}
