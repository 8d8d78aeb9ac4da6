use std::fmt;

use common::storage::StorageError;
use thiserror::Error;
use uuid::Uuid;

use crate::source::SourceError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("MQ error: {0}")]
    Mq(String),

    #[error("Worker cancelled")]
    Cancelled,
}

impl From<mq::MqError> for WorkerError {
    fn from(e: mq::MqError) -> Self {
        WorkerError::Mq(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;

/// Coarse classification of job failures, used for logging and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The referenced report does not exist. Never recorded, never retried.
    NotFound,
    /// The upstream source returned no rows.
    EmptySource,
    /// Source, blob store, persistence or encoding failed.
    UpstreamFailure,
    /// The queue message could not be decoded into a job.
    MessageMalformed,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::EmptySource => "empty_source",
            Self::UpstreamFailure => "upstream_failure",
            Self::MessageMalformed => "message_malformed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Failure of a single report build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("report {report_id} of user {user_id} not found")]
    NotFound { user_id: Uuid, report_id: Uuid },

    #[error("source returned no rows")]
    EmptySource,

    #[error("fetching rows failed: {0}")]
    Source(#[from] SourceError),

    #[error("storing artifact failed: {0}")]
    Storage(#[from] StorageError),

    #[error("persisting report failed: {0}")]
    Store(#[from] StoreError),

    #[error("encoding artifact failed: {0}")]
    Encode(#[from] csv::Error),

    #[error("encoding task failed: {0}")]
    EncodeTask(#[from] tokio::task::JoinError),

    #[error("build cancelled")]
    Cancelled,
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::EmptySource => ErrorKind::EmptySource,
            Self::Source(_)
            | Self::Storage(_)
            | Self::Store(_)
            | Self::Encode(_)
            | Self::EncodeTask(_) => ErrorKind::UpstreamFailure,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<std::io::Error> for BuildError {
    fn from(e: std::io::Error) -> Self {
        BuildError::Encode(csv::Error::from(e))
    }
}
