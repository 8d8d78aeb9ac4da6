use thiserror::Error;

#[derive(Debug, Error)]
pub enum MqError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Unknown receipt handle: {0}")]
    UnknownReceipt(String),

    #[error("Acknowledgment failed: {0}")]
    AckFailed(String),

    #[error("{0}")]
    Internal(String),
}

impl From<broccoli_queue::error::BroccoliError> for MqError {
    fn from(e: broccoli_queue::error::BroccoliError) -> Self {
        MqError::Internal(e.to_string())
    }
}
