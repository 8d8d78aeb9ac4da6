use std::time::Duration;

use async_trait::async_trait;

use crate::error::MqError;

/// A message handed out by a [`JobQueue`], not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Stable identifier of the message across redeliveries.
    pub message_id: String,
    /// Identifies this particular delivery; required to delete or release it.
    pub receipt_handle: String,
    pub body: String,
    /// 1 on first delivery, incremented on every redelivery.
    pub receive_count: u32,
}

/// Pull-based, at-least-once job queue.
///
/// A received message stays invisible to other consumers until it is deleted
/// (processed) or released (handed back to the queue's redelivery policy).
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a message body and return its message id.
    async fn send(&self, body: String) -> Result<String, MqError>;

    /// Receive up to `max_messages`, waiting at most `wait` for the first one.
    ///
    /// An empty result is not an error.
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, MqError>;

    /// Acknowledge a processed message so it is never delivered again.
    async fn delete(&self, message: &ReceivedMessage) -> Result<(), MqError>;

    /// Give a message back without acknowledging it.
    async fn release(&self, message: &ReceivedMessage) -> Result<(), MqError>;
}
