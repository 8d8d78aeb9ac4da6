use std::time::Duration;

use async_trait::async_trait;
pub use broccoli_queue::{
    brokers::broker::BrokerMessage,
    error::BroccoliError,
    queue::BroccoliQueue,
};
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::error::MqError;
use crate::queue::{JobQueue, ReceivedMessage};

pub type MqQueue = BroccoliQueue;

pub struct MqConfig {
    pub url: String,
    pub pool_size: u8,
}

pub async fn init_mq(config: MqConfig) -> Result<MqQueue, MqError> {
    BroccoliQueue::builder(&config.url)
        .pool_connections(config.pool_size)
        .build()
        .await
        .map_err(|e| MqError::Connection(e.to_string()))
}

/// [`JobQueue`] over a Redis-backed broccoli topic.
///
/// Message bodies travel as JSON strings. Broker messages stay in `in_flight`
/// between receive and delete/release, keyed by receipt handle, since the
/// broker needs the original message to acknowledge or reject it.
pub struct BroccoliJobQueue {
    queue: MqQueue,
    topic: String,
    in_flight: DashMap<String, BrokerMessage<String>>,
}

impl BroccoliJobQueue {
    pub fn new(queue: MqQueue, topic: impl Into<String>) -> Self {
        Self {
            queue,
            topic: topic.into(),
            in_flight: DashMap::new(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn take(&self, message: &ReceivedMessage) -> Result<BrokerMessage<String>, MqError> {
        self.in_flight
            .remove(&message.receipt_handle)
            .map(|(_, broker_message)| broker_message)
            .ok_or_else(|| MqError::UnknownReceipt(message.receipt_handle.clone()))
    }
}

#[async_trait]
impl JobQueue for BroccoliJobQueue {
    async fn send(&self, body: String) -> Result<String, MqError> {
        let published = self.queue.publish(&self.topic, None, &body, None).await?;
        Ok(published.task_id.to_string())
    }

    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, MqError> {
        let timeout = time::Duration::try_from(wait)
            .map_err(|e| MqError::Internal(format!("invalid receive wait: {e}")))?;

        let batch: Vec<BrokerMessage<String>> = self
            .queue
            .consume_batch(&self.topic, max_messages, timeout, None)
            .await?;

        let mut received = Vec::with_capacity(batch.len());
        for broker_message in batch {
            let receipt_handle = broker_message.task_id.to_string();
            received.push(ReceivedMessage {
                message_id: receipt_handle.clone(),
                receipt_handle: receipt_handle.clone(),
                body: broker_message.payload.clone(),
                receive_count: u32::from(broker_message.attempts) + 1,
            });
            self.in_flight.insert(receipt_handle, broker_message);
        }

        if !received.is_empty() {
            debug!(topic = %self.topic, count = received.len(), "Received messages");
        }
        Ok(received)
    }

    async fn delete(&self, message: &ReceivedMessage) -> Result<(), MqError> {
        let broker_message = self.take(message)?;
        self.queue
            .acknowledge(&self.topic, broker_message)
            .await
            .map_err(|e| MqError::AckFailed(e.to_string()))
    }

    async fn release(&self, message: &ReceivedMessage) -> Result<(), MqError> {
        let broker_message = self.take(message)?;
        if let Err(e) = self.queue.reject(&self.topic, broker_message).await {
            warn!(
                topic = %self.topic,
                message_id = %message.message_id,
                error = %e,
                "Failed to hand message back to broker"
            );
            return Err(e.into());
        }
        Ok(())
    }
}
