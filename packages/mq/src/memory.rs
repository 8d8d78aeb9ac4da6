use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::warn;

use crate::error::MqError;
use crate::queue::{JobQueue, ReceivedMessage};

const POLL_TICK: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
struct StoredMessage {
    id: String,
    body: String,
    receive_count: u32,
}

#[derive(Debug)]
struct InFlight {
    message: StoredMessage,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    ready: VecDeque<StoredMessage>,
    in_flight: HashMap<String, InFlight>,
    dead_letters: Vec<StoredMessage>,
    next_id: u64,
}

impl State {
    /// Move in-flight messages whose visibility timeout elapsed back to `ready`.
    fn requeue_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.visible_at <= now)
            .map(|(handle, _)| handle.clone())
            .collect();
        for handle in expired {
            if let Some(entry) = self.in_flight.remove(&handle) {
                self.ready.push_back(entry.message);
            }
        }
    }
}

/// In-process [`JobQueue`] with SQS-like semantics.
///
/// Received messages are hidden for `visibility_timeout`; unacknowledged ones
/// reappear afterwards. A message received more than `max_receive_count`
/// times is moved to the dead-letter list instead of being delivered.
pub struct MemoryQueue {
    state: Mutex<State>,
    notify: Notify,
    visibility_timeout: Duration,
    max_receive_count: u32,
}

impl MemoryQueue {
    pub fn new(visibility_timeout: Duration, max_receive_count: u32) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            visibility_timeout,
            max_receive_count,
        }
    }

    /// Messages waiting to be received.
    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    /// Messages received but neither deleted nor released.
    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Bodies of messages that exceeded `max_receive_count`.
    pub async fn dead_letters(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .dead_letters
            .iter()
            .map(|m| m.body.clone())
            .collect()
    }

    fn take_batch(&self, state: &mut State, max_messages: usize) -> Vec<ReceivedMessage> {
        let now = Instant::now();
        state.requeue_expired(now);

        let mut batch = Vec::new();
        while batch.len() < max_messages {
            let Some(mut message) = state.ready.pop_front() else {
                break;
            };
            message.receive_count += 1;
            if message.receive_count > self.max_receive_count {
                warn!(
                    message_id = %message.id,
                    receive_count = message.receive_count - 1,
                    "Message exceeded max receive count, dead-lettering"
                );
                state.dead_letters.push(message);
                continue;
            }

            let receipt_handle = format!("{}-{}", message.id, message.receive_count);
            batch.push(ReceivedMessage {
                message_id: message.id.clone(),
                receipt_handle: receipt_handle.clone(),
                body: message.body.clone(),
                receive_count: message.receive_count,
            });
            state.in_flight.insert(
                receipt_handle,
                InFlight {
                    message,
                    visible_at: now + self.visibility_timeout,
                },
            );
        }
        batch
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), 5)
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn send(&self, body: String) -> Result<String, MqError> {
        let id = {
            let mut state = self.state.lock().await;
            state.next_id += 1;
            let id = format!("msg-{}", state.next_id);
            state.ready.push_back(StoredMessage {
                id: id.clone(),
                body,
                receive_count: 0,
            });
            id
        };
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, MqError> {
        let deadline = Instant::now() + wait;
        loop {
            {
                let mut state = self.state.lock().await;
                let batch = self.take_batch(&mut state, max_messages);
                if !batch.is_empty() {
                    return Ok(batch);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            let pause = (deadline - now).min(POLL_TICK);
            let _ = tokio::time::timeout(pause, self.notify.notified()).await;
        }
    }

    async fn delete(&self, message: &ReceivedMessage) -> Result<(), MqError> {
        let mut state = self.state.lock().await;
        state
            .in_flight
            .remove(&message.receipt_handle)
            .map(|_| ())
            .ok_or_else(|| MqError::UnknownReceipt(message.receipt_handle.clone()))
    }

    async fn release(&self, message: &ReceivedMessage) -> Result<(), MqError> {
        {
            let mut state = self.state.lock().await;
            let entry = state
                .in_flight
                .remove(&message.receipt_handle)
                .ok_or_else(|| MqError::UnknownReceipt(message.receipt_handle.clone()))?;
            state.ready.push_back(entry.message);
        }
        self.notify.notify_waiters();
        Ok(())
    }
}
