//! Receive loop feeding a fixed set of worker tasks through a bounded channel.

use std::sync::Arc;
use std::time::Duration;

use common::ReportJob;
use common::config::MqAppConfig;
use mq::{JobQueue, ReceivedMessage};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::error::{ErrorKind, Result, WorkerError};
use crate::executor::{JobExecutor, execute_with_timeout};

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_concurrency: usize,
    /// Upper bound a single receive call waits for messages.
    pub receive_wait: Duration,
    pub poll_error_delay: Duration,
    pub job_timeout: Duration,
}

impl PoolSettings {
    pub fn from_config(worker: &WorkerConfig, mq: &MqAppConfig) -> Self {
        Self {
            max_concurrency: worker.max_concurrency,
            receive_wait: Duration::from_millis(mq.receive_wait_ms),
            poll_error_delay: worker.poll_error_delay(),
            job_timeout: worker.job_timeout(),
        }
    }
}

type SharedReceiver = Arc<Mutex<mpsc::Receiver<ReceivedMessage>>>;

pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    executor: Arc<dyn JobExecutor>,
    settings: PoolSettings,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        executor: Arc<dyn JobExecutor>,
        settings: PoolSettings,
    ) -> Result<Self> {
        if settings.max_concurrency == 0 {
            return Err(WorkerError::InvalidConfig(
                "worker.max_concurrency must be at least 1".into(),
            ));
        }
        Ok(Self {
            queue,
            executor,
            settings,
        })
    }

    /// Process jobs until `cancel` fires.
    ///
    /// Returns `Ok(())` on a clean stop and [`WorkerError::Cancelled`] when the
    /// stop interrupted a failing queue. Always waits for every worker task.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let capacity = self.settings.max_concurrency;
        let (tx, rx) = mpsc::channel::<ReceivedMessage>(capacity);
        let rx: SharedReceiver = Arc::new(Mutex::new(rx));

        let mut workers = JoinSet::new();
        for slot in 0..capacity {
            let worker = Worker {
                slot,
                queue: self.queue.clone(),
                executor: self.executor.clone(),
                job_timeout: self.settings.job_timeout,
            };
            workers.spawn(worker.run(rx.clone(), cancel.clone()));
        }
        info!(workers = capacity, "Worker pool started");

        let result = self.receive_loop(&tx, &cancel).await;
        drop(tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task panicked");
            }
        }

        // Messages still buffered were never started.
        let mut rx = rx.lock().await;
        while let Ok(message) = rx.try_recv() {
            release(self.queue.as_ref(), &message).await;
        }

        info!("Worker pool stopped");
        result
    }

    async fn receive_loop(
        &self,
        tx: &mpsc::Sender<ReceivedMessage>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let batch_size = self.settings.max_concurrency + 1;
        let mut last_poll_failed = false;

        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => return stop_result(last_poll_failed),
                r = self.queue.receive(batch_size, self.settings.receive_wait) => r,
            };

            let batch = match received {
                Ok(batch) => {
                    last_poll_failed = false;
                    batch
                }
                Err(e) => {
                    last_poll_failed = true;
                    error!(error = %e, "Failed to receive messages");
                    tokio::select! {
                        _ = cancel.cancelled() => return stop_result(last_poll_failed),
                        _ = tokio::time::sleep(self.settings.poll_error_delay) => {}
                    }
                    continue;
                }
            };

            if !batch.is_empty() {
                debug!(count = batch.len(), "Dispatching messages");
            }

            let mut pending = batch.into_iter();
            while let Some(message) = pending.next() {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = tx.reserve() => permit.ok(),
                };
                match permit {
                    Some(permit) => permit.send(message),
                    None => {
                        release(self.queue.as_ref(), &message).await;
                        for rest in pending {
                            release(self.queue.as_ref(), &rest).await;
                        }
                        if cancel.is_cancelled() {
                            return Ok(());
                        }
                        return Err(WorkerError::Mq("worker channel closed".into()));
                    }
                }
            }
        }
    }
}

fn stop_result(last_poll_failed: bool) -> Result<()> {
    if last_poll_failed {
        warn!("Cancelled while the queue was failing");
        Err(WorkerError::Cancelled)
    } else {
        Ok(())
    }
}

async fn release(queue: &dyn JobQueue, message: &ReceivedMessage) {
    if let Err(e) = queue.release(message).await {
        warn!(
            message_id = %message.message_id,
            error = %e,
            "Failed to release message"
        );
    }
}

struct Worker {
    slot: usize,
    queue: Arc<dyn JobQueue>,
    executor: Arc<dyn JobExecutor>,
    job_timeout: Duration,
}

impl Worker {
    async fn run(self, rx: SharedReceiver, cancel: CancellationToken) {
        loop {
            let next = {
                let mut rx = rx.lock().await;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    message = rx.recv() => message,
                }
            };
            let Some(message) = next else {
                break;
            };
            self.handle(message, &cancel).await;
        }
        debug!(slot = self.slot, "Worker exited");
    }

    async fn handle(&self, message: ReceivedMessage, cancel: &CancellationToken) {
        let job = match ReportJob::parse(&message.body) {
            Ok(job) => job,
            Err(e) => {
                warn!(
                    slot = self.slot,
                    message_id = %message.message_id,
                    kind = %ErrorKind::MessageMalformed,
                    error = %e,
                    "Skipping malformed message"
                );
                release(self.queue.as_ref(), &message).await;
                return;
            }
        };

        debug!(
            slot = self.slot,
            report_id = %job.report_id,
            receive_count = message.receive_count,
            "Processing job"
        );

        let outcome =
            execute_with_timeout(self.executor.as_ref(), cancel, job, self.job_timeout).await;

        match outcome {
            Ok(()) => self.delete(&message).await,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    report_id = %job.report_id,
                    user_id = %job.user_id,
                    "Report does not exist, discarding job"
                );
                self.delete(&message).await;
            }
            Err(e) => {
                error!(
                    slot = self.slot,
                    report_id = %job.report_id,
                    kind = %e.kind(),
                    error = %e,
                    "Job failed, leaving message for redelivery"
                );
                release(self.queue.as_ref(), &message).await;
            }
        }
    }

    async fn delete(&self, message: &ReceivedMessage) {
        if let Err(e) = self.queue.delete(message).await {
            error!(
                message_id = %message.message_id,
                error = %e,
                "Failed to delete message"
            );
        }
    }
}
