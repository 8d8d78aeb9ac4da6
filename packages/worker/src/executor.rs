use std::time::Duration;

use async_trait::async_trait;
use common::ReportJob;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::builder::ReportBuilder;
use crate::error::BuildError;

/// Runs a single decoded job. The pool only cares whether it succeeded.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, cancel: &CancellationToken, job: ReportJob) -> Result<(), BuildError>;
}

#[async_trait]
impl JobExecutor for ReportBuilder {
    async fn execute(&self, cancel: &CancellationToken, job: ReportJob) -> Result<(), BuildError> {
        self.build(cancel, job.user_id, job.report_id).await.map(|_| ())
    }
}

/// Run `job` under a child of `cancel` that is cancelled once `timeout` elapses.
///
/// On timeout the executor is still awaited so it can record the failure.
pub async fn execute_with_timeout(
    executor: &dyn JobExecutor,
    cancel: &CancellationToken,
    job: ReportJob,
    timeout: Duration,
) -> Result<(), BuildError> {
    let job_token = cancel.child_token();
    let run = executor.execute(&job_token, job);
    tokio::pin!(run);

    tokio::select! {
        res = &mut run => res,
        _ = tokio::time::sleep(timeout) => {
            warn!(
                report_id = %job.report_id,
                timeout_ms = timeout.as_millis() as u64,
                "Job exceeded timeout, cancelling"
            );
            job_token.cancel();
            run.await
        }
    }
}
