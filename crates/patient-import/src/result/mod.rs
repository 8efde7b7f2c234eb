//! The result stage.

mod orchestrator;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

pub use orchestrator::{ResultOrchestrator, ResultOutcome, result_csv};

use crate::error::ImportResult;
use crate::job::{JobStatusClient, OnFailure, update_job_status};
use crate::queue::{QueueClient, send_json};
use crate::types::{JobStatus, JobUpdate, ResultRequest};

/// Default number of record reads in flight.
pub const DEFAULT_READ_CONCURRENCY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultSettings {
    pub read_concurrency: usize,
}

impl Default for ResultSettings {
    fn default() -> Self {
        Self {
            read_concurrency: DEFAULT_READ_CONCURRENCY,
        }
    }
}

/// Starts the result stage of a job.
#[async_trait]
pub trait ResultHandler: Send + Sync {
    async fn process_job_result(&self, request: ResultRequest) -> ImportResult<()>;
}

/// Runs the result stage in process and returns its failures.
pub struct ResultHandlerLocal {
    orchestrator: Arc<ResultOrchestrator>,
}

impl ResultHandlerLocal {
    pub fn new(orchestrator: Arc<ResultOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl ResultHandler for ResultHandlerLocal {
    async fn process_job_result(&self, request: ResultRequest) -> ImportResult<()> {
        self.orchestrator.run(&request).await.map(|_| ())
    }
}

/// Enqueues the result request for a worker.
///
/// Runs detached from its caller: an enqueue failure marks the job failed and
/// is not returned.
pub struct ResultHandlerCloud {
    queue: Arc<dyn QueueClient>,
    queue_url: String,
    jobs: Arc<dyn JobStatusClient>,
}

impl ResultHandlerCloud {
    pub fn new(
        queue: Arc<dyn QueueClient>,
        queue_url: impl Into<String>,
        jobs: Arc<dyn JobStatusClient>,
    ) -> Self {
        Self {
            queue,
            queue_url: queue_url.into(),
            jobs,
        }
    }
}

#[async_trait]
impl ResultHandler for ResultHandlerCloud {
    async fn process_job_result(&self, request: ResultRequest) -> ImportResult<()> {
        match send_json(self.queue.as_ref(), &self.queue_url, &request).await {
            Ok(message_id) => {
                info!(
                    cx_id = %request.cx_id,
                    job_id = %request.job_id,
                    message_id = ?message_id,
                    "result request enqueued"
                );
            }
            Err(err) => {
                error!(
                    cx_id = %request.cx_id,
                    job_id = %request.job_id,
                    error = %err,
                    "failed to enqueue result request, marking job as failed"
                );
                update_job_status(
                    self.jobs.as_ref(),
                    &request.cx_id,
                    &request.job_id,
                    JobUpdate::new(JobStatus::Failed),
                    OnFailure::Log,
                )
                .await?;
            }
        }
        Ok(())
    }
}
