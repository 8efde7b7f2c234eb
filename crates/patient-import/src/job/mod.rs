//! Job status service access.
//!
//! The job record is owned by an external service; the pipeline only reads it
//! and requests transitions through a [`JobStatusClient`].

mod http;

use async_trait::async_trait;
use tracing::{error, info};

pub use http::HttpJobClient;

use crate::error::JobStatusError;
use crate::types::{ImportJob, JobUpdate};

/// Reads and updates the authoritative job record.
#[async_trait]
pub trait JobStatusClient: Send + Sync {
    async fn get_job(&self, cx_id: &str, job_id: &str) -> Result<ImportJob, JobStatusError>;

    async fn update_job(
        &self,
        cx_id: &str,
        job_id: &str,
        update: &JobUpdate,
    ) -> Result<ImportJob, JobStatusError>;
}

/// What to do when a status update fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    /// Return the error to the caller.
    Raise,
    /// Log the error and return `Ok(None)`.
    Log,
}

/// Requests a job update, raising or logging failures per `on_failure`.
pub async fn update_job_status(
    client: &dyn JobStatusClient,
    cx_id: &str,
    job_id: &str,
    update: JobUpdate,
    on_failure: OnFailure,
) -> Result<Option<ImportJob>, JobStatusError> {
    match client.update_job(cx_id, job_id, &update).await {
        Ok(job) => {
            info!(
                cx_id,
                job_id,
                status = %job.status,
                total = ?job.total,
                failed = ?job.failed,
                "job updated"
            );
            Ok(Some(job))
        }
        Err(err) => match on_failure {
            OnFailure::Raise => Err(err),
            OnFailure::Log => {
                error!(
                    cx_id,
                    job_id,
                    status = %update.status,
                    error = %err,
                    "failed to update job status"
                );
                Ok(None)
            }
        },
    }
}
