use std::sync::Arc;

use tracing::{error, info, instrument};

use super::ResultSettings;
use crate::error::ImportResult;
use crate::job::{JobStatusClient, OnFailure, update_job_status};
use crate::store::{ImportFileStore, PatientRecordStore};
use crate::types::{JobStatus, JobUpdate, RESULT_CSV_HEADER, RecordStatus, ResultEntry, ResultRequest};
use crate::validation::to_csv_string;

/// What a result run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultOutcome {
    pub result_key: String,
    pub rows: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Builds the result file from the per-row records of a job and finalizes
/// the job status.
pub struct ResultOrchestrator {
    jobs: Arc<dyn JobStatusClient>,
    files: ImportFileStore,
    records: PatientRecordStore,
    settings: ResultSettings,
}

impl ResultOrchestrator {
    pub fn new(
        jobs: Arc<dyn JobStatusClient>,
        files: ImportFileStore,
        records: PatientRecordStore,
        settings: ResultSettings,
    ) -> Self {
        Self {
            jobs,
            files,
            records,
            settings,
        }
    }

    /// Runs the stage. On failure the job is marked failed and the error returned.
    #[instrument(skip(self, request), fields(cx_id = %request.cx_id, job_id = %request.job_id))]
    pub async fn run(&self, request: &ResultRequest) -> ImportResult<ResultOutcome> {
        let cx_id = request.cx_id.as_str();
        let job_id = request.job_id.as_str();

        match self.build_and_complete(cx_id, job_id).await {
            Ok(outcome) => {
                info!(
                    cx_id,
                    job_id,
                    rows = outcome.rows,
                    succeeded = outcome.succeeded,
                    failed = outcome.failed,
                    result_key = %outcome.result_key,
                    "result file written, job completed"
                );
                Ok(outcome)
            }
            Err(err) => {
                error!(cx_id, job_id, error = %err, "result failed, marking job as failed");
                update_job_status(
                    self.jobs.as_ref(),
                    cx_id,
                    job_id,
                    JobUpdate::new(JobStatus::Failed),
                    OnFailure::Log,
                )
                .await?;
                Err(err)
            }
        }
    }

    async fn build_and_complete(&self, cx_id: &str, job_id: &str) -> ImportResult<ResultOutcome> {
        let entries = self
            .records
            .load_all(cx_id, job_id, self.settings.read_concurrency)
            .await?;
        let contents = result_csv(&entries)?;
        let result_key = self
            .files
            .write_result_file(cx_id, job_id, contents)
            .await?;

        update_job_status(
            self.jobs.as_ref(),
            cx_id,
            job_id,
            JobUpdate::new(JobStatus::Completed),
            OnFailure::Raise,
        )
        .await?;

        let succeeded = entries
            .iter()
            .filter(|e| e.status == RecordStatus::Success)
            .count();
        Ok(ResultOutcome {
            result_key,
            rows: entries.len(),
            succeeded,
            failed: entries.len() - succeeded,
        })
    }
}

/// Renders entries as the result file, one line per entry.
pub fn result_csv(entries: &[ResultEntry]) -> ImportResult<String> {
    let rows = entries.iter().map(|entry| entry.to_row().to_vec());
    Ok(to_csv_string(&RESULT_CSV_HEADER, rows)?)
}
