use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, instrument, warn};

use super::ThrottleSettings;
use crate::dispatch::PatientCreateDispatcher;
use crate::error::{DispatchError, ImportResult};
use crate::job::{JobStatusClient, OnFailure, update_job_status};
use crate::result::ResultHandler;
use crate::store::{ImportFileStore, PatientRecordStore};
use crate::types::{
    DISPATCH_FAILURE_MESSAGE, DISPATCH_FAILURE_REASON_FOR_CX, ImportJob, JobStatus, JobUpdate,
    ParseRequest, PatientCreateRequest, PatientRecord, ResultRequest, StagedPatient,
};
use crate::validation::{CsvValidator, SuccessfulRow};

/// What a parse run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    /// Rows in the upload.
    pub total: usize,
    /// Rows that failed validation.
    pub failed_validation: usize,
    /// Rows handed to the create dispatcher.
    pub dispatched: usize,
    pub dispatch_failures: usize,
    /// Failed-row records that could not be written.
    pub record_write_failures: usize,
    pub dry_run: bool,
}

enum Prepared {
    /// Nothing left to dispatch; the job is already finalized.
    Finished(ParseOutcome),
    Dispatch {
        job: ImportJob,
        rows: Vec<SuccessfulRow>,
        outcome: ParseOutcome,
    },
}

#[derive(Debug, Default)]
struct ChunkTally {
    dispatch_failures: usize,
    record_write_failures: usize,
    first_error: Option<String>,
}

/// Runs the parse stage of a job: validate the upload, record counts, fan out
/// rows to the create dispatcher in throttled chunks, then hand off to the
/// result stage.
pub struct ParseOrchestrator {
    jobs: Arc<dyn JobStatusClient>,
    files: ImportFileStore,
    records: PatientRecordStore,
    dispatcher: Arc<dyn PatientCreateDispatcher>,
    result: Arc<dyn ResultHandler>,
    validator: CsvValidator,
    throttle: ThrottleSettings,
}

impl ParseOrchestrator {
    pub fn new(
        jobs: Arc<dyn JobStatusClient>,
        files: ImportFileStore,
        records: PatientRecordStore,
        dispatcher: Arc<dyn PatientCreateDispatcher>,
        result: Arc<dyn ResultHandler>,
        validator: CsvValidator,
        throttle: ThrottleSettings,
    ) -> Self {
        Self {
            jobs,
            files,
            records,
            dispatcher,
            result,
            validator,
            throttle,
        }
    }

    pub fn throttle(&self) -> &ThrottleSettings {
        &self.throttle
    }

    /// Runs the stage. Job-level failures mark the job failed and are returned.
    #[instrument(skip(self, request), fields(cx_id = %request.cx_id, job_id = %request.job_id))]
    pub async fn run(&self, request: &ParseRequest) -> ImportResult<ParseOutcome> {
        let cx_id = request.cx_id.as_str();
        let job_id = request.job_id.as_str();

        let prepared = match self.prepare(request).await {
            Ok(prepared) => prepared,
            Err(err) => {
                error!(cx_id, job_id, error = %err, "parse failed, marking job as failed");
                update_job_status(
                    self.jobs.as_ref(),
                    cx_id,
                    job_id,
                    JobUpdate::new(JobStatus::Failed),
                    OnFailure::Log,
                )
                .await?;
                return Err(err);
            }
        };

        let (job, rows, mut outcome) = match prepared {
            Prepared::Finished(outcome) => return Ok(outcome),
            Prepared::Dispatch { job, rows, outcome } => (job, rows, outcome),
        };

        if outcome.dry_run {
            info!(cx_id, job_id, rows = rows.len(), "dry run, skipping patient creation");
        } else {
            let tally = self.dispatch_all(&job, &rows).await;
            outcome.dispatched = rows.len();
            outcome.dispatch_failures = tally.dispatch_failures;
            outcome.record_write_failures = tally.record_write_failures;
            if tally.dispatch_failures > 0 {
                error!(
                    cx_id,
                    job_id,
                    dispatch_failures = tally.dispatch_failures,
                    record_write_failures = tally.record_write_failures,
                    first_error = tally.first_error.as_deref().unwrap_or_default(),
                    "failed to dispatch some rows to patient create"
                );
            }
        }

        self.result
            .process_job_result(ResultRequest::new(cx_id, job_id))
            .await?;

        info!(
            cx_id,
            job_id,
            total = outcome.total,
            failed_validation = outcome.failed_validation,
            dispatched = outcome.dispatched,
            dispatch_failures = outcome.dispatch_failures,
            "parse finished"
        );
        Ok(outcome)
    }

    async fn prepare(&self, request: &ParseRequest) -> ImportResult<Prepared> {
        let cx_id = request.cx_id.as_str();
        let job_id = request.job_id.as_str();

        update_job_status(
            self.jobs.as_ref(),
            cx_id,
            job_id,
            JobUpdate::new(JobStatus::Processing)
                .with_force_status_update(request.force_status_update),
            OnFailure::Raise,
        )
        .await?;

        let job = self.jobs.get_job(cx_id, job_id).await?;
        let contents = self.files.read_raw_csv(cx_id, job_id).await?;
        let partitioned = self.validator.validate_and_parse(&contents)?.partition();

        let total = partitioned.total();
        let failed = partitioned.failed.len();
        let outcome = ParseOutcome {
            total,
            failed_validation: failed,
            dry_run: job.is_dry_run(),
            ..Default::default()
        };
        debug!(cx_id, job_id, total, failed, "upload validated");

        self.files
            .write_validation_files(cx_id, job_id, &partitioned)
            .await?;

        if partitioned.successful.is_empty() {
            warn!(cx_id, job_id, total, "no valid rows, marking job as failed");
            update_job_status(
                self.jobs.as_ref(),
                cx_id,
                job_id,
                JobUpdate::new(JobStatus::Failed).with_counts(total as u64, failed as u64),
                OnFailure::Raise,
            )
            .await?;
            return Ok(Prepared::Finished(outcome));
        }

        update_job_status(
            self.jobs.as_ref(),
            cx_id,
            job_id,
            JobUpdate::new(JobStatus::Processing).with_counts(total as u64, failed as u64),
            OnFailure::Raise,
        )
        .await?;

        Ok(Prepared::Dispatch {
            job,
            rows: partitioned.successful,
            outcome,
        })
    }

    /// Dispatches rows in sequential chunks. Rows within a chunk run
    /// concurrently and every row settles before the next chunk starts.
    async fn dispatch_all(&self, job: &ImportJob, rows: &[SuccessfulRow]) -> ChunkTally {
        let mut tally = ChunkTally::default();
        let chunk_size = self.throttle.chunk_size.max(1);

        for (index, chunk) in rows.chunks(chunk_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.throttle.chunk_delay).await;
            }
            let results = join_all(chunk.iter().map(|row| self.dispatch_row(job, row))).await;
            for result in results {
                let Err((err, recorded)) = result else {
                    continue;
                };
                tally.dispatch_failures += 1;
                if !recorded {
                    tally.record_write_failures += 1;
                }
                if tally.first_error.is_none() {
                    tally.first_error = Some(err.to_string());
                }
            }
        }

        tally
    }

    /// Stages and dispatches one row. On failure the row is recorded as failed;
    /// the returned flag says whether that record was written.
    async fn dispatch_row(&self, job: &ImportJob, row: &SuccessfulRow) -> Result<(), (DispatchError, bool)> {
        let err = match self.stage_and_dispatch(job, row).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        warn!(
            cx_id = %job.cx_id,
            job_id = %job.job_id,
            row_number = row.row_number,
            error = %err,
            "failed to dispatch row"
        );
        let record = PatientRecord::failed(
            row.row_csv.clone(),
            DISPATCH_FAILURE_REASON_FOR_CX,
            format!("{}. Cause: {}", DISPATCH_FAILURE_MESSAGE, err),
        );
        let recorded = match self
            .records
            .write(&job.cx_id, &job.job_id, row.row_number, &record)
            .await
        {
            Ok(()) => true,
            Err(write_err) => {
                error!(
                    cx_id = %job.cx_id,
                    job_id = %job.job_id,
                    row_number = row.row_number,
                    error = %write_err,
                    "failed to record dispatch failure"
                );
                false
            }
        };
        Err((err, recorded))
    }

    async fn stage_and_dispatch(&self, job: &ImportJob, row: &SuccessfulRow) -> Result<(), DispatchError> {
        let staged = StagedPatient {
            row_number: row.row_number,
            row_csv: row.row_csv.clone(),
            patient: row.patient.clone(),
        };
        self.records
            .stage_patient(&job.cx_id, &job.job_id, &staged)
            .await
            .map_err(|e| DispatchError::Enqueue {
                row_number: row.row_number,
                message: format!("failed to stage patient: {e}"),
            })?;

        self.dispatcher
            .process_patient_create(PatientCreateRequest {
                cx_id: job.cx_id.clone(),
                facility_id: job.facility_id.clone(),
                job_id: job.job_id.clone(),
                row_number: row.row_number,
                trigger_consolidated: job.params_ops.trigger_consolidated,
                disable_webhooks: job.params_ops.disable_webhooks,
                rerun_pd_on_new_demographics: job.params_ops.rerun_pd_on_new_demographics,
            })
            .await
    }
}
