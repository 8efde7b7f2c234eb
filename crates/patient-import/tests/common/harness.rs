//! Mock collaborators and a pipeline wired over them.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use patient_import::dispatch::{PatientCreateDispatcher, PatientCreator};
use patient_import::error::{DispatchError, ImportResult, JobStatusError};
use patient_import::job::JobStatusClient;
use patient_import::store::{ImportFileStore, ImportKeyspace, InMemoryClient, PatientRecordStore};
use patient_import::types::{
    ImportJob, JobStatus, JobUpdate, PatientCreateRequest, PatientPayload, PatientRecord,
    ResultRequest,
};
use patient_import::validation::CsvValidator;
use patient_import::{ParseOrchestrator, ResultHandler, ResultOrchestrator, ResultSettings, ThrottleSettings};
use tokio::time::Instant;

use super::fixtures::{BUCKET, CX_ID, JOB_ID, pending_job};

/// Job status service double that applies updates and records them.
#[derive(Clone)]
pub struct MockJobClient {
    state: Arc<Mutex<JobState>>,
}

struct JobState {
    job: ImportJob,
    updates: Vec<JobUpdate>,
    fail_gets: bool,
}

impl MockJobClient {
    pub fn new(job: ImportJob) -> Self {
        Self {
            state: Arc::new(Mutex::new(JobState {
                job,
                updates: Vec::new(),
                fail_gets: false,
            })),
        }
    }

    pub fn set_fail_gets(&self, fail: bool) {
        self.state.lock().unwrap().fail_gets = fail;
    }

    pub fn job(&self) -> ImportJob {
        self.state.lock().unwrap().job.clone()
    }

    pub fn updates(&self) -> Vec<JobUpdate> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn statuses(&self) -> Vec<JobStatus> {
        self.updates().iter().map(|u| u.status).collect()
    }
}

#[async_trait]
impl JobStatusClient for MockJobClient {
    async fn get_job(&self, cx_id: &str, job_id: &str) -> Result<ImportJob, JobStatusError> {
        let state = self.state.lock().unwrap();
        if state.fail_gets {
            return Err(JobStatusError::UnexpectedStatus {
                cx_id: cx_id.to_string(),
                job_id: job_id.to_string(),
                url: "mock".to_string(),
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(state.job.clone())
    }

    async fn update_job(
        &self,
        _cx_id: &str,
        _job_id: &str,
        update: &JobUpdate,
    ) -> Result<ImportJob, JobStatusError> {
        let mut state = self.state.lock().unwrap();
        state.updates.push(update.clone());
        state.job.status = update.status;
        if update.total.is_some() {
            state.job.total = update.total;
            state.job.failed = update.failed;
        }
        Ok(state.job.clone())
    }
}

/// One observed dispatch.
#[derive(Debug, Clone)]
pub struct DispatchCall {
    pub row_number: u32,
    pub started: Instant,
}

/// Dispatcher double that creates patients by writing success records.
///
/// Each call takes `work` to settle. Rows in `failing_rows` fail.
pub struct RecordingDispatcher {
    records: PatientRecordStore,
    failing_rows: HashSet<u32>,
    work: Duration,
    calls: Mutex<Vec<DispatchCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingDispatcher {
    pub fn new(records: PatientRecordStore, failing_rows: HashSet<u32>, work: Duration) -> Self {
        Self {
            records,
            failing_rows,
            work,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> Vec<DispatchCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PatientCreateDispatcher for RecordingDispatcher {
    async fn process_patient_create(&self, request: PatientCreateRequest) -> Result<(), DispatchError> {
        self.calls.lock().unwrap().push(DispatchCall {
            row_number: request.row_number,
            started: Instant::now(),
        });
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.work).await;
        let result = if self.failing_rows.contains(&request.row_number) {
            Err(DispatchError::Enqueue {
                row_number: request.row_number,
                message: "queue unavailable".to_string(),
            })
        } else {
            let staged = self
                .records
                .load_staged_patient(&request.cx_id, &request.job_id, request.row_number)
                .await
                .map_err(|e| DispatchError::Create {
                    row_number: request.row_number,
                    message: e.to_string(),
                })?;
            self.records
                .write(
                    &request.cx_id,
                    &request.job_id,
                    request.row_number,
                    &PatientRecord::success(staged.row_csv, format!("patient-{}", request.row_number)),
                )
                .await
                .map_err(|e| DispatchError::Create {
                    row_number: request.row_number,
                    message: e.to_string(),
                })
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Result handler that counts calls and runs the result stage in process.
pub struct CountingResultHandler {
    orchestrator: Arc<ResultOrchestrator>,
    calls: AtomicUsize,
}

impl CountingResultHandler {
    pub fn new(orchestrator: Arc<ResultOrchestrator>) -> Self {
        Self {
            orchestrator,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResultHandler for CountingResultHandler {
    async fn process_job_result(&self, request: ResultRequest) -> ImportResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.orchestrator.run(&request).await.map(|_| ())
    }
}

/// Patient creator double returning `patient-{row}` or failing for chosen rows.
#[derive(Default)]
pub struct MockCreator {
    pub failing_rows: HashSet<u32>,
    created: Mutex<Vec<PatientPayload>>,
}

impl MockCreator {
    pub fn failing(rows: impl IntoIterator<Item = u32>) -> Self {
        Self {
            failing_rows: rows.into_iter().collect(),
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn created(&self) -> Vec<PatientPayload> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl PatientCreator for MockCreator {
    async fn create_patient(
        &self,
        request: &PatientCreateRequest,
        patient: &PatientPayload,
    ) -> Result<String, DispatchError> {
        if self.failing_rows.contains(&request.row_number) {
            return Err(DispatchError::Create {
                row_number: request.row_number,
                message: "patient service rejected the request".to_string(),
            });
        }
        self.created.lock().unwrap().push(patient.clone());
        Ok(format!("patient-{}", request.row_number))
    }
}

/// Options for [`Harness::build`].
#[derive(Clone)]
pub struct HarnessOptions {
    pub job: ImportJob,
    pub failing_rows: HashSet<u32>,
    pub dispatch_work: Duration,
    pub throttle: ThrottleSettings,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            job: pending_job(),
            failing_rows: HashSet::new(),
            dispatch_work: Duration::from_millis(5),
            throttle: ThrottleSettings::default(),
        }
    }
}

/// Parse and result orchestrators over in-memory collaborators.
pub struct Harness {
    pub objects: InMemoryClient,
    pub jobs: MockJobClient,
    pub files: ImportFileStore,
    pub records: PatientRecordStore,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub result: Arc<CountingResultHandler>,
    pub result_orchestrator: Arc<ResultOrchestrator>,
    pub parse: ParseOrchestrator,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(HarnessOptions::default())
    }

    pub fn build(options: HarnessOptions) -> Self {
        let objects = InMemoryClient::new();
        let jobs = MockJobClient::new(options.job);
        let files = ImportFileStore::new(Arc::new(objects.clone()), BUCKET, ImportKeyspace::default());
        let records =
            PatientRecordStore::new(Arc::new(objects.clone()), BUCKET, ImportKeyspace::default());

        let dispatcher = Arc::new(RecordingDispatcher::new(
            records.clone(),
            options.failing_rows,
            options.dispatch_work,
        ));
        let result_orchestrator = Arc::new(ResultOrchestrator::new(
            Arc::new(jobs.clone()),
            files.clone(),
            records.clone(),
            ResultSettings::default(),
        ));
        let result = Arc::new(CountingResultHandler::new(result_orchestrator.clone()));
        let parse = ParseOrchestrator::new(
            Arc::new(jobs.clone()),
            files.clone(),
            records.clone(),
            dispatcher.clone(),
            result.clone(),
            CsvValidator::new(1_000).unwrap(),
            options.throttle,
        );

        Self {
            objects,
            jobs,
            files,
            records,
            dispatcher,
            result,
            result_orchestrator,
            parse,
        }
    }

    pub async fn upload(&self, contents: &str) {
        self.files
            .write_raw_csv(CX_ID, JOB_ID, contents.as_bytes().to_vec())
            .await
            .unwrap();
    }

    /// Parses the result file into its data lines, header excluded.
    pub async fn result_lines(&self) -> Vec<csv::StringRecord> {
        let contents = self.files.read_result_file(CX_ID, JOB_ID).await.unwrap();
        csv::Reader::from_reader(contents.as_bytes())
            .records()
            .collect::<Result<_, _>>()
            .unwrap()
    }
}
