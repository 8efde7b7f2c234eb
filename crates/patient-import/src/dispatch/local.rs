use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{PatientCreateDispatcher, PatientCreator};
use crate::error::DispatchError;
use crate::store::PatientRecordStore;
use crate::types::{DISPATCH_FAILURE_REASON_FOR_CX, PatientCreateRequest, PatientRecord};

/// The creation step for one row: load the staged patient, create it, record
/// the outcome.
///
/// A creation failure is recorded as a failed row and is not an error; only a
/// row that could not be loaded or recorded returns `Err`.
#[derive(Clone)]
pub struct PatientCreateProcessor {
    creator: Arc<dyn PatientCreator>,
    records: PatientRecordStore,
}

impl PatientCreateProcessor {
    pub fn new(creator: Arc<dyn PatientCreator>, records: PatientRecordStore) -> Self {
        Self { creator, records }
    }

    pub async fn process(&self, request: &PatientCreateRequest) -> Result<(), DispatchError> {
        let row_number = request.row_number;
        let staged = self
            .records
            .load_staged_patient(&request.cx_id, &request.job_id, row_number)
            .await
            .map_err(|e| DispatchError::Create {
                row_number,
                message: format!("failed to load staged patient: {e}"),
            })?;

        let record = match self.creator.create_patient(request, &staged.patient).await {
            Ok(patient_id) => {
                debug!(
                    cx_id = %request.cx_id,
                    job_id = %request.job_id,
                    row_number,
                    patient_id = %patient_id,
                    "patient created"
                );
                PatientRecord::success(staged.row_csv, patient_id)
            }
            Err(err) => {
                warn!(
                    cx_id = %request.cx_id,
                    job_id = %request.job_id,
                    row_number,
                    error = %err,
                    "patient creation failed"
                );
                PatientRecord::failed(staged.row_csv, DISPATCH_FAILURE_REASON_FOR_CX, err.to_string())
            }
        };

        self.records
            .write(&request.cx_id, &request.job_id, row_number, &record)
            .await
            .map_err(|e| DispatchError::Create {
                row_number,
                message: format!("failed to write patient record: {e}"),
            })
    }
}

/// Runs the creation step synchronously in process.
#[derive(Clone)]
pub struct LocalCreateDispatcher {
    processor: PatientCreateProcessor,
}

impl LocalCreateDispatcher {
    pub fn new(processor: PatientCreateProcessor) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl PatientCreateDispatcher for LocalCreateDispatcher {
    async fn process_patient_create(&self, request: PatientCreateRequest) -> Result<(), DispatchError> {
        self.processor.process(&request).await
    }
}
