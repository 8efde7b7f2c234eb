use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::client::{ObjectClient, ObjectClientError};
use super::keyspace::{ImportKeyspace, row_number_from_record_key};
use crate::error::{ImportResult, StoreError};
use crate::types::{PatientRecord, ResultEntry, StagedPatient};
use crate::validation::PartitionedRows;

const LIST_PAGE_SIZE: i32 = 1000;
const JSON_CONTENT_TYPE: &str = "application/json";
const CSV_CONTENT_TYPE: &str = "text/csv";

fn store_error(key: &str, err: ObjectClientError) -> StoreError {
    match err {
        ObjectClientError::NotFound => StoreError::NotFound {
            key: key.to_string(),
        },
        ObjectClientError::Throttled(message) => StoreError::Throttled {
            key: key.to_string(),
            message,
        },
        ObjectClientError::Unavailable(message) => StoreError::Unavailable { message },
        ObjectClientError::InvalidInput(message) | ObjectClientError::Internal(message) => {
            StoreError::Request {
                key: key.to_string(),
                message,
            }
        }
    }
}

/// A bucket plus the keyspace used to address job objects inside it.
#[derive(Clone)]
struct Location {
    client: Arc<dyn ObjectClient>,
    bucket: String,
    keyspace: ImportKeyspace,
}

impl Location {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.client
            .get_object(&self.bucket, key)
            .await
            .map_err(|e| store_error(key, e))?
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        self.client
            .put_object(&self.bucket, key, body, Some(content_type))
            .await
            .map_err(|e| store_error(key, e))
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T, StoreError> {
        let bytes = self.get(key).await?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
            message: format!("{key}: {e}"),
        })
    }

    async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let body = serde_json::to_vec(value).map_err(|e| StoreError::Serialization {
            message: format!("{key}: {e}"),
        })?;
        self.put(key, body, JSON_CONTENT_TYPE).await
    }
}

/// Durable per-row outcome records, one object per `(cx_id, job_id, row_number)`.
#[derive(Clone)]
pub struct PatientRecordStore {
    location: Location,
}

impl PatientRecordStore {
    pub fn new(client: Arc<dyn ObjectClient>, bucket: impl Into<String>, keyspace: ImportKeyspace) -> Self {
        Self {
            location: Location {
                client,
                bucket: bucket.into(),
                keyspace,
            },
        }
    }

    /// Writes the record for a row, overwriting any previous one.
    pub async fn write(
        &self,
        cx_id: &str,
        job_id: &str,
        row_number: u32,
        record: &PatientRecord,
    ) -> Result<(), StoreError> {
        let key = self.location.keyspace.record_key(cx_id, job_id, row_number);
        self.location.put_json(&key, record).await
    }

    /// Lists every record key of a job, following continuation tokens.
    pub async fn list_keys(&self, cx_id: &str, job_id: &str) -> Result<Vec<String>, StoreError> {
        let prefix = self.location.keyspace.records_prefix(cx_id, job_id);
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .location
                .client
                .list_objects(
                    &self.location.bucket,
                    &prefix,
                    continuation.as_deref(),
                    Some(LIST_PAGE_SIZE),
                )
                .await
                .map_err(|e| store_error(&prefix, e))?;
            keys.extend(page.keys);
            match page.next_continuation_token {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        debug!(cx_id, job_id, count = keys.len(), "listed patient records");
        Ok(keys)
    }

    pub async fn read(&self, key: &str) -> Result<PatientRecord, StoreError> {
        self.location.get_json(key).await
    }

    /// Loads every record of a job with at most `concurrency` reads in flight,
    /// returned in row order.
    pub async fn load_all(
        &self,
        cx_id: &str,
        job_id: &str,
        concurrency: usize,
    ) -> Result<Vec<ResultEntry>, StoreError> {
        let keys = self.list_keys(cx_id, job_id).await?;
        let rows: Vec<(u32, String)> = keys
            .into_iter()
            .filter_map(|key| match row_number_from_record_key(&key) {
                Some(row_number) => Some((row_number, key)),
                None => {
                    warn!(cx_id, job_id, key = %key, "skipping object that is not a patient record");
                    None
                }
            })
            .collect();

        let mut entries: Vec<ResultEntry> = stream::iter(rows)
            .map(|(row_number, key)| async move {
                let record = self.read(&key).await?;
                Ok::<_, StoreError>(ResultEntry::from_record(row_number, record))
            })
            .buffer_unordered(concurrency.max(1))
            .try_collect()
            .await?;

        entries.sort_by_key(|entry| entry.row_number);
        Ok(entries)
    }

    /// Stores the validated payload of a row for the creation step to pick up.
    pub async fn stage_patient(
        &self,
        cx_id: &str,
        job_id: &str,
        staged: &StagedPatient,
    ) -> Result<(), StoreError> {
        let key = self
            .location
            .keyspace
            .staged_patient_key(cx_id, job_id, staged.row_number);
        self.location.put_json(&key, staged).await
    }

    pub async fn load_staged_patient(
        &self,
        cx_id: &str,
        job_id: &str,
        row_number: u32,
    ) -> Result<StagedPatient, StoreError> {
        let key = self
            .location
            .keyspace
            .staged_patient_key(cx_id, job_id, row_number);
        self.location.get_json(&key).await
    }
}

/// Job-scoped files: the raw upload, validation files and the result file.
#[derive(Clone)]
pub struct ImportFileStore {
    location: Location,
}

impl ImportFileStore {
    pub fn new(client: Arc<dyn ObjectClient>, bucket: impl Into<String>, keyspace: ImportKeyspace) -> Self {
        Self {
            location: Location {
                client,
                bucket: bucket.into(),
                keyspace,
            },
        }
    }

    pub fn bucket(&self) -> &str {
        &self.location.bucket
    }

    pub fn keyspace(&self) -> &ImportKeyspace {
        &self.location.keyspace
    }

    pub async fn read_raw_csv(&self, cx_id: &str, job_id: &str) -> Result<String, StoreError> {
        let key = self.location.keyspace.raw_upload_key(cx_id, job_id);
        let bytes = self.location.get(&key).await?;
        String::from_utf8(bytes).map_err(|e| StoreError::Serialization {
            message: format!("{key}: {e}"),
        })
    }

    pub async fn write_raw_csv(
        &self,
        cx_id: &str,
        job_id: &str,
        contents: impl Into<Vec<u8>>,
    ) -> Result<(), StoreError> {
        let key = self.location.keyspace.raw_upload_key(cx_id, job_id);
        self.location.put(&key, contents.into(), CSV_CONTENT_TYPE).await
    }

    /// Writes `valid.csv` and `invalid.csv`, each only when it has rows.
    pub async fn write_validation_files(
        &self,
        cx_id: &str,
        job_id: &str,
        rows: &PartitionedRows,
    ) -> ImportResult<()> {
        if let Some(contents) = rows.valid_rows_file()? {
            let key = self.location.keyspace.valid_rows_key(cx_id, job_id);
            self.location
                .put(&key, contents.into_bytes(), CSV_CONTENT_TYPE)
                .await?;
        }
        if let Some(contents) = rows.invalid_rows_file()? {
            let key = self.location.keyspace.invalid_rows_key(cx_id, job_id);
            self.location
                .put(&key, contents.into_bytes(), CSV_CONTENT_TYPE)
                .await?;
        }
        Ok(())
    }

    /// Writes the result file and returns its key.
    pub async fn write_result_file(
        &self,
        cx_id: &str,
        job_id: &str,
        contents: String,
    ) -> Result<String, StoreError> {
        let key = self.location.keyspace.result_key(cx_id, job_id);
        self.location
            .put(&key, contents.into_bytes(), CSV_CONTENT_TYPE)
            .await?;
        Ok(key)
    }

    pub async fn read_result_file(&self, cx_id: &str, job_id: &str) -> Result<String, StoreError> {
        let key = self.location.keyspace.result_key(cx_id, job_id);
        let bytes = self.location.get(&key).await?;
        String::from_utf8(bytes).map_err(|e| StoreError::Serialization {
            message: format!("{key}: {e}"),
        })
    }
}
