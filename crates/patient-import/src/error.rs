//! Error types for the patient import pipeline.
//!
//! Errors are grouped by the collaborator that produced them: CSV input, the
//! job status service, row dispatch, the object store and the message queue.
//! Row-level validation problems are never errors; they are reported as
//! [`ParsedPatient::Error`](crate::validation::ParsedPatient::Error) entries.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::types::JobStatus;

/// The primary error type for all pipeline operations.
#[derive(Error, Debug)]
pub enum ImportError {
    /// CSV input errors
    #[error(transparent)]
    Csv(#[from] CsvError),

    /// Job status service errors
    #[error(transparent)]
    JobStatus(#[from] JobStatusError),

    /// Row dispatch errors
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Object store errors
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Message queue errors
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Hard failures while reading the uploaded CSV.
#[derive(Error, Debug)]
pub enum CsvError {
    #[error("failed to read CSV: {message}")]
    Read { message: String },

    #[error("CSV has more rows than max ({max})")]
    TooManyRows { max: usize },

    #[error("CSV has no header row")]
    MissingHeader,

    #[error("failed to write CSV: {message}")]
    Write { message: String },

    #[error("invalid address pattern: {message}")]
    Pattern { message: String },
}

/// Errors raised while talking to the job status service.
#[derive(Error, Debug)]
pub enum JobStatusError {
    #[error("job status request failed for job {job_id} (cx {cx_id}) at {url}: {message}")]
    Request {
        cx_id: String,
        job_id: String,
        url: String,
        message: String,
    },

    #[error("job status service returned {status} for job {job_id} (cx {cx_id}) at {url}: {body}")]
    UnexpectedStatus {
        cx_id: String,
        job_id: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("invalid job response for job {job_id} (cx {cx_id}) at {url}: {message}")]
    InvalidResponse {
        cx_id: String,
        job_id: String,
        url: String,
        message: String,
    },

    #[error("invalid job status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

/// Errors raised while handing a row to the patient creation collaborator.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("failed to send row {row_number} to patient create queue: {message}")]
    Enqueue { row_number: u32, message: String },

    #[error("patient creation failed for row {row_number}: {message}")]
    Create { row_number: u32, message: String },

    #[error("failed to serialize create request for row {row_number}: {message}")]
    Serialization { row_number: u32, message: String },
}

/// Object store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("object store request failed for {key}: {message}")]
    Request { key: String, message: String },

    #[error("object store throttled request for {key}: {message}")]
    Throttled { key: String, message: String },

    #[error("object store unavailable: {message}")]
    Unavailable { message: String },

    #[error("serialization error: {message}")]
    Serialization { message: String },
}

/// Message queue errors.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("failed to send message to {queue_url}: {message}")]
    Send { queue_url: String, message: String },

    #[error("failed to receive messages from {queue_url}: {message}")]
    Receive { queue_url: String, message: String },

    #[error("failed to delete message from {queue_url}: {message}")]
    Delete { queue_url: String, message: String },

    #[error("invalid message body on {queue_url}: {message}")]
    InvalidBody { queue_url: String, message: String },
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting: {name}")]
    Missing { name: String },

    #[error("invalid setting {name}: {message}")]
    Invalid { name: String, message: String },
}

/// Result type alias for pipeline operations.
pub type ImportResult<T> = Result<T, ImportError>;

impl ImportError {
    /// Returns true if the error means the requested object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ImportError::Store(StoreError::NotFound { .. }))
    }
}
