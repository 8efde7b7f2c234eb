//! Core types shared by every pipeline stage.

mod job;
mod patient;
mod record;
mod request;

pub use job::{ImportJob, JobStatus, JobUpdate, ParamsOps, validate_new_status};
pub use patient::{Address, Contact, Gender, PatientPayload, PersonalIdentifier, StagedPatient};
pub use record::{
    DISPATCH_FAILURE_MESSAGE, DISPATCH_FAILURE_REASON_FOR_CX, PatientRecord, RESULT_CSV_HEADER,
    RecordStatus, ResultEntry,
};
pub use request::{ParseRequest, PatientCreateRequest, ResultRequest};
