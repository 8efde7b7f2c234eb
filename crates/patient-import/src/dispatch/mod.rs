//! Handing validated rows to the patient creation collaborator.
//!
//! [`PatientCreateDispatcher`] has two implementations: [`LocalCreateDispatcher`]
//! runs the creation step in process, [`CloudCreateDispatcher`] enqueues the
//! request on the FIFO create queue for [`PatientCreateProcessor`] to pick up in
//! a worker.

mod cloud;
mod creator;
mod local;

use async_trait::async_trait;

pub use cloud::{CloudCreateDispatcher, deduplication_id};
pub use creator::{HttpPatientCreator, PatientCreator};
pub use local::{LocalCreateDispatcher, PatientCreateProcessor};

use crate::error::DispatchError;
use crate::types::PatientCreateRequest;

/// Hands one row to the creation collaborator.
///
/// `Ok` means creation will run (or already ran) for the row; `Err` means the
/// caller must record the row as failed.
#[async_trait]
pub trait PatientCreateDispatcher: Send + Sync {
    async fn process_patient_create(&self, request: PatientCreateRequest) -> Result<(), DispatchError>;
}
