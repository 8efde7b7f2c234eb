//! Stage requests exchanged between the pipeline stages.

use serde::{Deserialize, Serialize};

/// Request to create the patient for one validated row.
///
/// Serialized as the body of the create queue message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientCreateRequest {
    pub cx_id: String,
    pub facility_id: String,
    pub job_id: String,
    pub row_number: u32,
    pub trigger_consolidated: bool,
    pub disable_webhooks: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerun_pd_on_new_demographics: Option<bool>,
}

/// Request to run the parse stage for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseRequest {
    pub cx_id: String,
    pub job_id: String,
    #[serde(default)]
    pub force_status_update: bool,
}

impl ParseRequest {
    pub fn new(cx_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            cx_id: cx_id.into(),
            job_id: job_id.into(),
            force_status_update: false,
        }
    }

    pub fn with_force_status_update(mut self, force: bool) -> Self {
        self.force_status_update = force;
        self
    }
}

/// Request to run the result stage for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRequest {
    pub cx_id: String,
    pub job_id: String,
}

impl ResultRequest {
    pub fn new(cx_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            cx_id: cx_id.into(),
            job_id: job_id.into(),
        }
    }
}
