//! Import job record and status state machine.

use serde::{Deserialize, Serialize};

use crate::error::JobStatusError;

/// Lifecycle status of an import job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    /// Job was created and is waiting for the parse stage.
    Pending,
    /// Rows are being validated and dispatched.
    Processing,
    /// Result file was written.
    Completed,
    /// Job failed at the job level.
    Failed,
}

impl JobStatus {
    /// Returns true if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if a job in this status may move to `next`.
    ///
    /// `processing -> processing` is allowed so that a stuck job can be
    /// re-parsed.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Processing | Self::Failed) => true,
            (Self::Processing, Self::Processing | Self::Completed | Self::Failed) => true,
            _ => false,
        }
    }
}

/// Checks a status change against the job state machine.
pub fn validate_new_status(current: JobStatus, next: JobStatus) -> Result<JobStatus, JobStatusError> {
    if current.can_transition_to(next) {
        Ok(next)
    } else {
        Err(JobStatusError::InvalidTransition {
            from: current,
            to: next,
        })
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" | "waiting" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" | "complete" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown job status: {}", s)),
        }
    }
}

/// Operation flags stored with the job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamsOps {
    /// Force a consolidated data run once patients are created.
    #[serde(default)]
    pub trigger_consolidated: bool,
    /// Suppress webhooks for this job.
    #[serde(default)]
    pub disable_webhooks: bool,
    /// Re-run patient discovery when demographics change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerun_pd_on_new_demographics: Option<bool>,
    /// Validate and report without creating patients.
    #[serde(default)]
    pub dry_run: bool,
}

/// The authoritative job record, owned by the job status service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub cx_id: String,
    #[serde(alias = "id")]
    pub job_id: String,
    pub facility_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub failed: Option<u64>,
    #[serde(default)]
    pub params_ops: ParamsOps,
    #[serde(default)]
    pub force_status_update: bool,
}

impl ImportJob {
    /// Returns true if the job only validates its input.
    pub fn is_dry_run(&self) -> bool {
        self.params_ops.dry_run
    }
}

/// Body of a job status update request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobUpdate {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_status_update: Option<bool>,
}

impl JobUpdate {
    /// Creates an update that only changes the status.
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            total: None,
            failed: None,
            force_status_update: None,
        }
    }

    /// Sets the total and failed row counts.
    pub fn with_counts(mut self, total: u64, failed: u64) -> Self {
        self.total = Some(total);
        self.failed = Some(failed);
        self
    }

    /// Asks the service to skip its "don't regress status" guard.
    pub fn with_force_status_update(mut self, force: bool) -> Self {
        self.force_status_update = force.then_some(true);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_strings() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            let parsed: JobStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_state_machine() {
        assert!(validate_new_status(JobStatus::Pending, JobStatus::Processing).is_ok());
        assert!(validate_new_status(JobStatus::Processing, JobStatus::Completed).is_ok());
        assert!(validate_new_status(JobStatus::Processing, JobStatus::Failed).is_ok());
        assert!(validate_new_status(JobStatus::Processing, JobStatus::Processing).is_ok());
        assert!(validate_new_status(JobStatus::Pending, JobStatus::Completed).is_err());
        assert!(validate_new_status(JobStatus::Completed, JobStatus::Processing).is_err());
        assert!(validate_new_status(JobStatus::Failed, JobStatus::Completed).is_err());
    }

    #[test]
    fn test_update_serializes_only_set_fields() {
        let body = serde_json::to_value(JobUpdate::new(JobStatus::Processing)).unwrap();
        assert_eq!(body, serde_json::json!({"status": "processing"}));

        let body = serde_json::to_value(
            JobUpdate::new(JobStatus::Failed)
                .with_counts(3, 3)
                .with_force_status_update(true),
        )
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"status": "failed", "total": 3, "failed": 3, "forceStatusUpdate": true})
        );
    }

    #[test]
    fn test_job_deserializes_with_defaults() {
        let job: ImportJob = serde_json::from_value(serde_json::json!({
            "cxId": "cx",
            "id": "job",
            "facilityId": "fac",
            "status": "processing",
            "paramsOps": {"dryRun": true}
        }))
        .unwrap();
        assert_eq!(job.job_id, "job");
        assert!(job.is_dry_run());
        assert!(!job.params_ops.disable_webhooks);
        assert_eq!(job.total, None);
    }
}
