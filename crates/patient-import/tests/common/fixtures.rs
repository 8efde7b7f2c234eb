//! CSV and job fixtures.

use patient_import::types::{ImportJob, JobStatus, ParamsOps};

pub const CX_ID: &str = "cx-1";
pub const JOB_ID: &str = "job-1";
pub const FACILITY_ID: &str = "facility-1";
pub const BUCKET: &str = "test-bucket";

pub const HEADER: &str = "id,firstName,lastName,dob,gender,addressLine1,city,state,zip,phone";

/// A row that passes validation.
pub fn valid_row(n: usize) -> String {
    format!(
        "ext-{n},Patient{n},Tester,1980-01-{:02},F,{} Main St,Boston,MA,02110,617555{:04}",
        (n % 28) + 1,
        n + 1,
        n
    )
}

/// A row missing its first name.
pub fn invalid_row(n: usize) -> String {
    format!("ext-bad-{n},,Tester,1980-01-01,F,1 Main St,Boston,MA,02110,")
}

/// Header plus `valid` valid rows followed by `invalid` invalid rows.
pub fn csv_with(valid: usize, invalid: usize) -> String {
    let mut lines = vec![HEADER.to_string()];
    lines.extend((1..=valid).map(valid_row));
    lines.extend((1..=invalid).map(invalid_row));
    lines.join("\n")
}

pub fn pending_job() -> ImportJob {
    ImportJob {
        cx_id: CX_ID.to_string(),
        job_id: JOB_ID.to_string(),
        facility_id: FACILITY_ID.to_string(),
        status: JobStatus::Pending,
        total: None,
        failed: None,
        params_ops: ParamsOps::default(),
        force_status_update: false,
    }
}

pub fn dry_run_job() -> ImportJob {
    let mut job = pending_job();
    job.params_ops.dry_run = true;
    job
}
