//! Durable per-row outcomes and the result file projection.

use serde::{Deserialize, Serialize};

/// Customer-facing reason written when a row could not be handed off.
pub const DISPATCH_FAILURE_REASON_FOR_CX: &str = "Internal error";

/// Prefix of the developer-facing reason written when a row could not be handed off.
pub const DISPATCH_FAILURE_MESSAGE: &str = "Failure while sending payload to patient create queue";

/// Header of the result file.
pub const RESULT_CSV_HEADER: [&str; 6] = [
    "rowNumber",
    "rowCsv",
    "status",
    "patientId",
    "reasonForCx",
    "reasonForDev",
];

/// Outcome of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordStatus {
    Success,
    Failed,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// The durable outcome of one row, one per `(cxId, jobId, rowNumber)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    pub row_csv: String,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_for_cx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_for_dev: Option<String>,
}

impl PatientRecord {
    /// A row whose patient was created.
    pub fn success(row_csv: impl Into<String>, patient_id: impl Into<String>) -> Self {
        Self {
            row_csv: row_csv.into(),
            status: RecordStatus::Success,
            patient_id: Some(patient_id.into()),
            reason_for_cx: None,
            reason_for_dev: None,
        }
    }

    /// A row that failed, with a customer-safe reason and an internal diagnostic.
    pub fn failed(
        row_csv: impl Into<String>,
        reason_for_cx: impl Into<String>,
        reason_for_dev: impl Into<String>,
    ) -> Self {
        Self {
            row_csv: row_csv.into(),
            status: RecordStatus::Failed,
            patient_id: None,
            reason_for_cx: Some(reason_for_cx.into()),
            reason_for_dev: Some(reason_for_dev.into()),
        }
    }
}

/// One line of the result file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEntry {
    pub row_number: u32,
    pub row_csv: String,
    pub status: RecordStatus,
    pub patient_id: Option<String>,
    pub reason_for_cx: Option<String>,
    pub reason_for_dev: Option<String>,
}

impl ResultEntry {
    /// Projects a stored record.
    pub fn from_record(row_number: u32, record: PatientRecord) -> Self {
        Self {
            row_number,
            row_csv: record.row_csv,
            status: record.status,
            patient_id: record.patient_id,
            reason_for_cx: record.reason_for_cx,
            reason_for_dev: record.reason_for_dev,
        }
    }

    /// Cells in [`RESULT_CSV_HEADER`] order.
    pub fn to_row(&self) -> [String; 6] {
        [
            self.row_number.to_string(),
            self.row_csv.clone(),
            self.status.to_string(),
            self.patient_id.clone().unwrap_or_default(),
            self.reason_for_cx.clone().unwrap_or_default(),
            self.reason_for_dev.clone().unwrap_or_default(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_record_serialization() {
        let record = PatientRecord::failed("a,b", "Internal error", "boom");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "rowCsv": "a,b",
                "status": "failed",
                "reasonForCx": "Internal error",
                "reasonForDev": "boom"
            })
        );
    }

    #[test]
    fn test_entry_row_leaves_unset_fields_blank() {
        let entry = ResultEntry::from_record(4, PatientRecord::success("x,y", "p-1"));
        assert_eq!(
            entry.to_row(),
            [
                "4".to_string(),
                "x,y".to_string(),
                "success".to_string(),
                "p-1".to_string(),
                String::new(),
                String::new()
            ]
        );
    }
}
