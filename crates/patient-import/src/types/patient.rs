//! Patient demographics produced by CSV validation.

use serde::{Deserialize, Serialize};

/// Gender at birth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "O")]
    Other,
    #[serde(rename = "U")]
    Unknown,
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Male => write!(f, "M"),
            Self::Female => write!(f, "F"),
            Self::Other => write!(f, "O"),
            Self::Unknown => write!(f, "U"),
        }
    }
}

/// A US postal address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub address_line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    pub city: String,
    /// Two-letter state code.
    pub state: String,
    pub zip: String,
    pub country: String,
}

/// A phone number and/or email address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Government issued identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PersonalIdentifier {
    Ssn { value: String },
    #[serde(rename_all = "camelCase")]
    DriversLicense { value: String, state: String },
}

/// Normalized demographics for one CSV row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    /// Date of birth as `YYYY-MM-DD`.
    pub dob: String,
    pub gender_at_birth: Gender,
    pub address: Vec<Address>,
    #[serde(default)]
    pub contact: Vec<Contact>,
    #[serde(default)]
    pub personal_identifiers: Vec<PersonalIdentifier>,
}

/// A validated row staged in the object store for the creation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedPatient {
    pub row_number: u32,
    pub row_csv: String,
    pub patient: PatientPayload,
}
