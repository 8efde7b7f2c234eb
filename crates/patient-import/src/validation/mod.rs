//! CSV validation and parsing.
//!
//! [`CsvValidator::validate_and_parse`] turns raw CSV text into one
//! [`ParsedPatient`] per data row, in file order. Row-level problems never fail
//! the call: they become [`ParsedPatient::Error`] entries that keep the raw
//! columns and a `"; "`-joined list of reasons. Only unreadable input, a
//! missing header or more rows than the configured maximum are hard errors.
//!
//! # Recognized columns
//!
//! Header names are matched after [`normalize::normalize_header`], so
//! `First Name`, `first_name` and `firstName` are equivalent.
//!
//! | Column | Notes |
//! |--------|-------|
//! | `id` / `externalId` | optional, `id` wins when both are set |
//! | `firstName`, `lastName` | required |
//! | `dob` | required, several date formats accepted |
//! | `gender` | required, `M`/`F`/`O`/`U` or spelled out |
//! | `addressLine1`, `addressLine2`, `city`, `state`, `zip` | at least one complete block; numbered `-1`..`-10` |
//! | `phone`, `email` | optional; numbered `-1`..`-10` |
//! | `ssn` | optional |
//! | `driversLicenceNo`, `driversLicenceState` | optional, both required |

mod address;
mod contact;
pub mod normalize;

use std::collections::HashMap;

use chrono::NaiveDate;

pub use address::{AddressNormalizer, MAX_INDEXED_BLOCKS};
pub use contact::map_contacts;

use crate::error::CsvError;
use crate::types::{PatientPayload, PersonalIdentifier};
use normalize::{
    normalize_date, normalize_external_id, normalize_gender, normalize_header, normalize_name,
    normalize_ssn, normalize_us_state,
};

/// Default maximum number of data rows accepted in one upload.
pub const MAX_NUMBER_ROWS: usize = 100_000;

/// Name of the extra column appended to the invalid rows file.
pub const INVALID_ROWS_ERROR_COLUMN: &str = "error";

/// A problem with one field of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub error: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            error: error.into(),
        }
    }
}

/// The outcome of validating one CSV row.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPatient {
    Success {
        row_number: u32,
        row_columns: Vec<String>,
        row_csv: String,
        parsed: PatientPayload,
    },
    Error {
        row_number: u32,
        row_columns: Vec<String>,
        row_csv: String,
        error: String,
    },
}

impl ParsedPatient {
    /// 1-based data row number (the header is not counted).
    pub fn row_number(&self) -> u32 {
        match self {
            Self::Success { row_number, .. } | Self::Error { row_number, .. } => *row_number,
        }
    }

    pub fn row_columns(&self) -> &[String] {
        match self {
            Self::Success { row_columns, .. } | Self::Error { row_columns, .. } => row_columns,
        }
    }

    /// The row text as uploaded, without its line terminator.
    pub fn row_csv(&self) -> &str {
        match self {
            Self::Success { row_csv, .. } | Self::Error { row_csv, .. } => row_csv,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// A row that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessfulRow {
    pub row_number: u32,
    pub row_columns: Vec<String>,
    /// The row text as uploaded.
    pub row_csv: String,
    pub patient: PatientPayload,
}

/// A row that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRow {
    pub row_number: u32,
    pub row_columns: Vec<String>,
    pub row_csv: String,
    pub error: String,
}

/// Every row of an upload, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCsv {
    /// The header line as uploaded.
    pub header_line: String,
    /// Header names as uploaded.
    pub headers: Vec<String>,
    pub rows: Vec<ParsedPatient>,
}

/// Rows of an upload split by validation outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionedRows {
    pub headers: Vec<String>,
    pub successful: Vec<SuccessfulRow>,
    pub failed: Vec<FailedRow>,
}

impl PartitionedRows {
    pub fn total(&self) -> usize {
        self.successful.len() + self.failed.len()
    }

    /// Header plus the raw valid rows, or `None` when there are none.
    pub fn valid_rows_file(&self) -> Result<Option<String>, CsvError> {
        if self.successful.is_empty() {
            return Ok(None);
        }
        let rows = self.successful.iter().map(|row| row.row_columns.clone());
        to_csv_string(&self.headers, rows).map(Some)
    }

    /// Header plus an `error` column, with the raw invalid rows and their reasons.
    ///
    /// Commas in the reason are replaced with `;`.
    pub fn invalid_rows_file(&self) -> Result<Option<String>, CsvError> {
        if self.failed.is_empty() {
            return Ok(None);
        }
        let mut headers = self.headers.clone();
        headers.push(INVALID_ROWS_ERROR_COLUMN.to_string());
        let rows = self.failed.iter().map(|row| {
            let mut columns = row.row_columns.clone();
            columns.push(row.error.replace(',', ";"));
            columns
        });
        to_csv_string(&headers, rows).map(Some)
    }
}

impl ParsedCsv {
    pub fn successful_count(&self) -> usize {
        self.rows.iter().filter(|row| row.is_success()).count()
    }

    /// Splits rows into successful and failed, keeping file order within each.
    pub fn partition(self) -> PartitionedRows {
        let mut successful = Vec::new();
        let mut failed = Vec::new();
        for row in self.rows {
            match row {
                ParsedPatient::Success {
                    row_number,
                    row_columns,
                    row_csv,
                    parsed,
                } => successful.push(SuccessfulRow {
                    row_number,
                    row_columns,
                    row_csv,
                    patient: parsed,
                }),
                ParsedPatient::Error {
                    row_number,
                    row_columns,
                    row_csv,
                    error,
                } => failed.push(FailedRow {
                    row_number,
                    row_columns,
                    row_csv,
                    error,
                }),
            }
        }
        PartitionedRows {
            headers: self.headers,
            successful,
            failed,
        }
    }
}

/// Validates and parses patient import CSV files.
#[derive(Debug, Clone)]
pub struct CsvValidator {
    addresses: AddressNormalizer,
    max_rows: usize,
    today: Option<NaiveDate>,
}

impl CsvValidator {
    pub fn new(max_rows: usize) -> Result<Self, CsvError> {
        let addresses = AddressNormalizer::new().map_err(|e| CsvError::Pattern {
            message: e.to_string(),
        })?;
        Ok(Self {
            addresses,
            max_rows,
            today: None,
        })
    }

    /// Pins the date used to reject future dates of birth.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Parses every data row of `contents`.
    pub fn validate_and_parse(&self, contents: &str) -> Result<ParsedCsv, CsvError> {
        let today = self
            .today
            .unwrap_or_else(|| chrono::Utc::now().date_naive());

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(contents.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(read_error)?
            .iter()
            .map(str::to_string)
            .collect();
        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(CsvError::MissingHeader);
        }
        let keys: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let header_line = source_text(contents, 0, reader.position().byte())
            .map(|line| line.trim_start_matches('\u{feff}').to_string())
            .map_or_else(|| render_row(&headers), Ok)?;

        let mut rows = Vec::new();
        let mut record = csv::StringRecord::new();
        let mut index = 0usize;
        loop {
            let start = reader.position().byte();
            let read = match reader.read_record(&mut record) {
                Ok(false) => break,
                Ok(true) => Ok(()),
                Err(err) if matches!(err.kind(), csv::ErrorKind::Io(_)) => {
                    return Err(read_error(err));
                }
                Err(err) => Err(err),
            };
            let end = reader.position().byte();
            if index >= self.max_rows {
                return Err(CsvError::TooManyRows { max: self.max_rows });
            }
            index += 1;
            let row_number = index as u32;
            if let Err(err) = read {
                rows.push(ParsedPatient::Error {
                    row_number,
                    row_columns: Vec::new(),
                    row_csv: source_text(contents, start, end)
                        .unwrap_or_default()
                        .to_string(),
                    error: format!("Malformed row: {err}"),
                });
                continue;
            }

            let row_columns: Vec<String> = record.iter().map(str::to_string).collect();
            let start = record.position().map_or(start, |p| p.byte());
            let row_csv = match source_text(contents, start, end) {
                Some(text) => text.to_string(),
                None => render_row(&row_columns)?,
            };
            let fields: HashMap<String, String> = keys
                .iter()
                .cloned()
                .zip(row_columns.iter().cloned())
                .collect();

            rows.push(match self.map_row(&fields, today) {
                Ok(parsed) => ParsedPatient::Success {
                    row_number,
                    row_columns,
                    row_csv,
                    parsed,
                },
                Err(errors) => ParsedPatient::Error {
                    row_number,
                    row_columns,
                    row_csv,
                    error: errors
                        .iter()
                        .map(|e| e.error.as_str())
                        .collect::<Vec<_>>()
                        .join("; "),
                },
            });
        }

        Ok(ParsedCsv {
            header_line,
            headers,
            rows,
        })
    }

    /// Maps one row keyed by normalized header names.
    pub fn map_row(
        &self,
        fields: &HashMap<String, String>,
        today: NaiveDate,
    ) -> Result<PatientPayload, Vec<FieldError>> {
        let mut errors = Vec::new();
        let field = |name: &str| fields.get(name).map(String::as_str);

        let first_name = keep(
            &mut errors,
            "firstName",
            normalize_name(field("firstname"), "firstName"),
        );
        let last_name = keep(
            &mut errors,
            "lastName",
            normalize_name(field("lastname"), "lastName"),
        );
        let dob = keep(
            &mut errors,
            "dob",
            normalize_date(field("dob").unwrap_or_default(), today),
        );
        let gender = keep(
            &mut errors,
            "gender",
            normalize_gender(field("gender").unwrap_or_default()),
        );

        let (addresses, address_errors) = self.addresses.map_addresses(fields);
        errors.extend(address_errors);

        let (contacts, contact_errors) = map_contacts(fields);
        errors.extend(contact_errors);

        let external_id = normalize_external_id(field("id"))
            .or_else(|| normalize_external_id(field("externalid")));

        let mut personal_identifiers = Vec::new();
        if let Some(ssn) = field("ssn").filter(|v| !v.trim().is_empty()) {
            if let Some(value) = keep(&mut errors, "ssn", normalize_ssn(ssn)) {
                personal_identifiers.push(PersonalIdentifier::Ssn { value });
            }
        }
        if let Some(license) = drivers_license(field("driverslicenceno"), field("driverslicencestate"))
        {
            personal_identifiers.push(license);
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        match (first_name, last_name, dob, gender) {
            (Some(first_name), Some(last_name), Some(dob), Some(gender_at_birth))
                if !addresses.is_empty() =>
            {
                Ok(PatientPayload {
                    external_id,
                    first_name,
                    last_name,
                    dob,
                    gender_at_birth,
                    address: addresses,
                    contact: contacts,
                    personal_identifiers,
                })
            }
            _ => Err(vec![FieldError::new("general", "Missing required fields")]),
        }
    }
}

fn keep<T>(errors: &mut Vec<FieldError>, field: &str, result: Result<T, String>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            errors.push(FieldError::new(field, error));
            None
        }
    }
}

/// A driver's licence is only kept when both the number and a valid US state are set.
fn drivers_license(value: Option<&str>, state: Option<&str>) -> Option<PersonalIdentifier> {
    let value = value.map(|v| v.trim().to_lowercase()).filter(|v| !v.is_empty())?;
    let state = normalize_us_state(state?)?;
    Some(PersonalIdentifier::DriversLicense {
        value,
        state: state.to_string(),
    })
}

/// The uploaded text between two reader positions, without line terminators.
fn source_text(contents: &str, start: u64, end: u64) -> Option<&str> {
    let start = usize::try_from(start).ok()?;
    let end = usize::try_from(end).ok()?;
    let text = contents.get(start..end)?.trim_matches(['\r', '\n']);
    (!text.is_empty()).then_some(text)
}

/// Writes one row as a CSV line, quoting cells where needed.
fn render_row<S: AsRef<str>>(columns: &[S]) -> Result<String, CsvError> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    writer
        .write_record(columns.iter().map(|c| c.as_ref()))
        .map_err(|e| CsvError::Write {
            message: e.to_string(),
        })?;
    let bytes = writer.into_inner().map_err(|e| CsvError::Write {
        message: e.to_string(),
    })?;
    let line = String::from_utf8(bytes).map_err(|e| CsvError::Write {
        message: e.to_string(),
    })?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn read_error(err: csv::Error) -> CsvError {
    CsvError::Read {
        message: err.to_string(),
    }
}

/// Writes a header and rows as CSV text, quoting cells where needed.
pub(crate) fn to_csv_string<H, I>(headers: &[H], rows: I) -> Result<String, CsvError>
where
    H: AsRef<str>,
    I: IntoIterator<Item = Vec<String>>,
{
    let write_error = |e: csv::Error| CsvError::Write {
        message: e.to_string(),
    };
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    writer
        .write_record(headers.iter().map(|h| h.as_ref()))
        .map_err(write_error)?;
    for row in rows {
        writer.write_record(&row).map_err(write_error)?;
    }
    let bytes = writer.into_inner().map_err(|e| CsvError::Write {
        message: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|e| CsvError::Write {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Gender;

    const HEADER: &str = "id,firstName,lastName,dob,gender,addressLine1,city,state,zip,ssn";

    fn validator() -> CsvValidator {
        CsvValidator::new(MAX_NUMBER_ROWS)
            .unwrap()
            .with_today(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
    }

    fn csv_of(rows: &[&str]) -> String {
        let mut out = HEADER.to_string();
        for row in rows {
            out.push('\n');
            out.push_str(row);
        }
        out
    }

    #[test]
    fn test_valid_row_is_parsed() {
        let contents = csv_of(&["E1,jane,doe,1980-01-02,F,1 Main St,Boston,MA,02110,"]);
        let parsed = validator().validate_and_parse(&contents).unwrap();
        assert_eq!(parsed.header_line, HEADER);
        assert_eq!(parsed.rows.len(), 1);

        let ParsedPatient::Success {
            row_number, parsed, ..
        } = &parsed.rows[0]
        else {
            panic!("expected success: {:?}", parsed.rows[0]);
        };
        assert_eq!(*row_number, 1);
        assert_eq!(parsed.external_id.as_deref(), Some("E1"));
        assert_eq!(parsed.first_name, "Jane");
        assert_eq!(parsed.gender_at_birth, Gender::Female);
        assert_eq!(parsed.address[0].state, "MA");
        assert!(parsed.personal_identifiers.is_empty());
    }

    #[test]
    fn test_rows_keep_order_and_numbers() {
        let contents = csv_of(&[
            "1,Ann,Lee,1970-05-05,F,1 Main St,Boston,MA,02110,",
            ",,Lee,1970-05-05,F,1 Main St,Boston,MA,02110,",
            "3,Bob,Ray,1971-05-05,M,2 Main St,Boston,MA,02110,",
        ]);
        let parsed = validator().validate_and_parse(&contents).unwrap();
        let numbers: Vec<u32> = parsed.rows.iter().map(ParsedPatient::row_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(parsed.rows[0].is_success());
        assert!(!parsed.rows[1].is_success());
        assert!(parsed.rows[2].is_success());
        assert_eq!(parsed.successful_count(), 2);
    }

    #[test]
    fn test_errors_are_joined() {
        let contents = csv_of(&["1,,,not-a-date,x,,,,,"]);
        let parsed = validator().validate_and_parse(&contents).unwrap();
        let ParsedPatient::Error {
            error, row_columns, ..
        } = &parsed.rows[0]
        else {
            panic!("expected error");
        };
        assert_eq!(row_columns.len(), 10);
        assert!(error.starts_with("Missing firstName; Missing lastName; Invalid date"));
        assert!(error.ends_with("Patient has no address"));
    }

    #[test]
    fn test_external_id_falls_back() {
        let contents = "externalId,firstName,lastName,dob,gender,address1,city,state,zipCode\n\
                        X-9,Ann,Lee,1970-05-05,F,1 Main St,Boston,MA,02110";
        let parsed = validator().validate_and_parse(contents).unwrap();
        let ParsedPatient::Success { parsed, .. } = &parsed.rows[0] else {
            panic!("expected success");
        };
        assert_eq!(parsed.external_id.as_deref(), Some("X-9"));
    }

    #[test]
    fn test_identifiers() {
        let contents = "firstName,lastName,dob,gender,addressLine1,city,state,zip,ssn,driversLicenceNo,driversLicenceState\n\
                        Ann,Lee,1970-05-05,F,1 Main St,Boston,MA,02110,123-45-6789,AB123,California\n\
                        Ann,Lee,1970-05-05,F,1 Main St,Boston,MA,02110,,AB123,Nowhere\n\
                        Ann,Lee,1970-05-05,F,1 Main St,Boston,MA,02110,12,,";
        let parsed = validator().validate_and_parse(contents).unwrap();

        let ParsedPatient::Success { parsed: first, .. } = &parsed.rows[0] else {
            panic!("expected success");
        };
        assert_eq!(
            first.personal_identifiers,
            vec![
                PersonalIdentifier::Ssn {
                    value: "123456789".to_string()
                },
                PersonalIdentifier::DriversLicense {
                    value: "ab123".to_string(),
                    state: "CA".to_string()
                },
            ]
        );

        let ParsedPatient::Success { parsed: second, .. } = &parsed.rows[1] else {
            panic!("expected success");
        };
        assert!(second.personal_identifiers.is_empty());

        assert!(matches!(
            &parsed.rows[2],
            ParsedPatient::Error { error, .. } if error == "Invalid SSN"
        ));
    }

    #[test]
    fn test_too_many_rows() {
        let contents = csv_of(&[
            "1,Ann,Lee,1970-05-05,F,1 Main St,Boston,MA,02110,",
            "2,Ann,Lee,1970-05-05,F,1 Main St,Boston,MA,02110,",
            "3,Ann,Lee,1970-05-05,F,1 Main St,Boston,MA,02110,",
        ]);
        let validator = CsvValidator::new(2).unwrap();
        assert!(matches!(
            validator.validate_and_parse(&contents),
            Err(CsvError::TooManyRows { max: 2 })
        ));
    }

    #[test]
    fn test_empty_input_has_no_header() {
        assert!(matches!(
            validator().validate_and_parse(""),
            Err(CsvError::MissingHeader)
        ));
    }

    #[test]
    fn test_short_rows_are_row_errors() {
        let contents = csv_of(&["1,Ann"]);
        let parsed = validator().validate_and_parse(&contents).unwrap();
        assert_eq!(parsed.rows.len(), 1);
        assert!(!parsed.rows[0].is_success());
        assert_eq!(parsed.rows[0].row_csv(), "1,Ann");
    }

    #[test]
    fn test_row_csv_keeps_quoted_source_text() {
        let header = "\"firstName\",lastName,dob,gender,addressLine1,city,state,zip";
        let row = "\"Ann\",\"Lee, Jr\",1980-01-01,F,\"1 Main St, Apt 4\",Boston,MA,02110";
        let contents = format!("{header}\r\n{row}\r\n\r\n,Lee,1980-01-01,F,\"2 \"\"B\"\" St\",Boston,MA,02110\n");
        let parsed = validator().validate_and_parse(&contents).unwrap();
        assert_eq!(parsed.header_line, header);
        assert_eq!(parsed.rows.len(), 2);
        assert!(parsed.rows[0].is_success());
        assert_eq!(parsed.rows[0].row_csv(), row);
        assert_eq!(
            parsed.rows[1].row_csv(),
            ",Lee,1980-01-01,F,\"2 \"\"B\"\" St\",Boston,MA,02110"
        );

        for parsed_row in &parsed.rows {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .from_reader(parsed_row.row_csv().as_bytes());
            let reparsed = reader.records().next().unwrap().unwrap();
            let columns: Vec<&str> = reparsed.iter().collect();
            assert_eq!(columns, parsed_row.row_columns());
        }

        let partitioned = parsed.partition();
        assert_eq!(partitioned.successful[0].row_csv, row);
        assert_eq!(partitioned.failed[0].row_number, 2);
    }

    #[test]
    fn test_render_row_quotes_cells() {
        let line = render_row(&["Ann", "Lee, Jr", "say \"hi\""]).unwrap();
        assert_eq!(line, "Ann,\"Lee, Jr\",\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_validation_files() {
        let contents = csv_of(&[
            "1,Ann,Lee,1970-05-05,F,1 Main St,Boston,MA,02110,",
            "2,,Lee,1970-05-05,F,,,,,",
        ]);
        let partitioned = validator().validate_and_parse(&contents).unwrap().partition();
        assert_eq!(partitioned.total(), 2);

        let valid = partitioned.valid_rows_file().unwrap().unwrap();
        assert_eq!(
            valid,
            format!("{HEADER}\n1,Ann,Lee,1970-05-05,F,1 Main St,Boston,MA,02110,\n")
        );

        let invalid = partitioned.invalid_rows_file().unwrap().unwrap();
        let mut lines = invalid.lines();
        assert_eq!(lines.next(), Some(format!("{HEADER},error").as_str()));
        let row = lines.next().unwrap();
        assert!(row.starts_with("2,,Lee,1970-05-05,F,,,,,,Missing firstName; "));
        assert!(!row.trim_start_matches("2,,Lee,1970-05-05,F,,,,,,").contains(','));
    }

    #[test]
    fn test_partition_without_failures_has_no_invalid_file() {
        let contents = csv_of(&["1,Ann,Lee,1970-05-05,F,1 Main St,Boston,MA,02110,"]);
        let partitioned = validator().validate_and_parse(&contents).unwrap().partition();
        assert!(partitioned.invalid_rows_file().unwrap().is_none());
        assert_eq!(partitioned.successful.len(), 1);
    }
}
