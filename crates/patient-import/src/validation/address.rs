//! Address columns: numbered blocks, line cleanup and unit splitting.

use std::collections::HashMap;

use regex::Regex;

use super::FieldError;
use super::normalize::{collapse_whitespace, normalize_us_state, normalize_zip, title_case};
use crate::types::Address;

/// Numbered address/contact blocks (`-1` to `-10`) read in addition to the unnumbered one.
pub const MAX_INDEXED_BLOCKS: usize = 10;

const COUNTRY: &str = "USA";

const STREET_TYPES: &[&str] = &[
    "street", "st", "road", "rd", "lane", "ln", "drive", "dr", "avenue", "ave", "boulevard",
    "blvd", "circle", "cir", "court", "ct", "place", "pl", "terrace", "ter", "trail", "trl",
    "way", "highway", "hwy", "parkway", "pkwy", "crossing", "xing", "square", "sq", "loop",
    "path", "pike", "alley", "run",
];

const UNIT_INDICATORS: &[&str] = &[
    "apt", "apartment", "unit", "suite", "#", "number", "floor", "fl", "ste", "lot", "rm",
    "room", "trlr", "building", "blg", "no",
];

/// Cleans address lines and splits a trailing unit designator into line 2.
#[derive(Debug, Clone)]
pub struct AddressNormalizer {
    instructions: Regex,
    street_then_unit: Regex,
    unit_only: Regex,
}

impl AddressNormalizer {
    pub fn new() -> Result<Self, regex::Error> {
        let streets = STREET_TYPES.join("|");
        let units = UNIT_INDICATORS.join("|");
        Ok(Self {
            instructions: Regex::new(r"\(.*?\)")?,
            street_then_unit: Regex::new(&format!(
                r"(?i)(.*?\W+(?:{streets})\W+.*?)\s*((?:{units})\s*[#]?\s*[\w\s-]+)?$"
            ))?,
            unit_only: Regex::new(&format!(
                r"(?i)(.+?)\s*((?:{units})(?:\s*#\s*[\w\s-]+|\s*[\d\s-]+))?$"
            ))?,
        })
    }

    /// Removes parenthesized instructions, punctuation and repeated whitespace,
    /// then title-cases the line.
    pub fn normalize_line(&self, line: &str) -> String {
        let without_instructions = self.instructions.replace_all(line, " ");
        let without_punctuation: String = without_instructions
            .chars()
            .map(|c| if matches!(c, '.' | ',' | ';') { ' ' } else { c })
            .collect();
        title_case(&collapse_whitespace(&without_punctuation))
    }

    /// Normalizes a first address line and splits off a trailing unit.
    ///
    /// Returns one element when no unit was found, two otherwise. PO boxes are
    /// never split.
    pub fn normalize_and_split(&self, line: &str) -> Vec<String> {
        let normalized = self.normalize_line(line);
        if normalized.is_empty() {
            return Vec::new();
        }
        if normalized.to_lowercase().starts_with("po box") {
            return vec![normalized];
        }

        for pattern in [&self.street_then_unit, &self.unit_only] {
            if let Some(caps) = pattern.captures(&normalized) {
                let unit = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
                if unit.is_empty() {
                    continue;
                }
                let main = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
                return [main, unit]
                    .into_iter()
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect();
            }
        }

        vec![normalized]
    }

    /// Maps the unnumbered and numbered address blocks of a row.
    ///
    /// A block with no values is ignored; a partially filled block reports
    /// an error for every missing property.
    pub fn map_addresses(&self, fields: &HashMap<String, String>) -> (Vec<Address>, Vec<FieldError>) {
        let mut addresses = Vec::new();
        let mut errors = Vec::new();

        for index in std::iter::once(None).chain((1..=MAX_INDEXED_BLOCKS).map(Some)) {
            let (address, block_errors) = self.parse_address(fields, index);
            addresses.extend(address);
            errors.extend(block_errors);
        }

        if addresses.is_empty() {
            errors.push(FieldError::new("address", "Patient has no address"));
        }
        (addresses, errors)
    }

    fn parse_address(
        &self,
        fields: &HashMap<String, String>,
        index: Option<usize>,
    ) -> (Option<Address>, Vec<FieldError>) {
        let suffix = index.map(|i| format!("-{}", i)).unwrap_or_default();
        let line1_name = format!("addressLine1{}", suffix);
        let line2_name = format!("addressLine2{}", suffix);
        let city_name = format!("city{}", suffix);
        let state_name = format!("state{}", suffix);
        let zip_name = format!("zip{}", suffix);

        let mut errors = Vec::new();
        let mut found_any = false;

        let mut line1 = None;
        let mut line2 = None;
        let split = lookup(fields, &[line1_name.clone(), format!("address1{}", suffix)])
            .map(|raw| self.normalize_and_split(raw))
            .unwrap_or_default();
        let mut parts = split.into_iter();
        match parts.next() {
            Some(main) => {
                line1 = Some(main);
                line2 = parts.next();
                found_any = true;
            }
            None => errors.push(FieldError::new(&line1_name, format!("Missing {}", line1_name))),
        }

        let dedicated_line2 = lookup(fields, &[line2_name.clone(), format!("address2{}", suffix)])
            .map(|raw| self.normalize_line(raw))
            .filter(|line| !line.is_empty());
        if let Some(dedicated) = dedicated_line2 {
            if let (Some(main), Some(unit)) = (line1.as_mut(), line2.take()) {
                tracing::debug!(
                    field = %line2_name,
                    "unit found on both address lines, keeping the dedicated column"
                );
                *main = format!("{}, {}", main, unit);
            }
            line2 = Some(dedicated);
        }
        if line2.is_some() {
            found_any = true;
        }

        let city = lookup(fields, &[city_name.clone()])
            .map(|raw| title_case(&collapse_whitespace(raw)))
            .filter(|city| !city.is_empty());
        match city {
            Some(_) => found_any = true,
            None => errors.push(FieldError::new(&city_name, format!("Missing {}", city_name))),
        }

        let raw_state = lookup(fields, &[state_name.clone()]).unwrap_or_default();
        let state = normalize_us_state(raw_state);
        match state {
            Some(_) => found_any = true,
            None if raw_state.trim().is_empty() => {
                errors.push(FieldError::new(&state_name, format!("Missing {}", state_name)))
            }
            None => errors.push(FieldError::new(
                &state_name,
                format!("Invalid {}: {}", state_name, raw_state.trim()),
            )),
        }

        let raw_zip = lookup(fields, &[zip_name.clone(), format!("zipCode{}", suffix)]).unwrap_or_default();
        let zip = normalize_zip(raw_zip);
        match zip {
            Some(_) => found_any = true,
            None if raw_zip.trim().is_empty() => {
                errors.push(FieldError::new(&zip_name, format!("Missing {}", zip_name)))
            }
            None => errors.push(FieldError::new(
                &zip_name,
                format!("Invalid {}: {}", zip_name, raw_zip.trim()),
            )),
        }

        match (line1, city, state, zip) {
            (Some(address_line1), Some(city), Some(state), Some(zip)) => (
                Some(Address {
                    address_line1,
                    address_line2: line2,
                    city,
                    state: state.to_string(),
                    zip,
                    country: COUNTRY.to_string(),
                }),
                errors,
            ),
            _ if found_any => (None, errors),
            _ => (None, Vec::new()),
        }
    }
}

/// Returns the first column present among `names`, even when it is empty.
fn lookup<'a>(fields: &'a HashMap<String, String>, names: &[String]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| fields.get(&name.to_lowercase()))
        .map(String::as_str)
}
