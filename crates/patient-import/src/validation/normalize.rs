//! Field normalizers for CSV patient columns.
//!
//! Every normalizer returns either the cleaned value or a human-readable
//! reason that ends up in the row's error message.

use chrono::{Datelike, NaiveDate};

use crate::types::Gender;

const US_STATES: &[(&str, &str)] = &[
    ("AL", "alabama"),
    ("AK", "alaska"),
    ("AZ", "arizona"),
    ("AR", "arkansas"),
    ("CA", "california"),
    ("CO", "colorado"),
    ("CT", "connecticut"),
    ("DE", "delaware"),
    ("DC", "district of columbia"),
    ("FL", "florida"),
    ("GA", "georgia"),
    ("HI", "hawaii"),
    ("ID", "idaho"),
    ("IL", "illinois"),
    ("IN", "indiana"),
    ("IA", "iowa"),
    ("KS", "kansas"),
    ("KY", "kentucky"),
    ("LA", "louisiana"),
    ("ME", "maine"),
    ("MD", "maryland"),
    ("MA", "massachusetts"),
    ("MI", "michigan"),
    ("MN", "minnesota"),
    ("MS", "mississippi"),
    ("MO", "missouri"),
    ("MT", "montana"),
    ("NE", "nebraska"),
    ("NV", "nevada"),
    ("NH", "new hampshire"),
    ("NJ", "new jersey"),
    ("NM", "new mexico"),
    ("NY", "new york"),
    ("NC", "north carolina"),
    ("ND", "north dakota"),
    ("OH", "ohio"),
    ("OK", "oklahoma"),
    ("OR", "oregon"),
    ("PA", "pennsylvania"),
    ("RI", "rhode island"),
    ("SC", "south carolina"),
    ("SD", "south dakota"),
    ("TN", "tennessee"),
    ("TX", "texas"),
    ("UT", "utah"),
    ("VT", "vermont"),
    ("VA", "virginia"),
    ("WA", "washington"),
    ("WV", "west virginia"),
    ("WI", "wisconsin"),
    ("WY", "wyoming"),
    ("AS", "american samoa"),
    ("GU", "guam"),
    ("MP", "northern mariana islands"),
    ("PR", "puerto rico"),
    ("VI", "virgin islands"),
];

/// Characters removed from header names before lower-casing.
const HEADER_STRIP_CHARS: &str = "!@#$%^&*()+=[]\\';,./{}|\":<>?~_";

/// Normalizes a header name: special characters and whitespace removed, lower-cased.
///
/// Hyphens are kept so numbered blocks (`address1-2`) stay addressable.
pub fn normalize_header(header: &str) -> String {
    header
        .trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| !c.is_whitespace() && !HEADER_STRIP_CHARS.contains(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Upper-cases the first letter of every whitespace separated word and
/// lower-cases the rest.
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut at_word_start = true;
    for c in value.chars() {
        if c.is_whitespace() {
            at_word_start = true;
            out.push(c);
        } else if at_word_start {
            at_word_start = false;
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Collapses runs of whitespace into single spaces and trims.
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn normalize_name(value: Option<&str>, field: &str) -> Result<String, String> {
    let name = value.map(collapse_whitespace).unwrap_or_default();
    if name.is_empty() {
        return Err(format!("Missing {}", field));
    }
    Ok(title_case(&name))
}

/// Normalizes a date of birth to `YYYY-MM-DD`.
///
/// Accepts `YYYY-MM-DD`, `YYYYMMDD`, `MM/DD/YYYY` and `M/D/YYYY`, optionally
/// followed by a time component.
pub fn normalize_date(value: &str, today: NaiveDate) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("Missing dob".to_string());
    }
    let date_part = trimmed
        .split(['T', ' '])
        .next()
        .unwrap_or(trimmed);

    let parsed = if date_part.len() == 8 && date_part.chars().all(|c| c.is_ascii_digit()) {
        NaiveDate::parse_from_str(
            &format!("{}-{}-{}", &date_part[..4], &date_part[4..6], &date_part[6..]),
            "%Y-%m-%d",
        )
        .ok()
    } else {
        ["%Y-%m-%d", "%m/%d/%Y", "%m-%d-%Y", "%Y/%m/%d"]
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
    };

    let date = parsed.ok_or_else(|| format!("Invalid date: {}", trimmed))?;
    if date > today {
        return Err(format!("Date can't be in the future: {}", trimmed));
    }
    if date.year() < 1900 {
        return Err(format!("Date is too far in the past: {}", trimmed));
    }
    Ok(date.format("%Y-%m-%d").to_string())
}

pub fn normalize_gender(value: &str) -> Result<Gender, String> {
    match value.trim().to_lowercase().as_str() {
        "" => Err("Missing gender".to_string()),
        "m" | "male" => Ok(Gender::Male),
        "f" | "female" => Ok(Gender::Female),
        "o" | "other" | "un" => Ok(Gender::Other),
        "u" | "unknown" => Ok(Gender::Unknown),
        other => Err(format!("Invalid gender: {}", other)),
    }
}

/// Resolves a two-letter code or full state name to its code.
pub fn normalize_us_state(value: &str) -> Option<&'static str> {
    let cleaned = collapse_whitespace(value).to_lowercase();
    if cleaned.is_empty() {
        return None;
    }
    US_STATES
        .iter()
        .find(|(code, name)| code.eq_ignore_ascii_case(&cleaned) || *name == cleaned)
        .map(|(code, _)| *code)
}

/// Normalizes a ZIP or ZIP+4 to its five-digit form.
///
/// Three and four digit values are left-padded with zeros, since leading zeros
/// are commonly lost by spreadsheet tools.
pub fn normalize_zip(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let (five, plus_four) = match trimmed.split_once('-') {
        Some((five, rest)) => (five, Some(rest)),
        None => (trimmed, None),
    };
    if let Some(rest) = plus_four {
        if rest.len() != 4 || !rest.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
    }
    if five.is_empty() || !five.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match five.len() {
        9 if plus_four.is_none() => Some(five[..5].to_string()),
        3..=5 => Some(format!("{:0>5}", five)),
        _ => None,
    }
}

pub fn normalize_external_id(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Normalizes an SSN to nine digits.
pub fn normalize_ssn(value: &str) -> Result<String, String> {
    let digits: String = value
        .trim()
        .chars()
        .filter(|c| !matches!(c, '-' | ' ' | '.'))
        .collect();
    if digits.len() == 9 && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(digits)
    } else {
        Err("Invalid SSN".to_string())
    }
}

/// Normalizes a US phone number to ten digits.
pub fn normalize_phone(value: &str) -> Result<String, String> {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits = match digits.len() {
        11 if digits.starts_with('1') => digits[1..].to_string(),
        _ => digits,
    };
    if digits.len() == 10 {
        Ok(digits)
    } else {
        Err(format!("Invalid phone: {}", value.trim()))
    }
}

pub fn normalize_email(value: &str) -> Result<String, String> {
    let email = value.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(format!("Invalid email: {}", value.trim()))
    }
}
