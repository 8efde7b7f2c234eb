//! Phone and email columns.

use std::collections::HashMap;

use super::FieldError;
use super::address::MAX_INDEXED_BLOCKS;
use super::normalize::{normalize_email, normalize_phone};
use crate::types::Contact;

/// Maps the unnumbered and numbered `phone`/`email` columns of a row.
///
/// Blank values are skipped; malformed values are row errors.
pub fn map_contacts(fields: &HashMap<String, String>) -> (Vec<Contact>, Vec<FieldError>) {
    let mut contacts = Vec::new();
    let mut errors = Vec::new();

    for index in std::iter::once(None).chain((1..=MAX_INDEXED_BLOCKS).map(Some)) {
        let suffix = index.map(|i| format!("-{}", i)).unwrap_or_default();
        let mut contact = Contact::default();

        let phone_field = format!("phone{}", suffix);
        if let Some(raw) = non_blank(fields, &phone_field) {
            match normalize_phone(raw) {
                Ok(phone) => contact.phone = Some(phone),
                Err(error) => errors.push(FieldError::new(&phone_field, error)),
            }
        }

        let email_field = format!("email{}", suffix);
        if let Some(raw) = non_blank(fields, &email_field) {
            match normalize_email(raw) {
                Ok(email) => contact.email = Some(email),
                Err(error) => errors.push(FieldError::new(&email_field, error)),
            }
        }

        if contact.phone.is_some() || contact.email.is_some() {
            contacts.push(contact);
        }
    }

    (contacts, errors)
}

fn non_blank<'a>(fields: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    fields
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_contacts() {
        let fields: HashMap<String, String> = [
            ("phone", "(415) 555-0100"),
            ("email", ""),
            ("email-1", "A@B.CO"),
            ("phone-2", "123"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let (contacts, errors) = map_contacts(&fields);
        assert_eq!(
            contacts,
            vec![
                Contact {
                    phone: Some("4155550100".to_string()),
                    email: None
                },
                Contact {
                    phone: None,
                    email: Some("a@b.co".to_string())
                },
            ]
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "phone-2");
    }
}
