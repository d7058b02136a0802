//! Contact extractors: each turns page content into candidate contacts.
//!
//! Extractors are pure functions of (content, source URL, context); network
//! access happens only in the OCR/PDF extractors, which download the
//! artifacts they analyze. The engine holds extractors by kind and invokes
//! the enabled set.

pub mod email;
pub mod form;
pub mod ocr;
pub mod pdf;
pub mod phone;
pub mod social;

use std::collections::HashMap;

use crate::models::{Contact, ContactForm, SocialMediaProfile};

/// Collapse duplicate contacts on (method, value), keeping the
/// highest-confidence observation and merging metadata from the rest.
/// Order is preserved; on equal confidence the earlier observation wins.
pub fn dedupe_contacts(contacts: Vec<Contact>) -> Vec<Contact> {
    let mut seen: HashMap<(crate::models::ContactMethod, String), usize> = HashMap::new();
    let mut unique: Vec<Contact> = Vec::new();

    for contact in contacts {
        let key = (contact.method, contact.value.to_lowercase());
        match seen.get(&key) {
            None => {
                seen.insert(key, unique.len());
                unique.push(contact);
            }
            Some(&idx) => {
                let existing = &mut unique[idx];
                if contact.confidence_level.rank() > existing.confidence_level.rank() {
                    let mut replacement = contact;
                    for (k, v) in existing.metadata.iter() {
                        replacement
                            .metadata
                            .entry(k.clone())
                            .or_insert_with(|| v.clone());
                    }
                    *existing = replacement;
                } else {
                    for (k, v) in contact.metadata {
                        existing.metadata.entry(k).or_insert(v);
                    }
                }
            }
        }
    }

    unique
}

/// Collapse duplicate forms on their action URL.
pub fn dedupe_forms(forms: Vec<ContactForm>) -> Vec<ContactForm> {
    let mut seen: HashMap<String, ()> = HashMap::new();
    let mut unique = Vec::new();
    for form in forms {
        if seen.insert(form.action_url.clone(), ()).is_none() {
            unique.push(form);
        }
    }
    unique
}

/// Collapse duplicate social profiles on (platform, username).
pub fn dedupe_profiles(profiles: Vec<SocialMediaProfile>) -> Vec<SocialMediaProfile> {
    let mut seen: HashMap<(crate::models::SocialMediaPlatform, String), ()> = HashMap::new();
    let mut unique = Vec::new();
    for profile in profiles {
        let key = (profile.platform, profile.username.to_lowercase());
        if seen.insert(key, ()).is_none() {
            unique.push(profile);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConfidenceLevel, Contact, ContactMethod};
    use serde_json::Value;

    fn contact(value: &str, level: ConfidenceLevel, tag: &str) -> Contact {
        Contact::new(ContactMethod::Email, value, level, "https://acme.de")
            .with_extraction_method(tag)
    }

    #[test]
    fn dedupe_keeps_highest_confidence() {
        let low = contact("info@acme.de", ConfidenceLevel::Medium, "standard_pattern");
        let high = contact("info@acme.de", ConfidenceLevel::High, "mailto_link");
        let deduped = dedupe_contacts(vec![low, high]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].extraction_method, "mailto_link");
    }

    #[test]
    fn dedupe_prefers_earlier_on_tie() {
        let first = contact("info@acme.de", ConfidenceLevel::Medium, "obfuscated_text");
        let second = contact("info@acme.de", ConfidenceLevel::Medium, "standard_pattern");
        let deduped = dedupe_contacts(vec![first, second]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].extraction_method, "obfuscated_text");
    }

    #[test]
    fn dedupe_merges_metadata() {
        let mut a = contact("info@acme.de", ConfidenceLevel::Medium, "standard_pattern");
        a.insert_metadata("domain", Value::String("acme.de".into()));
        let mut b = contact("info@acme.de", ConfidenceLevel::High, "mailto_link");
        b.insert_metadata("source_type", Value::String("html_attribute".into()));

        let deduped = dedupe_contacts(vec![a, b]);
        assert_eq!(deduped.len(), 1);
        assert!(deduped[0].metadata.contains_key("domain"));
        assert!(deduped[0].metadata.contains_key("source_type"));
    }

    #[test]
    fn dedupe_is_case_insensitive_on_value() {
        // Values are normalized on construction for emails; simulate a mixed
        // case via a non-normalizing method.
        let a = Contact::new(
            ContactMethod::Address,
            "Sendlinger Str. 1",
            ConfidenceLevel::Medium,
            "https://acme.de",
        );
        let b = Contact::new(
            ContactMethod::Address,
            "sendlinger str. 1",
            ConfidenceLevel::Medium,
            "https://acme.de",
        );
        assert_eq!(dedupe_contacts(vec![a, b]).len(), 1);
    }
}
