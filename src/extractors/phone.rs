//! Phone number extraction for German and international formats.
//!
//! Pattern families run in order: German national, German mobile, Munich
//! local, generic international. Values canonicalize to a leading `+` for
//! international numbers or a leading `0` for national ones, digits only.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::models::{ConfidenceLevel, Contact, ContactMethod, DiscoveryContext};
use crate::normalize::normalize_text;

use super::dedupe_contacts;

struct PhoneFamily {
    name: &'static str,
    patterns: Vec<Regex>,
}

// Digit groups after the prefix, joined by space/slash/dot/dash runs. Real
// pages group numbers anywhere from "12345678" to "12 34 56 78".
const GROUP_TAIL: &str = r"(?:[\s/.-]*\d+){1,6}";

static FAMILIES: Lazy<Vec<PhoneFamily>> = Lazy::new(|| {
    vec![
        PhoneFamily {
            name: "german_mobile",
            patterns: compile(&[
                &format!(r"\+49[\s/.-]?0?[\s/.-]?1[5-7]\d{{1,3}}{}", GROUP_TAIL),
                &format!(r"\b0\s?1[5-7]\d{{1,2}}{}", GROUP_TAIL),
            ]),
        },
        PhoneFamily {
            name: "munich_local",
            patterns: compile(&[
                &format!(r"\(089\){}", GROUP_TAIL),
                &format!(r"\b089{}", GROUP_TAIL),
                &format!(r"\+49[\s/.-]?89{}", GROUP_TAIL),
            ]),
        },
        PhoneFamily {
            name: "german_national",
            patterns: compile(&[
                &format!(r"\+49[\s/.-]?0?[\s/.-]?[1-9]\d{{1,4}}{}", GROUP_TAIL),
                &format!(r"\b0049[\s/.-]?0?[\s/.-]?[1-9]\d{{1,4}}{}", GROUP_TAIL),
                &format!(r"\b0[1-9]\d{{1,4}}{}", GROUP_TAIL),
            ]),
        },
        PhoneFamily {
            name: "international",
            patterns: compile(&[&format!(r"\+\d{{1,3}}{}", GROUP_TAIL)]),
        },
    ]
});

fn compile<S: AsRef<str>>(patterns: &[S]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p.as_ref()).unwrap())
        .collect()
}

/// German area-code roots: mobiles on 15/16/17, landlines on 2..9 roots with
/// 2-5 digit area codes. Stored as the digits following the trunk `0`.
static GERMAN_AREA_ROOTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "15", "16", "17", // mobile blocks
        "2", "3", "4", "5", "6", "7", "8", "9", // landline roots
    ]
});

const CONTACT_URL_KEYWORDS: [&str; 6] =
    ["contact", "kontakt", "impressum", "about", "telefon", "phone"];

pub struct PhoneExtractor;

impl PhoneExtractor {
    pub fn new() -> Self {
        PhoneExtractor
    }

    pub fn extract(&self, text: &str, source_url: &str, ctx: &DiscoveryContext) -> Vec<Contact> {
        let normalized = normalize_text(text);
        let mut contacts = Vec::new();

        for family in FAMILIES.iter() {
            for pattern in &family.patterns {
                for m in pattern.find_iter(&normalized) {
                    if let Some(contact) =
                        self.build_contact(m.as_str(), family.name, source_url, ctx)
                    {
                        contacts.push(contact);
                    }
                }
            }
        }

        let unique = dedupe_contacts(contacts);
        debug!(
            "Extracted {} unique phone numbers from {}",
            unique.len(),
            source_url
        );
        unique
    }

    fn build_contact(
        &self,
        raw: &str,
        family: &'static str,
        source_url: &str,
        ctx: &DiscoveryContext,
    ) -> Option<Contact> {
        let canonical = canonicalize(raw);
        if !self.is_plausible(&canonical, family) {
            return None;
        }

        let confidence = self.determine_confidence(&canonical, family, source_url, ctx);
        let mut contact = Contact::new(ContactMethod::Phone, &canonical, confidence, source_url)
            .with_extraction_method("standard_pattern")
            .with_discovery_path(ctx.discovery_path.clone());
        contact.language = ctx.language.clone();
        contact.cultural_context = ctx.cultural_context.clone();
        contact.insert_metadata("extraction_pattern", Value::String(family.to_string()));

        if canonical.starts_with('+') {
            contact.insert_metadata("format", Value::String("international".into()));
            if let Some(cc) = country_code(&canonical) {
                contact.insert_metadata("country_code", Value::String(cc));
            }
        } else {
            contact.insert_metadata("format", Value::String("national".into()));
        }
        if let Some(area) = area_code(&canonical) {
            contact.insert_metadata("area_code", Value::String(area));
        }
        if is_mobile(&canonical) {
            contact.insert_metadata("is_mobile", Value::Bool(true));
        }
        if is_munich(&canonical) {
            contact.insert_metadata("is_munich", Value::Bool(true));
        }

        Some(contact)
    }

    /// Digits-only length in the E.164-ish bound [8, 15]; German national
    /// numbers additionally need a known area-code root.
    fn is_plausible(&self, canonical: &str, family: &'static str) -> bool {
        let digits: String = canonical.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() < 8 || digits.len() > 15 {
            return false;
        }

        if canonical.starts_with('+') {
            return true;
        }

        // National form: trunk 0 then a non-zero digit.
        if !canonical.starts_with('0') {
            return false;
        }
        let after_trunk = &canonical[1..];
        if after_trunk.starts_with('0') || after_trunk.is_empty() {
            return false;
        }
        if family == "international" {
            return true;
        }
        GERMAN_AREA_ROOTS
            .iter()
            .any(|root| after_trunk.starts_with(root))
    }

    fn determine_confidence(
        &self,
        canonical: &str,
        family: &'static str,
        source_url: &str,
        ctx: &DiscoveryContext,
    ) -> ConfidenceLevel {
        if is_munich(canonical) || is_mobile(canonical) {
            return ConfidenceLevel::High;
        }

        let url_lower = source_url.to_lowercase();
        if CONTACT_URL_KEYWORDS.iter().any(|k| url_lower.contains(k)) {
            return ConfidenceLevel::High;
        }

        let is_german = matches!(family, "german_national" | "german_mobile" | "munich_local")
            || canonical.starts_with("+49");
        if is_german && ctx.cultural_context == "german" {
            return ConfidenceLevel::High;
        }

        ConfidenceLevel::Medium
    }
}

/// Reduce a matched span to `+`-and-digits (international) or digits with a
/// leading `0` (national). `0049` folds into `+49`.
fn canonicalize(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    for (i, c) in raw.trim().chars().enumerate() {
        if c.is_ascii_digit() || (c == '+' && i == 0) {
            cleaned.push(c);
        }
    }
    if let Some(rest) = cleaned.strip_prefix("0049") {
        return format!("+49{}", rest.trim_start_matches('0'));
    }
    if let Some(rest) = cleaned.strip_prefix("+490") {
        // Trunk zero never appears after the country code.
        return format!("+49{}", rest);
    }
    cleaned
}

fn national_part(canonical: &str) -> Option<&str> {
    if let Some(rest) = canonical.strip_prefix("+49") {
        Some(rest)
    } else if canonical.starts_with('0') && !canonical.starts_with("00") {
        Some(&canonical[1..])
    } else {
        None
    }
}

fn is_mobile(canonical: &str) -> bool {
    national_part(canonical)
        .map(|n| n.starts_with("15") || n.starts_with("16") || n.starts_with("17"))
        .unwrap_or(false)
}

fn is_munich(canonical: &str) -> bool {
    national_part(canonical)
        .map(|n| n.starts_with("89"))
        .unwrap_or(false)
}

fn area_code(canonical: &str) -> Option<String> {
    let national = national_part(canonical)?;
    if national.starts_with("89") {
        return Some("089".to_string());
    }
    if national.starts_with("15") || national.starts_with("16") || national.starts_with("17") {
        return Some(format!("0{}", &national[..3.min(national.len())]));
    }
    // Big-city two-digit codes, else a three-digit prefix.
    let two: &str = &national[..2.min(national.len())];
    if ["30", "40", "69", "89"].contains(&two) {
        return Some(format!("0{}", two));
    }
    if national.len() >= 3 {
        return Some(format!("0{}", &national[..3]));
    }
    None
}

fn country_code(canonical: &str) -> Option<String> {
    let rest = canonical.strip_prefix('+')?;
    // Country codes are 1-3 digits; 49 is the common case here.
    if rest.starts_with("49") {
        return Some("49".to_string());
    }
    if rest.starts_with('1') {
        return Some("1".to_string());
    }
    Some(rest.chars().take(2).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> DiscoveryContext {
        DiscoveryContext::for_url("https://acme.de/wohnung/42").unwrap()
    }

    #[test]
    fn munich_landline_is_high_confidence() {
        let extractor = PhoneExtractor::new();
        let contacts = extractor.extract("Tel.: 089 12345678", "https://acme.de/anzeige", &ctx());

        assert_eq!(contacts.len(), 1);
        let c = &contacts[0];
        assert_eq!(c.method, ContactMethod::Phone);
        assert_eq!(c.value, "08912345678");
        assert_eq!(c.confidence_level, ConfidenceLevel::High);
        assert_eq!(
            c.metadata.get("area_code"),
            Some(&Value::String("089".into()))
        );
        assert_eq!(c.metadata.get("is_munich"), Some(&Value::Bool(true)));
    }

    #[test]
    fn munich_with_parentheses() {
        let extractor = PhoneExtractor::new();
        let contacts = extractor.extract("(089) 123 4567", "https://acme.de", &ctx());
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].value, "0891234567");
    }

    #[test]
    fn german_mobile_is_tagged() {
        let extractor = PhoneExtractor::new();
        let contacts = extractor.extract("Mobil: 0176 1234 5678", "https://acme.de", &ctx());

        assert_eq!(contacts.len(), 1);
        let c = &contacts[0];
        assert_eq!(c.value, "017612345678");
        assert_eq!(c.confidence_level, ConfidenceLevel::High);
        assert_eq!(c.metadata.get("is_mobile"), Some(&Value::Bool(true)));
    }

    #[test]
    fn international_plus49_folds_trunk_zero() {
        let extractor = PhoneExtractor::new();
        let contacts = extractor.extract("+49 089 1234567", "https://acme.de", &ctx());
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].value, "+49891234567");
        assert_eq!(
            contacts[0].metadata.get("country_code"),
            Some(&Value::String("49".into()))
        );
    }

    #[test]
    fn zero_zero_49_becomes_plus49() {
        let extractor = PhoneExtractor::new();
        let contacts = extractor.extract("0049 89 1234567", "https://acme.de", &ctx());
        assert!(contacts.iter().any(|c| c.value == "+49891234567"));
    }

    #[test]
    fn generic_international_is_medium() {
        let extractor = PhoneExtractor::new();
        let contacts = extractor.extract("+33 1 42 68 53 00", "https://acme.de", &ctx());
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].value, "+33142685300");
        assert_eq!(contacts[0].confidence_level, ConfidenceLevel::Medium);
    }

    #[test]
    fn rejects_too_short_and_too_long() {
        let extractor = PhoneExtractor::new();
        assert!(extractor.extract("0891 23", "https://acme.de", &ctx()).is_empty());
        assert!(extractor
            .extract("+49 1234567890123456789", "https://acme.de", &ctx())
            .is_empty());
    }

    #[test]
    fn rejects_unknown_area_root() {
        let extractor = PhoneExtractor::new();
        // 01 followed by 0: invalid German trunk sequence.
        assert!(extractor
            .extract("00 12345678", "https://acme.de", &ctx())
            .is_empty());
    }

    #[test]
    fn duplicate_formats_collapse() {
        let extractor = PhoneExtractor::new();
        let contacts = extractor.extract(
            "089 12345678 oder 089/12345678",
            "https://acme.de",
            &ctx(),
        );
        assert_eq!(contacts.len(), 1);
    }

    #[test]
    fn obfuscated_text_still_yields_phone() {
        let extractor = PhoneExtractor::new();
        // Normalization collapses whitespace before the patterns run.
        let contacts = extractor.extract("Tel:\n089\t1234567", "https://acme.de", &ctx());
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].value, "0891234567");
    }
}
