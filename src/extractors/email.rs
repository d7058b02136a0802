//! Email extraction with obfuscation handling.
//!
//! Pass order: mailto links in the raw HTML, strict pattern on normalized
//! text, obfuscated spans reconstructed from the raw text, entity-escaped
//! spans. Duplicates collapse onto the highest-confidence observation.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use crate::models::{ConfidenceLevel, Contact, ContactMethod, DiscoveryContext};
use crate::normalize::{contains_entity_obfuscation, contains_obfuscation_marker, normalize_text};

use super::dedupe_contacts;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9][A-Za-z0-9._%+-]*@[A-Za-z0-9][A-Za-z0-9.-]*\.[A-Za-z]{2,}\b")
        .unwrap()
});

// Domain side of an obfuscated address: labels joined by real dots or any
// spelled-out dot marker, ending in a plausible TLD.
const OBFUSCATED_DOMAIN: &str =
    r"((?:[A-Za-z0-9-]+(?:\s*\[dot\]\s*|\s*\(dot\)\s*|\s+dot\s+|\.))+[A-Za-z]{2,})";

static OBFUSCATED_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        format!(
            r"(?i)\b([A-Za-z0-9][A-Za-z0-9._%+-]*)\s*\[at\]\s*{}\b",
            OBFUSCATED_DOMAIN
        ),
        format!(
            r"(?i)\b([A-Za-z0-9][A-Za-z0-9._%+-]*)\s*\(at\)\s*{}\b",
            OBFUSCATED_DOMAIN
        ),
        format!(
            r"(?i)\b([A-Za-z0-9][A-Za-z0-9._%+-]*)\s+at\s+{}\b",
            OBFUSCATED_DOMAIN
        ),
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static ENTITY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b([A-Za-z0-9][A-Za-z0-9._%+-]*)\s*&#64;\s*([A-Za-z0-9.-]+\.[A-Za-z]{2,})\b",
        r"(?i)\b([A-Za-z0-9][A-Za-z0-9._%+-]*)\s*&#64;\s*([A-Za-z0-9.-]+&#46;[A-Za-z]{2,})\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static DOT_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+dot\s+|\s*\[dot\]\s*|\s*\(dot\)\s*").unwrap());

static MAILTO_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href^='mailto:']").unwrap());

/// Hosts that never belong to a reachable party. Single-label hosts and raw
/// IPs are rejected separately.
const INVALID_DOMAINS: [&str; 5] = [
    "example.com",
    "test.com",
    "domain.com",
    "email.com",
    "localhost",
];

const GERMAN_DOMAINS: [&str; 11] = [
    "gmx.de",
    "gmx.net",
    "web.de",
    "t-online.de",
    "freenet.de",
    "yahoo.de",
    "hotmail.de",
    "outlook.de",
    "live.de",
    "gmail.com",
    "googlemail.com",
];

const BUSINESS_DOMAIN_KEYWORDS: [&str; 9] = [
    "immobilien",
    "verwaltung",
    "makler",
    "realtor",
    "estate",
    "property",
    "management",
    "agency",
    "broker",
];

const CONTACT_URL_KEYWORDS: [&str; 6] = ["contact", "kontakt", "impressum", "about", "uber", "team"];

pub struct EmailExtractor;

impl EmailExtractor {
    pub fn new() -> Self {
        EmailExtractor
    }

    /// Extract email contacts from a page. `html` is the raw document (for
    /// mailto anchors and obfuscated spans), `text` its visible text.
    pub fn extract(
        &self,
        html: &str,
        text: &str,
        source_url: &str,
        ctx: &DiscoveryContext,
    ) -> Vec<Contact> {
        let mut contacts = Vec::new();

        if html.to_lowercase().contains("mailto:") {
            contacts.extend(self.extract_mailto(html, source_url, ctx));
        }

        // Obfuscated and entity passes come before the plain rerun so their
        // tags survive dedup when the normalized text yields the same address.
        if contains_obfuscation_marker(text) {
            contacts.extend(self.extract_obfuscated(text, source_url, ctx));
        }
        if contains_entity_obfuscation(html) {
            contacts.extend(self.extract_entity_escaped(html, source_url, ctx));
        }
        let normalized = normalize_text(text);
        contacts.extend(self.extract_standard(&normalized, source_url, ctx));

        let unique = dedupe_contacts(contacts);
        debug!("Extracted {} unique emails from {}", unique.len(), source_url);
        unique
    }

    /// Extract from plain text only (OCR output, PDF text, metadata strings).
    pub fn extract_from_text(
        &self,
        text: &str,
        source_url: &str,
        ctx: &DiscoveryContext,
    ) -> Vec<Contact> {
        let mut contacts = Vec::new();
        if contains_obfuscation_marker(text) {
            contacts.extend(self.extract_obfuscated(text, source_url, ctx));
        }
        let normalized = normalize_text(text);
        contacts.extend(self.extract_standard(&normalized, source_url, ctx));
        dedupe_contacts(contacts)
    }

    fn extract_mailto(
        &self,
        html: &str,
        source_url: &str,
        ctx: &DiscoveryContext,
    ) -> Vec<Contact> {
        let document = Html::parse_document(html);
        let mut contacts = Vec::new();

        for element in document.select(&MAILTO_SELECTOR) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Some(raw) = href.strip_prefix("mailto:") else {
                continue;
            };
            let email = raw.split('?').next().unwrap_or("").trim().to_lowercase();
            if email.is_empty() || !self.is_valid_email(&email) {
                continue;
            }

            let mut contact = Contact::new(
                ContactMethod::Email,
                email,
                ConfidenceLevel::High,
                source_url,
            )
            .with_extraction_method("mailto_link")
            .with_discovery_path(ctx.discovery_path.clone());
            self.annotate(&mut contact, ctx);
            contact.insert_metadata("source_type", Value::String("html_attribute".into()));
            contacts.push(contact);
        }

        contacts
    }

    fn extract_standard(
        &self,
        normalized_text: &str,
        source_url: &str,
        ctx: &DiscoveryContext,
    ) -> Vec<Contact> {
        let mut contacts = Vec::new();

        for m in EMAIL_PATTERN.find_iter(normalized_text) {
            let email = m.as_str().to_lowercase();
            if !self.is_valid_email(&email) {
                continue;
            }

            let confidence = self.determine_confidence(&email, source_url, ctx);
            let mut contact =
                Contact::new(ContactMethod::Email, email, confidence, source_url)
                    .with_extraction_method("standard_pattern")
                    .with_discovery_path(ctx.discovery_path.clone());
            self.annotate(&mut contact, ctx);
            contacts.push(contact);
        }

        contacts
    }

    fn extract_obfuscated(
        &self,
        raw_text: &str,
        source_url: &str,
        ctx: &DiscoveryContext,
    ) -> Vec<Contact> {
        let mut contacts = Vec::new();

        for pattern in OBFUSCATED_PATTERNS.iter() {
            for caps in pattern.captures_iter(raw_text) {
                let local = &caps[1];
                let domain_part = DOT_MARKERS.replace_all(&caps[2], ".");
                let email = format!("{}@{}", local, domain_part)
                    .trim_end_matches(['.', ',', ';', ':', '!', '?'])
                    .to_lowercase();
                if !self.is_valid_email(&email) {
                    continue;
                }

                // Obfuscated reconstructions are capped at medium.
                let mut contact = Contact::new(
                    ContactMethod::Email,
                    email,
                    ConfidenceLevel::Medium,
                    source_url,
                )
                .with_extraction_method("obfuscated_text")
                .with_discovery_path(ctx.discovery_path.clone());
                self.annotate(&mut contact, ctx);
                contact.insert_metadata(
                    "original_text",
                    Value::String(caps[0].trim().to_string()),
                );
                contacts.push(contact);
            }
        }

        contacts
    }

    fn extract_entity_escaped(
        &self,
        raw_html: &str,
        source_url: &str,
        ctx: &DiscoveryContext,
    ) -> Vec<Contact> {
        let mut contacts = Vec::new();

        for pattern in ENTITY_PATTERNS.iter() {
            for caps in pattern.captures_iter(raw_html) {
                let local = &caps[1];
                let domain_part = caps[2].replace("&#46;", ".");
                let email = format!("{}@{}", local, domain_part).to_lowercase();
                if !self.is_valid_email(&email) {
                    continue;
                }

                let mut contact = Contact::new(
                    ContactMethod::Email,
                    email,
                    ConfidenceLevel::Medium,
                    source_url,
                )
                .with_extraction_method("unicode")
                .with_discovery_path(ctx.discovery_path.clone());
                self.annotate(&mut contact, ctx);
                contacts.push(contact);
            }
        }

        contacts
    }

    fn annotate(&self, contact: &mut Contact, ctx: &DiscoveryContext) {
        contact.language = ctx.language.clone();
        contact.cultural_context = ctx.cultural_context.clone();
        if let Some(domain) = contact.domain() {
            contact.insert_metadata(
                "is_german_domain",
                Value::Bool(GERMAN_DOMAINS.contains(&domain.as_str())),
            );
            contact.insert_metadata("domain", Value::String(domain));
        }
    }

    fn is_valid_email(&self, email: &str) -> bool {
        if email.len() > 254 {
            return false;
        }
        let Some((local, domain)) = email.rsplit_once('@') else {
            return false;
        };
        if local.is_empty() || local.len() > 64 {
            return false;
        }
        if local.starts_with('.') || local.ends_with('.') {
            return false;
        }
        if !domain.contains('.') {
            return false;
        }
        let domain = domain.to_lowercase();
        if INVALID_DOMAINS.contains(&domain.as_str()) {
            return false;
        }
        // Raw IPv4 hosts are not contactable mailbox domains.
        if domain
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
        {
            return false;
        }
        let Some(tld) = domain.rsplit('.').next() else {
            return false;
        };
        tld.len() >= 2
    }

    fn determine_confidence(
        &self,
        email: &str,
        source_url: &str,
        ctx: &DiscoveryContext,
    ) -> ConfidenceLevel {
        let url_lower = source_url.to_lowercase();
        if CONTACT_URL_KEYWORDS.iter().any(|k| url_lower.contains(k)) {
            return ConfidenceLevel::High;
        }

        let domain = email.rsplit_once('@').map(|(_, d)| d).unwrap_or("");
        if ctx.cultural_context == "german" && GERMAN_DOMAINS.contains(&domain) {
            return ConfidenceLevel::High;
        }
        if BUSINESS_DOMAIN_KEYWORDS.iter().any(|k| domain.contains(k)) {
            return ConfidenceLevel::High;
        }

        ConfidenceLevel::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> DiscoveryContext {
        DiscoveryContext::for_url("https://acme.de/kontakt").unwrap()
    }

    #[test]
    fn mailto_and_standard_email_on_contact_page() {
        let extractor = EmailExtractor::new();
        let html = r#"<a href="mailto:info@acme.de">write us</a> Support: support@acme.de"#;
        let text = "write us Support: support@acme.de";

        let contacts = extractor.extract(html, text, "https://acme.de/kontakt", &ctx());
        assert_eq!(contacts.len(), 2);

        let mailto = contacts
            .iter()
            .find(|c| c.value == "info@acme.de")
            .expect("mailto contact");
        assert_eq!(mailto.method, ContactMethod::Email);
        assert_eq!(mailto.extraction_method, "mailto_link");
        assert_eq!(mailto.confidence_level, ConfidenceLevel::High);

        let standard = contacts
            .iter()
            .find(|c| c.value == "support@acme.de")
            .expect("standard contact");
        assert_eq!(standard.confidence_level, ConfidenceLevel::High);
    }

    #[test]
    fn mailto_query_string_is_stripped() {
        let extractor = EmailExtractor::new();
        let html = r#"<a href="mailto:info@acme.de?subject=Wohnung">mail</a>"#;
        let contacts = extractor.extract(html, "", "https://acme.de", &ctx());
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].value, "info@acme.de");
    }

    #[test]
    fn obfuscated_email_is_reconstructed_at_medium() {
        let extractor = EmailExtractor::new();
        let text = "reach us at hello [at] acme [dot] de";
        let contacts = extractor.extract("", text, "https://other.example/page", &ctx());

        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].value, "hello@acme.de");
        assert_eq!(contacts[0].extraction_method, "obfuscated_text");
        assert_eq!(contacts[0].confidence_level, ConfidenceLevel::Medium);
    }

    #[test]
    fn word_form_obfuscation() {
        let extractor = EmailExtractor::new();
        let contacts = extractor.extract(
            "",
            "mail me at vermietung at acme dot de thanks",
            "https://other.example/page",
            &ctx(),
        );
        assert!(contacts.iter().any(|c| c.value == "vermietung@acme.de"));
    }

    #[test]
    fn entity_escaped_email_tagged_unicode() {
        let extractor = EmailExtractor::new();
        let html = "Kontakt: info&#64;acme&#46;de";
        let contacts = extractor.extract(html, "", "https://other.example/page", &ctx());

        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].value, "info@acme.de");
        assert_eq!(contacts[0].extraction_method, "unicode");
    }

    #[test]
    fn rejects_placeholder_and_ip_domains() {
        let extractor = EmailExtractor::new();
        assert!(!extractor.is_valid_email("a@example.com"));
        assert!(!extractor.is_valid_email("a@test.com"));
        assert!(!extractor.is_valid_email("a@localhost"));
        assert!(!extractor.is_valid_email("a@192.168.0.1"));
        assert!(!extractor.is_valid_email("a@single"));
        assert!(extractor.is_valid_email("a@acme.de"));
    }

    #[test]
    fn rejects_overlong_addresses() {
        let extractor = EmailExtractor::new();
        let local = "a".repeat(65);
        assert!(!extractor.is_valid_email(&format!("{}@acme.de", local)));
        let long_domain = format!("a@{}.de", "d".repeat(260));
        assert!(!extractor.is_valid_email(&long_domain));
    }

    #[test]
    fn duplicates_collapse_to_best_observation() {
        let extractor = EmailExtractor::new();
        let html = r#"<a href="mailto:info@acme.de">mail</a> info@acme.de"#;
        let text = "info@acme.de";
        let contacts = extractor.extract(html, text, "https://other.example/page", &ctx());

        assert_eq!(contacts.len(), 1);
        // The mailto observation wins over the standard-pattern one.
        assert_eq!(contacts[0].extraction_method, "mailto_link");
        assert_eq!(contacts[0].confidence_level, ConfidenceLevel::High);
    }

    #[test]
    fn german_provider_domain_is_high_in_german_context() {
        let extractor = EmailExtractor::new();
        let contacts = extractor.extract(
            "",
            "schreiben sie an mieter@gmx.de",
            "https://other.example/listing",
            &ctx(),
        );
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].confidence_level, ConfidenceLevel::High);
        assert_eq!(
            contacts[0].metadata.get("is_german_domain"),
            Some(&Value::Bool(true))
        );
    }
}
