//! Multi-factor confidence scoring for discovered contacts.
//!
//! Seven factors in [0,1] combine as a dot product with weights summing to
//! 1.0. `explain` exposes each factor's weighted contribution so reviewers
//! can see why a contact was rated the way it was.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;
use url::Url;

use crate::models::{
    ConfidenceLevel, Contact, ContactForm, ContactMethod, ContactStatus, SocialMediaPlatform,
    SocialMediaProfile,
};

const WEIGHT_FORMAT: f64 = 0.25;
const WEIGHT_DOMAIN: f64 = 0.20;
const WEIGHT_CONTEXT: f64 = 0.20;
const WEIGHT_EXTRACTION: f64 = 0.15;
const WEIGHT_CULTURAL: f64 = 0.10;
const WEIGHT_VERIFICATION: f64 = 0.05;
const WEIGHT_HISTORY: f64 = 0.05;

static DOMAIN_REPUTATION: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        // German consumer providers
        ("gmx.de", 0.9),
        ("gmx.net", 0.9),
        ("web.de", 0.9),
        ("t-online.de", 0.9),
        ("freenet.de", 0.8),
        ("yahoo.de", 0.8),
        ("hotmail.de", 0.8),
        ("outlook.de", 0.8),
        // International providers
        ("gmail.com", 0.7),
        ("googlemail.com", 0.7),
        ("yahoo.com", 0.6),
        ("hotmail.com", 0.6),
        ("outlook.com", 0.6),
        ("live.com", 0.6),
    ])
});

static EXTRACTION_METHOD_SCORES: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("mailto_link", 0.95),
        ("standard_pattern", 0.8),
        ("obfuscated_text", 0.7),
        ("unicode", 0.7),
        ("ocr", 0.6),
        ("pdf", 0.7),
        ("social_media", 0.75),
        ("form_detection", 0.65),
    ])
});

const REAL_ESTATE_PATH_KEYWORDS: [&str; 10] = [
    "immobilien",
    "wohnung",
    "miete",
    "vermietung",
    "kaufen",
    "property",
    "apartment",
    "rent",
    "sale",
    "real-estate",
];

const CONTACT_PATH_KEYWORDS: [&str; 4] = ["kontakt", "contact", "impressum", "about"];

const BUSINESS_DOMAIN_KEYWORDS: [&str; 5] =
    ["immobilien", "verwaltung", "makler", "realtor", "estate"];

const SUSPICIOUS_LOCAL_PARTS: [&str; 5] = ["noreply", "no-reply", "donotreply", "test", "example"];

const SUSPICIOUS_TLDS: [&str; 4] = [".tk", ".ml", ".ga", ".cf"];

const GERMAN_PROVIDER_DOMAINS: [&str; 5] =
    ["gmx.de", "gmx.net", "web.de", "t-online.de", "freenet.de"];

/// Context bag passed alongside contacts; derived from the discovery context.
#[derive(Debug, Clone, Default)]
pub struct ScoringContext {
    pub cultural_context: String,
    pub language: String,
    pub source_domain: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScoringFactors {
    pub format_validity: f64,
    pub domain_reputation: f64,
    pub contextual_relevance: f64,
    pub extraction_method: f64,
    pub cultural_fit: f64,
    pub verification_status: f64,
    pub historical_performance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FactorContribution {
    pub factor: &'static str,
    pub score: f64,
    pub weight: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoringExplanation {
    pub final_score: f64,
    pub confidence_level: ConfidenceLevel,
    pub factors: Vec<FactorContribution>,
    pub recommendations: Vec<String>,
}

pub struct ContactScoringEngine;

impl ContactScoringEngine {
    pub fn new() -> Self {
        ContactScoringEngine
    }

    /// Final confidence in [0,1] for one contact.
    pub fn score_contact(&self, contact: &Contact, ctx: &ScoringContext) -> f64 {
        let factors = self.factors(contact, ctx);
        combine(&factors)
    }

    /// Batch scoring is per-item scoring with a shared context.
    pub fn score_batch(&self, contacts: &[Contact], ctx: &ScoringContext) -> Vec<f64> {
        contacts.iter().map(|c| self.score_contact(c, ctx)).collect()
    }

    pub fn explain(&self, contact: &Contact, ctx: &ScoringContext) -> ScoringExplanation {
        let factors = self.factors(contact, ctx);
        let final_score = combine(&factors);

        let table = [
            ("format_validity", factors.format_validity, WEIGHT_FORMAT),
            ("domain_reputation", factors.domain_reputation, WEIGHT_DOMAIN),
            (
                "contextual_relevance",
                factors.contextual_relevance,
                WEIGHT_CONTEXT,
            ),
            (
                "extraction_method",
                factors.extraction_method,
                WEIGHT_EXTRACTION,
            ),
            ("cultural_fit", factors.cultural_fit, WEIGHT_CULTURAL),
            (
                "verification_status",
                factors.verification_status,
                WEIGHT_VERIFICATION,
            ),
            (
                "historical_performance",
                factors.historical_performance,
                WEIGHT_HISTORY,
            ),
        ];

        ScoringExplanation {
            final_score,
            confidence_level: ConfidenceLevel::from_score(final_score),
            factors: table
                .iter()
                .map(|&(name, score, weight)| FactorContribution {
                    factor: name,
                    score,
                    weight,
                    contribution: score * weight,
                })
                .collect(),
            recommendations: recommendations(&factors),
        }
    }

    /// Contact-form quality score, independent of the factor table.
    pub fn score_form(&self, form: &ContactForm) -> f64 {
        let mut score: f64 = 0.5;

        if form.has_email_field() && form.has_message_field() {
            score += 0.3;
        } else if form.has_email_field() {
            score += 0.2;
        }

        score -= form.complexity_score * 0.2;
        score += form.user_friendly_score * 0.2;

        let field_count = form.fields.len();
        if (3..=5).contains(&field_count) {
            score += 0.1;
        } else if field_count > 8 {
            score -= 0.1;
        }

        if form.csrf_token.is_some() {
            score += 0.05;
        }

        score.clamp(0.0, 1.0)
    }

    /// Social-profile quality score from a platform base table.
    pub fn score_social_profile(&self, profile: &SocialMediaProfile) -> f64 {
        let mut score: f64 = match profile.platform {
            SocialMediaPlatform::Linkedin | SocialMediaPlatform::Xing => 0.9,
            SocialMediaPlatform::Whatsapp => 0.8,
            SocialMediaPlatform::Facebook | SocialMediaPlatform::Telegram => 0.7,
            SocialMediaPlatform::Instagram | SocialMediaPlatform::Twitter => 0.6,
        };

        if profile.is_business_profile() {
            score += 0.1;
        }

        let username = profile.username.to_lowercase();
        for term in ["immobilien", "verwaltung", "makler", "property", "realty"] {
            if username.contains(term) {
                score += 0.1;
            }
        }
        for indicator in ["123", "xxx", "spam", "test"] {
            if username.contains(indicator) {
                score -= 0.1;
            }
        }

        score.clamp(0.0, 1.0)
    }

    fn factors(&self, contact: &Contact, ctx: &ScoringContext) -> ScoringFactors {
        ScoringFactors {
            format_validity: format_validity(contact),
            domain_reputation: domain_reputation(contact, ctx),
            contextual_relevance: contextual_relevance(contact),
            extraction_method: EXTRACTION_METHOD_SCORES
                .get(contact.extraction_method.as_str())
                .copied()
                .unwrap_or(0.5),
            cultural_fit: cultural_fit(contact, ctx),
            verification_status: verification_status(contact),
            // Reserved until a history table exists.
            historical_performance: 0.5,
        }
    }
}

fn combine(factors: &ScoringFactors) -> f64 {
    let weighted = factors.format_validity * WEIGHT_FORMAT
        + factors.domain_reputation * WEIGHT_DOMAIN
        + factors.contextual_relevance * WEIGHT_CONTEXT
        + factors.extraction_method * WEIGHT_EXTRACTION
        + factors.cultural_fit * WEIGHT_CULTURAL
        + factors.verification_status * WEIGHT_VERIFICATION
        + factors.historical_performance * WEIGHT_HISTORY;
    weighted.clamp(0.0, 1.0)
}

fn format_validity(contact: &Contact) -> f64 {
    match contact.method {
        ContactMethod::Email | ContactMethod::Mailto => email_format(&contact.value),
        ContactMethod::Phone => phone_format(&contact.value),
        ContactMethod::Website | ContactMethod::Form => url_format(&contact.value),
        ContactMethod::SocialMedia => social_format(&contact.value),
        _ => 0.5,
    }
}

fn email_format(email: &str) -> f64 {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return 0.1;
    };
    if email.len() > 254 || local.len() > 64 {
        return 0.2;
    }
    if local.is_empty() || local.starts_with('.') || local.ends_with('.') {
        return 0.3;
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return 0.3;
    }
    if SUSPICIOUS_LOCAL_PARTS.iter().any(|p| local.contains(p)) {
        return 0.4;
    }
    if !local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c))
    {
        return 0.4;
    }
    if SUSPICIOUS_TLDS.iter().any(|tld| domain.ends_with(tld)) {
        return 0.6;
    }
    1.0
}

fn phone_format(phone: &str) -> f64 {
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    if !(8..=15).contains(&digits) {
        return 0.2;
    }
    let national = if let Some(rest) = phone.strip_prefix("+49") {
        Some(rest)
    } else if phone.starts_with('0') && !phone.starts_with("00") {
        Some(&phone[1..])
    } else {
        None
    };
    match national {
        Some(n) if n.starts_with("89") => 0.95,
        Some(_) => 0.9,
        None if phone.starts_with('+') => 0.7,
        None => 0.5,
    }
}

fn url_format(value: &str) -> f64 {
    let Ok(parsed) = Url::parse(value) else {
        return 0.2;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return 0.3;
    }
    let Some(host) = parsed.host_str() else {
        return 0.2;
    };
    if !host.contains('.') {
        return 0.3;
    }
    if SUSPICIOUS_TLDS.iter().any(|tld| host.ends_with(tld)) {
        return 0.4;
    }
    0.85
}

fn social_format(value: &str) -> f64 {
    let Ok(parsed) = Url::parse(value) else {
        return 0.2;
    };
    let Some(host) = parsed.host_str() else {
        return 0.2;
    };
    let path = parsed.path();
    let known = [
        ("facebook.com", "/"),
        ("instagram.com", "/"),
        ("twitter.com", "/"),
        ("linkedin.com", "/in/"),
        ("xing.com", "/profile/"),
        ("wa.me", "/"),
        ("t.me", "/"),
    ];
    for (domain, prefix) in known {
        if host.ends_with(domain) {
            return if path.starts_with(prefix) && path.len() > prefix.len() {
                0.9
            } else {
                0.4
            };
        }
    }
    0.6
}

fn domain_reputation(contact: &Contact, ctx: &ScoringContext) -> f64 {
    let Some(domain) = contact.domain() else {
        return 0.5;
    };

    if let Some(score) = DOMAIN_REPUTATION.get(domain.as_str()) {
        return *score;
    }
    // Subdomain of a known provider scores slightly below the parent.
    for (known, score) in DOMAIN_REPUTATION.iter() {
        if domain.ends_with(&format!(".{}", known)) {
            return score * 0.9;
        }
    }
    if BUSINESS_DOMAIN_KEYWORDS.iter().any(|k| domain.contains(k)) {
        return 0.85;
    }
    // A contact hosted on the listing's own domain is the party we are
    // looking for; trust it accordingly.
    if !ctx.source_domain.is_empty() {
        let source = ctx.source_domain.trim_start_matches("www.");
        if domain == source || domain.ends_with(&format!(".{}", source)) {
            return 0.9;
        }
    }
    0.6
}

fn contextual_relevance(contact: &Contact) -> f64 {
    let mut score: f64 = 0.5;

    if let Ok(parsed) = Url::parse(&contact.source_url) {
        let path = parsed.path().to_lowercase();
        for keyword in REAL_ESTATE_PATH_KEYWORDS {
            if path.contains(keyword) {
                score += 0.2;
            }
        }
        for keyword in CONTACT_PATH_KEYWORDS {
            if path.contains(keyword) {
                score += 0.15;
            }
        }
    }

    if contact.discovery_path.iter().any(|url| {
        let lower = url.to_lowercase();
        CONTACT_PATH_KEYWORDS.iter().any(|k| lower.contains(k))
    }) {
        score += 0.1;
    }

    score.min(1.0)
}

fn cultural_fit(contact: &Contact, ctx: &ScoringContext) -> f64 {
    let mut score: f64 = 0.5;

    if ctx.cultural_context == "german" {
        match contact.method {
            ContactMethod::Email | ContactMethod::Mailto => {
                if let Some(domain) = contact.domain() {
                    if GERMAN_PROVIDER_DOMAINS.iter().any(|d| domain == *d) {
                        score += 0.3;
                    } else if domain.ends_with(".de") {
                        score += 0.4;
                    }
                }
            }
            ContactMethod::Phone => {
                let value = &contact.value;
                let national = value
                    .strip_prefix("+49")
                    .or_else(|| value.strip_prefix('0').filter(|_| !value.starts_with("00")));
                if national.map(|n| n.starts_with("89")).unwrap_or(false) {
                    score += 0.4;
                } else if value.starts_with("+49") || value.starts_with('0') {
                    score += 0.3;
                }
            }
            ContactMethod::SocialMedia => {
                if contact.value.contains("xing.com") {
                    score += 0.3;
                }
            }
            _ => {}
        }
    }

    if ctx.language == "de" && contact.language == "de" {
        score += 0.2;
    }

    score.min(1.0)
}

fn verification_status(contact: &Contact) -> f64 {
    match contact.verification_status {
        ContactStatus::Verified => 1.0,
        ContactStatus::Unverified => 0.6,
        ContactStatus::Suspicious => 0.3,
        ContactStatus::Flagged => 0.2,
        ContactStatus::Invalid => 0.1,
    }
}

fn recommendations(factors: &ScoringFactors) -> Vec<String> {
    let mut out = Vec::new();
    if factors.format_validity < 0.5 {
        out.push("Format validation weak: the value has syntax issues".to_string());
    }
    if factors.domain_reputation < 0.5 {
        out.push("Domain has low reputation; verify before outreach".to_string());
    }
    if factors.contextual_relevance < 0.5 {
        out.push("Low contextual relevance; contact may not be business-related".to_string());
    }
    if factors.extraction_method < 0.5 {
        out.push("Extraction method is unreliable for this value".to_string());
    }
    if factors.cultural_fit < 0.5 {
        out.push("Contact may not fit the target market".to_string());
    }
    if factors.verification_status < 0.5 {
        out.push("Verification failed or flagged; review before use".to_string());
    }
    if out.is_empty() {
        out.push("Contact quality appears good".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Contact;

    fn german_ctx() -> ScoringContext {
        ScoringContext {
            cultural_context: "german".into(),
            language: "de".into(),
            source_domain: "acme.de".into(),
        }
    }

    fn mailto_contact() -> Contact {
        Contact::new(
            ContactMethod::Email,
            "info@acme.de",
            ConfidenceLevel::High,
            "https://acme.de/kontakt",
        )
        .with_extraction_method("mailto_link")
        .with_discovery_path(vec!["https://acme.de/kontakt".into()])
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let engine = ContactScoringEngine::new();
        let contacts = [
            mailto_contact(),
            Contact::new(
                ContactMethod::Phone,
                "08912345678",
                ConfidenceLevel::High,
                "https://acme.de",
            ),
            Contact::new(
                ContactMethod::Email,
                "x@y.tk",
                ConfidenceLevel::Low,
                "https://spam.example",
            ),
        ];
        for c in &contacts {
            let score = engine.score_contact(c, &german_ctx());
            assert!((0.0..=1.0).contains(&score), "score out of range: {}", score);
        }
    }

    #[test]
    fn mailto_on_contact_page_reaches_high_band() {
        let engine = ContactScoringEngine::new();
        let score = engine.score_contact(&mailto_contact(), &german_ctx());
        assert!(score >= 0.85, "mailto score too low: {}", score);
        assert_eq!(ConfidenceLevel::from_score(score), ConfidenceLevel::High);
    }

    #[test]
    fn standard_pattern_on_contact_page_is_high() {
        let engine = ContactScoringEngine::new();
        let contact = Contact::new(
            ContactMethod::Email,
            "support@acme.de",
            ConfidenceLevel::High,
            "https://acme.de/kontakt",
        )
        .with_discovery_path(vec!["https://acme.de/kontakt".into()]);
        let score = engine.score_contact(&contact, &german_ctx());
        assert!(score >= 0.8, "standard score too low: {}", score);
    }

    #[test]
    fn verified_contact_outscores_invalid_twin() {
        let engine = ContactScoringEngine::new();
        let mut verified = mailto_contact();
        verified.verification_status = ContactStatus::Verified;
        let mut invalid = mailto_contact();
        invalid.verification_status = ContactStatus::Invalid;

        let ctx = german_ctx();
        assert!(engine.score_contact(&verified, &ctx) > engine.score_contact(&invalid, &ctx));
    }

    #[test]
    fn suspicious_local_part_drags_format_down() {
        assert!(email_format("noreply@acme.de") < email_format("info@acme.de"));
        assert_eq!(email_format("info@acme.de"), 1.0);
        assert!(email_format("bad..@") <= 0.3);
    }

    #[test]
    fn munich_phone_format_peaks() {
        assert_eq!(phone_format("08912345678"), 0.95);
        assert_eq!(phone_format("+498912345678"), 0.95);
        assert!(phone_format("03012345678") < phone_format("08912345678"));
        assert_eq!(phone_format("123"), 0.2);
    }

    #[test]
    fn suspicious_tld_penalized_in_url_format() {
        assert!(url_format("https://acme.tk/contact") < url_format("https://acme.de/contact"));
    }

    #[test]
    fn ocr_extraction_scores_below_mailto() {
        let engine = ContactScoringEngine::new();
        let mailto = mailto_contact();
        let ocr = mailto_contact().with_extraction_method("ocr");
        let ctx = german_ctx();
        assert!(engine.score_contact(&mailto, &ctx) > engine.score_contact(&ocr, &ctx));
    }

    #[test]
    fn explain_accounts_for_full_score() {
        let engine = ContactScoringEngine::new();
        let explanation = engine.explain(&mailto_contact(), &german_ctx());

        let weight_sum: f64 = explanation.factors.iter().map(|f| f.weight).sum();
        assert!((weight_sum - 1.0).abs() < 1e-9);

        let contribution_sum: f64 = explanation.factors.iter().map(|f| f.contribution).sum();
        assert!((contribution_sum - explanation.final_score).abs() < 1e-9);
        assert!(!explanation.recommendations.is_empty());
    }

    #[test]
    fn recommendations_name_weak_factors() {
        let factors = ScoringFactors {
            format_validity: 0.2,
            domain_reputation: 0.9,
            contextual_relevance: 0.9,
            extraction_method: 0.9,
            cultural_fit: 0.9,
            verification_status: 0.9,
            historical_performance: 0.5,
        };
        let recs = recommendations(&factors);
        assert_eq!(recs.len(), 1);
        assert!(recs[0].contains("Format"));
    }

    #[test]
    fn batch_scoring_matches_single_scoring() {
        let engine = ContactScoringEngine::new();
        let contacts = vec![mailto_contact(), mailto_contact()];
        let ctx = german_ctx();
        let batch = engine.score_batch(&contacts, &ctx);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], engine.score_contact(&contacts[0], &ctx));
        assert_eq!(batch[0], batch[1]);
    }

    #[test]
    fn form_scoring_rewards_simple_friendly_forms() {
        let engine = ContactScoringEngine::new();
        let simple = ContactForm {
            action_url: "https://acme.de/send".into(),
            method: "POST".into(),
            fields: vec!["name".into(), "email".into(), "message".into()],
            required_fields: vec!["email".into()],
            csrf_token: Some("T".into()),
            source_url: "https://acme.de/kontakt".into(),
            confidence: ConfidenceLevel::High,
            complexity_score: 0.2,
            user_friendly_score: 0.9,
            metadata: Default::default(),
        };
        let bloated = ContactForm {
            fields: (0..12).map(|i| format!("f{}", i)).collect(),
            required_fields: (0..9).map(|i| format!("f{}", i)).collect(),
            csrf_token: None,
            complexity_score: 0.9,
            user_friendly_score: 0.3,
            ..simple.clone()
        };

        let s1 = engine.score_form(&simple);
        let s2 = engine.score_form(&bloated);
        assert!(s1 > s2);
        assert!((0.0..=1.0).contains(&s1));
        assert!((0.0..=1.0).contains(&s2));
    }

    #[test]
    fn xing_profile_outranks_instagram() {
        let engine = ContactScoringEngine::new();
        let xing = SocialMediaProfile {
            platform: SocialMediaPlatform::Xing,
            username: "max_mustermann".into(),
            profile_url: "https://xing.com/profile/max_mustermann".into(),
            display_name: None,
            source_url: "https://acme.de".into(),
            confidence: ConfidenceLevel::High,
            metadata: Default::default(),
        };
        let insta = SocialMediaProfile {
            platform: SocialMediaPlatform::Instagram,
            username: "max123".into(),
            profile_url: "https://instagram.com/max123".into(),
            ..xing.clone()
        };
        assert!(engine.score_social_profile(&xing) > engine.score_social_profile(&insta));
    }
}
