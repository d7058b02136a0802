//! Core data model for contact discovery.
//!
//! A `Contact` is any observed way of reaching a party (email, phone, form,
//! social profile, ...). Forms and social profiles have richer dedicated
//! types and convert into `Contact` for the common pipeline stages.

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactMethod {
    Email,
    Phone,
    Form,
    Website,
    Mailto,
    SocialMedia,
    Address,
}

impl ContactMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactMethod::Email => "email",
            ContactMethod::Phone => "phone",
            ContactMethod::Form => "form",
            ContactMethod::Website => "website",
            ContactMethod::Mailto => "mailto",
            ContactMethod::SocialMedia => "social_media",
            ContactMethod::Address => "address",
        }
    }
}

impl FromStr for ContactMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(ContactMethod::Email),
            "phone" => Ok(ContactMethod::Phone),
            "form" => Ok(ContactMethod::Form),
            "website" => Ok(ContactMethod::Website),
            "mailto" => Ok(ContactMethod::Mailto),
            "social_media" => Ok(ContactMethod::SocialMedia),
            "address" => Ok(ContactMethod::Address),
            other => Err(format!("unknown contact method: {}", other)),
        }
    }
}

/// Coarse confidence bucket, derived from the numeric score at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    Uncertain,
}

impl ConfidenceLevel {
    /// Rank for threshold comparisons (higher is better).
    pub fn rank(&self) -> u8 {
        match self {
            ConfidenceLevel::High => 4,
            ConfidenceLevel::Medium => 3,
            ConfidenceLevel::Low => 2,
            ConfidenceLevel::Uncertain => 1,
        }
    }

    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ConfidenceLevel::High
        } else if score >= 0.6 {
            ConfidenceLevel::Medium
        } else if score >= 0.4 {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::Uncertain
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Uncertain => "uncertain",
        }
    }
}

impl FromStr for ConfidenceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(ConfidenceLevel::High),
            "medium" => Ok(ConfidenceLevel::Medium),
            "low" => Ok(ConfidenceLevel::Low),
            "uncertain" => Ok(ConfidenceLevel::Uncertain),
            other => Err(format!("unknown confidence level: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    Unverified,
    Verified,
    Invalid,
    Suspicious,
    Flagged,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::Unverified => "unverified",
            ContactStatus::Verified => "verified",
            ContactStatus::Invalid => "invalid",
            ContactStatus::Suspicious => "suspicious",
            ContactStatus::Flagged => "flagged",
        }
    }
}

impl FromStr for ContactStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unverified" => Ok(ContactStatus::Unverified),
            "verified" => Ok(ContactStatus::Verified),
            "invalid" => Ok(ContactStatus::Invalid),
            "suspicious" => Ok(ContactStatus::Suspicious),
            "flagged" => Ok(ContactStatus::Flagged),
            other => Err(format!("unknown contact status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialMediaPlatform {
    Facebook,
    Instagram,
    Twitter,
    Linkedin,
    Whatsapp,
    Telegram,
    Xing,
}

impl SocialMediaPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            SocialMediaPlatform::Facebook => "facebook",
            SocialMediaPlatform::Instagram => "instagram",
            SocialMediaPlatform::Twitter => "twitter",
            SocialMediaPlatform::Linkedin => "linkedin",
            SocialMediaPlatform::Whatsapp => "whatsapp",
            SocialMediaPlatform::Telegram => "telegram",
            SocialMediaPlatform::Xing => "xing",
        }
    }
}

/// Extraction families that can be toggled per run. OCR and PDF are opt-in
/// feature flags declared at engine construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    Email,
    Phone,
    Form,
    SocialMedia,
    Ocr,
    Pdf,
}

impl FromStr for ExtractorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(ExtractorKind::Email),
            "phone" => Ok(ExtractorKind::Phone),
            "form" => Ok(ExtractorKind::Form),
            "social_media" => Ok(ExtractorKind::SocialMedia),
            "ocr" => Ok(ExtractorKind::Ocr),
            "pdf" => Ok(ExtractorKind::Pdf),
            other => Err(format!("unknown extractor kind: {}", other)),
        }
    }
}

/// A discovered contact channel with provenance and confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub method: ContactMethod,
    pub value: String,
    pub confidence_level: ConfidenceLevel,
    pub confidence_score: f64,
    pub source_url: String,
    pub discovery_path: Vec<String>,
    pub extraction_method: String,
    pub verification_status: ContactStatus,
    pub language: String,
    pub cultural_context: String,
    pub metadata: Map<String, Value>,
    pub observed_at: DateTime<Utc>,
}

impl Contact {
    pub fn new(
        method: ContactMethod,
        value: impl Into<String>,
        confidence_level: ConfidenceLevel,
        source_url: impl Into<String>,
    ) -> Self {
        let value = normalize_value(method, &value.into());
        Contact {
            method,
            value,
            confidence_level,
            confidence_score: 0.0,
            source_url: source_url.into(),
            discovery_path: Vec::new(),
            extraction_method: "standard_pattern".to_string(),
            verification_status: ContactStatus::Unverified,
            language: "unknown".to_string(),
            cultural_context: "general".to_string(),
            metadata: Map::new(),
            observed_at: Utc::now(),
        }
    }

    pub fn with_extraction_method(mut self, method: impl Into<String>) -> Self {
        self.extraction_method = method.into();
        self
    }

    pub fn with_discovery_path(mut self, path: Vec<String>) -> Self {
        self.discovery_path = path;
        self
    }

    pub fn insert_metadata(&mut self, key: &str, value: Value) {
        self.metadata.insert(key.to_string(), value);
    }

    /// Observation-level dedup key: 16 hex chars of SHA-256 over
    /// `method:value:source_url`. Not a persistence key.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}:{}:{}",
            self.method.as_str(),
            self.value,
            self.source_url
        ));
        let digest = hasher.finalize();
        hex_prefix(&digest, 16)
    }

    /// Domain derivable from the value alone: email RHS or URL host.
    pub fn domain(&self) -> Option<String> {
        match self.method {
            ContactMethod::Email | ContactMethod::Mailto => {
                self.value.rsplit_once('@').map(|(_, d)| d.to_lowercase())
            }
            ContactMethod::Website | ContactMethod::Form | ContactMethod::SocialMedia => {
                Url::parse(&self.value)
                    .ok()
                    .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            }
            _ => None,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.verification_status == ContactStatus::Verified
    }
}

fn normalize_value(method: ContactMethod, value: &str) -> String {
    match method {
        ContactMethod::Email | ContactMethod::Mailto => value.trim().to_lowercase(),
        ContactMethod::Phone => {
            let trimmed = value.trim();
            let mut out = String::with_capacity(trimmed.len());
            for (i, c) in trimmed.chars().enumerate() {
                if c.is_ascii_digit() || (c == '+' && i == 0) {
                    out.push(c);
                }
            }
            out
        }
        ContactMethod::Website => {
            let v = value.trim();
            if v.starts_with("http://") || v.starts_with("https://") {
                v.to_string()
            } else {
                format!("https://{}", v)
            }
        }
        _ => value.trim().to_string(),
    }
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(chars + 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
        if out.len() >= chars {
            break;
        }
    }
    out.truncate(chars);
    out
}

/// Stable signature for cross-run/cross-listing grouping:
/// SHA-256 over `method:value:domain`.
pub fn hash_signature(method: ContactMethod, value: &str, domain: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}", method.as_str(), value, domain));
    let digest = hasher.finalize();
    hex_prefix(&digest, 32)
}

/// A contact form found on a page, with usability analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactForm {
    pub action_url: String,
    pub method: String,
    pub fields: Vec<String>,
    pub required_fields: Vec<String>,
    pub csrf_token: Option<String>,
    pub source_url: String,
    pub confidence: ConfidenceLevel,
    pub complexity_score: f64,
    pub user_friendly_score: f64,
    pub metadata: Map<String, Value>,
}

impl ContactForm {
    pub fn has_email_field(&self) -> bool {
        self.fields.iter().any(|f| {
            matches!(
                f.to_lowercase().as_str(),
                "email" | "e-mail" | "mail" | "e_mail" | "email_address"
            )
        })
    }

    pub fn has_message_field(&self) -> bool {
        self.fields.iter().any(|f| {
            let f = f.to_lowercase();
            ["message", "nachricht", "comment", "text", "body"]
                .iter()
                .any(|m| f.contains(m))
        })
    }

    pub fn to_contact(&self) -> Contact {
        let mut contact = Contact::new(
            ContactMethod::Form,
            self.action_url.clone(),
            self.confidence,
            self.source_url.clone(),
        )
        .with_extraction_method("form_detection");
        contact.insert_metadata("http_method", Value::String(self.method.clone()));
        contact.insert_metadata(
            "fields",
            Value::Array(self.fields.iter().cloned().map(Value::String).collect()),
        );
        contact.insert_metadata(
            "required_fields",
            Value::Array(
                self.required_fields
                    .iter()
                    .cloned()
                    .map(Value::String)
                    .collect(),
            ),
        );
        if let Some(token) = &self.csrf_token {
            contact.insert_metadata("csrf_token", Value::String(token.clone()));
        }
        contact.insert_metadata("complexity_score", json_f64(self.complexity_score));
        contact.insert_metadata("user_friendly_score", json_f64(self.user_friendly_score));
        for (k, v) in &self.metadata {
            contact.metadata.insert(k.clone(), v.clone());
        }
        contact
    }
}

/// A social media profile link found during extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialMediaProfile {
    pub platform: SocialMediaPlatform,
    pub username: String,
    pub profile_url: String,
    pub display_name: Option<String>,
    pub source_url: String,
    pub confidence: ConfidenceLevel,
    pub metadata: Map<String, Value>,
}

const BUSINESS_NAME_KEYWORDS: [&str; 10] = [
    "immobilien",
    "verwaltung",
    "makler",
    "realtor",
    "estate",
    "property",
    "management",
    "agency",
    "broker",
    "realty",
];

impl SocialMediaProfile {
    pub fn is_business_profile(&self) -> bool {
        let haystack = format!(
            "{} {}",
            self.username,
            self.display_name.as_deref().unwrap_or("")
        )
        .to_lowercase();
        BUSINESS_NAME_KEYWORDS.iter().any(|k| haystack.contains(k))
    }

    pub fn to_contact(&self) -> Contact {
        let mut contact = Contact::new(
            ContactMethod::SocialMedia,
            self.profile_url.clone(),
            self.confidence,
            self.source_url.clone(),
        )
        .with_extraction_method("social_media");
        contact.insert_metadata(
            "platform",
            Value::String(self.platform.as_str().to_string()),
        );
        contact.insert_metadata("username", Value::String(self.username.clone()));
        if let Some(name) = &self.display_name {
            contact.insert_metadata("display_name", Value::String(name.clone()));
        }
        contact.insert_metadata(
            "is_business_profile",
            Value::Bool(self.is_business_profile()),
        );
        for (k, v) in &self.metadata {
            contact.metadata.insert(k.clone(), v.clone());
        }
        contact
    }
}

/// Immutable per-run settings for a discovery crawl.
#[derive(Debug, Clone)]
pub struct DiscoveryContext {
    pub seed_url: String,
    pub domain: String,
    pub allowed_domains: Vec<String>,
    pub max_depth: u32,
    pub current_depth: u32,
    pub respect_robots: bool,
    pub timeout: Duration,
    pub user_agent: String,
    pub language: String,
    pub cultural_context: String,
    pub enabled_extractors: HashSet<ExtractorKind>,
    pub confidence_threshold: ConfidenceLevel,
    pub discovery_path: Vec<String>,
}

impl DiscoveryContext {
    /// Build a context for a seed URL; the allowed-domain set defaults to the
    /// seed's own host.
    pub fn for_url(url: &str) -> crate::error::Result<Self> {
        let parsed = Url::parse(url).map_err(|e| crate::error::ScoutError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let domain = parsed
            .host_str()
            .ok_or_else(|| crate::error::ScoutError::InvalidUrl {
                url: url.to_string(),
                reason: "URL has no host".to_string(),
            })?
            .to_lowercase();

        Ok(DiscoveryContext {
            seed_url: url.to_string(),
            domain: domain.clone(),
            allowed_domains: vec![domain],
            max_depth: 2,
            current_depth: 0,
            respect_robots: true,
            timeout: Duration::from_secs(30),
            user_agent: "ContactScout/1.0".to_string(),
            language: "de".to_string(),
            cultural_context: "german".to_string(),
            enabled_extractors: default_extractors(),
            confidence_threshold: ConfidenceLevel::Low,
            discovery_path: vec![url.to_string()],
        })
    }

    pub fn can_crawl_deeper(&self) -> bool {
        self.current_depth < self.max_depth
    }

    pub fn is_allowed_domain(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        self.allowed_domains.iter().any(|d| *d == host)
    }

    pub fn extractor_enabled(&self, kind: ExtractorKind) -> bool {
        self.enabled_extractors.contains(&kind)
    }
}

pub fn default_extractors() -> HashSet<ExtractorKind> {
    [
        ExtractorKind::Email,
        ExtractorKind::Phone,
        ExtractorKind::Form,
        ExtractorKind::SocialMedia,
    ]
    .into_iter()
    .collect()
}

/// Explicit option record for a discovery request; replaces the loose option
/// bags of earlier revisions. Unknown config keys are rejected at parse time.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub enable_crawling: bool,
    pub enable_validation: bool,
    pub methods: HashSet<ExtractorKind>,
    pub confidence_threshold: ConfidenceLevel,
    pub language: String,
    pub cultural_context: String,
    pub max_depth: u32,
    pub timeout: Duration,
    pub rate_limit: Duration,
    pub respect_robots: bool,
    pub user_agent: String,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        DiscoveryOptions {
            enable_crawling: true,
            enable_validation: true,
            methods: default_extractors(),
            confidence_threshold: ConfidenceLevel::Low,
            language: "de".to_string(),
            cultural_context: "german".to_string(),
            max_depth: 2,
            timeout: Duration::from_secs(30),
            rate_limit: Duration::from_secs(1),
            respect_robots: true,
            user_agent: "ContactScout/1.0".to_string(),
        }
    }
}

/// One validation attempt against a contact. Append-only in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub validation_method: String,
    pub is_valid: bool,
    pub confidence: f64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metadata: Map<String, Value>,
    pub validated_at: DateTime<Utc>,
}

impl ValidationRecord {
    pub fn new(method: impl Into<String>, is_valid: bool, confidence: f64) -> Self {
        ValidationRecord {
            validation_method: method.into(),
            is_valid,
            confidence,
            errors: Vec::new(),
            warnings: Vec::new(),
            metadata: Map::new(),
            validated_at: Utc::now(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn insert_metadata(&mut self, key: &str, value: Value) {
        self.metadata.insert(key.to_string(), value);
    }
}

/// Outcome of one discovery run for one URL.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExtractionResult {
    pub contacts: Vec<Contact>,
    pub forms: Vec<ContactForm>,
    pub social_profiles: Vec<SocialMediaProfile>,
    pub source_url: String,
    pub extraction_secs: f64,
    pub error: Option<String>,
    pub metadata: Map<String, Value>,
}

impl ExtractionResult {
    pub fn failed(source_url: impl Into<String>, error: impl Into<String>) -> Self {
        ExtractionResult {
            source_url: source_url.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn total_contacts(&self) -> usize {
        self.contacts.len() + self.forms.len() + self.social_profiles.len()
    }

    pub fn high_confidence_contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contacts
            .iter()
            .filter(|c| c.confidence_level == ConfidenceLevel::High)
    }
}

pub fn json_f64(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
