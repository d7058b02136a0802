//! Layered contact validation: syntax, DNS/MX, SMTP probe, reachability.
//!
//! Validation never fails the pipeline: every attempt produces a
//! `ValidationRecord`, valid or not. External lookups sit behind a global
//! min-interval rate limit so batches cannot burst against third-party
//! DNS and mail infrastructure.

pub mod dns;
pub mod smtp;

use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, ScoutError};
use crate::models::{json_f64, Contact, ContactMethod, ValidationRecord};

use dns::MxLookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationLevel {
    Basic,
    Standard,
    Comprehensive,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationLevel::Basic => "basic",
            ValidationLevel::Standard => "standard",
            ValidationLevel::Comprehensive => "comprehensive",
        }
    }

    fn at_least_standard(&self) -> bool {
        !matches!(self, ValidationLevel::Basic)
    }
}

impl FromStr for ValidationLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "basic" => Ok(ValidationLevel::Basic),
            "standard" => Ok(ValidationLevel::Standard),
            "comprehensive" => Ok(ValidationLevel::Comprehensive),
            other => Err(format!("unknown validation level: {}", other)),
        }
    }
}

static EMAIL_STRICT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9._%+-]*[a-zA-Z0-9])?@[a-zA-Z0-9]([a-zA-Z0-9.-]*[a-zA-Z0-9])?\.[a-zA-Z]{2,}$")
        .unwrap()
});
static EMAIL_STANDARD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());
static EMAIL_LENIENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@]+@[^@]+\.[^@]+$").unwrap());

static PHONE_GERMAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\+49|0049|0)[1-9][0-9]{1,14}$").unwrap());
static PHONE_INTERNATIONAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[1-9]\d{1,14}$").unwrap());

/// Consumer providers that reject mailbox probes; SMTP is skipped for them.
const BLOCKED_VERIFICATION_DOMAINS: [&str; 8] = [
    "gmail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "web.de",
    "gmx.de",
    "t-online.de",
    "freenet.de",
];

const DISPOSABLE_DOMAINS: [&str; 6] = [
    "tempmail.org",
    "10minutemail.com",
    "mailinator.com",
    "guerrillamail.com",
    "throwaway.email",
    "temp-mail.org",
];

const INVALID_DOMAINS: [&str; 5] = [
    "localhost",
    "example.com",
    "test.com",
    "sample.com",
    "domain.com",
];

const SUSPICIOUS_TLDS: [&str; 4] = [".tk", ".ml", ".ga", ".cf"];

const GERMAN_AREA_ROOTS: [&str; 11] = ["15", "16", "17", "2", "3", "4", "5", "6", "7", "8", "9"];

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub enable_dns: bool,
    pub enable_smtp: bool,
    pub rate_limit: Duration,
    pub dns_servers: Vec<String>,
    pub dns_timeout: Duration,
    pub smtp_timeout: Duration,
    pub smtp_sender: String,
    pub http_timeout: Duration,
    pub user_agent: String,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        ValidatorConfig {
            enable_dns: true,
            enable_smtp: false,
            rate_limit: Duration::from_secs(1),
            dns_servers: vec![
                "8.8.8.8".to_string(),
                "8.8.4.4".to_string(),
                "1.1.1.1".to_string(),
            ],
            dns_timeout: Duration::from_secs(5),
            smtp_timeout: Duration::from_secs(5),
            smtp_sender: "validation@contact-scout.local".to_string(),
            http_timeout: Duration::from_secs(10),
            user_agent: "ContactScout/1.0".to_string(),
        }
    }
}

pub struct ContactValidator {
    config: ValidatorConfig,
    resolver: Option<trust_dns_resolver::TokioAsyncResolver>,
    http: reqwest::Client,
    last_validation: Mutex<Option<Instant>>,
}

impl ContactValidator {
    pub fn new(config: ValidatorConfig) -> Result<Self> {
        let resolver = if config.enable_dns {
            Some(dns::create_resolver(&config.dns_servers, config.dns_timeout)?)
        } else {
            None
        };
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ScoutError::Config(format!("failed to build HTTP client: {}", e)))?;

        info!(
            "Contact validator ready (dns: {}, smtp: {})",
            config.enable_dns, config.enable_smtp
        );

        Ok(ContactValidator {
            config,
            resolver,
            http,
            last_validation: Mutex::new(None),
        })
    }

    /// Validate one contact at the given level. Always returns a record.
    pub async fn validate(&self, contact: &Contact, level: ValidationLevel) -> ValidationRecord {
        self.enforce_rate_limit().await;

        match contact.method {
            ContactMethod::Email | ContactMethod::Mailto => {
                self.validate_email(contact, level).await
            }
            ContactMethod::Phone => self.validate_phone(contact, level),
            ContactMethod::Form => self.validate_url(contact, level, true).await,
            ContactMethod::Website => self.validate_url(contact, level, false).await,
            ContactMethod::SocialMedia => self.validate_social(contact, level).await,
            ContactMethod::Address => ValidationRecord::new("generic", true, 0.5)
                .with_warning("no specific validation for postal addresses"),
        }
    }

    /// Validate a batch sequentially (the shared limiter paces the calls).
    pub async fn validate_batch(
        &self,
        contacts: &[Contact],
        level: ValidationLevel,
    ) -> Vec<ValidationRecord> {
        let mut records = Vec::with_capacity(contacts.len());
        for contact in contacts {
            records.push(self.validate(contact, level).await);
        }
        records
    }

    async fn validate_email(&self, contact: &Contact, level: ValidationLevel) -> ValidationRecord {
        let email = contact.value.to_lowercase();

        let syntax = match email_syntax_tier(&email) {
            Some(tier) => tier,
            None => {
                return ValidationRecord::new("syntax", false, 0.1)
                    .with_error("invalid email syntax");
            }
        };

        let Some((local, domain)) = email.rsplit_once('@') else {
            return ValidationRecord::new("syntax", false, 0.1).with_error("missing @ separator");
        };

        let mut record = ValidationRecord::new("syntax", true, syntax_confidence(syntax));
        record.insert_metadata("syntax_tier", Value::String(syntax.to_string()));
        record.insert_metadata("local_part", Value::String(local.to_string()));
        record.insert_metadata("domain", Value::String(domain.to_string()));
        if syntax == "lenient" {
            record
                .warnings
                .push("address only matches the lenient syntax pattern".to_string());
        }

        if DISPOSABLE_DOMAINS.contains(&domain) {
            record
                .warnings
                .push("address uses a disposable email domain".to_string());
            record.insert_metadata("disposable_domain", Value::Bool(true));
        }

        if is_invalid_domain(domain) {
            record.is_valid = false;
            record.confidence = 0.2;
            record.validation_method = "domain".to_string();
            record.errors.push("invalid or suspicious domain".to_string());
            return record;
        }

        if !level.at_least_standard() || self.resolver.is_none() {
            return record;
        }

        // Standard level: MX with address fallback.
        let resolver = self.resolver.as_ref().unwrap();
        let lookup = dns::resolve_mail_server(resolver, domain).await;
        let mail_server = match lookup {
            MxLookup::Server(exchange) => {
                record.insert_metadata("mx_exchange", Value::String(exchange.clone()));
                Some(exchange)
            }
            MxLookup::AddressFallback(addr) => {
                record.insert_metadata("address_fallback", Value::String(addr.clone()));
                record
                    .warnings
                    .push("no MX record; using host address fallback".to_string());
                Some(addr)
            }
            MxLookup::NoRecords | MxLookup::NxDomain => {
                record.is_valid = false;
                record.confidence = 0.3;
                record.validation_method = "dns".to_string();
                record.errors.push("no_mx".to_string());
                return record;
            }
            MxLookup::Timeout => {
                record.validation_method = "dns".to_string();
                record
                    .warnings
                    .push("DNS lookup timed out; domain unconfirmed".to_string());
                return record;
            }
            MxLookup::Error(e) => {
                record.validation_method = "dns".to_string();
                record.warnings.push(format!("DNS lookup failed: {}", e));
                return record;
            }
        };

        record.validation_method = "dns".to_string();
        record.confidence = 0.8;

        if level != ValidationLevel::Comprehensive || !self.config.enable_smtp {
            return record;
        }
        if BLOCKED_VERIFICATION_DOMAINS.contains(&domain) {
            record
                .warnings
                .push("provider rejects mailbox probes; SMTP skipped".to_string());
            return record;
        }

        let Some(server) = mail_server else {
            return record;
        };
        let probe_email = email.clone();
        let sender = self.config.smtp_sender.clone();
        let timeout = self.config.smtp_timeout;
        let probe = tokio::task::spawn_blocking(move || {
            smtp::probe_mailbox(&probe_email, &server, &sender, timeout)
        })
        .await;

        match probe {
            Ok(result) => {
                record.insert_metadata("smtp_message", Value::String(result.message.clone()));
                match result.exists {
                    Some(true) => {
                        record.validation_method = "smtp".to_string();
                        record.confidence = 0.95;
                        record.insert_metadata("smtp_verified", Value::Bool(true));
                    }
                    Some(false) => {
                        record.validation_method = "smtp".to_string();
                        record.is_valid = false;
                        record.confidence = 0.2;
                        record.errors.push("mailbox rejected by server".to_string());
                    }
                    None => {
                        record.validation_method = "dns+smtp".to_string();
                        record.confidence = 0.7;
                        record
                            .warnings
                            .push("SMTP verification inconclusive".to_string());
                    }
                }
            }
            Err(e) => {
                warn!("SMTP probe task failed: {}", e);
                record
                    .warnings
                    .push("SMTP verification could not run".to_string());
            }
        }

        record
    }

    fn validate_phone(&self, contact: &Contact, level: ValidationLevel) -> ValidationRecord {
        let phone = &contact.value;
        let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

        let mut record = ValidationRecord::new("syntax", true, 0.9);
        record.insert_metadata("cleaned_number", Value::String(digits.clone()));

        if digits.len() < 8 || digits.len() > 15 {
            record.is_valid = false;
            record.confidence = 0.2;
            record
                .errors
                .push("phone number length outside valid range".to_string());
            return record;
        }

        if phone.starts_with('+') {
            if !PHONE_INTERNATIONAL.is_match(phone) {
                record.is_valid = false;
                record.confidence = 0.3;
                record
                    .errors
                    .push("invalid international phone format".to_string());
                return record;
            }
            record.insert_metadata("format", Value::String("international".into()));
        } else if phone.starts_with('0') {
            if !PHONE_GERMAN.is_match(phone) {
                record.is_valid = false;
                record.confidence = 0.3;
                record
                    .errors
                    .push("invalid German phone format".to_string());
                return record;
            }
            record.insert_metadata("format", Value::String("german_national".into()));
        } else {
            record.confidence = 0.7;
            record
                .warnings
                .push("phone number format unclear".to_string());
            record.insert_metadata("format", Value::String("unknown".into()));
        }

        if level == ValidationLevel::Comprehensive {
            let national = phone
                .strip_prefix("+49")
                .or_else(|| phone.strip_prefix("0049"))
                .or_else(|| phone.strip_prefix('0'));
            if let Some(national) = national {
                let known_root = GERMAN_AREA_ROOTS.iter().any(|r| national.starts_with(r));
                record.insert_metadata("area_code_validated", Value::Bool(known_root));
                if !known_root {
                    record
                        .warnings
                        .push("German area code validation inconclusive".to_string());
                    record.confidence = record.confidence.min(0.7);
                }
            }
            let is_mobile = ["15", "16", "17"].iter().any(|p| {
                phone
                    .strip_prefix("+49")
                    .or_else(|| phone.strip_prefix('0'))
                    .map(|n| n.starts_with(p))
                    .unwrap_or(false)
            });
            record.insert_metadata("is_mobile", Value::Bool(is_mobile));
            record.validation_method = "comprehensive".to_string();
        }

        record
    }

    async fn validate_url(
        &self,
        contact: &Contact,
        level: ValidationLevel,
        expect_form: bool,
    ) -> ValidationRecord {
        let target = &contact.value;
        let parsed = match Url::parse(target) {
            Ok(parsed) => parsed,
            Err(e) => {
                return ValidationRecord::new("url", false, 0.1)
                    .with_error(format!("invalid URL: {}", e));
            }
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return ValidationRecord::new("url", false, 0.2)
                .with_error(format!("invalid URL scheme: {}", parsed.scheme()));
        }

        let mut record = ValidationRecord::new("url", true, 0.8);
        if !level.at_least_standard() {
            return record;
        }

        record.validation_method = "reachability".to_string();
        match self.http.head(target.clone()).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                record.insert_metadata("response_status", Value::from(status));
                if status >= 400 {
                    record.is_valid = false;
                    record.confidence = 0.3;
                    record
                        .errors
                        .push(format!("URL returned status {}", status));
                    return record;
                }
                record.confidence = 0.85;
            }
            Err(e) => {
                record
                    .warnings
                    .push(format!("reachability check failed: {}", e));
                record.confidence = 0.6;
                return record;
            }
        }

        if level == ValidationLevel::Comprehensive {
            match self.http.get(target.clone()).send().await {
                Ok(response) => {
                    let content_type = response
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    record.insert_metadata("content_type", Value::String(content_type.clone()));

                    match response.text().await {
                        Ok(body) => {
                            if expect_form {
                                let has_form = body.to_lowercase().contains("<form");
                                record.insert_metadata("has_form", Value::Bool(has_form));
                                if !has_form {
                                    record
                                        .warnings
                                        .push("no form element found on page".to_string());
                                    record.confidence = 0.6;
                                } else {
                                    record.confidence = 0.9;
                                }
                            } else if content_type.contains("text/html")
                                || content_type.contains("text/plain")
                            {
                                record.confidence = 0.9;
                            } else {
                                record
                                    .warnings
                                    .push(format!("unexpected content type {}", content_type));
                            }
                        }
                        Err(e) => {
                            record
                                .warnings
                                .push(format!("could not read response body: {}", e));
                        }
                    }
                }
                Err(e) => {
                    record
                        .warnings
                        .push(format!("content check failed: {}", e));
                }
            }
        }

        record
    }

    async fn validate_social(&self, contact: &Contact, level: ValidationLevel) -> ValidationRecord {
        let target = &contact.value;
        if Url::parse(target).map(|u| u.host_str().is_none()).unwrap_or(true) {
            return ValidationRecord::new("url", false, 0.2)
                .with_error("invalid social media URL".to_string());
        }

        let mut record = ValidationRecord::new("url", true, 0.8);
        if !level.at_least_standard() {
            return record;
        }

        record.validation_method = "reachability".to_string();
        match self.http.head(target.clone()).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                record.insert_metadata("response_status", Value::from(status));
                if status == 404 {
                    record.is_valid = false;
                    record.confidence = 0.2;
                    record
                        .errors
                        .push("social media profile not found (404)".to_string());
                } else if status >= 400 {
                    // Many platforms reject HEAD for anonymous scrapers;
                    // that alone is not evidence the profile is gone.
                    record
                        .warnings
                        .push(format!("profile returned status {}", status));
                    record.confidence = 0.6;
                }
            }
            Err(e) => {
                record
                    .warnings
                    .push(format!("reachability check failed: {}", e));
                record.confidence = 0.6;
            }
        }

        record
    }

    async fn enforce_rate_limit(&self) {
        let wait = {
            let mut last = self.last_validation.lock().await;
            let now = Instant::now();
            let wait = match *last {
                Some(prev) => {
                    let since = now.duration_since(prev);
                    self.config.rate_limit.saturating_sub(since)
                }
                None => Duration::ZERO,
            };
            *last = Some(now + wait);
            wait
        };

        if !wait.is_zero() {
            debug!("Validator rate limit: sleeping {:?}", wait);
            // A little jitter keeps batch probes from looking mechanical.
            let jitter = Duration::from_millis(fastrand::u64(0..50));
            tokio::time::sleep(wait + jitter).await;
        }
    }
}

fn email_syntax_tier(email: &str) -> Option<&'static str> {
    let local_len = email.split('@').next().map(|l| l.len()).unwrap_or(0);
    if email.len() > 254 || local_len > 64 {
        return None;
    }
    if EMAIL_STRICT.is_match(email) {
        Some("strict")
    } else if EMAIL_STANDARD.is_match(email) {
        Some("standard")
    } else if EMAIL_LENIENT.is_match(email) {
        Some("lenient")
    } else {
        None
    }
}

fn syntax_confidence(tier: &str) -> f64 {
    match tier {
        "strict" => 0.9,
        "standard" => 0.8,
        _ => 0.7,
    }
}

fn is_invalid_domain(domain: &str) -> bool {
    let domain = domain.to_lowercase();
    if INVALID_DOMAINS.contains(&domain.as_str()) {
        return true;
    }
    if !domain.contains('.') {
        return true;
    }
    if domain.contains("..") {
        return true;
    }
    // Raw IPv4 literals.
    if domain
        .split('.')
        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
    {
        return true;
    }
    if domain.matches('.').count() > 4 {
        return true;
    }
    SUSPICIOUS_TLDS.iter().any(|tld| domain.ends_with(tld))
}

/// Aggregate view over a batch of validation records.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub valid_percentage: f64,
    pub average_confidence: f64,
    pub methods: HashMap<String, MethodCounts>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MethodCounts {
    pub valid: usize,
    pub invalid: usize,
}

pub fn summarize(records: &[ValidationRecord]) -> ValidationSummary {
    let total = records.len();
    if total == 0 {
        return ValidationSummary {
            total: 0,
            valid: 0,
            invalid: 0,
            valid_percentage: 0.0,
            average_confidence: 0.0,
            methods: HashMap::new(),
            recommendations: Vec::new(),
        };
    }

    let valid = records.iter().filter(|r| r.is_valid).count();
    let invalid = total - valid;
    let valid_percentage = valid as f64 / total as f64 * 100.0;
    let average_confidence = records.iter().map(|r| r.confidence).sum::<f64>() / total as f64;

    let mut methods: HashMap<String, MethodCounts> = HashMap::new();
    for record in records {
        let counts = methods.entry(record.validation_method.clone()).or_default();
        if record.is_valid {
            counts.valid += 1;
        } else {
            counts.invalid += 1;
        }
    }

    let mut recommendations = Vec::new();
    if valid_percentage < 50.0 {
        recommendations.push(format!(
            "low validation success rate ({:.1}%): review extraction quality",
            valid_percentage
        ));
    }
    if methods.get("dns").map(|c| c.invalid > 0).unwrap_or(false) {
        recommendations.push("DNS failures detected: check domain quality".to_string());
    }
    if methods.get("smtp").map(|c| c.invalid > 0).unwrap_or(false) {
        recommendations
            .push("SMTP rejections detected: consider disabling probes for bulk runs".to_string());
    }
    if average_confidence < 0.7 {
        recommendations.push(format!(
            "low average confidence ({:.2}): consider additional verification",
            average_confidence
        ));
    }
    recommendations.truncate(5);

    ValidationSummary {
        total,
        valid,
        invalid,
        valid_percentage,
        average_confidence,
        methods,
        recommendations,
    }
}

/// Confidence metadata payload for persisting alongside a record.
pub fn record_metadata(record: &ValidationRecord) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(
        "errors".into(),
        Value::Array(record.errors.iter().cloned().map(Value::String).collect()),
    );
    map.insert(
        "warnings".into(),
        Value::Array(record.warnings.iter().cloned().map(Value::String).collect()),
    );
    map.insert("confidence".into(), json_f64(record.confidence));
    for (k, v) in &record.metadata {
        map.insert(k.clone(), v.clone());
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConfidenceLevel;

    fn validator() -> ContactValidator {
        ContactValidator::new(ValidatorConfig {
            enable_dns: false,
            enable_smtp: false,
            rate_limit: Duration::from_millis(1),
            ..ValidatorConfig::default()
        })
        .unwrap()
    }

    fn email_contact(value: &str) -> Contact {
        Contact::new(
            ContactMethod::Email,
            value,
            ConfidenceLevel::Medium,
            "https://acme.de/kontakt",
        )
    }

    #[tokio::test]
    async fn strict_email_passes_basic_syntax() {
        let v = validator();
        let record = v
            .validate(&email_contact("info@acme.de"), ValidationLevel::Basic)
            .await;
        assert!(record.is_valid);
        assert_eq!(record.validation_method, "syntax");
        assert!((record.confidence - 0.9).abs() < 1e-9);
        assert_eq!(
            record.metadata.get("syntax_tier"),
            Some(&Value::String("strict".into()))
        );
    }

    #[tokio::test]
    async fn malformed_email_fails_syntax() {
        let v = validator();
        let record = v
            .validate(&email_contact("not-an-email"), ValidationLevel::Basic)
            .await;
        assert!(!record.is_valid);
        assert_eq!(record.validation_method, "syntax");
        assert!(!record.errors.is_empty());
    }

    #[tokio::test]
    async fn placeholder_domain_fails_domain_check() {
        let v = validator();
        let record = v
            .validate(&email_contact("a@example.com"), ValidationLevel::Basic)
            .await;
        assert!(!record.is_valid);
        assert_eq!(record.validation_method, "domain");
    }

    #[tokio::test]
    async fn disposable_domain_warns_but_passes_syntax() {
        let v = validator();
        let record = v
            .validate(&email_contact("x@mailinator.com"), ValidationLevel::Basic)
            .await;
        assert!(record.is_valid);
        assert!(record
            .warnings
            .iter()
            .any(|w| w.contains("disposable")));
    }

    #[tokio::test]
    async fn suspicious_tld_is_rejected() {
        let v = validator();
        let record = v
            .validate(&email_contact("a@foo.tk"), ValidationLevel::Basic)
            .await;
        assert!(!record.is_valid);
    }

    #[tokio::test]
    async fn phone_validation_is_syntax_only() {
        let v = validator();
        let contact = Contact::new(
            ContactMethod::Phone,
            "08912345678",
            ConfidenceLevel::High,
            "https://acme.de",
        );
        let record = v.validate(&contact, ValidationLevel::Standard).await;
        assert!(record.is_valid);
        assert_eq!(record.validation_method, "syntax");
        assert_eq!(
            record.metadata.get("format"),
            Some(&Value::String("german_national".into()))
        );
    }

    #[tokio::test]
    async fn comprehensive_phone_tags_mobile() {
        let v = validator();
        let contact = Contact::new(
            ContactMethod::Phone,
            "+4917612345678",
            ConfidenceLevel::High,
            "https://acme.de",
        );
        let record = v.validate(&contact, ValidationLevel::Comprehensive).await;
        assert!(record.is_valid);
        assert_eq!(record.validation_method, "comprehensive");
        assert_eq!(record.metadata.get("is_mobile"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn short_phone_fails() {
        let v = validator();
        let contact = Contact::new(
            ContactMethod::Phone,
            "12345",
            ConfidenceLevel::Low,
            "https://acme.de",
        );
        let record = v.validate(&contact, ValidationLevel::Basic).await;
        assert!(!record.is_valid);
    }

    #[tokio::test]
    async fn form_url_with_bad_scheme_fails() {
        let v = validator();
        let contact = Contact::new(
            ContactMethod::Form,
            "ftp://acme.de/form",
            ConfidenceLevel::Medium,
            "https://acme.de",
        );
        let record = v.validate(&contact, ValidationLevel::Basic).await;
        assert!(!record.is_valid);
        assert_eq!(record.validation_method, "url");
    }

    #[tokio::test]
    async fn basic_url_validation_skips_network() {
        let v = validator();
        let contact = Contact::new(
            ContactMethod::Website,
            "https://acme.de",
            ConfidenceLevel::Medium,
            "https://acme.de",
        );
        let record = v.validate(&contact, ValidationLevel::Basic).await;
        assert!(record.is_valid);
        assert_eq!(record.validation_method, "url");
    }

    #[test]
    fn syntax_tiers_are_ordered() {
        assert_eq!(email_syntax_tier("info@acme.de"), Some("strict"));
        // Trailing dash in the local part fails strict but passes standard.
        assert_eq!(email_syntax_tier("info-@acme.de"), Some("standard"));
        assert_eq!(email_syntax_tier("weird name@acme.de"), Some("lenient"));
        assert_eq!(email_syntax_tier("no-at-sign"), None);
        let long_local = format!("{}@acme.de", "a".repeat(65));
        assert_eq!(email_syntax_tier(&long_local), None);
    }

    #[test]
    fn invalid_domain_table() {
        assert!(is_invalid_domain("localhost"));
        assert!(is_invalid_domain("example.com"));
        assert!(is_invalid_domain("192.168.0.1"));
        assert!(is_invalid_domain("a..b.de"));
        assert!(is_invalid_domain("x.tk"));
        assert!(is_invalid_domain("a.b.c.d.e.f.de"));
        assert!(!is_invalid_domain("acme.de"));
    }

    #[test]
    fn summary_counts_and_recommendations() {
        let records = vec![
            ValidationRecord::new("syntax", true, 0.9),
            ValidationRecord::new("dns", false, 0.3),
            ValidationRecord::new("dns", true, 0.8),
            ValidationRecord::new("syntax", false, 0.1),
        ];
        let summary = summarize(&records);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.valid, 2);
        assert_eq!(summary.invalid, 2);
        assert!((summary.valid_percentage - 50.0).abs() < 1e-9);
        assert_eq!(summary.methods.get("dns").unwrap().invalid, 1);
        assert!(summary
            .recommendations
            .iter()
            .any(|r| r.contains("DNS failures")));
    }

    #[test]
    fn empty_summary_is_all_zero() {
        let summary = summarize(&[]);
        assert_eq!(summary.total, 0);
        assert!(summary.recommendations.is_empty());
    }

    #[tokio::test]
    async fn rate_limit_spaces_validations() {
        let v = ContactValidator::new(ValidatorConfig {
            enable_dns: false,
            enable_smtp: false,
            rate_limit: Duration::from_millis(120),
            ..ValidatorConfig::default()
        })
        .unwrap();

        let contact = email_contact("info@acme.de");
        let start = Instant::now();
        v.validate(&contact, ValidationLevel::Basic).await;
        v.validate(&contact, ValidationLevel::Basic).await;
        assert!(start.elapsed() >= Duration::from_millis(120));
    }
}
