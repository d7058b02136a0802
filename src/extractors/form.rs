//! Contact form detection and analysis.
//!
//! Every `<form>` on a page is analyzed; only forms that look like contact
//! forms (keyword text, contact field names, or email+message field pair)
//! are reported, with complexity and user-friendliness scores.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::models::{ConfidenceLevel, ContactForm, DiscoveryContext};

use super::dedupe_forms;

static FORM_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("form").unwrap());
static FIELD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("input, textarea, select").unwrap());
static HIDDEN_INPUT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("input[type='hidden']").unwrap());
static LABEL_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("label").unwrap());
static PLACEHOLDER_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[placeholder]").unwrap());
static FIELDSET_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("fieldset").unwrap());
static HELP_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("[class*='help'], [class*='hint'], [class*='info']").unwrap()
});

static CSRF_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)csrf|token|_token|authenticity_token").unwrap());

const CONTACT_FORM_KEYWORDS: [&str; 8] = [
    "contact", "kontakt", "message", "nachricht", "feedback", "anfrage", "inquiry", "support",
];

const CONTACT_FIELD_NAMES: [&str; 9] = [
    "name", "email", "message", "subject", "phone", "telefon", "nachricht", "betreff", "comment",
];

const COMPLEX_FIELD_TYPES: [&str; 6] = ["file", "date", "datetime", "select", "radio", "checkbox"];

const CONTACT_URL_KEYWORDS: [&str; 3] = ["contact", "kontakt", "impressum"];

pub struct FormExtractor;

impl FormExtractor {
    pub fn new() -> Self {
        FormExtractor
    }

    pub fn extract(&self, html: &str, source_url: &str, _ctx: &DiscoveryContext) -> Vec<ContactForm> {
        let document = Html::parse_document(html);
        let mut forms = Vec::new();

        for form_el in document.select(&FORM_SELECTOR) {
            if let Some(form) = self.analyze_form(form_el, source_url) {
                forms.push(form);
            }
        }

        let unique = dedupe_forms(forms);
        debug!("Extracted {} contact forms from {}", unique.len(), source_url);
        unique
    }

    fn analyze_form(&self, form_el: ElementRef, source_url: &str) -> Option<ContactForm> {
        let action_attr = form_el.value().attr("action").unwrap_or("").trim();
        let action_url = resolve_action(action_attr, source_url)?;
        let method = form_el
            .value()
            .attr("method")
            .map(|m| m.trim().to_uppercase())
            .filter(|m| m == "GET" || m == "POST")
            .unwrap_or_else(|| "POST".to_string());

        let labels_with_star: Vec<String> = form_el
            .select(&LABEL_SELECTOR)
            .filter(|l| l.text().collect::<String>().contains('*'))
            .filter_map(|l| l.value().attr("for").map(|f| f.to_string()))
            .collect();

        let mut fields = Vec::new();
        let mut required_fields = Vec::new();
        let mut complex_count = 0usize;

        for field_el in form_el.select(&FIELD_SELECTOR) {
            let Some(name) = field_el.value().attr("name") else {
                continue;
            };
            let name = name.to_string();
            if fields.contains(&name) {
                continue;
            }

            let el = field_el.value();
            let field_type = el.attr("type").unwrap_or("").to_lowercase();
            let tag = el.name().to_lowercase();
            if COMPLEX_FIELD_TYPES.contains(&field_type.as_str()) || tag == "select" {
                complex_count += 1;
            }

            let required = el.attr("required").is_some()
                || el.attr("aria-required") == Some("true")
                || el
                    .attr("id")
                    .map(|id| labels_with_star.iter().any(|f| f == id))
                    .unwrap_or(false);
            if required {
                required_fields.push(name.clone());
            }
            fields.push(name);
        }

        let csrf_token = form_el
            .select(&HIDDEN_INPUT_SELECTOR)
            .find(|el| {
                el.value()
                    .attr("name")
                    .map(|n| CSRF_NAME.is_match(n))
                    .unwrap_or(false)
            })
            .and_then(|el| el.value().attr("value").map(|v| v.to_string()));

        if !self.is_contact_form(form_el, &fields) {
            return None;
        }

        let complexity_score = complexity(&fields, &required_fields, complex_count);
        let user_friendly_score = friendliness(form_el);
        let confidence = self.determine_confidence(&fields, source_url);

        let mut metadata = Map::new();
        if let Some(id) = form_el.value().attr("id") {
            metadata.insert("form_id".into(), Value::String(id.to_string()));
        }
        if let Some(class) = form_el.value().attr("class") {
            metadata.insert("form_class".into(), Value::String(class.to_string()));
        }
        metadata.insert("total_fields".into(), Value::from(fields.len()));
        metadata.insert(
            "required_fields_count".into(),
            Value::from(required_fields.len()),
        );

        Some(ContactForm {
            action_url,
            method,
            fields,
            required_fields,
            csrf_token,
            source_url: source_url.to_string(),
            confidence,
            complexity_score,
            user_friendly_score,
            metadata,
        })
    }

    fn is_contact_form(&self, form_el: ElementRef, fields: &[String]) -> bool {
        let form_text = form_el.text().collect::<String>().to_lowercase();
        if CONTACT_FORM_KEYWORDS.iter().any(|k| form_text.contains(k)) {
            return true;
        }

        let lower: Vec<String> = fields.iter().map(|f| f.to_lowercase()).collect();
        let contact_fields = lower
            .iter()
            .filter(|f| CONTACT_FIELD_NAMES.contains(&f.as_str()))
            .count();
        if contact_fields >= 2 {
            return true;
        }

        let has_email = lower.iter().any(|f| f.contains("email"));
        let has_message = lower
            .iter()
            .any(|f| f.contains("message") || f.contains("nachricht") || f.contains("text"));
        has_email && has_message
    }

    fn determine_confidence(&self, fields: &[String], source_url: &str) -> ConfidenceLevel {
        let url_lower = source_url.to_lowercase();
        if CONTACT_URL_KEYWORDS.iter().any(|k| url_lower.contains(k)) {
            return ConfidenceLevel::High;
        }

        let lower: Vec<String> = fields.iter().map(|f| f.to_lowercase()).collect();
        let has_email = lower.iter().any(|f| f.contains("email"));
        let has_message = lower
            .iter()
            .any(|f| f.contains("message") || f.contains("nachricht"));
        if has_email && has_message {
            return ConfidenceLevel::High;
        }

        let indicators = lower
            .iter()
            .filter(|f| CONTACT_FIELD_NAMES.contains(&f.as_str()))
            .count();
        if indicators >= 3 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// Resolve a form action against the page URL. An empty action posts back to
/// the page itself.
fn resolve_action(action: &str, source_url: &str) -> Option<String> {
    if action.is_empty() {
        return Some(source_url.to_string());
    }
    if action.starts_with("http://") || action.starts_with("https://") {
        return Some(action.to_string());
    }
    let base = Url::parse(source_url).ok()?;
    base.join(action).ok().map(|u| u.to_string())
}

/// Mean of field-count, required-ratio, and complex-type pressure, in [0,1].
fn complexity(fields: &[String], required: &[String], complex_count: usize) -> f64 {
    if fields.is_empty() {
        return 0.0;
    }
    let field_complexity = (fields.len() as f64 / 10.0).min(1.0);
    let required_ratio = required.len() as f64 / fields.len() as f64;
    let type_complexity = (complex_count as f64 / 3.0).min(1.0);
    ((field_complexity + required_ratio + type_complexity) / 3.0).clamp(0.0, 1.0)
}

fn friendliness(form_el: ElementRef) -> f64 {
    let mut score: f64 = 0.5;
    if form_el.select(&LABEL_SELECTOR).next().is_some() {
        score += 0.2;
    }
    if form_el.select(&PLACEHOLDER_SELECTOR).next().is_some() {
        score += 0.1;
    }
    if form_el.select(&FIELDSET_SELECTOR).next().is_some() {
        score += 0.1;
    }
    if form_el.select(&HELP_SELECTOR).next().is_some() {
        score += 0.1;
    }
    score.min(1.0)
}
