//! Text normalization for obfuscated contact data.
//!
//! Pure string transform, no I/O. Idempotent: `normalize(normalize(x)) ==
//! normalize(x)`.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static AT_BRACKET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*\[at\]\s*").unwrap());
static AT_PAREN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*\(at\)\s*").unwrap());
static AT_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+at\s+").unwrap());
static DOT_BRACKET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*\[dot\]\s*").unwrap());
static DOT_PAREN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*\(dot\)\s*").unwrap());
static DOT_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+dot\s+").unwrap());
static NUMERIC_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&#(\d+);").unwrap());
static TRACKING_TOKENS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(noreply|no-reply|no_reply|donotreply)\b").unwrap());

/// Undo common obfuscations and unify whitespace. The output is suitable for
/// the strict extraction patterns downstream.
pub fn normalize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    // Entities first: "&#64;" must become "@" before the marker passes so a
    // second run sees no leftover work.
    let mut out = decode_entities(text.trim());

    out = AT_BRACKET.replace_all(&out, "@").into_owned();
    out = AT_PAREN.replace_all(&out, "@").into_owned();
    out = AT_WORD.replace_all(&out, "@").into_owned();
    out = DOT_BRACKET.replace_all(&out, ".").into_owned();
    out = DOT_PAREN.replace_all(&out, ".").into_owned();
    out = DOT_WORD.replace_all(&out, ".").into_owned();

    // Tracking addresses like noreply@ are stripped before any length checks.
    out = TRACKING_TOKENS.replace_all(&out, "").into_owned();

    out = WHITESPACE.replace_all(&out, " ").into_owned();
    out.trim().to_string()
}

/// Decode the HTML entities that show up in obfuscated contact markup:
/// numeric references plus the handful of named ones browsers emit.
fn decode_entities(text: &str) -> String {
    let mut out = NUMERIC_ENTITY
        .replace_all(text, |caps: &regex::Captures| {
            caps[1]
                .parse::<u32>()
                .ok()
                .and_then(char::from_u32)
                .map(|c| c.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned();

    for (entity, replacement) in [
        ("&nbsp;", " "),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&apos;", "'"),
        ("&amp;", "&"),
    ] {
        if out.contains(entity) {
            out = out.replace(entity, replacement);
        }
    }
    out
}

/// True when the raw text contains an email obfuscation marker. Used to tag
/// contacts reconstructed from obfuscated spans.
pub fn contains_obfuscation_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("[at]")
        || lower.contains("(at)")
        || lower.contains("[dot]")
        || lower.contains("(dot)")
        || AT_WORD.is_match(text)
}

/// True when the raw text carries entity-escaped email punctuation.
pub fn contains_entity_obfuscation(text: &str) -> bool {
    text.contains("&#64;") || text.contains("&#46;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize_text("a  b\t\nc"), "a b c");
    }

    #[test]
    fn resolves_word_obfuscations() {
        assert_eq!(
            normalize_text("hello [at] acme [dot] de"),
            "hello@acme.de"
        );
        assert_eq!(normalize_text("hello (AT) acme (DOT) de"), "hello@acme.de");
        assert_eq!(normalize_text("hello at acme dot de"), "hello@acme.de");
    }

    #[test]
    fn resolves_entity_obfuscations() {
        assert_eq!(normalize_text("info&#64;acme&#46;de"), "info@acme.de");
        assert_eq!(normalize_text("Tom &amp; Jerry"), "Tom & Jerry");
    }

    #[test]
    fn strips_tracking_tokens() {
        assert_eq!(normalize_text("noreply@acme.de"), "@acme.de");
        assert_eq!(normalize_text("write to no-reply please"), "write to please");
    }

    #[test]
    fn idempotent_on_own_output() {
        let samples = [
            "hello [at] acme [dot] de",
            "info&#64;acme&#46;de",
            "  lots   of\nspace  ",
            "Tel.: 089 / 12 34 56 78",
            "a at b dot c",
            "",
        ];
        for s in samples {
            let once = normalize_text(s);
            assert_eq!(normalize_text(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn marker_detection() {
        assert!(contains_obfuscation_marker("mail [at] acme.de"));
        assert!(contains_obfuscation_marker("mail at acme dot de"));
        assert!(!contains_obfuscation_marker("mail@acme.de"));
        assert!(contains_entity_obfuscation("mail&#64;acme.de"));
        assert!(!contains_entity_obfuscation("mail@acme.de"));
    }
}
