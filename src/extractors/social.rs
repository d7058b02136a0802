//! Social media profile discovery.
//!
//! A regex table per platform yields canonical profile URLs and usernames.
//! XING matters for the German market; LinkedIn and XING links rank as
//! business channels.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::models::{ConfidenceLevel, DiscoveryContext, SocialMediaPlatform, SocialMediaProfile};

use super::dedupe_profiles;

struct PlatformPatterns {
    platform: SocialMediaPlatform,
    patterns: Vec<Regex>,
}

static PLATFORMS: Lazy<Vec<PlatformPatterns>> = Lazy::new(|| {
    vec![
        PlatformPatterns {
            platform: SocialMediaPlatform::Facebook,
            patterns: compile(&[
                r"(?i)facebook\.com/pages/([A-Za-z0-9._-]+)",
                r"(?i)facebook\.com/([A-Za-z0-9._-]+)",
                r"(?i)\bfb\.com/([A-Za-z0-9._-]+)",
            ]),
        },
        PlatformPatterns {
            platform: SocialMediaPlatform::Instagram,
            patterns: compile(&[
                r"(?i)instagram\.com/([A-Za-z0-9._-]+)",
                r"(?i)instagr\.am/([A-Za-z0-9._-]+)",
            ]),
        },
        PlatformPatterns {
            platform: SocialMediaPlatform::Twitter,
            patterns: compile(&[
                r"(?i)twitter\.com/([A-Za-z0-9_]+)",
                r"(?i)\bx\.com/([A-Za-z0-9_]+)",
            ]),
        },
        PlatformPatterns {
            platform: SocialMediaPlatform::Linkedin,
            patterns: compile(&[
                r"(?i)linkedin\.com/in/([A-Za-z0-9._-]+)",
                r"(?i)linkedin\.com/company/([A-Za-z0-9._-]+)",
            ]),
        },
        PlatformPatterns {
            platform: SocialMediaPlatform::Whatsapp,
            patterns: compile(&[
                r"(?i)wa\.me/([0-9+]+)",
                r"(?i)api\.whatsapp\.com/send\?phone=([0-9+]+)",
                r"(?i)whatsapp\.com/([A-Za-z0-9._-]+)",
            ]),
        },
        PlatformPatterns {
            platform: SocialMediaPlatform::Telegram,
            patterns: compile(&[
                r"(?i)\bt\.me/([A-Za-z0-9._-]+)",
                r"(?i)telegram\.me/([A-Za-z0-9._-]+)",
            ]),
        },
        PlatformPatterns {
            platform: SocialMediaPlatform::Xing,
            patterns: compile(&[
                r"(?i)xing\.com/profile/([A-Za-z0-9._-]+)",
                r"(?i)xing\.com/companies/([A-Za-z0-9._-]+)",
            ]),
        },
    ]
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
}

static DISPLAY_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z][a-z]+(?:\s+[A-Z][a-z]+)+").unwrap());

/// Path segments that appear after platform hosts but are not usernames.
const RESERVED_SEGMENTS: [&str; 8] = [
    "share", "sharer", "intent", "home", "login", "privacy", "legal", "pages",
];

const CONTACT_URL_KEYWORDS: [&str; 5] = ["contact", "kontakt", "impressum", "about", "social"];

const BUSINESS_KEYWORDS: [&str; 10] = [
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

pub struct SocialMediaExtractor;

impl SocialMediaExtractor {
    pub fn new() -> Self {
        SocialMediaExtractor
    }

    /// Scan raw page content (HTML or text) for profile links.
    pub fn extract(
        &self,
        content: &str,
        source_url: &str,
        _ctx: &DiscoveryContext,
    ) -> Vec<SocialMediaProfile> {
        let mut profiles = Vec::new();

        for entry in PLATFORMS.iter() {
            for pattern in &entry.patterns {
                for caps in pattern.captures_iter(content) {
                    let username = caps[1].trim_matches('.').to_string();
                    if username.is_empty()
                        || RESERVED_SEGMENTS.contains(&username.to_lowercase().as_str())
                    {
                        continue;
                    }

                    let whole = caps.get(0).unwrap();
                    let display_name = extract_display_name(content, whole.start(), whole.end());
                    let confidence =
                        self.determine_confidence(entry.platform, &username, source_url);

                    let mut metadata = Map::new();
                    metadata.insert(
                        "matched_span".into(),
                        Value::String(whole.as_str().to_string()),
                    );

                    profiles.push(SocialMediaProfile {
                        platform: entry.platform,
                        profile_url: profile_url(entry.platform, &username),
                        username,
                        display_name,
                        source_url: source_url.to_string(),
                        confidence,
                        metadata,
                    });
                }
            }
        }

        let unique = dedupe_profiles(profiles);
        debug!(
            "Extracted {} social profiles from {}",
            unique.len(),
            source_url
        );
        unique
    }

    fn determine_confidence(
        &self,
        platform: SocialMediaPlatform,
        username: &str,
        source_url: &str,
    ) -> ConfidenceLevel {
        if matches!(
            platform,
            SocialMediaPlatform::Linkedin | SocialMediaPlatform::Xing
        ) {
            return ConfidenceLevel::High;
        }

        let url_lower = source_url.to_lowercase();
        if CONTACT_URL_KEYWORDS.iter().any(|k| url_lower.contains(k)) {
            return ConfidenceLevel::High;
        }

        let user_lower = username.to_lowercase();
        if BUSINESS_KEYWORDS.iter().any(|k| user_lower.contains(k)) {
            return ConfidenceLevel::High;
        }

        ConfidenceLevel::Medium
    }
}

fn profile_url(platform: SocialMediaPlatform, username: &str) -> String {
    match platform {
        SocialMediaPlatform::Facebook => format!("https://facebook.com/{}", username),
        SocialMediaPlatform::Instagram => format!("https://instagram.com/{}", username),
        SocialMediaPlatform::Twitter => format!("https://twitter.com/{}", username),
        SocialMediaPlatform::Linkedin => format!("https://linkedin.com/in/{}", username),
        SocialMediaPlatform::Whatsapp => format!("https://wa.me/{}", username),
        SocialMediaPlatform::Telegram => format!("https://t.me/{}", username),
        SocialMediaPlatform::Xing => format!("https://xing.com/profile/{}", username),
    }
}

/// Look for a capitalized name near the matched link.
fn extract_display_name(content: &str, start: usize, end: usize) -> Option<String> {
    let window_start = start.saturating_sub(100);
    let window_end = (end + 100).min(content.len());
    let window = content.get(window_start..window_end)?;
    DISPLAY_NAME.find(window).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> DiscoveryContext {
        DiscoveryContext::for_url("https://acme.de/impressum").unwrap()
    }

    #[test]
    fn finds_xing_profile_as_high_confidence() {
        let extractor = SocialMediaExtractor::new();
        let profiles = extractor.extract(
            "Folgen Sie uns: https://www.xing.com/profile/Max_Mustermann",
            "https://acme.de/wohnung/3",
            &ctx(),
        );

        assert_eq!(profiles.len(), 1);
        let p = &profiles[0];
        assert_eq!(p.platform, SocialMediaPlatform::Xing);
        assert_eq!(p.username, "Max_Mustermann");
        assert_eq!(p.profile_url, "https://xing.com/profile/Max_Mustermann");
        assert_eq!(p.confidence, ConfidenceLevel::High);
    }

    #[test]
    fn finds_linkedin_company_pages() {
        let extractor = SocialMediaExtractor::new();
        let profiles = extractor.extract(
            "linkedin.com/company/acme-immobilien",
            "https://acme.de",
            &ctx(),
        );
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].platform, SocialMediaPlatform::Linkedin);
        assert_eq!(profiles[0].username, "acme-immobilien");
    }

    #[test]
    fn whatsapp_number_link() {
        let extractor = SocialMediaExtractor::new();
        let profiles = extractor.extract(
            r#"<a href="https://wa.me/498912345678">WhatsApp</a>"#,
            "https://acme.de",
            &ctx(),
        );
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].platform, SocialMediaPlatform::Whatsapp);
        assert_eq!(profiles[0].username, "498912345678");
    }

    #[test]
    fn duplicates_collapse_on_platform_and_username() {
        let extractor = SocialMediaExtractor::new();
        let content = "facebook.com/acmehomes and again https://facebook.com/acmehomes";
        let profiles = extractor.extract(content, "https://acme.de", &ctx());
        assert_eq!(profiles.len(), 1);
    }

    #[test]
    fn sharer_links_are_skipped() {
        let extractor = SocialMediaExtractor::new();
        let profiles = extractor.extract(
            "https://facebook.com/sharer?u=https://acme.de",
            "https://acme.de",
            &ctx(),
        );
        assert!(profiles.is_empty());
    }

    #[test]
    fn business_keyword_in_username_raises_confidence() {
        let extractor = SocialMediaExtractor::new();
        let profiles = extractor.extract(
            "instagram.com/mueller.immobilien",
            "https://acme.de/wohnung/1",
            &ctx(),
        );
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].confidence, ConfidenceLevel::High);
        assert!(profiles[0].is_business_profile());
    }

    #[test]
    fn twitter_and_x_map_to_same_platform() {
        let extractor = SocialMediaExtractor::new();
        let profiles = extractor.extract(
            "twitter.com/acmehomes or x.com/acmehomes",
            "https://acme.de",
            &ctx(),
        );
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].platform, SocialMediaPlatform::Twitter);
    }
}
