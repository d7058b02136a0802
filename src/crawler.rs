//! Depth-bounded BFS crawler with contact-page link prioritization.
//!
//! The crawler owns its frontier and visited set for the duration of one run.
//! Links are scored for contact relevance; the top 20 per page are enqueued
//! one level deeper, never past `context.max_depth`.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ScoutError;
use crate::extractors::email::EmailExtractor;
use crate::extractors::form::FormExtractor;
use crate::extractors::phone::PhoneExtractor;
use crate::extractors::social::SocialMediaExtractor;
use crate::fetcher::Fetcher;
use crate::models::{Contact, ContactForm, DiscoveryContext, ExtractorKind, SocialMediaProfile};

static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());

/// URL path fragments that indicate contact pages.
const CONTACT_URL_PATTERNS: [&str; 15] = [
    "/kontakt",
    "/contact",
    "/impressum",
    "/about",
    "/uber",
    "/contact-us",
    "/contactus",
    "/kontaktformular",
    "/contact-form",
    "/vermieter",
    "/landlord",
    "/owner",
    "/team",
    "/staff",
    "/directory",
];

const CONTACT_KEYWORDS: [&str; 12] = [
    "kontakt",
    "contact",
    "impressum",
    "about",
    "vermieter",
    "hausverwaltung",
    "landlord",
    "owner",
    "kontaktformular",
    "get-in-touch",
    "reach-us",
    "contact-info",
];

const GERMAN_KEYWORDS: [&str; 4] = ["kontakt", "impressum", "vermieter", "hausverwaltung"];

/// Binary and asset extensions the crawler never follows.
const IGNORED_EXTENSIONS: [&str; 24] = [
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".zip", ".rar", ".tar", ".gz",
    ".7z", ".mp3", ".mp4", ".avi", ".mov", ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp",
    ".css", ".js",
];

/// Links enqueued per page, after scoring.
const LINKS_PER_PAGE: usize = 20;

#[derive(Debug, Default, Clone, Serialize)]
pub struct CrawlStats {
    pub urls_crawled: usize,
    pub contacts_found: usize,
    pub forms_found: usize,
    pub errors_encountered: usize,
    pub robots_blocked: usize,
    pub duration_secs: f64,
}

impl CrawlStats {
    pub fn success_rate(&self) -> f64 {
        if self.urls_crawled == 0 {
            return 0.0;
        }
        (self.urls_crawled - self.errors_encountered.min(self.urls_crawled)) as f64
            / self.urls_crawled as f64
            * 100.0
    }
}

pub struct CrawlOutcome {
    pub contacts: Vec<Contact>,
    pub forms: Vec<ContactForm>,
    pub social_profiles: Vec<SocialMediaProfile>,
    pub stats: CrawlStats,
    pub visited: HashSet<String>,
}

pub struct ContactCrawler {
    fetcher: Arc<Fetcher>,
    email: EmailExtractor,
    phone: PhoneExtractor,
    form: FormExtractor,
    social: SocialMediaExtractor,
}

impl ContactCrawler {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        ContactCrawler {
            fetcher,
            email: EmailExtractor::new(),
            phone: PhoneExtractor::new(),
            form: FormExtractor::new(),
            social: SocialMediaExtractor::new(),
        }
    }

    /// Crawl from the seed in `ctx`, breadth-first, up to `ctx.max_depth`.
    pub async fn crawl(&self, ctx: &DiscoveryContext) -> CrawlOutcome {
        let started: DateTime<Utc> = Utc::now();
        let start = Instant::now();
        info!("🕷️  Starting crawl of {} (max_depth {})", ctx.seed_url, ctx.max_depth);

        let mut frontier: VecDeque<(String, u32)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut stats = CrawlStats::default();
        let mut contacts = Vec::new();
        let mut forms = Vec::new();
        let mut social_profiles = Vec::new();

        frontier.push_back((ctx.seed_url.clone(), 0));

        while let Some((url, depth)) = frontier.pop_front() {
            if visited.contains(&url) {
                continue;
            }
            visited.insert(url.clone());

            let page = match self.fetcher.fetch(&url, ctx).await {
                Ok(page) => page,
                Err(ScoutError::RobotsBlocked(blocked)) => {
                    stats.robots_blocked += 1;
                    debug!("Skipping robots-blocked URL {}", blocked);
                    continue;
                }
                Err(e) => {
                    stats.errors_encountered += 1;
                    warn!("Failed to crawl {}: {}", url, e);
                    continue;
                }
            };

            stats.urls_crawled += 1;

            let mut page_ctx = ctx.clone();
            page_ctx.current_depth = depth;
            if page.final_url != ctx.seed_url && !page_ctx.discovery_path.contains(&page.final_url)
            {
                page_ctx.discovery_path.push(page.final_url.clone());
            }

            let (page_contacts, page_forms, page_profiles, links) =
                self.process_page(&page.body, &page.final_url, &page_ctx);

            stats.contacts_found += page_contacts.len();
            stats.forms_found += page_forms.len();
            contacts.extend(page_contacts);
            forms.extend(page_forms);
            social_profiles.extend(page_profiles);

            // A link at max_depth is never enqueued.
            if depth + 1 <= ctx.max_depth {
                for link in links {
                    if !visited.contains(&link) {
                        frontier.push_back((link, depth + 1));
                    }
                }
            }

            if stats.urls_crawled % 10 == 0 {
                info!(
                    "Crawl progress: {} URLs, {} contacts, {} forms",
                    stats.urls_crawled, stats.contacts_found, stats.forms_found
                );
            }
        }

        stats.duration_secs = start.elapsed().as_secs_f64();
        info!(
            "🎯 Crawl of {} complete: {} URLs, {} contacts, {} forms in {:.1}s (started {})",
            ctx.seed_url,
            stats.urls_crawled,
            stats.contacts_found,
            stats.forms_found,
            stats.duration_secs,
            started.format("%H:%M:%S"),
        );

        CrawlOutcome {
            contacts,
            forms,
            social_profiles,
            stats,
            visited,
        }
    }

    /// Run enabled extractors over one page and collect prioritized links.
    fn process_page(
        &self,
        html: &str,
        page_url: &str,
        ctx: &DiscoveryContext,
    ) -> (
        Vec<Contact>,
        Vec<ContactForm>,
        Vec<SocialMediaProfile>,
        Vec<String>,
    ) {
        let document = Html::parse_document(html);
        let text = visible_text(&document);

        let mut contacts = Vec::new();
        let mut forms = Vec::new();
        let mut profiles = Vec::new();

        if ctx.extractor_enabled(ExtractorKind::Email) {
            contacts.extend(self.email.extract(html, &text, page_url, ctx));
        }
        if ctx.extractor_enabled(ExtractorKind::Phone) {
            contacts.extend(self.phone.extract(&text, page_url, ctx));
        }
        if ctx.extractor_enabled(ExtractorKind::Form) {
            forms.extend(self.form.extract(html, page_url, ctx));
        }
        if ctx.extractor_enabled(ExtractorKind::SocialMedia) {
            profiles.extend(self.social.extract(html, page_url, ctx));
        }

        let links = extract_links(&document, page_url, ctx);
        (contacts, forms, profiles, links)
    }
}

pub fn visible_text(document: &Html) -> String {
    let node = document.select(&BODY_SELECTOR).next();
    let fragments: Vec<&str> = match node {
        Some(body) => body.text().collect(),
        None => document.root_element().text().collect(),
    };
    fragments
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract same-site links from a page, scored for contact relevance. Links
/// resolve against the final (post-redirect) page URL.
pub fn extract_links(document: &Html, base_url: &str, ctx: &DiscoveryContext) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };

    let mut scored: Vec<(String, f64)> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for element in document.select(&LINK_SELECTOR) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }

        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }

        let path_lower = resolved.path().to_lowercase();
        if IGNORED_EXTENSIONS.iter().any(|ext| path_lower.ends_with(ext)) {
            continue;
        }

        let Some(host) = resolved.host_str() else {
            continue;
        };
        if !ctx.is_allowed_domain(host) {
            continue;
        }

        let mut resolved = resolved;
        resolved.set_fragment(None);
        let url_string = resolved.to_string();
        if !seen.insert(url_string.clone()) {
            continue;
        }

        let anchor_text = element.text().collect::<String>().to_lowercase();
        let score = score_link(&url_string, &anchor_text, ctx);
        scored.push((url_string, score));
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
        .into_iter()
        .take(LINKS_PER_PAGE)
        .map(|(url, _)| url)
        .collect()
}

/// Contact URL patterns weigh heaviest, anchor keywords next, locale keywords
/// in German context on top; depth drags the score down.
pub fn score_link(url: &str, anchor_text: &str, ctx: &DiscoveryContext) -> f64 {
    let mut score = 0.0;
    let url_lower = url.to_lowercase();

    for pattern in CONTACT_URL_PATTERNS {
        if url_lower.contains(pattern) {
            score += 10.0;
        }
    }
    for keyword in CONTACT_KEYWORDS {
        if anchor_text.contains(keyword) {
            score += 5.0;
        }
    }
    if ctx.language == "de" || ctx.cultural_context == "german" {
        for keyword in GERMAN_KEYWORDS {
            if anchor_text.contains(keyword) {
                score += 3.0;
            }
        }
    }

    score -= ctx.current_depth as f64 * 2.0;
    score
}
