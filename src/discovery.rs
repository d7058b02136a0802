//! Discovery engine: orchestrates fetch, extraction, crawling, scoring,
//! validation and filtering for single URLs and batches.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use crate::crawler::{visible_text, ContactCrawler};
use crate::extractors::email::EmailExtractor;
use crate::extractors::form::FormExtractor;
use crate::extractors::ocr::{OcrConfig, OcrContactExtractor};
use crate::extractors::pdf::PdfContactExtractor;
use crate::extractors::phone::PhoneExtractor;
use crate::extractors::social::SocialMediaExtractor;
use crate::extractors::{dedupe_contacts, dedupe_forms, dedupe_profiles};
use crate::fetcher::Fetcher;
use crate::models::{
    ConfidenceLevel, Contact, ContactStatus, DiscoveryContext, DiscoveryOptions, ExtractionResult,
    ExtractorKind,
};
use crate::scoring::{ContactScoringEngine, ScoringContext};
use crate::validator::{ContactValidator, ValidationLevel, ValidatorConfig};

static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").unwrap());
static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// Images per page considered for OCR.
const OCR_IMAGES_PER_PAGE: usize = 5;
/// PDFs per page considered for text extraction.
const PDFS_PER_PAGE: usize = 3;
/// Concurrent URL discoveries in a batch.
const BATCH_CONCURRENCY: usize = 5;

#[derive(Debug, Default, Clone, Serialize)]
pub struct DiscoveryStats {
    pub urls_processed: usize,
    pub urls_failed: usize,
    pub contacts_found: usize,
    pub forms_found: usize,
    pub social_profiles_found: usize,
    pub high_confidence_contacts: usize,
    pub verified_contacts: usize,
    pub extraction_secs: f64,
    pub validation_secs: f64,
    pub total_secs: f64,
}

impl DiscoveryStats {
    pub fn success_rate(&self) -> f64 {
        if self.urls_processed == 0 {
            return 0.0;
        }
        (self.urls_processed - self.urls_failed.min(self.urls_processed)) as f64
            / self.urls_processed as f64
            * 100.0
    }
}

/// Cooperative cancellation for batch runs.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Handle dropped without cancelling: never fires.
                std::future::pending::<()>().await;
            }
        }
    }
}

pub struct ContactDiscoveryEngine {
    options: DiscoveryOptions,
    validation_level: ValidationLevel,
    fetcher: Arc<Fetcher>,
    crawler: ContactCrawler,
    email: EmailExtractor,
    phone: PhoneExtractor,
    form: FormExtractor,
    social: SocialMediaExtractor,
    ocr: Option<OcrContactExtractor>,
    pdf: Option<PdfContactExtractor>,
    scorer: ContactScoringEngine,
    validator: ContactValidator,
    cache: Mutex<HashMap<(String, String, bool), ExtractionResult>>,
    stats: Mutex<DiscoveryStats>,
}

impl ContactDiscoveryEngine {
    /// Build an engine. OCR and PDF extraction are hard feature flags: they
    /// are only available when listed in `options.methods`, and a PDF flag
    /// without a loadable PDFium library is a construction error.
    pub fn new(
        options: DiscoveryOptions,
        validator_config: ValidatorConfig,
        validation_level: ValidationLevel,
        ocr_config: OcrConfig,
    ) -> crate::error::Result<Self> {
        let fetcher = Arc::new(Fetcher::new(
            &options.user_agent,
            options.timeout,
            options.rate_limit,
        )?);

        let ocr = if options.methods.contains(&ExtractorKind::Ocr) {
            Some(OcrContactExtractor::new(fetcher.clone(), ocr_config))
        } else {
            None
        };
        let pdf = if options.methods.contains(&ExtractorKind::Pdf) {
            Some(PdfContactExtractor::new(fetcher.clone())?)
        } else {
            None
        };

        let validator = ContactValidator::new(validator_config)?;

        info!(
            "Discovery engine ready (crawling: {}, validation: {}, ocr: {}, pdf: {})",
            options.enable_crawling,
            options.enable_validation,
            ocr.is_some(),
            pdf.is_some(),
        );

        Ok(ContactDiscoveryEngine {
            crawler: ContactCrawler::new(fetcher.clone()),
            email: EmailExtractor::new(),
            phone: PhoneExtractor::new(),
            form: FormExtractor::new(),
            social: SocialMediaExtractor::new(),
            ocr,
            pdf,
            scorer: ContactScoringEngine::new(),
            validator,
            fetcher,
            options,
            validation_level,
            cache: Mutex::new(HashMap::new()),
            stats: Mutex::new(DiscoveryStats::default()),
        })
    }

    fn context_for(&self, url: &str) -> crate::error::Result<DiscoveryContext> {
        let mut ctx = DiscoveryContext::for_url(url)?;
        ctx.max_depth = self.options.max_depth;
        ctx.respect_robots = self.options.respect_robots;
        ctx.timeout = self.options.timeout;
        ctx.user_agent = self.options.user_agent.clone();
        ctx.language = self.options.language.clone();
        ctx.cultural_context = self.options.cultural_context.clone();
        ctx.enabled_extractors = self.options.methods.clone();
        ctx.confidence_threshold = self.options.confidence_threshold;
        Ok(ctx)
    }

    /// Discover contacts for a single URL. Failures come back as an error
    /// result; this never panics or propagates.
    pub async fn discover(&self, url: &str) -> ExtractionResult {
        let start = Instant::now();

        let cache_key = (
            url.to_string(),
            self.options.language.clone(),
            self.options.enable_crawling,
        );
        {
            let cache = self.cache.lock().await;
            if let Some(cached) = cache.get(&cache_key) {
                debug!("Cache hit for {}", url);
                return cached.clone();
            }
        }

        let ctx = match self.context_for(url) {
            Ok(ctx) => ctx,
            Err(e) => {
                self.note_failure(start).await;
                return ExtractionResult::failed(url, e.to_string());
            }
        };

        let mut result = match self.extract_single(url, &ctx).await {
            Ok(result) => result,
            Err(e) => {
                self.note_failure(start).await;
                warn!("Discovery failed for {}: {}", url, e);
                return ExtractionResult::failed(url, e.to_string());
            }
        };

        if self.options.enable_crawling && ctx.can_crawl_deeper() {
            let outcome = self.crawler.crawl(&ctx).await;
            result.contacts.extend(outcome.contacts);
            result.forms.extend(outcome.forms);
            result.social_profiles.extend(outcome.social_profiles);
            result.metadata.insert(
                "crawl".into(),
                serde_json::to_value(&outcome.stats).unwrap_or(Value::Null),
            );
        }

        // Social profiles participate in the contact list as well.
        let profile_contacts: Vec<Contact> = result
            .social_profiles
            .iter()
            .map(|p| {
                let mut c = p.to_contact();
                c.confidence_score = self.scorer.score_social_profile(p);
                c
            })
            .collect();
        result.contacts.extend(profile_contacts);

        result.contacts = dedupe_contacts(std::mem::take(&mut result.contacts));
        result.forms = dedupe_forms(std::mem::take(&mut result.forms));
        result.social_profiles = dedupe_profiles(std::mem::take(&mut result.social_profiles));

        for contact in &mut result.contacts {
            let fingerprint = contact.fingerprint();
            contact.insert_metadata("fingerprint", Value::String(fingerprint));
        }

        // Score everything against the seed context.
        let scoring_ctx = ScoringContext {
            cultural_context: ctx.cultural_context.clone(),
            language: ctx.language.clone(),
            source_domain: ctx.domain.clone(),
        };
        for contact in &mut result.contacts {
            contact.confidence_score = self.scorer.score_contact(contact, &scoring_ctx);
            contact.confidence_level = ConfidenceLevel::from_score(contact.confidence_score);
        }
        for form in &mut result.forms {
            let score = self.scorer.score_form(form);
            form.metadata
                .insert("quality_score".into(), crate::models::json_f64(score));
        }

        if self.options.enable_validation {
            let validation_start = Instant::now();
            let records = self
                .validator
                .validate_batch(&result.contacts, self.validation_level)
                .await;
            for (contact, record) in result.contacts.iter_mut().zip(records.iter()) {
                contact.verification_status = if record.is_valid {
                    ContactStatus::Verified
                } else {
                    ContactStatus::Invalid
                };
                contact.insert_metadata(
                    "validation",
                    crate::validator::record_metadata(record),
                );
                // Verification feeds back into the final score.
                contact.confidence_score = self.scorer.score_contact(contact, &scoring_ctx);
                contact.confidence_level = ConfidenceLevel::from_score(contact.confidence_score);
            }
            let validation_secs = validation_start.elapsed().as_secs_f64();
            self.stats.lock().await.validation_secs += validation_secs;
        }

        result.contacts =
            filter_by_confidence(std::mem::take(&mut result.contacts), ctx.confidence_threshold);

        result.extraction_secs = start.elapsed().as_secs_f64();
        self.note_success(&result, start).await;

        let mut cache = self.cache.lock().await;
        cache.insert(cache_key, result.clone());
        info!(
            "Discovery for {} found {} contacts, {} forms in {:.1}s",
            url,
            result.contacts.len(),
            result.forms.len(),
            result.extraction_secs
        );
        result
    }

    /// Discover a batch of URLs with bounded concurrency. One result per
    /// input URL, in input order; individual failures never cancel siblings.
    pub async fn discover_batch(
        self: &Arc<Self>,
        urls: &[String],
        cancel: Option<CancelToken>,
    ) -> Vec<ExtractionResult> {
        info!("Starting batch discovery for {} URLs", urls.len());
        let semaphore = Arc::new(Semaphore::new(BATCH_CONCURRENCY));
        let mut join_set: JoinSet<(usize, ExtractionResult)> = JoinSet::new();

        for (index, url) in urls.iter().enumerate() {
            let engine = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let url = url.clone();
            let cancel = cancel.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = match cancel {
                    Some(mut token) => {
                        tokio::select! {
                            result = engine.discover(&url) => result,
                            _ = token.cancelled() => ExtractionResult::failed(&url, "cancelled"),
                        }
                    }
                    None => engine.discover(&url).await,
                };
                (index, result)
            });
        }

        let mut results: Vec<Option<ExtractionResult>> = vec![None; urls.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => warn!("Batch task panicked: {}", e),
            }
        }

        results
            .into_iter()
            .enumerate()
            .map(|(i, r)| r.unwrap_or_else(|| ExtractionResult::failed(&urls[i], "task failed")))
            .collect()
    }

    async fn extract_single(
        &self,
        url: &str,
        ctx: &DiscoveryContext,
    ) -> crate::error::Result<ExtractionResult> {
        let page = self.fetcher.fetch(url, ctx).await?;

        // The parsed document is not Send; everything that needs it happens
        // in this block, before the OCR/PDF awaits below.
        let (mut result, image_urls, pdf_urls) = {
            let document = Html::parse_document(&page.body);
            let text = visible_text(&document);

            let mut result = ExtractionResult {
                source_url: page.final_url.clone(),
                ..Default::default()
            };
            result
                .metadata
                .insert("response_status".into(), Value::from(page.status));
            result
                .metadata
                .insert("content_length".into(), Value::from(page.body.len()));

            if ctx.extractor_enabled(ExtractorKind::Email) {
                result
                    .contacts
                    .extend(self.email.extract(&page.body, &text, &page.final_url, ctx));
            }
            if ctx.extractor_enabled(ExtractorKind::Phone) {
                result
                    .contacts
                    .extend(self.phone.extract(&text, &page.final_url, ctx));
            }
            if ctx.extractor_enabled(ExtractorKind::Form) {
                result
                    .forms
                    .extend(self.form.extract(&page.body, &page.final_url, ctx));
            }
            if ctx.extractor_enabled(ExtractorKind::SocialMedia) {
                result
                    .social_profiles
                    .extend(self.social.extract(&page.body, &page.final_url, ctx));
            }

            let image_urls = if self.ocr.is_some() {
                collect_image_urls(&document, &page.final_url)
            } else {
                Vec::new()
            };
            let pdf_urls = if self.pdf.is_some() {
                collect_pdf_urls(&document, &page.final_url)
            } else {
                Vec::new()
            };
            (result, image_urls, pdf_urls)
        };

        if let Some(ocr) = &self.ocr {
            for image_url in image_urls {
                result
                    .contacts
                    .extend(ocr.extract_from_image_url(&image_url, &page.final_url, ctx).await);
            }
        }
        if let Some(pdf) = &self.pdf {
            for pdf_url in pdf_urls {
                result
                    .contacts
                    .extend(pdf.extract_from_pdf_url(&pdf_url, &page.final_url, ctx).await);
            }
        }

        Ok(result)
    }

    pub async fn stats(&self) -> DiscoveryStats {
        self.stats.lock().await.clone()
    }

    pub async fn reset_stats(&self) {
        *self.stats.lock().await = DiscoveryStats::default();
    }

    pub async fn cache_size(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
        info!("Discovery cache cleared");
    }

    async fn note_success(&self, result: &ExtractionResult, start: Instant) {
        let mut stats = self.stats.lock().await;
        stats.urls_processed += 1;
        stats.contacts_found += result.contacts.len();
        stats.forms_found += result.forms.len();
        stats.social_profiles_found += result.social_profiles.len();
        stats.high_confidence_contacts += result.high_confidence_contacts().count();
        stats.verified_contacts += result.contacts.iter().filter(|c| c.is_verified()).count();
        stats.extraction_secs += result.extraction_secs;
        stats.total_secs += start.elapsed().as_secs_f64();
    }

    async fn note_failure(&self, start: Instant) {
        let mut stats = self.stats.lock().await;
        stats.urls_processed += 1;
        stats.urls_failed += 1;
        stats.total_secs += start.elapsed().as_secs_f64();
    }
}

/// Keep contacts at or above the coarse threshold.
pub fn filter_by_confidence(
    contacts: Vec<Contact>,
    threshold: ConfidenceLevel,
) -> Vec<Contact> {
    let min_rank = threshold.rank();
    contacts
        .into_iter()
        .filter(|c| c.confidence_level.rank() >= min_rank)
        .collect()
}

fn collect_image_urls(document: &Html, base_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    document
        .select(&IMG_SELECTOR)
        .filter_map(|el| el.value().attr("src"))
        .filter_map(|src| base.join(src.trim()).ok())
        .map(|u| u.to_string())
        .filter(|u| OcrContactExtractor::can_process(u))
        .take(OCR_IMAGES_PER_PAGE)
        .collect()
}

fn collect_pdf_urls(document: &Html, base_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .map(|u| u.to_string())
        .filter(|u| PdfContactExtractor::can_process(u))
        .take(PDFS_PER_PAGE)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContactMethod;
    use std::time::Duration;

    fn engine() -> Arc<ContactDiscoveryEngine> {
        let options = DiscoveryOptions {
            enable_crawling: false,
            enable_validation: false,
            rate_limit: Duration::from_millis(1),
            timeout: Duration::from_millis(300),
            ..DiscoveryOptions::default()
        };
        let validator_config = ValidatorConfig {
            enable_dns: false,
            enable_smtp: false,
            rate_limit: Duration::from_millis(1),
            ..ValidatorConfig::default()
        };
        Arc::new(
            ContactDiscoveryEngine::new(
                options,
                validator_config,
                ValidationLevel::Basic,
                OcrConfig::default(),
            )
            .unwrap(),
        )
    }

    fn contact_with_level(value: &str, level: ConfidenceLevel) -> Contact {
        let mut c = Contact::new(
            ContactMethod::Email,
            value,
            level,
            "https://acme.de/kontakt",
        );
        c.confidence_level = level;
        c
    }

    #[test]
    fn confidence_filter_respects_threshold() {
        let contacts = vec![
            contact_with_level("a@acme.de", ConfidenceLevel::High),
            contact_with_level("b@acme.de", ConfidenceLevel::Medium),
            contact_with_level("c@acme.de", ConfidenceLevel::Low),
            contact_with_level("d@acme.de", ConfidenceLevel::Uncertain),
        ];
        let filtered = filter_by_confidence(contacts, ConfidenceLevel::Medium);
        assert_eq!(filtered.len(), 2);
        assert!(filtered
            .iter()
            .all(|c| c.confidence_level.rank() >= ConfidenceLevel::Medium.rank()));
    }

    #[test]
    fn image_and_pdf_urls_are_collected_and_capped() {
        let mut html = String::from("<html><body>");
        for i in 0..8 {
            html.push_str(&format!("<img src=\"/img/{}.png\">", i));
        }
        html.push_str("<img src=\"/logo.svg\">");
        for i in 0..5 {
            html.push_str(&format!("<a href=\"/doc/{}.pdf\">expose</a>", i));
        }
        html.push_str("</body></html>");

        let document = Html::parse_document(&html);
        let images = collect_image_urls(&document, "https://acme.de/wohnung/1");
        let pdfs = collect_pdf_urls(&document, "https://acme.de/wohnung/1");

        assert_eq!(images.len(), OCR_IMAGES_PER_PAGE);
        assert!(images.iter().all(|u| u.ends_with(".png")));
        assert_eq!(pdfs.len(), PDFS_PER_PAGE);
        assert!(pdfs.iter().all(|u| u.ends_with(".pdf")));
    }

    #[tokio::test]
    async fn invalid_url_yields_error_result_not_panic() {
        let engine = engine();
        let result = engine.discover("not a url at all").await;
        assert!(result.error.is_some());
        assert!(result.contacts.is_empty());

        let stats = engine.stats().await;
        assert_eq!(stats.urls_processed, 1);
        assert_eq!(stats.urls_failed, 1);
        assert!(stats.success_rate() < 1e-9);
    }

    #[tokio::test]
    async fn batch_preserves_input_length_and_order() {
        let engine = engine();
        let urls = vec![
            "first-bad-url".to_string(),
            "second-bad-url".to_string(),
            "third-bad-url".to_string(),
        ];
        let results = engine.discover_batch(&urls, None).await;

        assert_eq!(results.len(), urls.len());
        for (url, result) in urls.iter().zip(results.iter()) {
            assert_eq!(&result.source_url, url);
            assert!(result.error.is_some());
        }
    }

    #[tokio::test]
    async fn cancelled_batch_reports_cancellation() {
        let engine = engine();
        let (handle, token) = cancel_pair();
        handle.cancel();

        // Cancellation is already signalled; in-flight URLs finish as
        // cancelled unless they complete first.
        let urls = vec!["bad-url-1".to_string(), "bad-url-2".to_string()];
        let results = engine.discover_batch(&urls, Some(token)).await;
        assert_eq!(results.len(), 2);
        for result in results {
            assert!(result.error.is_some());
        }
    }

    #[tokio::test]
    async fn cache_is_clearable() {
        let engine = engine();
        engine.discover("bad-url").await;
        // Error results are not cached; cache stays empty.
        assert_eq!(engine.cache_size().await, 0);
        engine.clear_cache().await;
        assert_eq!(engine.cache_size().await, 0);
    }

    #[test]
    fn pdf_flag_without_library_is_a_construction_error() {
        let mut options = DiscoveryOptions::default();
        options.methods.insert(ExtractorKind::Pdf);
        let validator_config = ValidatorConfig {
            enable_dns: false,
            ..ValidatorConfig::default()
        };
        let result = ContactDiscoveryEngine::new(
            options,
            validator_config,
            ValidationLevel::Basic,
            OcrConfig::default(),
        );
        // Either the library is present (engine builds) or construction
        // fails loudly; it must never silently drop the flag.
        match result {
            Ok(engine) => assert!(engine.pdf.is_some()),
            Err(e) => assert_eq!(e.kind(), "config"),
        }
    }
}
