//! PDF contact extraction via PDFium.
//!
//! Opt-in at engine construction; the constructor verifies the PDFium
//! library is loadable so a misconfigured deployment fails fast instead of
//! silently extracting nothing. Text is pulled page by page, metadata fields
//! (author, creator, title, subject) are scanned as well.

use std::sync::Arc;

use pdfium_render::prelude::*;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Result, ScoutError};
use crate::fetcher::Fetcher;
use crate::models::{Contact, DiscoveryContext};

use super::email::EmailExtractor;
use super::phone::PhoneExtractor;

/// PDF download cap.
const MAX_PDF_BYTES: u64 = 10 * 1024 * 1024;

pub struct PdfContactExtractor {
    fetcher: Arc<Fetcher>,
    email: EmailExtractor,
    phone: PhoneExtractor,
}

impl PdfContactExtractor {
    /// Verify the PDFium library binds before accepting work.
    pub fn new(fetcher: Arc<Fetcher>) -> Result<Self> {
        let _ = load_pdfium()?;
        Ok(PdfContactExtractor {
            fetcher,
            email: EmailExtractor::new(),
            phone: PhoneExtractor::new(),
        })
    }

    pub fn can_process(url: &str) -> bool {
        let path = Url::parse(url)
            .map(|u| u.path().to_lowercase())
            .unwrap_or_else(|_| url.to_lowercase());
        path.ends_with(".pdf")
    }

    /// Extract contacts from a linked PDF. Failures skip the artifact only.
    pub async fn extract_from_pdf_url(
        &self,
        pdf_url: &str,
        page_url: &str,
        ctx: &DiscoveryContext,
    ) -> Vec<Contact> {
        if !Self::can_process(pdf_url) {
            return Vec::new();
        }

        let bytes = match self.fetcher.fetch_bytes(pdf_url, ctx, MAX_PDF_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Skipping PDF {}: {}", pdf_url, e);
                return Vec::new();
            }
        };

        // Pdfium handles are not Send; the whole parse runs on a blocking
        // thread and only the extracted strings come back.
        let extracted = tokio::task::spawn_blocking(move || extract_texts(&bytes)).await;
        let texts = match extracted {
            Ok(Ok(texts)) => texts,
            Ok(Err(e)) => {
                warn!("PDF parse failed for {}: {}", pdf_url, e);
                return Vec::new();
            }
            Err(e) => {
                warn!("PDF parse task failed for {}: {}", pdf_url, e);
                return Vec::new();
            }
        };

        debug!(
            "PDF {} yielded {} text segments",
            pdf_url,
            texts.page_texts.len() + texts.metadata_texts.len()
        );

        let mut contacts = Vec::new();
        for text in texts.page_texts.iter().chain(texts.metadata_texts.iter()) {
            contacts.extend(self.email.extract_from_text(text, page_url, ctx));
            contacts.extend(self.phone.extract(text, page_url, ctx));
        }

        let mut contacts = super::dedupe_contacts(contacts);
        for contact in &mut contacts {
            contact.extraction_method = "pdf".to_string();
            contact.insert_metadata("pdf_source", Value::String(pdf_url.to_string()));
        }
        contacts
    }
}

struct PdfTexts {
    page_texts: Vec<String>,
    metadata_texts: Vec<String>,
}

fn extract_texts(bytes: &[u8]) -> Result<PdfTexts> {
    let pdfium = load_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| ScoutError::Parse {
            component: "pdf",
            url: String::new(),
            reason: format!("failed to load PDF: {}", e),
        })?;

    let mut page_texts = Vec::new();
    for page in document.pages().iter() {
        if let Ok(text) = page.text() {
            let content = text.all();
            if !content.trim().is_empty() {
                page_texts.push(content);
            }
        }
    }

    let mut metadata_texts = Vec::new();
    for tag in document.metadata().iter() {
        if matches!(
            tag.tag_type(),
            PdfDocumentMetadataTagType::Author
                | PdfDocumentMetadataTagType::Creator
                | PdfDocumentMetadataTagType::Title
                | PdfDocumentMetadataTagType::Subject
        ) {
            let value = tag.value().to_string();
            if !value.trim().is_empty() {
                metadata_texts.push(value);
            }
        }
    }

    Ok(PdfTexts {
        page_texts,
        metadata_texts,
    })
}

/// Load the PDFium dynamic library: explicit path via
/// `PDFIUM_DYNAMIC_LIB_PATH`, then alongside the executable, then the system
/// search path.
fn load_pdfium() -> Result<Pdfium> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            ScoutError::Config(format!("failed to load PDFium from {}: {}", path, e))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        ScoutError::Config(format!(
            "PDFium library not found; set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {}",
            e
        ))
    })?;
    Ok(Pdfium::new(bindings))
}
