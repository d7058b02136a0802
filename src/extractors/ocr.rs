//! OCR-based contact extraction from images.
//!
//! Opt-in at engine construction. Downloads the image within a size cap,
//! preprocesses it for recognition (RGB conversion, contrast boost, upscale
//! for small sources), runs the `tesseract` binary, and feeds the recognized
//! text back through the email and phone extractors.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, ImageOutputFormat};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Result, ScoutError};
use crate::fetcher::Fetcher;
use crate::models::{Contact, DiscoveryContext};

use super::email::EmailExtractor;
use super::phone::PhoneExtractor;

const IMAGE_EXTENSIONS: [&str; 6] = [".png", ".jpg", ".jpeg", ".webp", ".bmp", ".tiff"];

/// Image download cap; contact banners are small, anything bigger is not
/// worth recognizing.
const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

/// Below this size the image is doubled before recognition.
const MIN_WIDTH: u32 = 800;
const MIN_HEIGHT: u32 = 600;

#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Tesseract language codes, joined with `+` on the command line.
    pub languages: Vec<String>,
    pub tesseract_command: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        OcrConfig {
            languages: vec!["deu".to_string(), "eng".to_string()],
            tesseract_command: "tesseract".to_string(),
        }
    }
}

pub struct OcrContactExtractor {
    fetcher: Arc<Fetcher>,
    email: EmailExtractor,
    phone: PhoneExtractor,
    config: OcrConfig,
}

impl OcrContactExtractor {
    pub fn new(fetcher: Arc<Fetcher>, config: OcrConfig) -> Self {
        OcrContactExtractor {
            fetcher,
            email: EmailExtractor::new(),
            phone: PhoneExtractor::new(),
            config,
        }
    }

    /// Whether the URL points at an image we recognize.
    pub fn can_process(url: &str) -> bool {
        let path = Url::parse(url)
            .map(|u| u.path().to_lowercase())
            .unwrap_or_else(|_| url.to_lowercase());
        IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    }

    /// Extract contacts from an image URL found on `page_url`. Failures skip
    /// the artifact only; the page pipeline continues.
    pub async fn extract_from_image_url(
        &self,
        image_url: &str,
        page_url: &str,
        ctx: &DiscoveryContext,
    ) -> Vec<Contact> {
        if !Self::can_process(image_url) {
            return Vec::new();
        }

        let bytes = match self.fetcher.fetch_bytes(image_url, ctx, MAX_IMAGE_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Skipping image {}: {}", image_url, e);
                return Vec::new();
            }
        };

        let text = match self.recognize(bytes).await {
            Ok(text) => text,
            Err(e) => {
                warn!("OCR failed for {}: {}", image_url, e);
                return Vec::new();
            }
        };
        if text.trim().is_empty() {
            return Vec::new();
        }
        debug!("OCR text from {}: {} chars", image_url, text.len());

        let mut contacts = self.email.extract_from_text(&text, page_url, ctx);
        contacts.extend(self.phone.extract(&text, page_url, ctx));

        for contact in &mut contacts {
            contact.extraction_method = "ocr".to_string();
            contact.insert_metadata("ocr_source", Value::String(image_url.to_string()));
        }
        contacts
    }

    async fn recognize(&self, bytes: Vec<u8>) -> Result<String> {
        let prepared = tokio::task::spawn_blocking(move || prepare_image(&bytes))
            .await
            .map_err(|e| ScoutError::Parse {
                component: "ocr",
                url: String::new(),
                reason: e.to_string(),
            })??;

        let path = scratch_path();
        tokio::fs::write(&path, &prepared).await?;

        let languages = self.config.languages.join("+");
        let output = tokio::process::Command::new(&self.config.tesseract_command)
            .arg(&path)
            .arg("stdout")
            .arg("-l")
            .arg(&languages)
            .arg("--psm")
            .arg("3")
            .output()
            .await;

        tokio::fs::remove_file(&path).await.ok();

        let output = output.map_err(|e| {
            ScoutError::Config(format!(
                "could not run '{}': {} (is tesseract installed?)",
                self.config.tesseract_command, e
            ))
        })?;

        if !output.status.success() {
            return Err(ScoutError::Parse {
                component: "ocr",
                url: String::new(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Decode, convert to RGB, boost contrast and upscale small images; returns
/// PNG bytes ready for recognition.
fn prepare_image(bytes: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(bytes).map_err(|e| ScoutError::Parse {
        component: "ocr",
        url: String::new(),
        reason: format!("image decode failed: {}", e),
    })?;

    let rgb = decoded.to_rgb8();
    let mut enhanced = image::imageops::contrast(&rgb, 1.5);

    let (width, height) = (enhanced.width(), enhanced.height());
    if width < MIN_WIDTH || height < MIN_HEIGHT {
        enhanced = image::imageops::resize(
            &enhanced,
            width * 2,
            height * 2,
            FilterType::CatmullRom,
        );
    }

    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(enhanced)
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ScoutError::Parse {
            component: "ocr",
            url: String::new(),
            reason: format!("PNG encode failed: {}", e),
        })?;
    Ok(cursor.into_inner())
}

fn scratch_path() -> PathBuf {
    std::env::temp_dir().join(format!("contact-scout-ocr-{}.png", uuid::Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn recognizes_image_extensions() {
        assert!(OcrContactExtractor::can_process(
            "https://acme.de/kontakt-banner.png"
        ));
        assert!(OcrContactExtractor::can_process(
            "https://acme.de/img/card.JPEG?size=large"
        ));
        assert!(!OcrContactExtractor::can_process(
            "https://acme.de/kontakt.html"
        ));
        assert!(!OcrContactExtractor::can_process("https://acme.de/doc.pdf"));
    }

    #[test]
    fn prepare_image_upscales_small_input() {
        let img = RgbImage::from_pixel(100, 80, Rgb([200, 200, 200]));
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .unwrap();

        let prepared = prepare_image(&cursor.into_inner()).unwrap();
        let reloaded = image::load_from_memory(&prepared).unwrap();
        assert_eq!(reloaded.width(), 200);
        assert_eq!(reloaded.height(), 160);
    }

    #[test]
    fn prepare_image_keeps_large_input_size() {
        let img = RgbImage::from_pixel(900, 700, Rgb([10, 10, 10]));
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .unwrap();

        let prepared = prepare_image(&cursor.into_inner()).unwrap();
        let reloaded = image::load_from_memory(&prepared).unwrap();
        assert_eq!(reloaded.width(), 900);
        assert_eq!(reloaded.height(), 700);
    }

    #[test]
    fn prepare_image_rejects_garbage() {
        assert!(prepare_image(&[0xde, 0xad, 0xbe, 0xef]).is_err());
    }
}
