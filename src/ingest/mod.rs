//! Turning screenshot files into [`Document`]s.
//!
//! OCR and vision description are external collaborators behind the
//! [`OcrEngine`] and [`VisionDescriber`] traits. Vision descriptions go
//! through a [`ContentCache`] keyed by the raw image bytes, so the same
//! screenshot is only described once.

pub mod images;
pub mod ocr;
pub mod vision;

use image::DynamicImage;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::document::{CacheKey, Document};
use crate::semantic::ContentCache;

pub use ocr::TesseractOcr;
pub use vision::AnthropicVision;

/// Description used when no vision client is configured or the call fails.
pub const FALLBACK_DESCRIPTION: &str =
    "Visual description unavailable (API key not configured or API error)";

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("vision api error: {0}")]
    Vision(String),

    #[error("ocr error: {0}")]
    Ocr(String),
}

/// Extracts printed text from an image.
pub trait OcrEngine: Send + Sync {
    fn extract(&self, image: &DynamicImage) -> Result<String, IngestError>;
}

/// Produces a natural-language description of an image.
pub trait VisionDescriber: Send + Sync {
    fn describe(&self, image: &DynamicImage) -> Result<String, IngestError>;
}

pub struct ScreenshotProcessor {
    ocr: Option<Box<dyn OcrEngine>>,
    vision: Option<Box<dyn VisionDescriber>>,
    cache: ContentCache,
}

impl ScreenshotProcessor {
    pub fn new(
        ocr: Option<Box<dyn OcrEngine>>,
        vision: Option<Box<dyn VisionDescriber>>,
        cache: ContentCache,
    ) -> Self {
        Self { ocr, vision, cache }
    }

    /// Processor wired from config: tesseract for OCR, Anthropic for vision.
    ///
    /// Vision is left out when disabled or when no API key is available.
    pub fn from_config(config: &Config) -> Result<Self, IngestError> {
        let ocr: Option<Box<dyn OcrEngine>> = if config.ocr.enabled {
            Some(Box::new(TesseractOcr::new(&config.ocr)))
        } else {
            None
        };

        let vision: Option<Box<dyn VisionDescriber>> =
            match (config.vision.enabled, config.vision.resolved_api_key()) {
                (true, Some(key)) => Some(Box::new(AnthropicVision::new(&config.vision, key)?)),
                (true, None) => {
                    log::warn!("no vision API key configured; using fallback descriptions");
                    None
                }
                (false, _) => None,
            };

        let cache = ContentCache::with_capacity(config.vision.cache_capacity);
        Ok(Self::new(ocr, vision, cache))
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// OCR text of the image; empty when OCR is off or fails.
    pub fn extract_text(&self, image: &DynamicImage) -> String {
        let Some(ocr) = &self.ocr else {
            return String::new();
        };

        match ocr.extract(image) {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                log::warn!("OCR extraction failed: {e}");
                String::new()
            }
        }
    }

    /// Vision description of the image, reused for byte-identical images.
    ///
    /// Falls back to [`FALLBACK_DESCRIPTION`], which is never cached.
    pub fn describe(&self, raw_bytes: &[u8], image: &DynamicImage) -> String {
        let Some(vision) = &self.vision else {
            return FALLBACK_DESCRIPTION.to_string();
        };

        let key = CacheKey::for_bytes(raw_bytes);
        match self.cache.try_get_or_compute(&key, || vision.describe(image)) {
            Ok(description) => description,
            Err(e) => {
                log::warn!("vision description failed key={key} err={e}");
                FALLBACK_DESCRIPTION.to_string()
            }
        }
    }

    /// Build a document from raw image bytes.
    ///
    /// Undecodable bytes produce a document without text.
    pub fn process_bytes(&self, path: &str, raw_bytes: &[u8]) -> Document {
        let image = match images::decode(raw_bytes) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Failed to process {path}: {e}");
                return Document::empty(path);
            }
        };

        let ocr_text = self.extract_text(&image);
        let vision_description = self.describe(raw_bytes, &image);
        Document::new(path, ocr_text, vision_description)
    }

    pub fn process_image(&self, path: &Path) -> Document {
        let path_str = path.to_string_lossy();
        match std::fs::read(path) {
            Ok(bytes) => self.process_bytes(&path_str, &bytes),
            Err(e) => {
                log::warn!("Failed to read {path_str}: {e}");
                Document::empty(&path_str)
            }
        }
    }

    pub fn process_batch(&self, paths: &[PathBuf]) -> Vec<Document> {
        paths.iter().map(|path| self.process_image(path)).collect()
    }
}

/// Image files directly inside `dir`, sorted by path.
pub fn collect_images(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && images::is_image_path(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
