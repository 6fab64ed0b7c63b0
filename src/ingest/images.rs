//! Image helpers for the ingestion pipeline
//!
//! Decoding, downscaling before upload and PNG encoding.

use image::{DynamicImage, GenericImageView, ImageFormat};
use std::borrow::Cow;
use std::io::Cursor;
use std::path::Path;

use crate::ingest::IngestError;

/// File extensions treated as screenshots
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

pub fn decode(data: &[u8]) -> Result<DynamicImage, IngestError> {
    Ok(image::load_from_memory(data)?)
}

/// Dimensions after fitting `(width, height)` into a `max_dimension` square,
/// keeping the aspect ratio. The flag tells whether a resize is needed.
pub fn fit_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32, bool) {
    if width > max_dimension || height > max_dimension {
        let scale = (max_dimension as f64) / (width.max(height) as f64);
        let new_w = ((width as f64) * scale).round() as u32;
        let new_h = ((height as f64) * scale).round() as u32;
        (new_w.clamp(1, max_dimension), new_h.clamp(1, max_dimension), true)
    } else {
        (width, height, false)
    }
}

/// Downscale an image so neither side exceeds `max_dimension`.
/// Images that already fit are borrowed as-is.
pub fn downscale(img: &DynamicImage, max_dimension: u32) -> Cow<'_, DynamicImage> {
    let (w, h) = img.dimensions();
    let (new_w, new_h, needs_resize) = fit_dimensions(w, h, max_dimension);

    if needs_resize {
        Cow::Owned(img.resize_exact(new_w, new_h, image::imageops::FilterType::Lanczos3))
    } else {
        Cow::Borrowed(img)
    }
}

pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, IngestError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
