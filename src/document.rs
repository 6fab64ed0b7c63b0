//! Screenshot documents and the identities derived from them.
//!
//! A [`Document`] is what the ingestion pipeline hands to the search engine.
//! Two hashes hang off it:
//! - [`DocumentId`]: hash of the path, used for dedup inside the index
//! - [`CacheKey`]: hash of the raw image bytes, used to reuse vision descriptions

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::{fmt::Display, ops::Deref};

/// Separator placed between OCR text and the vision description.
pub const COMBINED_SEPARATOR: &str = "\n\n";

/// Default length (in characters) of the text previews kept next to each vector.
pub const DEFAULT_PREVIEW_CHARS: usize = 500;

/// Number of digest bytes kept for a document id.
const DOCUMENT_ID_BYTES: usize = 16;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub path: String,
    pub filename: String,
    pub ocr_text: String,
    pub vision_description: String,
    /// Text that gets embedded; authoritative for relevance.
    pub combined_text: String,
}

impl Document {
    /// Build a document from extracted texts, joining them with [`COMBINED_SEPARATOR`].
    pub fn new(path: &str, ocr_text: String, vision_description: String) -> Self {
        let combined_text = format!("{ocr_text}{COMBINED_SEPARATOR}{vision_description}");
        Self {
            path: path.to_string(),
            filename: filename_of(path),
            ocr_text,
            vision_description,
            combined_text,
        }
    }

    /// A document with no text at all. Indexing skips it.
    pub fn empty(path: &str) -> Self {
        Self {
            path: path.to_string(),
            filename: filename_of(path),
            ..Default::default()
        }
    }

    pub fn has_content(&self) -> bool {
        !self.combined_text.trim().is_empty()
    }

    pub fn id(&self) -> DocumentId {
        DocumentId::for_path(&self.path)
    }
}

fn filename_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Stable document identity derived from the document path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub struct DocumentId(String);

impl DocumentId {
    /// SHA-256 of the path, truncated to 16 bytes and hex encoded.
    pub fn for_path(path: &str) -> Self {
        let digest = Sha256::digest(path.as_bytes());
        DocumentId(to_hex(&digest[..DOCUMENT_ID_BYTES]))
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Deref for DocumentId {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<DocumentId> for String {
    fn from(fr: DocumentId) -> Self {
        fr.0
    }
}

/// Content address of an image: SHA-256 of its raw bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_bytes(bytes: &[u8]) -> Self {
        CacheKey(to_hex(&Sha256::digest(bytes)))
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Metadata stored next to each vector and returned with search hits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub path: String,
    pub filename: String,
    pub ocr_preview: String,
    pub vision_preview: String,
    pub has_ocr: bool,
    pub has_vision: bool,
}

impl EntryMetadata {
    pub fn from_document(document: &Document, preview_chars: usize) -> Self {
        Self {
            path: document.path.clone(),
            filename: document.filename.clone(),
            ocr_preview: preview(&document.ocr_text, preview_chars),
            vision_preview: preview(&document.vision_description, preview_chars),
            has_ocr: !document.ocr_text.is_empty(),
            has_vision: !document.vision_description.is_empty(),
        }
    }
}

/// First `max_chars` characters of `text`. Never splits a UTF-8 sequence.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_is_deterministic() {
        let a = DocumentId::for_path("shots/login.png");
        let b = DocumentId::for_path("shots/login.png");
        assert_eq!(a, b);
        assert_eq!(a.len(), DOCUMENT_ID_BYTES * 2);
    }

    #[test]
    fn test_document_id_differs_per_path() {
        let a = DocumentId::for_path("a.png");
        let b = DocumentId::for_path("b.png");
        assert_ne!(a, b);
    }

    #[test]
    fn test_cache_key_ignores_path() {
        let bytes = b"\x89PNG fake image bytes";
        assert_eq!(CacheKey::for_bytes(bytes), CacheKey::for_bytes(bytes));
        assert_ne!(CacheKey::for_bytes(bytes), CacheKey::for_bytes(b"other"));
    }

    #[test]
    fn test_new_document_combines_texts() {
        let doc = Document::new("/tmp/shots/a.png", "Sign in".into(), "A login form".into());
        assert_eq!(doc.filename, "a.png");
        assert_eq!(doc.combined_text, "Sign in\n\nA login form");
        assert!(doc.has_content());
    }

    #[test]
    fn test_empty_document_has_no_content() {
        let doc = Document::empty("broken.png");
        assert_eq!(doc.filename, "broken.png");
        assert!(!doc.has_content());

        let whitespace = Document::new("w.png", "  ".into(), "\t".into());
        assert!(!whitespace.has_content());
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let text = "é".repeat(600);
        let p = preview(&text, DEFAULT_PREVIEW_CHARS);
        assert_eq!(p.chars().count(), DEFAULT_PREVIEW_CHARS);

        assert_eq!(preview("short", DEFAULT_PREVIEW_CHARS), "short");
    }

    #[test]
    fn test_metadata_flags() {
        let doc = Document::new("a.png", String::new(), "dark theme dashboard".into());
        let meta = EntryMetadata::from_document(&doc, 4);
        assert!(!meta.has_ocr);
        assert!(meta.has_vision);
        assert_eq!(meta.vision_preview, "dark");
        assert_eq!(meta.ocr_preview, "");
    }
}
