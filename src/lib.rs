//! Semantic search over screenshots.
//!
//! Screenshots are turned into text documents (OCR plus a vision
//! description), embedded, and searched by meaning with cosine similarity.
//! Everything lives in process memory.

pub mod config;
pub mod document;
pub mod ingest;
pub mod semantic;
#[cfg(test)]
mod tests;

pub use config::Config;
pub use document::{CacheKey, Document, DocumentId, EntryMetadata};
pub use ingest::{collect_images, ScreenshotProcessor};
pub use semantic::{ContentCache, EngineStats, SearchEngine, SearchHit};
