//! Semantic indexing and retrieval for screenshots.
//!
//! # Architecture
//!
//! - `embeddings`: embedding providers (fastembed by default)
//! - `index`: vector stores with cosine nearest-neighbor search
//! - `cache`: bounded content-addressed description cache
//! - `fallback`: ordered initialization strategies
//! - `deadline`: timeouts around blocking external calls
//! - `engine`: dedup, batching and scoring on top of the above

pub mod cache;
pub mod deadline;
pub mod embeddings;
mod engine;
pub mod fallback;
pub mod index;

pub use cache::ContentCache;
pub use embeddings::{fastembed_chain, EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use engine::{EmbeddingDimension, EngineError, EngineStats, SearchEngine, SearchHit};
pub use fallback::{ChainExhausted, FallbackChain};
pub use index::{memory_store_chain, MemoryVectorStore, QueryMatch, StoreError, VectorStore};

/// Default embedding model name
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
