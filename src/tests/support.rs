//! Offline stand-ins for the embedding model and vector store.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::SearchConfig;
use crate::document::{DocumentId, EntryMetadata};
use crate::semantic::{
    memory_store_chain, EmbeddingError, EmbeddingProvider, FallbackChain, QueryMatch, SearchEngine,
    StoreError, VectorStore,
};

pub const TEST_DIMENSIONS: usize = 512;

/// Bag-of-words embedder: each lowercase token bumps one hashed bucket.
pub struct TokenEmbedder {
    pub calls: Arc<AtomicUsize>,
    fail_marker: Option<&'static str>,
    delay: Option<Duration>,
}

impl TokenEmbedder {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            fail_marker: None,
            delay: None,
        }
    }

    /// Fails for any text containing `marker`.
    pub fn failing_on(marker: &'static str) -> Self {
        Self {
            fail_marker: Some(marker),
            ..Self::new()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }
}

impl EmbeddingProvider for TokenEmbedder {
    fn name(&self) -> &str {
        "token-test"
    }

    fn dimensions(&self) -> usize {
        TEST_DIMENSIONS
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(marker) = self.fail_marker {
            if text.contains(marker) {
                return Err(EmbeddingError::EmbeddingFailed(format!("refusing {marker}")));
            }
        }

        let mut v = vec![0f32; TEST_DIMENSIONS];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            v[(hasher.finish() as usize) % TEST_DIMENSIONS] += 1.0;
        }
        Ok(v)
    }
}

/// Store whose writes and reads always fail.
pub struct BrokenStore;

impl VectorStore for BrokenStore {
    fn name(&self) -> &str {
        "broken"
    }

    fn len(&self) -> usize {
        0
    }

    fn contains(&self, _id: &DocumentId) -> bool {
        false
    }

    fn dimensions(&self) -> Option<usize> {
        None
    }

    fn upsert_batch(
        &mut self,
        _ids: Vec<DocumentId>,
        _embeddings: Vec<Vec<f32>>,
        _metadatas: Vec<EntryMetadata>,
        _texts: Vec<String>,
    ) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk on fire".to_string()))
    }

    fn query(&self, _embedding: &[f32], _k: usize) -> Result<Vec<QueryMatch>, StoreError> {
        Err(StoreError::Backend("disk on fire".to_string()))
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk on fire".to_string()))
    }
}

/// Chain that hands out `provider` and counts how often it was initialized.
pub fn counted_chain(
    provider: Arc<dyn EmbeddingProvider>,
    inits: Arc<AtomicUsize>,
) -> FallbackChain<Arc<dyn EmbeddingProvider>> {
    FallbackChain::new("embedding provider").then("test", move || {
        inits.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(Arc::clone(&provider))
    })
}

pub struct Harness {
    pub engine: SearchEngine,
    pub encode_calls: Arc<AtomicUsize>,
    pub inits: Arc<AtomicUsize>,
}

pub fn harness_with(embedder: TokenEmbedder, config: SearchConfig) -> Harness {
    let encode_calls = embedder.calls.clone();
    let inits = Arc::new(AtomicUsize::new(0));
    let chain = counted_chain(Arc::new(embedder), inits.clone());
    let engine = SearchEngine::with_chains(config, chain, memory_store_chain(16));

    Harness {
        engine,
        encode_calls,
        inits,
    }
}

pub fn harness() -> Harness {
    harness_with(TokenEmbedder::new(), SearchConfig::default())
}

pub fn calls(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}
