//! Search engine over screenshot documents.
//!
//! Owns the embedding provider and the vector store, both initialized
//! lazily through their fallback chains, plus the id → document table that
//! makes re-indexing idempotent.
//!
//! Mutations hold the state writer lock for their whole duration, so the
//! membership table, the document counter and the store always agree.

use serde::{Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::SearchConfig;
use crate::document::{Document, DocumentId, EntryMetadata};
use crate::semantic::deadline::Deadline;
use crate::semantic::embeddings::{fastembed_chain, EmbeddingError, EmbeddingProvider};
use crate::semantic::fallback::{ChainExhausted, FallbackChain};
use crate::semantic::index::{memory_store_chain, StoreError, VectorStore};

/// Errors that can occur inside the engine.
///
/// Only `ensure_ready` and `clear_index` surface them; indexing and search
/// log them and degrade.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Initialization failed: {0}")]
    Init(#[from] ChainExhausted),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Vector store not initialized")]
    NotInitialized,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: DocumentId,
    pub metadata: EntryMetadata,
    /// `1 - cosine_distance`
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingDimension {
    Loaded(usize),
    NotLoaded,
}

impl Display for EmbeddingDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingDimension::Loaded(dims) => write!(f, "{dims}"),
            EmbeddingDimension::NotLoaded => write!(f, "not yet loaded"),
        }
    }
}

impl Serialize for EmbeddingDimension {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EmbeddingDimension::Loaded(dims) => serializer.serialize_u64(*dims as u64),
            EmbeddingDimension::NotLoaded => serializer.serialize_str("not yet loaded"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub total_documents: usize,
    pub model_name: String,
    pub embedding_dimension: EmbeddingDimension,
    pub indexed_ids: Vec<DocumentId>,
}

#[derive(Default)]
struct IndexState {
    store: Option<Box<dyn VectorStore>>,
    indexed: HashMap<DocumentId, Document>,
    doc_count: usize,
}

/// Columns of a bulk upsert, built before anything is committed.
#[derive(Default)]
struct PendingBatch {
    ids: Vec<DocumentId>,
    embeddings: Vec<Vec<f32>>,
    metadatas: Vec<EntryMetadata>,
    texts: Vec<String>,
    documents: Vec<Document>,
}

impl PendingBatch {
    fn push(
        &mut self,
        id: DocumentId,
        embedding: Vec<f32>,
        metadata: EntryMetadata,
        document: &Document,
    ) {
        self.ids.push(id);
        self.embeddings.push(embedding);
        self.metadatas.push(metadata);
        self.texts.push(document.combined_text.clone());
        self.documents.push(document.clone());
    }
}

pub struct SearchEngine {
    config: SearchConfig,
    embedder_chain: FallbackChain<Arc<dyn EmbeddingProvider>>,
    store_chain: FallbackChain<Box<dyn VectorStore>>,
    /// Uses Mutex<Option<_>> instead of OnceLock because get_or_try_init is unstable.
    embedder: Mutex<Option<Arc<dyn EmbeddingProvider>>>,
    /// Shared by every embedding call; a hung model blocks further calls
    /// until its overrunning call returns.
    embed_deadline: Deadline,
    state: RwLock<IndexState>,
}

impl SearchEngine {
    /// Engine backed by fastembed and the in-memory store.
    ///
    /// Nothing is loaded until the first `ensure_ready`, index or search call.
    pub fn new(config: SearchConfig) -> Self {
        let embedder_chain = fastembed_chain(&config);
        let store_chain = memory_store_chain(config.expected_documents);
        Self::with_chains(config, embedder_chain, store_chain)
    }

    pub fn with_chains(
        config: SearchConfig,
        embedder_chain: FallbackChain<Arc<dyn EmbeddingProvider>>,
        store_chain: FallbackChain<Box<dyn VectorStore>>,
    ) -> Self {
        Self {
            embed_deadline: Deadline::new(config.embed_timeout()),
            config,
            embedder_chain,
            store_chain,
            embedder: Mutex::new(None),
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Initialize the embedding provider and the vector store if needed.
    ///
    /// Idempotent. Fails only when a whole fallback chain is exhausted.
    pub fn ensure_ready(&self) -> Result<(), EngineError> {
        self.embedder()?;
        let mut state = self.write_state()?;
        self.ensure_store(&mut state)
    }

    pub fn is_ready(&self) -> bool {
        let embedder_loaded = self
            .embedder
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false);
        let store_loaded = self
            .state
            .read()
            .map(|state| state.store.is_some())
            .unwrap_or(false);
        embedder_loaded && store_loaded
    }

    pub fn doc_count(&self) -> usize {
        self.state.read().map(|state| state.doc_count).unwrap_or(0)
    }

    pub fn is_indexed(&self, path: &str) -> bool {
        let id = DocumentId::for_path(path);
        self.state
            .read()
            .map(|state| state.indexed.contains_key(&id))
            .unwrap_or(false)
    }

    /// Index one document.
    ///
    /// Returns `false` for documents without text and on any failure, in
    /// which case nothing changes. Returns `true` without recomputation when
    /// the path is already indexed.
    pub fn index_document(&self, document: &Document) -> bool {
        match self.try_index_document(document) {
            Ok(indexed) => indexed,
            Err(e) => {
                log::error!("path={} outcome=error err={e}", document.path);
                false
            }
        }
    }

    fn try_index_document(&self, document: &Document) -> Result<bool, EngineError> {
        if !document.has_content() {
            log::debug!("path={} outcome=skip reason=empty", document.path);
            return Ok(false);
        }

        let id = document.id();
        let mut state = self.write_state()?;
        if state.indexed.contains_key(&id) {
            return Ok(true);
        }

        let provider = self.embedder()?;
        self.ensure_store(&mut state)?;

        let embedding = self.encode(&provider, &document.combined_text)?;
        let metadata = EntryMetadata::from_document(document, self.config.preview_chars);

        let store = state.store.as_mut().ok_or(EngineError::NotInitialized)?;
        store.upsert_batch(
            vec![id.clone()],
            vec![embedding],
            vec![metadata],
            vec![document.combined_text.clone()],
        )?;

        state.indexed.insert(id, document.clone());
        state.doc_count += 1;
        log::debug!("path={} outcome=indexed", document.path);

        Ok(true)
    }

    /// Index many documents with a single bulk upsert.
    ///
    /// Documents without text, already indexed paths and repeated paths
    /// within the batch are skipped; a document whose embedding fails is
    /// skipped too. The batch is committed only if the bulk upsert succeeds.
    /// Returns the number of newly indexed documents, 0 on failure.
    pub fn index_batch(&self, documents: &[Document]) -> usize {
        match self.try_index_batch(documents) {
            Ok(count) => count,
            Err(e) => {
                log::error!("batch indexing failed: {e}");
                0
            }
        }
    }

    fn try_index_batch(&self, documents: &[Document]) -> Result<usize, EngineError> {
        let candidates: Vec<&Document> = documents.iter().filter(|d| d.has_content()).collect();
        if candidates.is_empty() {
            return Ok(0);
        }

        let mut state = self.write_state()?;
        let provider = self.embedder()?;
        self.ensure_store(&mut state)?;

        let mut pending = PendingBatch::default();
        let mut seen = HashSet::new();

        for document in candidates {
            let id = document.id();
            if state.indexed.contains_key(&id) || !seen.insert(id.clone()) {
                continue;
            }

            match self.encode(&provider, &document.combined_text) {
                Ok(embedding) => {
                    let metadata =
                        EntryMetadata::from_document(document, self.config.preview_chars);
                    pending.push(id, embedding, metadata, document);
                }
                Err(e) => {
                    log::warn!("path={} outcome=skip err={e}", document.path);
                }
            }
        }

        if pending.ids.is_empty() {
            return Ok(0);
        }

        let store = state.store.as_mut().ok_or(EngineError::NotInitialized)?;
        store.upsert_batch(
            pending.ids.clone(),
            pending.embeddings,
            pending.metadatas,
            pending.texts,
        )?;

        let count = pending.ids.len();
        for (id, document) in pending.ids.into_iter().zip(pending.documents) {
            state.indexed.insert(id, document);
        }
        state.doc_count += count;
        log::info!("batch indexed count={count} total={}", state.doc_count);

        Ok(count)
    }

    /// Top-k search. Hits are ordered by descending confidence.
    ///
    /// Failures are logged and produce an empty list. An empty index answers
    /// immediately without loading the embedding model.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        match self.try_search(query, top_k) {
            Ok(hits) => hits,
            Err(e) => {
                log::warn!("search failed: {e}");
                vec![]
            }
        }
    }

    fn try_search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, EngineError> {
        let state = self.read_state()?;
        if state.doc_count == 0 || top_k == 0 {
            return Ok(vec![]);
        }

        let provider = self.embedder()?;
        let embedding = self.encode(&provider, query)?;

        let store = state.store.as_ref().ok_or(EngineError::NotInitialized)?;
        let matches = store.query(&embedding, top_k.min(state.doc_count))?;

        Ok(matches
            .into_iter()
            .map(|m| SearchHit {
                id: m.id,
                metadata: m.metadata,
                confidence: 1.0 - m.distance,
            })
            .collect())
    }

    /// Drop every indexed document.
    ///
    /// On failure the index is left exactly as it was.
    pub fn clear_index(&self) -> Result<(), EngineError> {
        let mut state = self.write_state()?;

        if let Some(store) = state.store.as_mut() {
            store.clear().map_err(|e| {
                log::error!("failed to clear index: {e}");
                e
            })?;
        }

        state.indexed.clear();
        state.doc_count = 0;
        log::info!("index cleared");

        Ok(())
    }

    /// Snapshot of the engine. Never loads the embedding model.
    pub fn get_stats(&self) -> EngineStats {
        let (total_documents, mut indexed_ids) = self
            .state
            .read()
            .map(|state| (state.doc_count, state.indexed.keys().cloned().collect::<Vec<_>>()))
            .unwrap_or_default();
        indexed_ids.sort();

        let loaded = self
            .embedder
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(Arc::clone));

        let (model_name, embedding_dimension) = match loaded {
            Some(provider) => (
                provider.name().to_string(),
                EmbeddingDimension::Loaded(provider.dimensions()),
            ),
            None => (self.config.model.clone(), EmbeddingDimension::NotLoaded),
        };

        EngineStats {
            total_documents,
            model_name,
            embedding_dimension,
            indexed_ids,
        }
    }

    /// Loaded provider, running the fallback chain on first use.
    fn embedder(&self) -> Result<Arc<dyn EmbeddingProvider>, EngineError> {
        let mut guard = self
            .embedder
            .lock()
            .map_err(|e| EngineError::Internal(format!("Lock poisoned: {}", e)))?;

        if let Some(provider) = guard.as_ref() {
            return Ok(Arc::clone(provider));
        }

        log::info!("Initializing embedding provider for model '{}'", self.config.model);
        let resolved = self.embedder_chain.run()?;
        log::info!(
            "Embedding provider ready model={} dimensions={} strategy={}",
            resolved.value.name(),
            resolved.value.dimensions(),
            resolved.strategy
        );

        *guard = Some(Arc::clone(&resolved.value));
        Ok(resolved.value)
    }

    fn ensure_store(&self, state: &mut IndexState) -> Result<(), EngineError> {
        if state.store.is_none() {
            let resolved = self.store_chain.run()?;
            log::info!(
                "Vector store ready store={} strategy={}",
                resolved.value.name(),
                resolved.strategy
            );
            state.store = Some(resolved.value);
        }
        Ok(())
    }

    fn encode(
        &self,
        provider: &Arc<dyn EmbeddingProvider>,
        text: &str,
    ) -> Result<Vec<f32>, EngineError> {
        let provider = Arc::clone(provider);
        let text = text.to_string();
        let embedding = self
            .embed_deadline
            .run(move || provider.encode(&text))
            .map_err(EmbeddingError::from)??;
        Ok(embedding)
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, IndexState>, EngineError> {
        self.state
            .read()
            .map_err(|e| EngineError::Internal(format!("Lock poisoned: {}", e)))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, IndexState>, EngineError> {
        self.state
            .write()
            .map_err(|e| EngineError::Internal(format!("Lock poisoned: {}", e)))
    }
}
