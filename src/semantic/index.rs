//! Vector stores with cosine-distance nearest-neighbor search.
//!
//! [`MemoryVectorStore`] keeps everything in process memory; nothing
//! survives a restart.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::document::{DocumentId, EntryMetadata};
use crate::semantic::fallback::FallbackChain;

/// Storage for embedded documents.
///
/// `upsert_batch` is all-or-nothing: either every entry of the batch is
/// stored or none is.
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &str;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, id: &DocumentId) -> bool;

    /// Embedding length of the stored entries, once the first entry exists.
    fn dimensions(&self) -> Option<usize>;

    /// Insert new entries. Ids must not already be present.
    fn upsert_batch(
        &mut self,
        ids: Vec<DocumentId>,
        embeddings: Vec<Vec<f32>>,
        metadatas: Vec<EntryMetadata>,
        texts: Vec<String>,
    ) -> Result<(), StoreError>;

    /// Up to `k` entries ordered by increasing cosine distance.
    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<QueryMatch>, StoreError>;

    fn clear(&mut self) -> Result<(), StoreError>;
}

/// A single nearest-neighbor match.
#[derive(Debug, Clone)]
pub struct QueryMatch {
    pub id: DocumentId,
    pub metadata: EntryMetadata,
    /// Cosine distance, `1 - cosine_similarity`.
    pub distance: f32,
}

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot store or search with zero-norm vector")]
    ZeroNormVector,

    #[error("Entry {0} already exists")]
    DuplicateId(DocumentId),

    #[error("Batch columns differ in length: {ids} ids, {embeddings} embeddings, {metadatas} metadatas, {texts} texts")]
    LengthMismatch {
        ids: usize,
        embeddings: usize,
        metadatas: usize,
        texts: usize,
    },

    #[error("Failed to reserve space for {0} entries: {1}")]
    Allocation(usize, String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone)]
struct StoredEntry {
    id: DocumentId,
    embedding: Vec<f32>,
    norm: f32,
    metadata: EntryMetadata,
    text: String,
}

/// In-memory vector store.
///
/// Entries are kept in insertion order, which also breaks distance ties.
/// The embedding length is fixed by the first stored entry and released
/// again by `clear`.
#[derive(Default)]
pub struct MemoryVectorStore {
    entries: Vec<StoredEntry>,
    positions: HashMap<DocumentId, usize>,
    dimensions: Option<usize>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with room for `capacity` entries up front.
    pub fn try_with_capacity(capacity: usize) -> Result<Self, StoreError> {
        let mut store = Self::new();
        store
            .entries
            .try_reserve(capacity)
            .map_err(|e| StoreError::Allocation(capacity, e.to_string()))?;
        store
            .positions
            .try_reserve(capacity)
            .map_err(|e| StoreError::Allocation(capacity, e.to_string()))?;
        Ok(store)
    }

    /// Stored text of an entry.
    pub fn text(&self, id: &DocumentId) -> Option<&str> {
        self.positions
            .get(id)
            .map(|&pos| self.entries[pos].text.as_str())
    }

    fn validate_batch(
        &self,
        ids: &[DocumentId],
        embeddings: &[Vec<f32>],
    ) -> Result<Option<usize>, StoreError> {
        let mut dimensions = self.dimensions;
        let mut seen = HashSet::with_capacity(ids.len());

        for (id, embedding) in ids.iter().zip(embeddings) {
            if self.positions.contains_key(id) || !seen.insert(id) {
                return Err(StoreError::DuplicateId(id.clone()));
            }

            let expected = *dimensions.get_or_insert(embedding.len());
            if embedding.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    got: embedding.len(),
                });
            }

            if l2_norm(embedding) < f32::EPSILON {
                return Err(StoreError::ZeroNormVector);
            }
        }

        Ok(dimensions)
    }
}

impl VectorStore for MemoryVectorStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn contains(&self, id: &DocumentId) -> bool {
        self.positions.contains_key(id)
    }

    fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    fn upsert_batch(
        &mut self,
        ids: Vec<DocumentId>,
        embeddings: Vec<Vec<f32>>,
        metadatas: Vec<EntryMetadata>,
        texts: Vec<String>,
    ) -> Result<(), StoreError> {
        if ids.len() != embeddings.len() || ids.len() != metadatas.len() || ids.len() != texts.len()
        {
            return Err(StoreError::LengthMismatch {
                ids: ids.len(),
                embeddings: embeddings.len(),
                metadatas: metadatas.len(),
                texts: texts.len(),
            });
        }

        if ids.is_empty() {
            return Ok(());
        }

        // Validate everything before the first write.
        let dimensions = self.validate_batch(&ids, &embeddings)?;

        self.entries.reserve(ids.len());
        for (((id, embedding), metadata), text) in
            ids.into_iter().zip(embeddings).zip(metadatas).zip(texts)
        {
            let norm = l2_norm(&embedding);
            self.positions.insert(id.clone(), self.entries.len());
            self.entries.push(StoredEntry {
                id,
                embedding,
                norm,
                metadata,
                text,
            });
        }
        self.dimensions = dimensions;

        Ok(())
    }

    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<QueryMatch>, StoreError> {
        let k = k.min(self.entries.len());
        if k == 0 {
            return Ok(vec![]);
        }

        if let Some(expected) = self.dimensions {
            if embedding.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    got: embedding.len(),
                });
            }
        }

        let query_norm = l2_norm(embedding);
        if query_norm < f32::EPSILON {
            return Err(StoreError::ZeroNormVector);
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| (pos, cosine_distance(embedding, query_norm, entry)))
            .collect();

        // Stable sort keeps insertion order among equal distances
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(pos, distance)| {
                let entry = &self.entries[pos];
                QueryMatch {
                    id: entry.id.clone(),
                    metadata: entry.metadata.clone(),
                    distance,
                }
            })
            .collect())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.entries.clear();
        self.positions.clear();
        self.dimensions = None;
        Ok(())
    }
}

/// Default initialization order for the in-memory store:
/// 1. `preallocated`: reserve room for the expected document count
/// 2. `default`: start empty and grow on demand
pub fn memory_store_chain(expected_documents: usize) -> FallbackChain<Box<dyn VectorStore>> {
    FallbackChain::new("vector store")
        .then("preallocated", move || {
            MemoryVectorStore::try_with_capacity(expected_documents)
                .map(|store| Box::new(store) as Box<dyn VectorStore>)
        })
        .then("default", || {
            Ok::<_, StoreError>(Box::new(MemoryVectorStore::new()) as Box<dyn VectorStore>)
        })
}

/// Compute L2 norm of a vector.
fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine distance between the query and a stored entry.
/// Assumes both norms are precomputed and non-zero.
fn cosine_distance(query: &[f32], query_norm: f32, entry: &StoredEntry) -> f32 {
    let dot_product: f32 = query
        .iter()
        .zip(entry.embedding.iter())
        .map(|(a, b)| a * b)
        .sum();
    1.0 - dot_product / (query_norm * entry.norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(path: &str) -> EntryMetadata {
        EntryMetadata {
            path: path.to_string(),
            filename: path.to_string(),
            ocr_preview: String::new(),
            vision_preview: String::new(),
            has_ocr: false,
            has_vision: false,
        }
    }

    fn insert(
        store: &mut MemoryVectorStore,
        path: &str,
        embedding: Vec<f32>,
    ) -> Result<(), StoreError> {
        store.upsert_batch(
            vec![DocumentId::for_path(path)],
            vec![embedding],
            vec![meta(path)],
            vec![path.to_string()],
        )
    }

    #[test]
    fn test_new_store() {
        let store = MemoryVectorStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
        assert_eq!(store.dimensions(), None);
    }

    #[test]
    fn test_insert_and_contains() {
        let mut store = MemoryVectorStore::new();
        insert(&mut store, "a.png", vec![1.0, 0.0, 0.0]).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.dimensions(), Some(3));
        assert!(store.contains(&DocumentId::for_path("a.png")));
        assert_eq!(store.text(&DocumentId::for_path("a.png")), Some("a.png"));
    }

    #[test]
    fn test_insert_dimension_mismatch() {
        let mut store = MemoryVectorStore::new();
        insert(&mut store, "a.png", vec![1.0, 0.0, 0.0]).unwrap();

        let result = insert(&mut store, "b.png", vec![1.0, 0.0, 0.0, 0.0]);
        assert!(matches!(result, Err(StoreError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_insert_zero_norm_rejected() {
        let mut store = MemoryVectorStore::new();
        let result = insert(&mut store, "a.png", vec![0.0, 0.0, 0.0]);
        assert!(matches!(result, Err(StoreError::ZeroNormVector)));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut store = MemoryVectorStore::new();
        insert(&mut store, "a.png", vec![1.0, 0.0]).unwrap();

        let result = insert(&mut store, "a.png", vec![0.0, 1.0]);
        assert!(matches!(result, Err(StoreError::DuplicateId(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_failed_batch_leaves_store_untouched() {
        let mut store = MemoryVectorStore::new();
        insert(&mut store, "a.png", vec![1.0, 0.0]).unwrap();

        // second entry is invalid; the first must not be stored either
        let result = store.upsert_batch(
            vec![DocumentId::for_path("b.png"), DocumentId::for_path("c.png")],
            vec![vec![0.0, 1.0], vec![0.0, 0.0]],
            vec![meta("b.png"), meta("c.png")],
            vec!["b".into(), "c".into()],
        );

        assert!(matches!(result, Err(StoreError::ZeroNormVector)));
        assert_eq!(store.len(), 1);
        assert!(!store.contains(&DocumentId::for_path("b.png")));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut store = MemoryVectorStore::new();
        let result = store.upsert_batch(
            vec![DocumentId::for_path("a.png")],
            vec![],
            vec![meta("a.png")],
            vec!["a".into()],
        );
        assert!(matches!(result, Err(StoreError::LengthMismatch { .. })));
    }

    #[test]
    fn test_query_orders_by_distance() {
        let mut store = MemoryVectorStore::new();
        insert(&mut store, "x.png", vec![1.0, 0.0, 0.0]).unwrap();
        insert(&mut store, "y.png", vec![0.0, 1.0, 0.0]).unwrap();

        let results = store.query(&[1.0, 0.1, 0.0], 10).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].metadata.path, "x.png");
        assert!(results[0].distance < results[1].distance);
        assert!(results[0].distance.abs() < 0.01);
    }

    #[test]
    fn test_query_clamps_k() {
        let mut store = MemoryVectorStore::new();
        for i in 0..10 {
            insert(&mut store, &format!("{i}.png"), vec![1.0, i as f32 * 0.1, 0.0]).unwrap();
        }

        assert_eq!(store.query(&[1.0, 0.0, 0.0], 3).unwrap().len(), 3);
        assert_eq!(store.query(&[1.0, 0.0, 0.0], 50).unwrap().len(), 10);
        assert!(store.query(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut store = MemoryVectorStore::new();
        insert(&mut store, "first.png", vec![0.0, 1.0]).unwrap();
        insert(&mut store, "second.png", vec![0.0, 2.0]).unwrap();

        let results = store.query(&[0.0, 1.0], 2).unwrap();
        assert_eq!(results[0].metadata.path, "first.png");
        assert_eq!(results[1].metadata.path, "second.png");
    }

    #[test]
    fn test_query_empty_store_returns_empty() {
        let store = MemoryVectorStore::new();
        assert!(store.query(&[1.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_clear() {
        let mut store = MemoryVectorStore::new();
        insert(&mut store, "a.png", vec![1.0, 0.0]).unwrap();

        store.clear().unwrap();
        assert!(store.is_empty());
        assert_eq!(store.dimensions(), None);
        assert!(store.query(&[1.0, 0.0], 5).unwrap().is_empty());

        // a new index may use a different embedding length
        insert(&mut store, "a.png", vec![1.0, 0.0, 0.0]).unwrap();
        assert_eq!(store.dimensions(), Some(3));
    }

    #[test]
    fn test_chain_falls_back_when_preallocation_fails() {
        let resolved = memory_store_chain(usize::MAX).run().unwrap();
        assert_eq!(resolved.strategy, "default");

        let resolved = memory_store_chain(16).run().unwrap();
        assert_eq!(resolved.strategy, "preallocated");
        assert!(resolved.value.is_empty());
    }
}
