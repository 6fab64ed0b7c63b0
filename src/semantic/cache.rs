//! Content-addressed cache for expensive per-image descriptions.
//!
//! Keys are hashes of the raw image bytes, so byte-identical screenshots
//! share one description no matter where they live on disk. The cache is
//! bounded; once full, moka evicts the least valuable entries.

use moka::sync::Cache;
use std::sync::Arc;

use crate::document::CacheKey;

/// Default number of descriptions kept in memory.
pub const DEFAULT_CACHE_CAPACITY: u64 = 1024;

#[derive(Clone)]
pub struct ContentCache {
    inner: Cache<CacheKey, String>,
    capacity: u64,
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl ContentCache {
    pub fn with_capacity(capacity: u64) -> Self {
        let inner = Cache::builder().max_capacity(capacity).build();
        Self { inner, capacity }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Return the cached value for `key`, computing and storing it on a miss.
    ///
    /// Concurrent callers asking for the same key run `compute` once.
    pub fn get_or_compute<F>(&self, key: &CacheKey, compute: F) -> String
    where
        F: FnOnce() -> String,
    {
        self.inner.get_with(key.clone(), compute)
    }

    /// Like [`get_or_compute`](Self::get_or_compute), for computations that can fail.
    ///
    /// Failures are not cached; the next call for the same key computes again.
    pub fn try_get_or_compute<F, E>(&self, key: &CacheKey, compute: F) -> Result<String, Arc<E>>
    where
        F: FnOnce() -> Result<String, E>,
        E: Send + Sync + 'static,
    {
        self.inner.try_get_with(key.clone(), compute)
    }

    pub fn get(&self, key: &CacheKey) -> Option<String> {
        self.inner.get(key)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.contains_key(key)
    }

    pub fn len(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks();
    }
}
