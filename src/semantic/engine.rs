//! Query engine: vectorizer -> cache -> index -> cache.
//!
//! The vectorizer and index live behind one read-write lock so a search
//! never observes a half-applied write. The cache has its own lock and is
//! always taken after the state lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard};

use crate::error::{KnowledgeError, Result};
use crate::semantic::cache::{CacheKey, CacheStats, QueryCache};
use crate::semantic::index::{FlatIndex, SearchHit};
use crate::semantic::metadata::Metadata;
use crate::semantic::preprocess::normalize_query;
use crate::semantic::vectorizer::TfIdfVectorizer;

/// Vectorizer and index, guarded together.
#[derive(Debug)]
pub struct EngineState {
    /// `None` until the first batch of documents is fitted
    pub vectorizer: Option<TfIdfVectorizer>,
    pub index: FlatIndex,
}

/// Engine behavior switches.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub normalize_queries: bool,
    pub invalidate_cache_on_add: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            normalize_queries: true,
            invalidate_cache_on_add: true,
        }
    }
}

/// Work counters, mainly to observe cache effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub transforms: u64,
    pub index_searches: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

#[derive(Default)]
struct Counters {
    transforms: AtomicU64,
    index_searches: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

pub struct QueryEngine {
    state: RwLock<EngineState>,
    cache: QueryCache,
    options: EngineOptions,
    counters: Counters,
}

impl QueryEngine {
    /// Create an engine around an empty index of `dimensions` and an
    /// optionally pre-fitted vectorizer.
    pub fn new(
        vectorizer: Option<TfIdfVectorizer>,
        dimensions: usize,
        cache_capacity: usize,
        options: EngineOptions,
    ) -> Self {
        Self {
            state: RwLock::new(EngineState {
                vectorizer,
                index: FlatIndex::new(dimensions),
            }),
            cache: QueryCache::new(cache_capacity),
            options,
            counters: Counters::default(),
        }
    }

    /// Return the `k` stored documents closest to `query`.
    ///
    /// Repeated queries are answered from the cache without touching the
    /// vectorizer or the index.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let state = self.read()?;
        let vectorizer = state.vectorizer.as_ref().ok_or(KnowledgeError::NotFitted)?;

        let key = self.cache_key(query, k);
        if let Some(hits) = self.cache.get(&key) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hits);
        }
        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);

        let vector = vectorizer.transform(query)?;
        self.counters.transforms.fetch_add(1, Ordering::Relaxed);

        let hits = state.index.search(&vector, k)?;
        self.counters.index_searches.fetch_add(1, Ordering::Relaxed);

        // still under the read lock, so no write can slip in before this
        self.cache.put(key, hits.clone());

        Ok(hits)
    }

    /// Vectorize and index a single document.
    pub fn add(&self, text: &str, metadata: Metadata) -> Result<u64> {
        let ids = self.add_batch(&[text], vec![metadata])?;
        ids.into_iter()
            .next()
            .ok_or_else(|| KnowledgeError::Internal("index returned no id".into()))
    }

    /// Vectorize and index documents with the already fitted vocabulary.
    pub fn add_batch<S: AsRef<str> + Sync>(
        &self,
        texts: &[S],
        metadata: Vec<Metadata>,
    ) -> Result<Vec<u64>> {
        self.write(|state| {
            let vectorizer = state.vectorizer.as_ref().ok_or(KnowledgeError::NotFitted)?;
            let vectors = vectorizer.transform_batch(texts)?;
            Ok(state.index.add(vectors, metadata)?)
        })
    }

    /// Index `texts`, fitting `vectorizer` on them first if nothing is fitted yet.
    ///
    /// When a vectorizer is already fitted, `vectorizer` is dropped and the
    /// batch goes through the frozen vocabulary. A fresh fit is committed
    /// only if the whole batch was added.
    pub fn fit_and_add<S: AsRef<str> + Sync>(
        &self,
        vectorizer: TfIdfVectorizer,
        texts: &[S],
        metadata: Vec<Metadata>,
    ) -> Result<Vec<u64>> {
        self.write(|state| {
            if let Some(current) = &state.vectorizer {
                let vectors = current.transform_batch(texts)?;
                return Ok(state.index.add(vectors, metadata)?);
            }

            let mut vectorizer = vectorizer;
            let vectors = vectorizer.fit_transform(texts)?;
            let ids = state.index.add(vectors, metadata)?;

            log::info!(
                "Fitted vocabulary of {} terms on {} documents",
                vectorizer.vocabulary_len(),
                texts.len()
            );
            state.vectorizer = Some(vectorizer);
            Ok(ids)
        })
    }

    /// Run `f` under the write lock.
    ///
    /// The cache is dropped after a successful write when
    /// `invalidate_cache_on_add` is set. `f` must leave the state untouched
    /// when it returns an error.
    pub fn write<R>(&self, f: impl FnOnce(&mut EngineState) -> Result<R>) -> Result<R> {
        let mut state = self.state.write().map_err(KnowledgeError::poisoned)?;
        let result = f(&mut state)?;

        if self.options.invalidate_cache_on_add {
            self.cache.clear();
        }

        Ok(result)
    }

    /// Remove one entry by id. Returns `false` when the id is unknown, in
    /// which case the cache is kept.
    pub fn remove(&self, id: u64) -> Result<bool> {
        let mut state = self.state.write().map_err(KnowledgeError::poisoned)?;
        let removed = state.index.remove(id).is_some();

        if removed && self.options.invalidate_cache_on_add {
            self.cache.clear();
        }

        Ok(removed)
    }

    /// Shared access to the vectorizer and index.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, EngineState>> {
        self.state.read().map_err(KnowledgeError::poisoned)
    }

    /// Replace the whole state, e.g. after loading a snapshot. Always clears the cache.
    pub fn replace(&self, new_state: EngineState) -> Result<()> {
        let mut state = self.state.write().map_err(KnowledgeError::poisoned)?;
        *state = new_state;
        self.cache.clear();
        Ok(())
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            transforms: self.counters.transforms.load(Ordering::Relaxed),
            index_searches: self.counters.index_searches.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
        }
    }

    fn cache_key(&self, query: &str, k: usize) -> CacheKey {
        if self.options.normalize_queries {
            CacheKey::new(&normalize_query(query), k)
        } else {
            CacheKey::new(query, k)
        }
    }
}
