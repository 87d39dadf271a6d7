//! Bounded LRU cache for query results.
//!
//! Keys combine a stable hash of the normalized query text with `k`, so a
//! result computed for `k = 3` is never used to answer `k = 5`. Both `get`
//! and `put` refresh recency, which is why even lookups take the lock.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::semantic::index::SearchHit;
use crate::semantic::preprocess::query_hash;

/// Default number of cached queries
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Cache key: (query hash, k).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub query_hash: u64,
    pub k: usize,
}

impl CacheKey {
    /// Build a key from already-normalized query text.
    pub fn new(query: &str, k: usize) -> Self {
        Self {
            query_hash: query_hash(query),
            k,
        }
    }
}

/// Hit/miss/eviction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Inner {
    entries: LruCache<CacheKey, Vec<SearchHit>>,
    stats: CacheStats,
}

/// Thread-safe LRU cache of query results.
pub struct QueryCache {
    inner: Mutex<Inner>,
}

impl QueryCache {
    /// Create a cache holding at most `capacity` results (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or_else(|| {
            log::warn!("query cache capacity 0 is not allowed, using 1");
            NonZeroUsize::MIN
        });

        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Look up a cached result, marking it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<SearchHit>> {
        let mut inner = self.lock();
        let cached = inner.entries.get(key).cloned();
        match cached {
            Some(hits) => {
                inner.stats.hits += 1;
                Some(hits)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Check for a key without touching recency or counters.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().entries.contains(key)
    }

    /// Store a result, evicting the least recently used entry when full.
    pub fn put(&self, key: CacheKey, hits: Vec<SearchHit>) {
        let mut inner = self.lock();
        if let Some((evicted, _)) = inner.entries.push(key, hits) {
            if evicted != key {
                inner.stats.evictions += 1;
                log::debug!(
                    "evicted cached query hash={:016x} k={}",
                    evicted.query_hash,
                    evicted.k
                );
            }
        }
    }

    /// Remove every entry. Counters are kept.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().entries.cap().get()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// The cache only holds derived data, so a poisoned lock is recovered
    /// rather than propagated.
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
