//! Data cache for object content
//!
//! Remote reads are slow, so recently used object bytes are kept in a
//! bounded LRU cache. The cache is never authoritative: a miss says nothing
//! about remote existence, and a hit is only as fresh as its insertion.

use bucketds_common::Key;
use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache statistics for monitoring
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: AtomicU64,
    /// Number of cache misses
    pub misses: AtomicU64,
    /// Number of entries evicted to make room
    pub evictions: AtomicU64,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }

    /// Reset all statistics
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

/// Bounded LRU cache of key to content bytes
pub struct DataCache {
    /// Cached entries; lookups reorder recency, so reads also take the lock
    entries: Mutex<LruCache<Key, Bytes>>,
    /// Cache statistics
    stats: CacheStats,
}

impl DataCache {
    /// Create a new data cache holding at most `capacity` items
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            stats: CacheStats::default(),
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Maximum number of items
    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    /// Get the current number of entries in the cache
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Look up content, marking it most recently used
    pub fn get(&self, key: &Key) -> Option<Bytes> {
        let mut entries = self.entries.lock();
        if let Some(data) = entries.get(key) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            Some(data.clone())
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Insert or replace content, evicting the least recently used entry
    /// when at capacity
    pub fn add(&self, key: Key, data: Bytes) {
        let mut entries = self.entries.lock();
        if let Some((evicted, _)) = entries.push(key.clone(), data) {
            // push hands back the old value when the key was already cached
            if evicted != key {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Remove content for a key
    pub fn remove(&self, key: &Key) -> Option<Bytes> {
        self.entries.lock().pop(key)
    }

    /// Look up content without touching recency or statistics
    pub fn peek(&self, key: &Key) -> Option<Bytes> {
        self.entries.lock().peek(key).cloned()
    }

    /// Check if a key is cached, without touching its recency
    pub fn contains(&self, key: &Key) -> bool {
        self.entries.lock().contains(key)
    }

    /// Clear all entries from the cache
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl std::fmt::Debug for DataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}
