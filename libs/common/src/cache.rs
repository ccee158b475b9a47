//! Process-local cache module
//!
//! This module wraps a concurrent in-memory cache with time-to-live and
//! idle expiry. Entries can be removed one by one, by predicate, or all at
//! once; removals are visible to every reader as soon as the call returns.

use moka::sync::Cache;
use std::{hash::Hash, time::Duration};
use tracing::warn;

/// Configuration for a local cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime of an entry after insertion
    pub time_to_live: Duration,
    /// Lifetime of an entry after its last read or write
    pub time_to_idle: Duration,
    /// Upper bound on the number of entries
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            time_to_live: Duration::from_secs(24 * 60 * 60),
            time_to_idle: Duration::from_secs(48 * 60 * 60),
            max_capacity: 10_000,
        }
    }
}

/// Concurrent TTL cache shared by clones
#[derive(Clone)]
pub struct LocalCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Cache<K, V>,
}

impl<K, V> LocalCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Build a cache from the given configuration
    pub fn new(config: &CacheConfig) -> Self {
        let inner = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.time_to_live)
            .time_to_idle(config.time_to_idle)
            .support_invalidation_closures()
            .build();

        Self { inner }
    }

    /// Get a clone of the cached value
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key)
    }

    /// Insert or replace a value
    pub fn put(&self, key: K, value: V) {
        self.inner.insert(key, value);
    }

    /// Remove a single entry
    pub fn evict(&self, key: &K) {
        self.inner.invalidate(key);
    }

    /// Remove every entry matching `predicate`
    ///
    /// Falls back to dropping the whole cache if the predicate cannot be
    /// registered, so a caller never observes a stale entry.
    pub fn evict_if<F>(&self, predicate: F)
    where
        F: Fn(&K, &V) -> bool + Send + Sync + 'static,
    {
        if let Err(e) = self.inner.invalidate_entries_if(predicate) {
            warn!("Predicate invalidation rejected ({}), flushing cache", e);
            self.flush();
        }
    }

    /// Remove every entry
    pub fn flush(&self) {
        self.inner.invalidate_all();
    }

    /// Approximate number of live entries
    pub fn len(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }

    /// Whether the cache currently holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
