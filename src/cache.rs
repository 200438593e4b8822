//! Caching utilities for verification results.

use moka::future::Cache;
use moka::Expiry;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Implemented by cached values that declare their own lifetime.
///
/// Verification outcomes age at different rates: a confirmed identity
/// stays valid far longer than a transient resolver failure, so the TTL
/// is a property of the stored value, not of the cache.
pub trait EntryTtl {
    /// How long this value may be served from cache.
    fn ttl(&self) -> Duration;
}

struct PerEntryExpiry;

impl<K, V: EntryTtl> Expiry<K, V> for PerEntryExpiry {
    fn expire_after_create(&self, _key: &K, value: &V, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl())
    }
}

/// Generic cache wrapper with per-entry expiry and statistics.
///
/// Expired entries are never returned; eviction happens during normal
/// cache operations, with no background task.
pub struct ExpiringCache<K, V>
where
    K: Hash + Eq + Send + Sync + Clone + 'static,
    V: EntryTtl + Clone + Send + Sync + 'static,
{
    inner: Cache<K, V>,
    name: String,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Hash + Eq + Send + Sync + Clone + 'static,
    V: EntryTtl + Clone + Send + Sync + 'static,
{
    /// Create a new cache with the given capacity.
    pub fn new(name: impl Into<String>, max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryExpiry)
            .build();

        Self {
            inner,
            name: name.into(),
        }
    }

    /// Get a value from the cache.
    pub async fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).await
    }

    /// Insert a value into the cache.
    pub async fn insert(&self, key: K, value: V) {
        self.inner.insert(key, value).await;
    }

    /// Get the current entry count (approximate until housekeeping runs).
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Get the cache name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invalidate all entries.
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}
