//! In-memory TTL cache with least-recently-used eviction.
//!
//! Values are cloned on the way in and on the way out, so a caller that
//! mutates what it got back never changes what the next caller sees. Store
//! owned data (structs, `serde_json::Value`), not `Arc`s, or the copy is
//! shallow.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

struct CacheEntry<V> {
    inserted_at: Instant,
    value: V,
}

pub struct TtlCache<K, V>
where
    K: Hash + Eq,
{
    ttl: Duration,
    lock_timeout: Duration,
    inner: Mutex<LruCache<K, CacheEntry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    /// A zero `max_entries` is treated as one.
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        TtlCache {
            ttl,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// How long `get`/`set` wait for the lock before giving up.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a copy of the live value for `key`. Expired entries are
    /// dropped and reported as a miss; a read never extends the TTL.
    pub async fn get(&self, key: &K) -> Option<V> {
        let Ok(mut inner) = tokio::time::timeout(self.lock_timeout, self.inner.lock()).await
        else {
            tracing::warn!("cache lock busy, treating lookup as a miss");
            return None;
        };

        let mut expired = false;
        let value = match inner.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                expired = true;
                None
            }
            None => None,
        };
        if expired {
            inner.pop(key);
        }
        value
    }

    /// Stores a copy of `value`, evicting the least recently used entry
    /// when the cache is full.
    pub async fn set(&self, key: K, value: &V) {
        let Ok(mut inner) = tokio::time::timeout(self.lock_timeout, self.inner.lock()).await
        else {
            tracing::warn!("cache lock busy, skipping store");
            return;
        };
        inner.put(
            key,
            CacheEntry {
                inserted_at: Instant::now(),
                value: value.clone(),
            },
        );
    }

    /// Number of stored entries, expired ones included until they are read.
    /// Reports zero when the lock cannot be taken in time.
    pub async fn len(&self) -> usize {
        match tokio::time::timeout(self.lock_timeout, self.inner.lock()).await {
            Ok(inner) => inner.len(),
            Err(_) => {
                tracing::warn!("cache lock busy, reporting empty");
                0
            }
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        match tokio::time::timeout(self.lock_timeout, self.inner.lock()).await {
            Ok(mut inner) => inner.clear(),
            Err(_) => tracing::warn!("cache lock busy, skipping clear"),
        }
    }

    #[cfg(test)]
    async fn hold_lock_for(&self, duration: Duration) {
        let _guard = self.inner.lock().await;
        tokio::time::sleep(duration).await;
    }
}
