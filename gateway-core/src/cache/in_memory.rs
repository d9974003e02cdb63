//! In-memory [`Cache`] implementation backed by `dashmap`.
//!
//! Eviction is approximate LRU: when `max_entries` is exceeded, the entry
//! with the oldest last-access tick is dropped. Recency is tracked with a
//! monotonic counter rather than wall-clock time, so eviction order is exact
//! under concurrent access without needing a global lock.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Cache, CacheError};

struct Slot<V> {
    value: V,
    expires_at: Option<Instant>,
    last_access: u64,
}

/// Thread-safe in-memory cache with optional capacity bound and per-entry TTL.
pub struct InMemoryCache<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    entries: DashMap<K, Slot<V>>,
    max_entries: Option<usize>,
    clock: AtomicU64,
}

impl<K, V> InMemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    /// Creates an empty cache. `max_entries` of `None` means unbounded.
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            clock: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn evict_one(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().last_access)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

impl<K, V> Default for InMemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for InMemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K) -> Option<V> {
        let mut slot = self.entries.get_mut(key)?;
        if let Some(expires_at) = slot.expires_at {
            if Instant::now() >= expires_at {
                drop(slot);
                self.entries.remove(key);
                return None;
            }
        }
        slot.last_access = self.tick();
        Some(slot.value.clone())
    }

    async fn set(&self, key: K, value: V, ttl: Option<Duration>) -> Result<(), CacheError> {
        let last_access = self.tick();
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.entries.insert(
            key,
            Slot {
                value,
                expires_at,
                last_access,
            },
        );
        if let Some(max) = self.max_entries {
            while self.entries.len() > max {
                self.evict_one();
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &K) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.entries.clear();
        Ok(())
    }

    async fn len(&self) -> usize {
        self.entries.len()
    }

    async fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}
