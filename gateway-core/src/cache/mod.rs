//! Generic key-value cache with optional TTL.
//!
//! This is the low-level primitive; [`crate::response_cache::ResponseCache`]
//! layers category partitioning and freshness tracking on top of it for the
//! gateway's AI-response cache.

mod error;
mod in_memory;

pub use error::CacheError;
pub use in_memory::InMemoryCache;

use async_trait::async_trait;
use std::time::Duration;

/// Cache trait for key-value storage with optional TTL.
#[async_trait]
pub trait Cache<K, V>: Send + Sync
where
    K: Send + Sync,
    V: Clone + Send + Sync,
{
    /// Get a value from the cache by key.
    ///
    /// Returns `None` if the key is not found or has expired.
    async fn get(&self, key: &K) -> Option<V>;

    /// Set a value in the cache with an optional TTL.
    ///
    /// If `ttl` is `None`, the value will not expire.
    async fn set(&self, key: K, value: V, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Delete a value from the cache.
    async fn delete(&self, key: &K) -> Result<(), CacheError>;

    /// Clear all entries from the cache.
    async fn clear(&self) -> Result<(), CacheError>;

    /// Number of live entries (expired entries may still be counted until
    /// the next access reaps them).
    async fn len(&self) -> usize;

    /// Snapshot of all live keys, for prefix scans. Expired entries may
    /// still appear until the next access reaps them.
    async fn keys(&self) -> Vec<K>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_trait_object() {
        let cache: Box<dyn Cache<String, String>> = Box::new(InMemoryCache::new(None));
        cache
            .set("key".to_string(), "value".to_string(), None)
            .await
            .unwrap();
        assert_eq!(
            cache.get(&"key".to_string()).await,
            Some("value".to_string())
        );
    }
}
