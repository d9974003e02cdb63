//! Category-partitioned, TTL'd cache for gateway responses and related
//! lookups, built on top of [`crate::cache::InMemoryCache`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gateway_config::GatewaySettings;

use crate::cache::{Cache, InMemoryCache};

/// Independently-sized, independently-expiring cache partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachePartition {
    UserSettings,
    MemoryRetrieval,
    AiResponse,
    FileMetadata,
    Embedding,
    Thumbnail,
    HealthData,
    DeviceSettings,
}

impl CachePartition {
    fn name(&self) -> &'static str {
        match self {
            CachePartition::UserSettings => "user_settings",
            CachePartition::MemoryRetrieval => "memory_retrieval",
            CachePartition::AiResponse => "ai_response",
            CachePartition::FileMetadata => "file_metadata",
            CachePartition::Embedding => "embedding",
            CachePartition::Thumbnail => "thumbnail",
            CachePartition::HealthData => "health_data",
            CachePartition::DeviceSettings => "device_settings",
        }
    }
}

/// Whether a cache hit is still within its TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Past TTL but not yet evicted; caller may serve it while triggering a
    /// background refresh (stale-while-revalidate).
    Stale,
}

#[derive(Clone)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

/// A cache value plus the metadata needed to classify its freshness.
pub struct CacheLookup<V> {
    pub value: V,
    pub freshness: Freshness,
}

/// Grace period during which a stale entry is still served
/// (stale-while-revalidate) before being treated as a miss.
const STALE_GRACE: Duration = Duration::from_secs(30);

/// Multi-partition response cache. One [`InMemoryCache`] per [`CachePartition`],
/// each sized and TTL'd from [`GatewaySettings`].
pub struct ResponseCache<V: Clone + Send + Sync + 'static> {
    partitions: HashMap<CachePartition, (InMemoryCache<String, Entry<V>>, Duration)>,
}

impl<V: Clone + Send + Sync + 'static> ResponseCache<V> {
    pub fn new(settings: &GatewaySettings) -> Self {
        let mut partitions = HashMap::new();
        let all = [
            CachePartition::UserSettings,
            CachePartition::MemoryRetrieval,
            CachePartition::AiResponse,
            CachePartition::FileMetadata,
            CachePartition::Embedding,
            CachePartition::Thumbnail,
            CachePartition::HealthData,
            CachePartition::DeviceSettings,
        ];
        for partition in all {
            let (max_entries, ttl) = match partition {
                CachePartition::AiResponse => (
                    settings.cache_ai_response.max_entries,
                    settings.cache_ai_response.ttl,
                ),
                CachePartition::Embedding => (
                    settings.cache_embedding.max_entries,
                    settings.cache_embedding.ttl,
                ),
                CachePartition::MemoryRetrieval => (
                    settings.cache_memory_retrieval.max_entries,
                    settings.cache_memory_retrieval.ttl,
                ),
                _ => (
                    settings.cache_default.max_entries,
                    settings.cache_default.ttl,
                ),
            };
            partitions.insert(partition, (InMemoryCache::new(Some(max_entries)), ttl));
        }
        Self { partitions }
    }

    fn key(category: CachePartition, key: &str) -> String {
        format!("{}:{}", category.name(), key)
    }

    pub async fn get(&self, category: CachePartition, key: &str) -> Option<CacheLookup<V>> {
        let (cache, _) = self.partitions.get(&category)?;
        let entry = cache.get(&Self::key(category, key)).await?;
        let age = entry.inserted_at.elapsed();
        let freshness = if age <= entry.ttl {
            Freshness::Fresh
        } else if age <= entry.ttl + STALE_GRACE {
            Freshness::Stale
        } else {
            return None;
        };
        Some(CacheLookup {
            value: entry.value,
            freshness,
        })
    }

    pub async fn put(&self, category: CachePartition, key: &str, value: V) {
        let Some((cache, default_ttl)) = self.partitions.get(&category) else {
            return;
        };
        let entry = Entry {
            value,
            inserted_at: Instant::now(),
            ttl: *default_ttl,
        };
        // Entries are kept past their nominal TTL (up to STALE_GRACE) so
        // `get` can distinguish Fresh from Stale; the backing cache never
        // expires them itself.
        let _ = cache.set(Self::key(category, key), entry, None).await;
    }

    pub async fn invalidate(&self, category: CachePartition, key: &str) {
        if let Some((cache, _)) = self.partitions.get(&category) {
            let _ = cache.delete(&Self::key(category, key)).await;
        }
    }

    /// Invalidates every entry in `category` whose key starts with `prefix`.
    /// Returns the number of entries removed.
    pub async fn invalidate_prefix(&self, category: CachePartition, prefix: &str) -> usize {
        let Some((cache, _)) = self.partitions.get(&category) else {
            return 0;
        };
        let full_prefix = Self::key(category, prefix);
        let matching: Vec<String> = cache
            .keys()
            .await
            .into_iter()
            .filter(|k| k.starts_with(&full_prefix))
            .collect();
        let count = matching.len();
        for key in matching {
            let _ = cache.delete(&key).await;
        }
        count
    }

    pub async fn clear(&self, category: CachePartition) {
        if let Some((cache, _)) = self.partitions.get(&category) {
            let _ = cache.clear().await;
        }
    }

    pub async fn clear_all(&self) {
        for (cache, _) in self.partitions.values() {
            let _ = cache.clear().await;
        }
    }

    pub async fn len(&self, category: CachePartition) -> usize {
        match self.partitions.get(&category) {
            Some((cache, _)) => cache.len().await,
            None => 0,
        }
    }
}

/// Builds the fingerprint used as the `ai_response` partition key: a compact
/// hash over user id, provider, model, and the normalized last user message.
pub fn ai_response_key(user_id: i64, provider: &str, model: &str, normalized_prompt: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    normalized_prompt.hash(&mut hasher);
    let prompt_hash = hasher.finish();
    format!("{user_id}:{provider}:{model}:{prompt_hash:016x}")
}

pub type SharedResponseCache<V> = Arc<ResponseCache<V>>;

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_config::GatewaySettings;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn test_settings() -> GatewaySettings {
        let _guard = ENV_LOCK.lock().unwrap();
        for (key, _) in env::vars() {
            if key.starts_with("GATEWAY_") {
                env::remove_var(key);
            }
        }
        GatewaySettings::from_env().unwrap()
    }

    #[tokio::test]
    async fn put_then_get_is_fresh() {
        let cache: ResponseCache<String> = ResponseCache::new(&test_settings());
        cache
            .put(CachePartition::AiResponse, "k1", "hello".to_string())
            .await;
        let hit = cache.get(CachePartition::AiResponse, "k1").await.unwrap();
        assert_eq!(hit.value, "hello");
        assert_eq!(hit.freshness, Freshness::Fresh);
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let cache: ResponseCache<String> = ResponseCache::new(&test_settings());
        assert!(cache.get(CachePartition::AiResponse, "missing").await.is_none());
    }

    #[tokio::test]
    async fn partitions_are_isolated() {
        let cache: ResponseCache<String> = ResponseCache::new(&test_settings());
        cache
            .put(CachePartition::AiResponse, "k1", "a".to_string())
            .await;
        assert!(cache.get(CachePartition::Embedding, "k1").await.is_none());
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache: ResponseCache<String> = ResponseCache::new(&test_settings());
        cache
            .put(CachePartition::AiResponse, "k1", "a".to_string())
            .await;
        cache.invalidate(CachePartition::AiResponse, "k1").await;
        assert!(cache.get(CachePartition::AiResponse, "k1").await.is_none());
    }

    #[tokio::test]
    async fn invalidate_prefix_removes_only_matching_keys() {
        let cache: ResponseCache<String> = ResponseCache::new(&test_settings());
        cache
            .put(CachePartition::AiResponse, "user:1:hello", "a".to_string())
            .await;
        cache
            .put(CachePartition::AiResponse, "user:1:goodbye", "b".to_string())
            .await;
        cache
            .put(CachePartition::AiResponse, "user:2:hello", "c".to_string())
            .await;
        let removed = cache.invalidate_prefix(CachePartition::AiResponse, "user:1:").await;
        assert_eq!(removed, 2);
        assert!(cache.get(CachePartition::AiResponse, "user:1:hello").await.is_none());
        assert!(cache.get(CachePartition::AiResponse, "user:1:goodbye").await.is_none());
        assert!(cache.get(CachePartition::AiResponse, "user:2:hello").await.is_some());
    }

    #[test]
    fn ai_response_key_is_deterministic() {
        let a = ai_response_key(1, "primary", "gpt-4o-mini", "hello there");
        let b = ai_response_key(1, "primary", "gpt-4o-mini", "hello there");
        assert_eq!(a, b);
    }

    #[test]
    fn ai_response_key_differs_by_prompt() {
        let a = ai_response_key(1, "primary", "gpt-4o-mini", "hello there");
        let b = ai_response_key(1, "primary", "gpt-4o-mini", "goodbye");
        assert_ne!(a, b);
    }
}
