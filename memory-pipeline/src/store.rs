//! Memory store abstraction and an in-memory implementation.
//!
//! Mirrors the shape of a namespace-isolated key/value store: one row per
//! memory, keyed by id, with the user id as the natural partition.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::MemoryError;
use crate::model::MemoryEntry;

/// Durable storage contract for memories. The crate ships
/// [`InMemoryMemoryStore`]; a production deployment swaps in a SQL- or
/// KV-backed implementation behind the same trait.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn upsert(&self, entry: MemoryEntry) -> Result<(), MemoryError>;
    async fn get(&self, id: &str) -> Result<Option<MemoryEntry>, MemoryError>;
    /// All `active` entries for `user_id`, most recently created first.
    async fn active_for_user(&self, user_id: i64) -> Result<Vec<MemoryEntry>, MemoryError>;
    async fn find_by_semantic_hash(
        &self,
        user_id: i64,
        semantic_hash: &str,
    ) -> Result<Option<MemoryEntry>, MemoryError>;
    async fn deactivate(&self, id: &str) -> Result<(), MemoryError>;
    async fn record_access(&self, id: &str) -> Result<(), MemoryError>;
    /// Active entries for `user_id` created within `within` of now, newest
    /// first, capped at `limit` — the Deduplicator's and Relationship
    /// Engine's candidate horizon.
    async fn recent_for_user(
        &self,
        user_id: i64,
        within: Duration,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError>;
}

pub struct InMemoryMemoryStore {
    inner: Arc<RwLock<HashMap<String, MemoryEntry>>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn upsert(&self, entry: MemoryEntry) -> Result<(), MemoryError> {
        self.inner.write().await.insert(entry.id.clone(), entry);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryEntry>, MemoryError> {
        Ok(self.inner.read().await.get(id).cloned())
    }

    async fn active_for_user(&self, user_id: i64) -> Result<Vec<MemoryEntry>, MemoryError> {
        let map = self.inner.read().await;
        let mut entries: Vec<MemoryEntry> = map
            .values()
            .filter(|e| e.user_id == user_id && e.active)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn find_by_semantic_hash(
        &self,
        user_id: i64,
        semantic_hash: &str,
    ) -> Result<Option<MemoryEntry>, MemoryError> {
        let map = self.inner.read().await;
        Ok(map
            .values()
            .find(|e| e.user_id == user_id && e.active && e.semantic_hash == semantic_hash)
            .cloned())
    }

    async fn deactivate(&self, id: &str) -> Result<(), MemoryError> {
        let mut map = self.inner.write().await;
        let entry = map
            .get_mut(id)
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;
        entry.active = false;
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn record_access(&self, id: &str) -> Result<(), MemoryError> {
        let mut map = self.inner.write().await;
        let entry = map
            .get_mut(id)
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;
        entry.access_count += 1;
        entry.last_accessed_at = Some(Utc::now());
        Ok(())
    }

    async fn recent_for_user(
        &self,
        user_id: i64,
        within: Duration,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(within).unwrap_or(chrono::Duration::zero());
        let mut entries = self.active_for_user(user_id).await?;
        entries.retain(|e| e.created_at >= cutoff);
        entries.truncate(limit);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemoryCategory;

    fn entry(id: &str, user_id: i64) -> MemoryEntry {
        MemoryEntry {
            id: id.to_string(),
            user_id,
            content: "likes running".to_string(),
            category: MemoryCategory::Preference,
            importance: 0.5,
            keywords: vec!["running".to_string()],
            embedding: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            access_count: 0,
            last_accessed_at: None,
            active: true,
            semantic_hash: "hash1".to_string(),
            update_count: 0,
        }
    }

    #[tokio::test]
    async fn upsert_then_get_roundtrips() {
        let store = InMemoryMemoryStore::new();
        store.upsert(entry("m1", 1)).await.unwrap();
        let found = store.get("m1").await.unwrap().unwrap();
        assert_eq!(found.id, "m1");
    }

    #[tokio::test]
    async fn active_for_user_excludes_other_users_and_inactive() {
        let store = InMemoryMemoryStore::new();
        store.upsert(entry("m1", 1)).await.unwrap();
        store.upsert(entry("m2", 2)).await.unwrap();
        let mut inactive = entry("m3", 1);
        inactive.active = false;
        store.upsert(inactive).await.unwrap();

        let active = store.active_for_user(1).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "m1");
    }

    #[tokio::test]
    async fn find_by_semantic_hash_matches_user_and_hash() {
        let store = InMemoryMemoryStore::new();
        store.upsert(entry("m1", 1)).await.unwrap();
        let found = store.find_by_semantic_hash(1, "hash1").await.unwrap();
        assert!(found.is_some());
        assert!(store.find_by_semantic_hash(2, "hash1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deactivate_marks_inactive() {
        let store = InMemoryMemoryStore::new();
        store.upsert(entry("m1", 1)).await.unwrap();
        store.deactivate("m1").await.unwrap();
        let active = store.active_for_user(1).await.unwrap();
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn deactivate_missing_id_errors() {
        let store = InMemoryMemoryStore::new();
        let err = store.deactivate("missing").await.unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn record_access_increments_counter() {
        let store = InMemoryMemoryStore::new();
        store.upsert(entry("m1", 1)).await.unwrap();
        store.record_access("m1").await.unwrap();
        store.record_access("m1").await.unwrap();
        let found = store.get("m1").await.unwrap().unwrap();
        assert_eq!(found.access_count, 2);
    }

    #[tokio::test]
    async fn recent_for_user_respects_limit() {
        let store = InMemoryMemoryStore::new();
        for i in 0..5 {
            store.upsert(entry(&format!("m{i}"), 1)).await.unwrap();
        }
        let recent = store
            .recent_for_user(1, Duration::from_secs(48 * 3600), 3)
            .await
            .unwrap();
        assert_eq!(recent.len(), 3);
    }
}
