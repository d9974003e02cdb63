//! Extraction, deduplication, relationship-linking, and retrieval for the
//! wellness-coaching backend's long-term user memory.
//!
//! [`MemoryPipeline`] composes the stages the way [`gateway_core::Gateway`]
//! composes its own components: built once, shared behind an `Arc`, no
//! globals. It reuses `gateway-core`'s [`gateway_core::ProviderAdapter`] for
//! both the LLM-assisted extraction verdict and embeddings, rather than
//! holding a separate client.

pub mod dedup;
pub mod error;
pub mod extractor;
pub mod model;
pub mod relationships;
pub mod retriever;
pub mod store;
pub mod supervisor;

pub use dedup::{semantic_hash, DedupDecision, Deduplicator};
pub use error::MemoryError;
pub use extractor::{ExtractionVerdict, MemoryExtractor};
pub use model::{
    AtomicFact, ConversationContext, FactType, Intent, MemoryCategory, MemoryEntry, QueryExpansion,
    Relationship, RelationshipType, TemporalBucket,
};
pub use relationships::{ConsolidationLogEntry, RelationshipEngine};
pub use retriever::{IntelligentRetriever, ScoredMemory};
pub use store::{InMemoryMemoryStore, MemoryStore};
pub use supervisor::MemorySupervisor;

use std::sync::Arc;

use gateway_core::ProviderAdapter;
use tracing::debug;

/// The Relationship Engine only mines pairwise relationships against a
/// user's most recent memories, not their entire history.
const RELATIONSHIP_CANDIDATE_LIMIT: usize = 20;

/// Single entry point for the memory pipeline: extract a candidate memory
/// from a message, deduplicate it against the user's existing memories,
/// link it into the relationship graph, and retrieve relevant memories for
/// a later turn.
pub struct MemoryPipeline {
    store: Arc<dyn MemoryStore>,
    extractor: MemoryExtractor,
    dedup: Deduplicator,
    relationships: Arc<RelationshipEngine>,
    retriever: IntelligentRetriever,
}

impl MemoryPipeline {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        provider: Arc<dyn ProviderAdapter>,
        model: impl Into<String>,
    ) -> Self {
        let relationships = Arc::new(RelationshipEngine::new(store.clone()));
        Self {
            store: store.clone(),
            extractor: MemoryExtractor::new(provider.clone(), model),
            dedup: Deduplicator::new(store.clone()),
            relationships: relationships.clone(),
            retriever: IntelligentRetriever::new(store, relationships, provider),
        }
    }

    /// Runs the full ingest pipeline for one user message. Returns `None`
    /// when nothing was worth remembering or the content duplicated an
    /// existing memory exactly; returns the affected entry on create,
    /// update, or merge.
    pub async fn ingest(&self, user_id: i64, message: &str) -> Result<Option<MemoryEntry>, MemoryError> {
        let Some(mut candidate) = self.extractor.extract(user_id, message).await? else {
            return Ok(None);
        };

        match self.dedup.resolve(&mut candidate).await? {
            DedupDecision::Skip { existing_id } => {
                debug!(user_id, existing_id, "ingest skipped: exact duplicate");
                Ok(None)
            }
            DedupDecision::Update { existing_id } | DedupDecision::Merge { existing_id } => {
                debug!(user_id, existing_id, "ingest resolved against existing memory");
                self.store.get(&existing_id).await
            }
            DedupDecision::Create => {
                self.store.upsert(candidate.clone()).await?;
                let mut recent = self.store.active_for_user(user_id).await?;
                recent.truncate(RELATIONSHIP_CANDIDATE_LIMIT);
                self.relationships
                    .process_new_entry(&candidate, &recent)
                    .await?;
                debug!(user_id, memory_id = %candidate.id, "ingest created new memory");
                Ok(Some(candidate))
            }
        }
    }

    pub async fn retrieve(
        &self,
        context: &ConversationContext,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ScoredMemory>, MemoryError> {
        self.retriever.retrieve(context, query, limit).await
    }

    pub fn relationships_for(&self, memory_id: &str) -> Vec<Relationship> {
        self.relationships.relationships_for(memory_id)
    }

    pub fn consolidation_log(&self) -> Vec<ConsolidationLogEntry> {
        self.relationships.consolidation_log()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::MockProviderAdapter;

    fn test_context(user_id: i64) -> ConversationContext {
        ConversationContext {
            user_id,
            conversation_id: "c1".into(),
            coaching_mode: "fitness".into(),
            recent_topics: vec![],
            intent: Intent::General,
            temporal_bucket: TemporalBucket::Recent,
            session_length: 1,
        }
    }

    #[tokio::test]
    async fn ingest_creates_memory_for_explicit_trigger() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let provider = Arc::new(MockProviderAdapter::new("primary"));
        let pipeline = MemoryPipeline::new(store, provider, "mock-small");

        let entry = pipeline
            .ingest(1, "remember that I'm training for a 10k")
            .await
            .unwrap();
        assert!(entry.is_some());
    }

    #[tokio::test]
    async fn ingest_ignores_ordinary_messages() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let provider = Arc::new(MockProviderAdapter::new("primary"));
        let pipeline = MemoryPipeline::new(store, provider, "mock-small");

        let entry = pipeline.ingest(1, "what's the weather like").await.unwrap();
        assert!(entry.is_none());
    }

    #[tokio::test]
    async fn repeated_identical_trigger_is_skipped_on_second_ingest() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let provider = Arc::new(MockProviderAdapter::new("primary"));
        let pipeline = MemoryPipeline::new(store, provider, "mock-small");

        let first = pipeline
            .ingest(1, "remember that I'm training for a 10k")
            .await
            .unwrap();
        assert!(first.is_some());

        let second = pipeline
            .ingest(1, "remember that I'm training for a 10k")
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn retrieve_finds_ingested_memory() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let provider = Arc::new(MockProviderAdapter::new("primary"));
        let pipeline = MemoryPipeline::new(store, provider, "mock-small");

        pipeline
            .ingest(1, "remember that I love morning runs")
            .await
            .unwrap();

        let results = pipeline
            .retrieve(&test_context(1), "morning runs", 5)
            .await
            .unwrap();
        assert!(!results.is_empty());
    }
}
