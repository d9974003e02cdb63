//! Data model shared across the extraction, dedup, relationship, and
//! retrieval stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Preference,
    PersonalInfo,
    Context,
    Instruction,
}

/// A single durable fact about a user, owned by the memory store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub user_id: i64,
    pub content: String,
    pub category: MemoryCategory,
    /// 0.0 - 1.0
    pub importance: f32,
    pub keywords: Vec<String>,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub access_count: u32,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub semantic_hash: String,
    pub update_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    Preference,
    Goal,
    Constraint,
    Experience,
    Knowledge,
}

/// A single verifiable statement extracted from a [`MemoryEntry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomicFact {
    pub id: String,
    pub memory_id: String,
    pub content: String,
    pub fact_type: FactType,
    pub confidence: f32,
    pub extracted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Supports,
    Contradicts,
    Elaborates,
    Supersedes,
    Related,
    TemporalSequence,
    BuildsOn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: RelationshipType,
    pub strength: f32,
    pub confidence: f32,
    pub context: String,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

/// Result of expanding a retrieval query with synonyms and related terms.
#[derive(Debug, Clone, Default)]
pub struct QueryExpansion {
    pub original_query: String,
    pub expanded_terms: Vec<String>,
    pub synonyms: Vec<String>,
    pub related_concepts: Vec<String>,
    pub semantic_clusters: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Question,
    GoalSetting,
    ProgressCheck,
    AdviceSeeking,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalBucket {
    Immediate,
    Recent,
    Historical,
}

/// Per-request context used to bias retrieval scoring.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    pub user_id: i64,
    pub conversation_id: String,
    pub coaching_mode: String,
    pub recent_topics: Vec<String>,
    pub intent: Intent,
    pub temporal_bucket: TemporalBucket,
    pub session_length: u32,
}

impl ConversationContext {
    pub fn with_recent_topics(mut self, mut topics: Vec<String>) -> Self {
        topics.truncate(10);
        self.recent_topics = topics;
        self
    }
}
