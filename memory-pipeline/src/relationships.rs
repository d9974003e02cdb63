//! Relationship Engine: extracts atomic facts from a memory, links related
//! memories, and consolidates contradictions.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::MemoryError;
use crate::model::{AtomicFact, FactType, MemoryEntry, Relationship, RelationshipType};
use crate::store::MemoryStore;

/// Atomic-fact extraction is capped here: a memory entry rarely contains
/// more than a handful of independently verifiable statements, and capping
/// keeps downstream relationship analysis from growing quadratically.
const MAX_FACTS_PER_MEMORY: usize = 5;

const KEYWORD_OVERLAP_SUPPORT_THRESHOLD: f32 = 0.3;
/// Below the `Supports` bar but still enough shared vocabulary, within the
/// same category, to call one memory a further detail on the other.
const KEYWORD_OVERLAP_ELABORATES_THRESHOLD: f32 = 0.15;
const TEMPORAL_PROXIMITY_HOURS: i64 = 24;
/// A cluster of `Elaborates`-linked memories this size or larger collapses
/// into one canonical entry.
const ELABORATES_CLUSTER_CONSOLIDATION_SIZE: usize = 2;

/// Word pairs that, when one appears in each of two memories about the same
/// topic, indicate the user's stated fact changed rather than merely
/// expanded.
const CONTRADICTION_PAIRS: &[(&str, &str)] = &[
    ("vegetarian", "meat"),
    ("vegan", "dairy"),
    ("like", "dislike"),
    ("like", "hate"),
    ("love", "hate"),
    ("enjoy", "hate"),
    ("morning", "evening"),
    ("quit", "started"),
    ("stopped", "started"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsolidationKind {
    /// A high-confidence contradiction: the older memory is deactivated.
    Supersession,
    /// A cluster of `Elaborates`-linked memories collapsed into one.
    Consolidation,
}

#[derive(Debug, Clone)]
pub struct ConsolidationLogEntry {
    pub kind: ConsolidationKind,
    pub source_ids: Vec<String>,
    pub result_id: String,
    pub reason: String,
    pub confidence: f32,
    pub at: DateTime<Utc>,
}

pub struct RelationshipEngine {
    store: Arc<dyn MemoryStore>,
    relationships: DashMap<String, Relationship>,
    consolidation_log: DashMap<String, ConsolidationLogEntry>,
}

impl RelationshipEngine {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self {
            store,
            relationships: DashMap::new(),
            consolidation_log: DashMap::new(),
        }
    }

    /// Pattern-based fact extraction: splits on sentence boundaries and
    /// classifies each clause by keyword, capped at
    /// [`MAX_FACTS_PER_MEMORY`].
    pub fn extract_atomic_facts(entry: &MemoryEntry) -> Vec<AtomicFact> {
        entry
            .content
            .split(['.', ';', '\n'])
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .take(MAX_FACTS_PER_MEMORY)
            .map(|clause| AtomicFact {
                id: Uuid::new_v4().to_string(),
                memory_id: entry.id.clone(),
                content: clause.to_string(),
                fact_type: classify_fact(clause),
                confidence: 0.7,
                extracted_at: Utc::now(),
            })
            .collect()
    }

    /// Compares `entry` against `candidates` (typically the user's other
    /// recent active memories) and returns every relationship found.
    /// Contradictions trigger supersession of the older memory; an
    /// `Elaborates` cluster reaching [`ELABORATES_CLUSTER_CONSOLIDATION_SIZE`]
    /// triggers consolidation into one canonical memory. Both are side
    /// effects logged to [`Self::consolidation_log`].
    pub async fn process_new_entry(
        &self,
        entry: &MemoryEntry,
        candidates: &[MemoryEntry],
    ) -> Result<Vec<Relationship>, MemoryError> {
        let mut found = Vec::new();
        let mut elaborates_partners: Vec<MemoryEntry> = Vec::new();
        for other in candidates {
            if other.id == entry.id {
                continue;
            }
            if let Some(relationship) = self.analyze_pair(entry, other).await? {
                if relationship.relationship_type == RelationshipType::Elaborates {
                    elaborates_partners.push(other.clone());
                }
                self.relationships
                    .insert(relationship.id.clone(), relationship.clone());
                found.push(relationship);
            }
        }

        if elaborates_partners.len() + 1 >= ELABORATES_CLUSTER_CONSOLIDATION_SIZE {
            self.consolidate_cluster(entry, &elaborates_partners).await?;
        }

        Ok(found)
    }

    /// Collapses `entry` and its `Elaborates`-linked `partners` into one
    /// canonical survivor (the earliest-created of the cluster), merging
    /// content and keywords and deactivating the rest.
    async fn consolidate_cluster(&self, entry: &MemoryEntry, partners: &[MemoryEntry]) -> Result<(), MemoryError> {
        let mut cluster: Vec<&MemoryEntry> = partners.iter().collect();
        cluster.push(entry);
        let canonical_ref = cluster
            .iter()
            .min_by_key(|m| m.created_at)
            .copied()
            .expect("cluster is non-empty");
        let canonical_id = canonical_ref.id.clone();
        let mut canonical = canonical_ref.clone();

        let mut source_ids = Vec::new();
        for member in &cluster {
            if member.id == canonical_id {
                continue;
            }
            if !canonical.content.contains(member.content.as_str()) {
                canonical.content.push_str("; ");
                canonical.content.push_str(&member.content);
            }
            for kw in &member.keywords {
                if !canonical.keywords.contains(kw) {
                    canonical.keywords.push(kw.clone());
                }
            }
            canonical.importance = canonical.importance.max(member.importance);
            source_ids.push(member.id.clone());
        }

        canonical.updated_at = Utc::now();
        canonical.update_count += 1;
        self.store.upsert(canonical.clone()).await?;
        for id in &source_ids {
            if *id != canonical_id {
                self.store.deactivate(id).await?;
            }
        }

        self.consolidation_log.insert(
            canonical_id.clone(),
            ConsolidationLogEntry {
                kind: ConsolidationKind::Consolidation,
                source_ids,
                result_id: canonical_id,
                reason: "elaborates cluster consolidation".to_string(),
                confidence: 0.75,
                at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn analyze_pair(
        &self,
        a: &MemoryEntry,
        b: &MemoryEntry,
    ) -> Result<Option<Relationship>, MemoryError> {
        if let Some(relationship) = self.contradiction_relationship(a, b).await? {
            return Ok(Some(relationship));
        }

        let overlap = keyword_overlap(&a.keywords, &b.keywords);
        if overlap >= KEYWORD_OVERLAP_SUPPORT_THRESHOLD {
            return Ok(Some(self.new_relationship(
                a,
                b,
                RelationshipType::Supports,
                overlap,
            )));
        }

        if a.category == b.category && overlap >= KEYWORD_OVERLAP_ELABORATES_THRESHOLD {
            return Ok(Some(self.new_relationship(
                a,
                b,
                RelationshipType::Elaborates,
                overlap,
            )));
        }

        let hours_apart = (a.created_at - b.created_at).num_hours().abs();
        if hours_apart <= TEMPORAL_PROXIMITY_HOURS {
            return Ok(Some(self.new_relationship(
                a,
                b,
                RelationshipType::TemporalSequence,
                0.4,
            )));
        }

        Ok(None)
    }

    async fn contradiction_relationship(
        &self,
        a: &MemoryEntry,
        b: &MemoryEntry,
    ) -> Result<Option<Relationship>, MemoryError> {
        let a_lower = a.content.to_lowercase();
        let b_lower = b.content.to_lowercase();

        let contradicts = CONTRADICTION_PAIRS.iter().any(|(x, y)| {
            (a_lower.contains(x) && b_lower.contains(y))
                || (a_lower.contains(y) && b_lower.contains(x))
        });
        if !contradicts {
            return Ok(None);
        }

        let (older, newer) = if a.created_at <= b.created_at { (a, b) } else { (b, a) };
        self.store.deactivate(&older.id).await?;
        self.consolidation_log.insert(
            older.id.clone(),
            ConsolidationLogEntry {
                kind: ConsolidationKind::Supersession,
                source_ids: vec![older.id.clone()],
                result_id: newer.id.clone(),
                reason: "contradiction detected in stated facts".to_string(),
                confidence: 0.9,
                at: Utc::now(),
            },
        );

        Ok(Some(self.new_relationship(
            older,
            newer,
            RelationshipType::Supersedes,
            1.0,
        )))
    }

    fn new_relationship(
        &self,
        source: &MemoryEntry,
        target: &MemoryEntry,
        relationship_type: RelationshipType,
        strength: f32,
    ) -> Relationship {
        Relationship {
            id: Uuid::new_v4().to_string(),
            source_id: source.id.clone(),
            target_id: target.id.clone(),
            relationship_type,
            strength: strength.clamp(0.0, 1.0),
            confidence: 0.75,
            context: format!("{:?}", relationship_type),
            created_at: Utc::now(),
            active: true,
        }
    }

    pub fn relationships_for(&self, memory_id: &str) -> Vec<Relationship> {
        self.relationships
            .iter()
            .filter(|r| r.source_id == memory_id || r.target_id == memory_id)
            .map(|r| r.clone())
            .collect()
    }

    pub fn consolidation_log(&self) -> Vec<ConsolidationLogEntry> {
        self.consolidation_log.iter().map(|e| e.clone()).collect()
    }
}

fn classify_fact(clause: &str) -> FactType {
    let lower = clause.to_lowercase();
    if lower.contains("want") || lower.contains("goal") || lower.contains("plan to") {
        FactType::Goal
    } else if lower.contains("can't") || lower.contains("cannot") || lower.contains("allerg") || lower.contains("avoid") {
        FactType::Constraint
    } else if lower.contains("like") || lower.contains("enjoy") || lower.contains("prefer") || lower.contains("love") {
        FactType::Preference
    } else if lower.contains("used to") || lower.contains("tried") || lower.contains("did") {
        FactType::Experience
    } else {
        FactType::Knowledge
    }
}

fn keyword_overlap(a: &[String], b: &[String]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let set_a: HashSet<&String> = a.iter().collect();
    let set_b: HashSet<&String> = b.iter().collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemoryCategory;
    use crate::store::InMemoryMemoryStore;

    fn entry(id: &str, content: &str, keywords: Vec<&str>, created_at: DateTime<Utc>) -> MemoryEntry {
        MemoryEntry {
            id: id.to_string(),
            user_id: 1,
            content: content.to_string(),
            category: MemoryCategory::Preference,
            importance: 0.5,
            keywords: keywords.into_iter().map(String::from).collect(),
            embedding: vec![],
            created_at,
            updated_at: created_at,
            access_count: 0,
            last_accessed_at: None,
            active: true,
            semantic_hash: String::new(),
            update_count: 0,
        }
    }

    #[test]
    fn extract_atomic_facts_caps_at_five() {
        let content = "a. b. c. d. e. f. g";
        let e = entry("m1", content, vec![], Utc::now());
        let facts = RelationshipEngine::extract_atomic_facts(&e);
        assert_eq!(facts.len(), 5);
    }

    #[test]
    fn classify_fact_recognizes_constraint() {
        assert_eq!(classify_fact("I can't eat peanuts"), FactType::Constraint);
    }

    #[test]
    fn keyword_overlap_jaccard() {
        let overlap = keyword_overlap(
            &["running".to_string(), "morning".to_string()],
            &["running".to_string(), "evening".to_string()],
        );
        assert!((overlap - (1.0 / 3.0)).abs() < 1e-5);
    }

    #[tokio::test]
    async fn contradiction_supersedes_older_and_logs_consolidation() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let older = entry("m1", "I am vegetarian", vec!["vegetarian"], Utc::now() - chrono::Duration::days(10));
        let newer = entry("m2", "I started eating meat again", vec!["meat"], Utc::now());
        store.upsert(older.clone()).await.unwrap();
        store.upsert(newer.clone()).await.unwrap();

        let engine = RelationshipEngine::new(store.clone());
        let found = engine.process_new_entry(&newer, &[older.clone()]).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].relationship_type, RelationshipType::Supersedes);
        let refreshed = store.get("m1").await.unwrap().unwrap();
        assert!(!refreshed.active);
        assert_eq!(engine.consolidation_log().len(), 1);
    }

    #[tokio::test]
    async fn overlapping_keywords_yield_supports_relationship() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let a = entry("m1", "enjoys running in the morning", vec!["running", "morning", "fitness"], Utc::now() - chrono::Duration::days(5));
        let b = entry("m2", "runs five miles weekly", vec!["running", "fitness"], Utc::now() - chrono::Duration::days(3));
        store.upsert(a.clone()).await.unwrap();

        let engine = RelationshipEngine::new(store);
        let found = engine.process_new_entry(&b, &[a]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].relationship_type, RelationshipType::Supports);
    }

    #[tokio::test]
    async fn close_in_time_unrelated_memories_get_temporal_sequence() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let now = Utc::now();
        let a = entry("m1", "bought new running shoes", vec!["shoes"], now);
        let b = entry("m2", "tried a new coffee shop", vec!["coffee"], now);
        store.upsert(a.clone()).await.unwrap();

        let engine = RelationshipEngine::new(store);
        let found = engine.process_new_entry(&b, &[a]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].relationship_type, RelationshipType::TemporalSequence);
    }

    #[tokio::test]
    async fn elaborates_cluster_of_two_consolidates_into_canonical() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let older = entry(
            "m1",
            "bought new running shoes",
            vec!["running", "shoes", "gear", "morning"],
            Utc::now() - chrono::Duration::days(2),
        );
        let newer = entry("m2", "looking for trail running shoes", vec!["running", "trail"], Utc::now());
        store.upsert(older.clone()).await.unwrap();
        store.upsert(newer.clone()).await.unwrap();

        let engine = RelationshipEngine::new(store.clone());
        let found = engine.process_new_entry(&newer, &[older.clone()]).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].relationship_type, RelationshipType::Elaborates);

        let canonical = store.get("m1").await.unwrap().unwrap();
        assert!(canonical.active);
        assert!(canonical.content.contains("trail running shoes"));
        let merged_away = store.get("m2").await.unwrap().unwrap();
        assert!(!merged_away.active);

        let log = engine.consolidation_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, ConsolidationKind::Consolidation);
        assert_eq!(log[0].result_id, "m1");
    }
}
