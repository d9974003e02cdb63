//! Intelligent Retriever: expands a query, scores candidate memories along
//! four axes, re-ranks for conversational context, and diversifies the
//! final selection across categories.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use gateway_core::ProviderAdapter;

use crate::error::MemoryError;
use crate::model::{
    ConversationContext, Intent, MemoryCategory, MemoryEntry, QueryExpansion, RelationshipType, TemporalBucket,
};
use crate::relationships::RelationshipEngine;
use crate::store::MemoryStore;

/// Starting similarity floor; shifted per-query/session by
/// [`adaptive_semantic_floor`], then lowered in further steps when too few
/// candidates clear it, so a narrow or unusual query still returns
/// something useful instead of an empty result set.
const INITIAL_SEMANTIC_FLOOR: f32 = 0.70;
const FLOOR_STEP_SIZE: f32 = 0.20;
const MIN_DESIRED_RESULTS: usize = 3;

/// Query term counts at or above this are "specific enough" to raise the
/// floor; at or below this they're broad enough to lower it.
const SPECIFIC_QUERY_TERMS: usize = 4;
const BROAD_QUERY_TERMS: usize = 1;
/// A conversation this many turns or longer counts as a long session.
const LONG_SESSION_TURNS: u32 = 10;

/// Baseline axis weights (semantic, temporal, contextual, graph); adapted
/// per-context in [`adaptive_weights`].
const BASE_WEIGHTS: (f32, f32, f32, f32) = (0.45, 0.20, 0.20, 0.15);

const SYNONYMS: &[(&str, &[&str])] = &[
    ("exercise", &["workout", "fitness", "training"]),
    ("food", &["diet", "nutrition", "eating"]),
    ("sleep", &["rest", "insomnia"]),
    ("stress", &["anxiety", "overwhelm"]),
    ("goal", &["target", "objective", "plan"]),
];

/// Near-identical content (by shingle overlap) is treated as a duplicate
/// during diversification at or above this Jaccard similarity.
const NEAR_DUPLICATE_JACCARD: f32 = 0.8;
/// Word-shingle size used for the near-duplicate pass.
const SHINGLE_SIZE: usize = 3;

#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub entry: MemoryEntry,
    pub semantic: f32,
    pub temporal: f32,
    pub contextual: f32,
    pub graph: f32,
    pub score: f32,
    /// How confident the retriever is this memory is actually relevant,
    /// distinct from `score`'s use as a ranking key: semantic similarity
    /// plus any contextual re-rank boost, capped at 1.0.
    pub confidence: f32,
    /// Which signals contributed to surfacing this memory (e.g.
    /// "semantic_match", "coaching_mode", "graph_connection").
    pub retrieval_reasons: HashSet<String>,
    /// How much this item contributed to output diversity: the fraction of
    /// its category's cap still unused when it was selected. Populated by
    /// `diversify`; 0.0 for memories that never reach that stage.
    pub diversity_score: f32,
}

pub struct IntelligentRetriever {
    store: Arc<dyn MemoryStore>,
    relationships: Arc<RelationshipEngine>,
    provider: Arc<dyn ProviderAdapter>,
}

impl IntelligentRetriever {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        relationships: Arc<RelationshipEngine>,
        provider: Arc<dyn ProviderAdapter>,
    ) -> Self {
        Self {
            store,
            relationships,
            provider,
        }
    }

    /// Stage 1: expands `query` with known synonyms and a naive keyword
    /// split; a production system would call out to a thesaurus service or
    /// the provider itself, but this keeps expansion local and fast.
    pub fn expand_query(&self, query: &str) -> QueryExpansion {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|w| w.len() > 2)
            .collect();

        let mut synonyms = Vec::new();
        for term in &terms {
            if let Some((_, syns)) = SYNONYMS.iter().find(|(k, _)| k == term) {
                synonyms.extend(syns.iter().map(|s| s.to_string()));
            }
        }

        QueryExpansion {
            original_query: query.to_string(),
            expanded_terms: terms.clone(),
            synonyms,
            related_concepts: terms,
            semantic_clusters: Vec::new(),
        }
    }

    /// Stages 2-4: score every active memory for `context.user_id`, apply
    /// contextual re-rank boosts, filter by an adaptive semantic floor, and
    /// diversify the final list before truncating to `limit`.
    pub async fn retrieve(
        &self,
        context: &ConversationContext,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ScoredMemory>, MemoryError> {
        let expansion = self.expand_query(query);
        let expanded_text = format!(
            "{} {} {}",
            expansion.original_query,
            expansion.expanded_terms.join(" "),
            expansion.synonyms.join(" ")
        );
        let query_embedding = self
            .provider
            .generate_embedding(&expanded_text)
            .await
            .map_err(|e| MemoryError::Extraction(e.to_string()))?;

        let candidates = self.store.active_for_user(context.user_id).await?;
        let mut scored: Vec<ScoredMemory> = candidates
            .into_iter()
            .map(|entry| self.score(entry, &query_embedding, context))
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let floor = adaptive_semantic_floor(&expansion, context);
        let selected = self.select_with_adaptive_floor(scored, floor);
        Ok(self.diversify(selected, limit))
    }

    fn select_with_adaptive_floor(&self, scored: Vec<ScoredMemory>, start_floor: f32) -> Vec<ScoredMemory> {
        for floor in floor_steps(start_floor) {
            let above: Vec<ScoredMemory> = scored
                .iter()
                .filter(|s| s.semantic >= floor)
                .cloned()
                .collect();
            if above.len() >= MIN_DESIRED_RESULTS || floor == 0.0 {
                return above;
            }
        }
        scored
    }

    fn score(&self, entry: MemoryEntry, query_embedding: &[f32], context: &ConversationContext) -> ScoredMemory {
        let semantic = cosine_similarity(query_embedding, &entry.embedding);
        let temporal = temporal_score(&entry, context.temporal_bucket);
        let (contextual, mut retrieval_reasons) = contextual_score_with_reasons(&entry, context);
        let graph = graph_score(&self.relationships, &entry.id);

        if semantic >= 0.5 {
            retrieval_reasons.insert("semantic_match".to_string());
        }
        if graph > 0.0 {
            retrieval_reasons.insert("graph_connection".to_string());
        }

        let (w_semantic, w_temporal, w_contextual, w_graph) = adaptive_weights(context);
        let score = semantic * w_semantic + temporal * w_temporal + contextual * w_contextual + graph * w_graph;
        let confidence = (semantic + contextual).clamp(0.0, 1.0);

        ScoredMemory {
            entry,
            semantic,
            temporal,
            contextual,
            graph,
            score,
            confidence,
            retrieval_reasons,
            diversity_score: 0.0,
        }
    }

    /// Per-category caps (as a fraction of `limit`) so the final list
    /// doesn't collapse onto one topic: preferences and conversational
    /// context can dominate up to 30% each, personal facts and standing
    /// instructions up to 20% each. Near-identical content is dropped via a
    /// shingling-hash comparison before a cap is even consulted.
    fn diversify(&self, mut scored: Vec<ScoredMemory>, limit: usize) -> Vec<ScoredMemory> {
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let mut counts: HashMap<MemoryCategory, usize> = HashMap::new();
        let mut result: Vec<ScoredMemory> = Vec::with_capacity(limit);
        let mut accepted_shingles: Vec<HashSet<u64>> = Vec::with_capacity(limit);

        // A single pass in score order: a cap, once hit, is never relaxed,
        // so a category with little diversity can leave the result under
        // `limit` rather than violate another category's cap.
        for mut item in scored {
            if result.len() >= limit {
                break;
            }

            let item_shingles = shingle_hashes(&item.entry.content, SHINGLE_SIZE);
            let is_near_duplicate = accepted_shingles
                .iter()
                .any(|seen| jaccard(seen, &item_shingles) >= NEAR_DUPLICATE_JACCARD);
            if is_near_duplicate {
                continue;
            }

            let cap = category_cap(item.entry.category, limit);
            let count = counts.entry(item.entry.category).or_insert(0);
            if *count < cap {
                item.diversity_score = 1.0 - (*count as f32 / cap as f32);
                *count += 1;
                accepted_shingles.push(item_shingles);
                result.push(item);
            }
        }

        result
    }
}

/// Hashes every `k`-word shingle of `text`, so two near-identical memories
/// (paraphrases, minor edits) hash to mostly-overlapping sets even though
/// their raw content differs.
fn shingle_hashes(text: &str, k: usize) -> HashSet<u64> {
    let words: Vec<String> = text.to_lowercase().split_whitespace().map(String::from).collect();
    if words.is_empty() {
        return HashSet::new();
    }
    if words.len() < k {
        return HashSet::from([hash_str(&words.join(" "))]);
    }
    words.windows(k).map(|w| hash_str(&w.join(" "))).collect()
}

fn hash_str(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

/// Jaccard similarity between two shingle sets; two empty sets are treated
/// as identical (both degenerate to the same "no content" case).
fn jaccard(a: &HashSet<u64>, b: &HashSet<u64>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

fn category_cap(category: MemoryCategory, limit: usize) -> usize {
    let share = match category {
        MemoryCategory::Preference => 0.30,
        MemoryCategory::PersonalInfo => 0.20,
        MemoryCategory::Context => 0.30,
        MemoryCategory::Instruction => 0.20,
    };
    (((limit as f32) * share).ceil() as usize).max(1)
}

/// Floor starts at [`INITIAL_SEMANTIC_FLOOR`] and shifts by the query's
/// specificity (how many terms `expand_query` found worth keeping) and by
/// session length, per-query/per-turn rather than a single global constant.
fn adaptive_semantic_floor(expansion: &QueryExpansion, context: &ConversationContext) -> f32 {
    let mut floor = INITIAL_SEMANTIC_FLOOR;
    let term_count = expansion.expanded_terms.len();
    if term_count >= SPECIFIC_QUERY_TERMS {
        floor += 0.10;
    } else if term_count <= BROAD_QUERY_TERMS {
        floor -= 0.10;
    }
    if context.session_length >= LONG_SESSION_TURNS {
        floor += 0.10;
    }
    floor.clamp(0.0, 1.0)
}

/// Descending fallback floors starting from `start`, so a narrow query that
/// clears too few candidates relaxes gradually down to "take anything"
/// rather than jumping straight to an unfiltered result set.
fn floor_steps(start: f32) -> Vec<f32> {
    let mut steps = vec![start];
    let mut next = start - FLOOR_STEP_SIZE;
    while next > 0.0 {
        steps.push(next);
        next -= FLOOR_STEP_SIZE;
    }
    steps.push(0.0);
    steps
}

/// Base axis weights shifted per [`ConversationContext`]: an immediate
/// temporal context leans on recency, a long session leans on contextual
/// (coaching-mode/topic/intent) relevance over raw semantic similarity.
fn adaptive_weights(context: &ConversationContext) -> (f32, f32, f32, f32) {
    let (mut semantic, mut temporal, mut contextual, graph) = BASE_WEIGHTS;
    if context.temporal_bucket == TemporalBucket::Immediate {
        semantic -= 0.15;
        temporal += 0.15;
    }
    if context.session_length >= LONG_SESSION_TURNS {
        semantic -= 0.15;
        contextual += 0.15;
    }
    let total = semantic + temporal + contextual + graph;
    (semantic / total, temporal / total, contextual / total, graph / total)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

fn temporal_score(entry: &MemoryEntry, bucket: TemporalBucket) -> f32 {
    let age_hours = (chrono::Utc::now() - entry.created_at).num_hours().max(0) as f32;
    match bucket {
        TemporalBucket::Immediate => (1.0 - age_hours / 24.0).clamp(0.0, 1.0),
        TemporalBucket::Recent => (1.0 - age_hours / (24.0 * 14.0)).clamp(0.0, 1.0),
        TemporalBucket::Historical => 0.5,
    }
}

/// Stage 3's contextual re-rank: coaching-mode relevance (+0.15),
/// recent-topic relevance (+0.20), intent alignment (+0.25), and recency
/// when the conversation is in the `Immediate` temporal bucket (+0.10).
/// Each fires at most once per memory regardless of how many topics or
/// keywords match, so a single memory can't dominate purely by overlap count.
fn contextual_score(entry: &MemoryEntry, context: &ConversationContext) -> f32 {
    contextual_score_with_reasons(entry, context).0
}

/// Same boost logic as [`contextual_score`], additionally reporting which
/// boosts fired, for [`ScoredMemory::retrieval_reasons`].
fn contextual_score_with_reasons(entry: &MemoryEntry, context: &ConversationContext) -> (f32, HashSet<String>) {
    let mut boost: f32 = 0.0;
    let mut reasons = HashSet::new();

    let mode = context.coaching_mode.to_lowercase();
    if !mode.is_empty()
        && (entry.content.to_lowercase().contains(&mode) || entry.keywords.iter().any(|k| k.to_lowercase() == mode))
    {
        boost += 0.15;
        reasons.insert("coaching_mode".to_string());
    }

    if context.recent_topics.iter().any(|topic| {
        let topic_lower = topic.to_lowercase();
        entry.keywords.iter().any(|k| k.to_lowercase() == topic_lower)
            || entry.content.to_lowercase().contains(&topic_lower)
    }) {
        boost += 0.20;
        reasons.insert("recent_topic".to_string());
    }

    if let Some(aligned) = intent_aligned_category(context.intent) {
        if entry.category == aligned {
            boost += 0.25;
            reasons.insert("intent_alignment".to_string());
        }
    }

    if context.temporal_bucket == TemporalBucket::Immediate {
        boost += 0.10;
        reasons.insert("recency".to_string());
    }

    (boost.clamp(0.0, 1.0), reasons)
}

fn intent_aligned_category(intent: Intent) -> Option<MemoryCategory> {
    match intent {
        Intent::Question => Some(MemoryCategory::PersonalInfo),
        Intent::GoalSetting => Some(MemoryCategory::Instruction),
        Intent::ProgressCheck => Some(MemoryCategory::Context),
        Intent::AdviceSeeking => Some(MemoryCategory::Preference),
        Intent::General => None,
    }
}

/// Traverses `Supports`/`Elaborates` edges out to depth 2, guarding against
/// cycles with a visited set; depth-2 hits count at half strength.
fn graph_score(relationships: &RelationshipEngine, memory_id: &str) -> f32 {
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(memory_id.to_string());
    let mut frontier = vec![memory_id.to_string()];
    let mut total = 0.0f32;
    let mut count = 0usize;

    for depth in 1..=2 {
        let decay = if depth == 1 { 1.0 } else { 0.5 };
        let mut next_frontier = Vec::new();
        for id in &frontier {
            for rel in relationships.relationships_for(id) {
                if !matches!(rel.relationship_type, RelationshipType::Supports | RelationshipType::Elaborates) {
                    continue;
                }
                let other = if rel.source_id == *id {
                    rel.target_id.clone()
                } else {
                    rel.source_id.clone()
                };
                if visited.contains(&other) {
                    continue;
                }
                visited.insert(other.clone());
                total += rel.strength * decay;
                count += 1;
                next_frontier.push(other);
            }
        }
        if next_frontier.is_empty() {
            break;
        }
        frontier = next_frontier;
    }

    if count == 0 {
        0.0
    } else {
        (total / count as f32).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemoryCategory;
    use crate::store::InMemoryMemoryStore;
    use gateway_core::MockProviderAdapter;

    fn entry(id: &str, content: &str, category: MemoryCategory, embedding: Vec<f32>) -> MemoryEntry {
        MemoryEntry {
            id: id.to_string(),
            user_id: 1,
            content: content.to_string(),
            category,
            importance: 0.5,
            keywords: vec![],
            embedding,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            access_count: 0,
            last_accessed_at: None,
            active: true,
            semantic_hash: String::new(),
            update_count: 0,
        }
    }

    fn context() -> ConversationContext {
        ConversationContext {
            user_id: 1,
            conversation_id: "c1".into(),
            coaching_mode: "fitness".into(),
            recent_topics: vec!["running".into()],
            intent: Intent::AdviceSeeking,
            temporal_bucket: TemporalBucket::Recent,
            session_length: 5,
        }
    }

    #[test]
    fn expand_query_adds_known_synonyms() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let relationships = Arc::new(RelationshipEngine::new(store.clone()));
        let provider = Arc::new(MockProviderAdapter::new("primary"));
        let retriever = IntelligentRetriever::new(store, relationships, provider);
        let expansion = retriever.expand_query("need help with exercise routine");
        assert!(expansion.synonyms.contains(&"workout".to_string()));
    }

    #[tokio::test]
    async fn retrieve_returns_relevant_memories_within_limit() {
        let store = Arc::new(InMemoryMemoryStore::new());
        store
            .upsert(entry("m1", "enjoys running every morning", MemoryCategory::Preference, vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert(entry("m2", "owns a cat named Whiskers", MemoryCategory::PersonalInfo, vec![0.0, 1.0]))
            .await
            .unwrap();

        let relationships = Arc::new(RelationshipEngine::new(store.clone()));
        let provider = Arc::new(MockProviderAdapter::new("primary"));
        let retriever = IntelligentRetriever::new(store, relationships, provider);

        let results = retriever.retrieve(&context(), "running routine", 5).await.unwrap();
        assert!(!results.is_empty());
        assert!(results.len() <= 5);
    }

    #[tokio::test]
    async fn diversify_caps_single_category_share() {
        let store = Arc::new(InMemoryMemoryStore::new());
        for i in 0..6 {
            store
                .upsert(entry(
                    &format!("m{i}"),
                    "likes tea",
                    MemoryCategory::Preference,
                    vec![1.0, 0.0],
                ))
                .await
                .unwrap();
        }
        store
            .upsert(entry("other", "works as a teacher", MemoryCategory::PersonalInfo, vec![0.9, 0.1]))
            .await
            .unwrap();

        let relationships = Arc::new(RelationshipEngine::new(store.clone()));
        let provider = Arc::new(MockProviderAdapter::new("primary"));
        let retriever = IntelligentRetriever::new(store, relationships, provider);

        let results = retriever.retrieve(&context(), "tea preferences", 4).await.unwrap();
        let preference_count = results
            .iter()
            .filter(|r| r.entry.category == MemoryCategory::Preference)
            .count();
        assert!(preference_count <= 2);
    }

    #[test]
    fn contextual_score_sums_each_boost_once() {
        let e = entry("m1", "loves morning running, training for a 10k", MemoryCategory::Instruction, vec![]);
        let ctx = ConversationContext {
            user_id: 1,
            conversation_id: "c1".into(),
            coaching_mode: "running".into(),
            recent_topics: vec!["running".into(), "morning".into()],
            intent: Intent::GoalSetting,
            temporal_bucket: TemporalBucket::Immediate,
            session_length: 3,
        };
        // coaching-mode (0.15) + recent-topic (0.20, once regardless of two matches)
        // + intent alignment (0.25) + immediate recency (0.10) = 0.70
        assert!((contextual_score(&e, &ctx) - 0.70).abs() < 1e-5);
    }

    #[test]
    fn contextual_score_is_zero_with_no_matching_context() {
        let e = entry("m1", "owns a blue bicycle", MemoryCategory::PersonalInfo, vec![]);
        let ctx = ConversationContext {
            user_id: 1,
            conversation_id: "c1".into(),
            coaching_mode: "nutrition".into(),
            recent_topics: vec!["sleep".into()],
            intent: Intent::General,
            temporal_bucket: TemporalBucket::Recent,
            session_length: 1,
        };
        assert_eq!(contextual_score(&e, &ctx), 0.0);
    }

    fn entry_with_keywords(id: &str, content: &str, keywords: &[&str]) -> MemoryEntry {
        let mut e = entry(id, content, MemoryCategory::Preference, vec![]);
        e.keywords = keywords.iter().map(|k| k.to_string()).collect();
        e
    }

    #[tokio::test]
    async fn graph_score_reaches_depth_two_at_half_strength() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let a = entry_with_keywords("a", "likes tea", &["tea", "morning", "routine"]);
        let b = entry_with_keywords("b", "likes herbal tea", &["tea", "herbal"]);
        let c = entry_with_keywords("c", "likes chamomile specifically", &["herbal", "chamomile", "strength"]);
        for e in [&a, &b, &c] {
            store.upsert(e.clone()).await.unwrap();
        }
        let engine = RelationshipEngine::new(store.clone());
        // a-b overlap by "tea" and b-c overlap by "herbal": both land in the
        // Elaborates band, giving a a direct edge to b and an indirect one to c.
        engine.process_new_entry(&b, std::slice::from_ref(&a)).await.unwrap();
        engine.process_new_entry(&c, std::slice::from_ref(&b)).await.unwrap();

        let score = graph_score(&engine, "a");
        assert!(score > 0.0);
    }

    #[test]
    fn adaptive_semantic_floor_rises_for_specific_query_and_long_session() {
        let broad = QueryExpansion {
            original_query: "help".into(),
            expanded_terms: vec!["help".into()],
            synonyms: vec![],
            related_concepts: vec![],
            semantic_clusters: vec![],
        };
        let specific = QueryExpansion {
            original_query: "morning running routine training plan".into(),
            expanded_terms: vec!["morning".into(), "running".into(), "routine".into(), "training".into(), "plan".into()],
            synonyms: vec![],
            related_concepts: vec![],
            semantic_clusters: vec![],
        };
        let mut ctx = context();
        ctx.session_length = 1;

        let broad_floor = adaptive_semantic_floor(&broad, &ctx);
        let specific_floor = adaptive_semantic_floor(&specific, &ctx);
        assert!(specific_floor > broad_floor);

        ctx.session_length = 20;
        let long_session_floor = adaptive_semantic_floor(&specific, &ctx);
        assert!(long_session_floor > specific_floor);
    }

    #[tokio::test]
    async fn near_duplicate_content_is_filtered_by_shingling() {
        let store = Arc::new(InMemoryMemoryStore::new());
        store
            .upsert(entry(
                "m1",
                "enjoys running every morning before work",
                MemoryCategory::Preference,
                vec![1.0, 0.0],
            ))
            .await
            .unwrap();
        store
            .upsert(entry(
                "m2",
                "enjoys running every morning before breakfast",
                MemoryCategory::Preference,
                vec![1.0, 0.0],
            ))
            .await
            .unwrap();

        let relationships = Arc::new(RelationshipEngine::new(store.clone()));
        let provider = Arc::new(MockProviderAdapter::new("primary"));
        let retriever = IntelligentRetriever::new(store, relationships, provider);

        let results = retriever.retrieve(&context(), "running routine", 5).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn jaccard_of_identical_sets_is_one() {
        let a = shingle_hashes("likes tea in the morning", 3);
        let b = shingle_hashes("likes tea in the morning", 3);
        assert_eq!(jaccard(&a, &b), 1.0);
    }

    #[test]
    fn jaccard_of_disjoint_sets_is_zero() {
        let a = shingle_hashes("likes tea in the morning", 3);
        let b = shingle_hashes("owns a blue bicycle downtown", 3);
        assert_eq!(jaccard(&a, &b), 0.0);
    }

    #[tokio::test]
    async fn retrieved_memories_carry_confidence_and_reasons() {
        let store = Arc::new(InMemoryMemoryStore::new());
        store
            .upsert(entry_with_keywords("m1", "enjoys running in fitness sessions", &["fitness", "running"]))
            .await
            .unwrap();

        let relationships = Arc::new(RelationshipEngine::new(store.clone()));
        let provider = Arc::new(MockProviderAdapter::new("primary"));
        let retriever = IntelligentRetriever::new(store, relationships, provider);

        let results = retriever.retrieve(&context(), "running routine", 5).await.unwrap();
        let top = results.first().expect("at least one result");
        assert!(top.confidence > 0.0);
        assert!(top.retrieval_reasons.contains("coaching_mode"));
        assert!(top.diversity_score > 0.0);
    }

    #[test]
    fn category_cap_matches_spec_shares() {
        assert_eq!(category_cap(MemoryCategory::Preference, 10), 3);
        assert_eq!(category_cap(MemoryCategory::PersonalInfo, 10), 2);
        assert_eq!(category_cap(MemoryCategory::Context, 10), 3);
        assert_eq!(category_cap(MemoryCategory::Instruction, 10), 2);
    }
}
