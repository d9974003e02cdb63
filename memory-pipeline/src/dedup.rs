//! Deduplicator: decides whether a freshly extracted memory is new,
//! redundant, an update to an existing memory, or should be merged with one.

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::MemoryError;
use crate::model::MemoryEntry;
use crate::store::MemoryStore;

/// Memories whose cosine similarity meets this bar are treated as the same
/// fact restated and skipped outright; below it but above [`UPDATE_THRESHOLD`]
/// they're close enough that the candidate refines the existing entry instead
/// of creating a new one. [`DedupDecision::Merge`] is never produced here —
/// it belongs to the relationship engine's cluster consolidation.
const SKIP_THRESHOLD: f32 = 0.85;
const UPDATE_THRESHOLD: f32 = 0.70;

const DECISION_CACHE_CAPACITY: usize = 256;

/// Similarity comparison is bounded to this recent a window, capped at
/// [`SIMILARITY_HORIZON_MAX_ENTRIES`], so a long-lived user's full history
/// never has to be scanned for every new candidate.
const SIMILARITY_HORIZON: std::time::Duration = std::time::Duration::from_secs(48 * 3600);
const SIMILARITY_HORIZON_MAX_ENTRIES: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub enum DedupDecision {
    Create,
    Skip { existing_id: String },
    Update { existing_id: String },
    Merge { existing_id: String },
}

/// Content-addressed fingerprint used for exact-duplicate detection and as
/// the store's `semantic_hash` index key. Falls back to a hash of the
/// normalized content when no embedding is available.
pub fn semantic_hash(content: &str, embedding: &[f32]) -> String {
    let mut hasher = DefaultHasher::new();
    if embedding.is_empty() {
        content.trim().to_lowercase().hash(&mut hasher);
    } else {
        for dim in embedding.iter().take(8) {
            // Quantize so near-identical floats hash identically.
            ((dim * 1000.0).round() as i64).hash(&mut hasher);
        }
    }
    format!("{:016x}", hasher.finish())
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

struct DecisionCache {
    map: std::collections::HashMap<(i64, String), DedupDecision>,
    order: VecDeque<(i64, String)>,
}

impl DecisionCache {
    fn new() -> Self {
        Self {
            map: std::collections::HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &(i64, String)) -> Option<DedupDecision> {
        self.map.get(key).cloned()
    }

    fn put(&mut self, key: (i64, String), decision: DedupDecision) {
        if !self.map.contains_key(&key) {
            self.order.push_back(key.clone());
            if self.order.len() > DECISION_CACHE_CAPACITY {
                if let Some(oldest) = self.order.pop_front() {
                    self.map.remove(&oldest);
                }
            }
        }
        self.map.insert(key, decision);
    }
}

/// Serializes dedup decisions per user (two concurrent extractions for the
/// same user must not both decide `Create` against the same candidate) and
/// caches recent decisions to skip the store scan on repeat content.
pub struct Deduplicator {
    store: Arc<dyn MemoryStore>,
    user_locks: DashMap<i64, Arc<AsyncMutex<()>>>,
    decision_cache: AsyncMutex<DecisionCache>,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self {
            store,
            user_locks: DashMap::new(),
            decision_cache: AsyncMutex::new(DecisionCache::new()),
        }
    }

    fn lock_for_user(&self, user_id: i64) -> Arc<AsyncMutex<()>> {
        self.user_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Decides what to do with `candidate` and, for `Update`/`Merge`,
    /// applies the decision to the store. `Create` is left to the caller
    /// (the relationship engine assigns the id before persisting).
    pub async fn resolve(&self, candidate: &mut MemoryEntry) -> Result<DedupDecision, MemoryError> {
        let lock = self.lock_for_user(candidate.user_id);
        let _guard = lock.lock().await;

        candidate.semantic_hash = semantic_hash(&candidate.content, &candidate.embedding);
        let cache_key = (candidate.user_id, candidate.semantic_hash.clone());

        if let Some(cached) = self.decision_cache.lock().await.get(&cache_key) {
            if let DedupDecision::Skip { existing_id } = &cached {
                return Ok(DedupDecision::Skip {
                    existing_id: existing_id.clone(),
                });
            }
        }

        if let Some(exact) = self
            .store
            .find_by_semantic_hash(candidate.user_id, &candidate.semantic_hash)
            .await?
        {
            let decision = DedupDecision::Skip {
                existing_id: exact.id.clone(),
            };
            self.decision_cache
                .lock()
                .await
                .put(cache_key, decision.clone());
            return Ok(decision);
        }

        let existing = self
            .store
            .recent_for_user(candidate.user_id, SIMILARITY_HORIZON, SIMILARITY_HORIZON_MAX_ENTRIES)
            .await?;

        let mut best: Option<(f32, &MemoryEntry)> = None;
        for entry in &existing {
            let sim = cosine_similarity(&candidate.embedding, &entry.embedding);
            if best.map(|(b, _)| sim > b).unwrap_or(true) {
                best = Some((sim, entry));
            }
        }

        let decision = match best {
            Some((sim, entry)) if sim >= SKIP_THRESHOLD => DedupDecision::Skip {
                existing_id: entry.id.clone(),
            },
            Some((sim, entry)) if sim >= UPDATE_THRESHOLD => {
                self.apply_update(entry, candidate).await?;
                DedupDecision::Update {
                    existing_id: entry.id.clone(),
                }
            }
            _ => DedupDecision::Create,
        };

        self.decision_cache.lock().await.put(cache_key, decision.clone());
        Ok(decision)
    }

    async fn apply_update(&self, existing: &MemoryEntry, candidate: &MemoryEntry) -> Result<(), MemoryError> {
        let mut updated = existing.clone();
        updated.content = candidate.content.clone();
        updated.importance = updated.importance.max(candidate.importance);
        updated.keywords = candidate.keywords.clone();
        updated.embedding = candidate.embedding.clone();
        updated.semantic_hash = candidate.semantic_hash.clone();
        updated.updated_at = chrono::Utc::now();
        updated.update_count += 1;
        self.store.upsert(updated).await
    }
}
