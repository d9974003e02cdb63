//! Bounded-concurrency background runner for memory ingestion.
//!
//! Chat responses must never wait on, or fail because of, memory work. The
//! supervisor caps how many `ingest` calls run at once (independent of the
//! chat worker pool) and tracks per-user failures through a
//! [`gateway_core::CircuitBreaker`] keyed by user id, so a user whose
//! memory writes keep failing stops generating ingest attempts without
//! affecting any other user or the chat path itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gateway_core::CircuitBreaker;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::MemoryPipeline;

pub struct MemorySupervisor {
    semaphore: Arc<Semaphore>,
    breaker: CircuitBreaker,
    failures: AtomicU64,
}

impl MemorySupervisor {
    pub fn new(concurrency: usize, breaker_threshold: u32, breaker_cooldown: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            breaker: CircuitBreaker::new(breaker_threshold, breaker_cooldown),
            failures: AtomicU64::new(0),
        }
    }

    /// Schedules `pipeline.ingest(user_id, message)` on a bounded background
    /// task. Returns immediately; the caller's chat response never waits on
    /// this. Skipped entirely while this user's memory breaker is open.
    pub fn spawn_ingest(self: &Arc<Self>, pipeline: Arc<MemoryPipeline>, user_id: i64, message: String) {
        let key = user_id.to_string();
        if !self.breaker.allow(&key) {
            warn!(user_id, "memory breaker open, skipping ingest");
            return;
        }
        let supervisor = self.clone();
        let semaphore = self.semaphore.clone();
        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            match pipeline.ingest(user_id, &message).await {
                Ok(_) => supervisor.breaker.record_success(&key),
                Err(err) => {
                    supervisor.breaker.record_failure(&key);
                    supervisor.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(user_id, error = %err, "memory ingest failed");
                }
            }
        });
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryMemoryStore;
    use gateway_core::MockProviderAdapter;

    #[tokio::test]
    async fn spawn_ingest_creates_memory_in_background() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let provider = Arc::new(MockProviderAdapter::new("primary"));
        let pipeline = Arc::new(MemoryPipeline::new(store.clone(), provider, "mock-small"));
        let supervisor = Arc::new(MemorySupervisor::new(2, 5, Duration::from_secs(60)));

        supervisor.spawn_ingest(
            pipeline,
            1,
            "remember that I'm training for a 10k".to_string(),
        );

        // Background task needs a moment to run; poll briefly rather than
        // assuming a fixed delay is enough.
        for _ in 0..50 {
            if !store.active_for_user(1).await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!store.active_for_user(1).await.unwrap().is_empty());
        assert_eq!(supervisor.failure_count(), 0);
    }

    #[test]
    fn open_breaker_skips_scheduling() {
        let supervisor = MemorySupervisor::new(2, 1, Duration::from_secs(60));
        supervisor.breaker.record_failure("1");
        assert!(!supervisor.breaker.allow("1"));
    }
}
