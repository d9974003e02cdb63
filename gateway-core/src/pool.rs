//! Per-provider connection pool: a bounded-concurrency slot limiter with
//! rolling health stats.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use crate::error::GatewayError;

struct ProviderStats {
    successes: AtomicU64,
    failures: AtomicU64,
    total_latency_ms: AtomicU64,
}

impl ProviderStats {
    fn new() -> Self {
        Self {
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
        }
    }
}

/// A held connection slot; releases automatically on drop, so a panicking
/// or early-returning worker never leaks concurrency.
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

/// Bounded concurrency limiter, one [`Semaphore`] per provider tag.
pub struct ConnectionPool {
    semaphores: HashMap<String, Arc<Semaphore>>,
    stats: HashMap<String, ProviderStats>,
}

impl ConnectionPool {
    pub fn new(providers: &[(&str, usize)]) -> Self {
        let mut semaphores = HashMap::new();
        let mut stats = HashMap::new();
        for (tag, max_concurrency) in providers {
            semaphores.insert(tag.to_string(), Arc::new(Semaphore::new(*max_concurrency)));
            stats.insert(tag.to_string(), ProviderStats::new());
        }
        Self { semaphores, stats }
    }

    pub async fn acquire(&self, provider: &str, acquire_timeout: Duration) -> Result<Slot, GatewayError> {
        let sem = self
            .semaphores
            .get(provider)
            .ok_or_else(|| GatewayError::Internal(format!("unknown provider: {provider}")))?
            .clone();
        match timeout(acquire_timeout, sem.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(Slot { _permit: permit }),
            Ok(Err(_)) => Err(GatewayError::Internal("connection pool closed".into())),
            Err(_) => Err(GatewayError::ResourceExhausted(format!(
                "timed out acquiring a connection slot for {provider}"
            ))),
        }
    }

    pub fn record_success(&self, provider: &str, latency: Duration) {
        if let Some(stats) = self.stats.get(provider) {
            stats.successes.fetch_add(1, Ordering::Relaxed);
            stats
                .total_latency_ms
                .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
        }
    }

    pub fn record_failure(&self, provider: &str) {
        if let Some(stats) = self.stats.get(provider) {
            stats.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// In-flight call count for a provider, derived from available permits.
    pub fn available_permits(&self, provider: &str) -> usize {
        self.semaphores
            .get(provider)
            .map(|s| s.available_permits())
            .unwrap_or(0)
    }

    pub fn success_count(&self, provider: &str) -> u64 {
        self.stats
            .get(provider)
            .map(|s| s.successes.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn failure_count(&self, provider: &str) -> u64 {
        self.stats
            .get(provider)
            .map(|s| s.failures.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}
