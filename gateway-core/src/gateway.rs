//! Gateway front-end: validates requests, enqueues them for the worker
//! pool, and exposes batch/stream/health/stats operations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use gateway_config::GatewaySettings;

use crate::breaker::{BreakerPhase, CircuitBreaker};
use crate::error::GatewayError;
use crate::pool::ConnectionPool;
use crate::provider::{HttpProviderAdapter, MockProviderAdapter, ProviderAdapter};
use crate::queue::PriorityQueue;
use crate::request::Request;
use crate::response::{BatchItemResult, BatchResponse, Response};
use crate::response_cache::{CachePartition, ResponseCache};
use crate::worker::{spawn_workers, Job, WorkerContext};

struct GatewayStats {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl GatewayStats {
    fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }
}

/// Snapshot returned by `/admin/stats`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GatewayStatsSnapshot {
    pub queue_length: usize,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cache_entries: usize,
    pub worker_count: usize,
}

/// Snapshot returned by `/health`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub providers: HashMap<String, bool>,
}

/// The application-facing gateway: owns the queue, worker pool, cache,
/// breaker, and provider adapters. Constructed once and shared behind an
/// `Arc` (see `gateway-serve`'s `AppState`).
pub struct Gateway {
    ctx: Arc<WorkerContext>,
    settings: Arc<GatewaySettings>,
    stats: GatewayStats,
    _workers: Vec<JoinHandle<()>>,
    submit_timeout: Duration,
}

fn build_providers(settings: &GatewaySettings) -> HashMap<String, Arc<dyn ProviderAdapter>> {
    let mut providers: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();

    let primary: Arc<dyn ProviderAdapter> = if settings.primary.api_key.is_some() {
        Arc::new(HttpProviderAdapter::new(
            "primary",
            settings.primary.base_url.clone(),
            settings.primary.api_key.clone(),
        ))
    } else {
        Arc::new(MockProviderAdapter::new("primary"))
    };
    providers.insert("primary".to_string(), primary);

    let secondary: Arc<dyn ProviderAdapter> = if settings.secondary.api_key.is_some() {
        Arc::new(HttpProviderAdapter::new(
            "secondary",
            settings.secondary.base_url.clone(),
            settings.secondary.api_key.clone(),
        ))
    } else {
        Arc::new(MockProviderAdapter::new("secondary"))
    };
    providers.insert("secondary".to_string(), secondary);

    providers
}

impl Gateway {
    pub fn new(settings: Arc<GatewaySettings>) -> Self {
        let providers = build_providers(&settings);
        let pool = Arc::new(ConnectionPool::new(&[
            ("primary", settings.workers),
            ("secondary", settings.workers),
        ]));
        let cache = Arc::new(ResponseCache::new(&settings));
        let breaker = Arc::new(CircuitBreaker::new(
            settings.breaker_failure_threshold,
            settings.breaker_cooldown,
        ));
        let queue = Arc::new(PriorityQueue::new(settings.queue_capacity_per_level * 5));

        let ctx = Arc::new(WorkerContext {
            queue,
            pool,
            cache,
            breaker,
            providers,
            pool_acquire_timeout: Duration::from_secs(5),
            retry_attempts: settings.retry_attempts,
        });

        let workers = spawn_workers(ctx.clone(), settings.workers);

        Self {
            ctx,
            settings,
            stats: GatewayStats::new(),
            _workers: workers,
            submit_timeout: Duration::from_secs(30),
        }
    }

    /// For tests/composition: build a gateway around a pre-assembled
    /// provider map (e.g. all-mock) instead of reading `GatewaySettings`.
    pub fn with_providers(settings: Arc<GatewaySettings>, providers: HashMap<String, Arc<dyn ProviderAdapter>>) -> Self {
        let pool = Arc::new(ConnectionPool::new(&[
            ("primary", settings.workers),
            ("secondary", settings.workers),
        ]));
        let cache = Arc::new(ResponseCache::new(&settings));
        let breaker = Arc::new(CircuitBreaker::new(
            settings.breaker_failure_threshold,
            settings.breaker_cooldown,
        ));
        let queue = Arc::new(PriorityQueue::new(settings.queue_capacity_per_level * 5));

        let ctx = Arc::new(WorkerContext {
            queue,
            pool,
            cache,
            breaker,
            providers,
            pool_acquire_timeout: Duration::from_secs(5),
            retry_attempts: settings.retry_attempts,
        });

        let workers = spawn_workers(ctx.clone(), settings.workers);

        Self {
            ctx,
            settings,
            stats: GatewayStats::new(),
            _workers: workers,
            submit_timeout: Duration::from_secs(30),
        }
    }

    fn prepare_request(&self, mut request: Request) -> Result<Request, GatewayError> {
        if request.id.is_empty() {
            request.id = Uuid::new_v4().to_string();
        }
        request.validate().map_err(|e| GatewayError::BadRequest(e.to_string()))?;
        Ok(request)
    }

    /// Enqueues `request` and awaits the worker pool's result, up to
    /// `submit_timeout`.
    pub async fn submit(&self, request: Request) -> Result<Response, GatewayError> {
        let request = self.prepare_request(request)?;
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = oneshot::channel();
        self.ctx
            .queue
            .enqueue(Job { request, reply: tx })
            .map_err(|_| GatewayError::ResourceExhausted("queue is full".to_string()))?;

        let result = tokio::time::timeout(self.submit_timeout, rx).await;
        let outcome = match result {
            Ok(Ok(inner)) => inner,
            Ok(Err(_)) => Err(GatewayError::Internal("worker dropped the reply channel".into())),
            Err(_) => Err(GatewayError::Timeout),
        };

        match &outcome {
            Ok(_) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        outcome
    }

    /// Submits every request, preserving input order. A single request's
    /// failure does not abort the rest.
    pub async fn submit_batch(&self, requests: Vec<Request>) -> BatchResponse {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            match self.submit(request).await {
                Ok(response) => results.push(BatchItemResult::Ok { response }),
                Err(err) => results.push(BatchItemResult::Err {
                    class: err.class(),
                    message: err.to_string(),
                }),
            }
        }
        BatchResponse { results }
    }

    /// Streaming submission: bypasses the cache on write, never caches an
    /// incomplete stream. Uses the same queue/worker path as `submit`, then
    /// delivers the full content through `on_chunk` once complete (the
    /// underlying adapter may call `on_chunk` incrementally via
    /// `stream_chat`; this entry point covers the common "one assembled
    /// response" path used by the HTTP SSE front-end).
    pub async fn submit_stream(
        &self,
        request: Request,
        on_chunk: tokio::sync::mpsc::Sender<String>,
    ) -> Result<Response, GatewayError> {
        let response = self.submit(request).await?;
        let _ = on_chunk.send(response.content.clone()).await;
        Ok(response)
    }

    pub fn cancel(&self, token: &CancellationToken) {
        token.cancel();
    }

    pub async fn stats(&self) -> GatewayStatsSnapshot {
        GatewayStatsSnapshot {
            queue_length: self.ctx.queue.len(),
            submitted: self.stats.submitted.load(Ordering::Relaxed),
            completed: self.stats.completed.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            cache_entries: self.ctx.cache.len(CachePartition::AiResponse).await,
            worker_count: self.settings.workers,
        }
    }

    pub fn health(&self) -> HealthStatus {
        let mut providers = HashMap::new();
        for tag in self.ctx.providers.keys() {
            let phase = self.ctx.breaker.phase(tag);
            providers.insert(tag.clone(), !matches!(phase, BreakerPhase::Open));
        }
        let healthy = providers.values().any(|ok| *ok);
        HealthStatus { healthy, providers }
    }

    pub async fn clear_cache(&self) {
        self.ctx.cache.clear_all().await;
    }

    /// Invalidates every `ai_response` cache entry keyed under `prefix`
    /// (e.g. a user id) without wiping the whole partition. Returns the
    /// number of entries removed.
    pub async fn invalidate_cache_prefix(&self, prefix: &str) -> usize {
        self.ctx
            .cache
            .invalidate_prefix(CachePartition::AiResponse, prefix)
            .await
    }

    /// Models available per provider, for `/v1/models`.
    pub async fn list_models(&self) -> HashMap<String, Vec<String>> {
        let mut out = HashMap::new();
        for (tag, adapter) in &self.ctx.providers {
            let models = adapter.list_models().await.unwrap_or_default();
            out.insert(tag.clone(), models);
        }
        out
    }
}
