//! Fixed-size worker pool draining the priority queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use tokio::sync::oneshot;

use crate::breaker::CircuitBreaker;
use crate::error::GatewayError;
use crate::pool::ConnectionPool;
use crate::provider::{CallOptions, ProviderAdapter};
use crate::queue::{PriorityQueue, Queueable};
use crate::request::Request;
use crate::response::{Response, Usage};
use crate::response_cache::{ai_response_key, CachePartition, Freshness, ResponseCache};

/// A queued request bundled with the channel its submitter is waiting on.
pub struct Job {
    pub request: Request,
    pub reply: oneshot::Sender<Result<Response, GatewayError>>,
}

impl Queueable for Job {
    fn priority(&self) -> u8 {
        self.request.priority
    }
    fn is_expired(&self) -> bool {
        self.request.is_expired()
    }
    fn is_cancelled(&self) -> bool {
        self.request.cancellation.is_cancelled()
    }
}

/// Everything a worker needs, shared across the whole pool.
pub struct WorkerContext {
    pub queue: Arc<PriorityQueue<Job>>,
    pub pool: Arc<ConnectionPool>,
    pub cache: Arc<ResponseCache<Response>>,
    pub breaker: Arc<CircuitBreaker>,
    pub providers: HashMap<String, Arc<dyn ProviderAdapter>>,
    pub pool_acquire_timeout: Duration,
    pub retry_attempts: u32,
}

/// Spawns `count` worker tasks; returns their join handles so callers can
/// await graceful shutdown.
pub fn spawn_workers(ctx: Arc<WorkerContext>, count: usize) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|id| {
            let ctx = ctx.clone();
            tokio::spawn(async move { worker_loop(id, ctx).await })
        })
        .collect()
}

async fn worker_loop(id: usize, ctx: Arc<WorkerContext>) {
    loop {
        let job = match ctx.queue.dequeue(Duration::from_secs(1)).await {
            Ok(j) => j,
            Err(_) => continue,
        };
        debug!(worker = id, request_id = %job.request.id, "dequeued request");
        let result = process_request(&ctx, job.request).await;
        let _ = job.reply.send(result);
    }
}

/// Runs one request through cache-check, breaker, pool, and adapter, with
/// bounded retry on transient/rate-limited failures. Returns the response
/// that would be handed back to the caller; callers that need the
/// reply-channel wiring (the HTTP front-end) build on top of this.
pub async fn process_request(ctx: &WorkerContext, request: Request) -> Result<Response, GatewayError> {
    request.validate().map_err(|e| GatewayError::BadRequest(e.to_string()))?;

    let provider_tag = request.provider.as_str();
    let last_user_message = request
        .messages
        .last()
        .map(|m| m.content.as_str())
        .unwrap_or("");
    let cache_key = ai_response_key(request.user_id, provider_tag, &request.model, last_user_message);

    if let Some(hit) = ctx.cache.get(CachePartition::AiResponse, &cache_key).await {
        let mut response = hit.value;
        response.cache_hit = true;
        if hit.freshness == Freshness::Stale {
            // Stale-while-revalidate: the caller gets the stale value now;
            // a fresh one will land in the cache on the next miss-driven call.
            debug!(request_id = %request.id, "serving stale cache entry");
        }
        return Ok(response);
    }

    let provider = ctx
        .providers
        .get(provider_tag)
        .ok_or_else(|| GatewayError::BadRequest(format!("unknown provider: {provider_tag}")))?
        .clone();

    let mut attempt = 0;
    loop {
        if !ctx.breaker.allow(provider_tag) {
            return Err(GatewayError::BreakerOpen(provider_tag.to_string()));
        }

        let started = Instant::now();
        let slot_result = tokio::select! {
            result = ctx.pool.acquire(provider_tag, ctx.pool_acquire_timeout) => result,
            _ = request.cancellation.cancelled() => return Err(GatewayError::Cancelled),
        };
        let slot = match slot_result {
            Ok(slot) => slot,
            Err(err) => return Err(err),
        };

        let call_opts = CallOptions {
            model: request.model.clone(),
            max_tokens: None,
            temperature: None,
        };
        let call_result = tokio::select! {
            result = provider.generate_chat(&request.messages, &call_opts) => result,
            _ = request.cancellation.cancelled() => {
                drop(slot);
                return Err(GatewayError::Cancelled);
            }
        };
        drop(slot);
        let elapsed = started.elapsed();

        match call_result {
            Ok(result) => {
                ctx.breaker.record_success(provider_tag);
                ctx.pool.record_success(provider_tag, elapsed);
                let response = Response {
                    request_id: request.id.clone(),
                    provider: request.provider,
                    model: request.model.clone(),
                    content: result.content,
                    finish_reason: result.finish_reason,
                    usage: Usage {
                        prompt_tokens: result.usage.prompt_tokens,
                        completion_tokens: result.usage.completion_tokens,
                        total_tokens: result.usage.total_tokens,
                    },
                    processing_time: elapsed,
                    cache_hit: false,
                    retry_attempt: attempt,
                    timestamp: chrono::Utc::now(),
                };
                ctx.cache.put(CachePartition::AiResponse, &cache_key, response.clone()).await;
                return Ok(response);
            }
            Err(err) => {
                ctx.breaker.record_failure(provider_tag);
                ctx.pool.record_failure(provider_tag);
                if err.is_retryable() && attempt < ctx.retry_attempts {
                    attempt += 1;
                    let backoff = Duration::from_millis(50 * 2u64.pow(attempt)) + jitter();
                    warn!(request_id = %request.id, attempt, "retrying after transient failure");
                    sleep(backoff).await;
                    continue;
                }
                return Err(err);
            }
        }
    }
}

fn jitter() -> Duration {
    use rand::Rng;
    Duration::from_millis(rand::thread_rng().gen_range(0..25))
}
