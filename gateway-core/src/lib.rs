//! # gateway-core
//!
//! A concurrent gateway that fronts multiple upstream AI providers for the
//! wellness-coaching backend: connection pooling, priority queueing,
//! response caching, per-provider circuit breaking, and feature-flagged
//! rollout.
//!
//! ## Design principles
//!
//! - **One entry point**: [`Gateway`] owns the queue, worker pool, cache,
//!   breaker, and provider adapters; everything else in this crate is a
//!   component it wires together. Nothing is a global/static — callers
//!   build one `Gateway` and share it behind an `Arc`.
//! - **Provider adapters are the only thing that talks to the network**:
//!   [`ProviderAdapter`] is implemented by [`MockProviderAdapter`] (tests,
//!   and the default when no API key is configured) and
//!   [`HttpProviderAdapter`] (OpenAI-compatible wire format).
//! - **Every suspension point is bounded**: the queue has a capacity, the
//!   connection pool has a per-provider concurrency limit, and every
//!   request carries a deadline.
//!
//! ## Main modules
//!
//! - [`request`] / [`response`]: wire types exchanged with callers.
//! - [`provider`]: [`ProviderAdapter`] trait, [`MockProviderAdapter`], [`HttpProviderAdapter`].
//! - [`pool`]: [`ConnectionPool`], per-provider concurrency limiting.
//! - [`cache`]: generic [`Cache`] trait + [`InMemoryCache`].
//! - [`response_cache`]: category-partitioned, TTL'd [`ResponseCache`] built on `cache`.
//! - [`queue`]: [`PriorityQueue`], bounded multi-level FIFO with backpressure.
//! - [`breaker`]: [`CircuitBreaker`], per-key closed/open/half-open state machine.
//! - [`worker`]: fixed-size worker pool draining the queue.
//! - [`flags`]: [`FeatureFlags`], deterministic per-user rollout.
//! - [`gateway`]: [`Gateway`], the front-end tying every component together.
//! - [`error`]: [`GatewayError`] taxonomy shared across the crate.

pub mod breaker;
pub mod cache;
pub mod error;
pub mod flags;
pub mod gateway;
pub mod pool;
pub mod provider;
pub mod queue;
pub mod request;
pub mod response;
pub mod response_cache;
pub mod worker;

pub use breaker::{BreakerPhase, CircuitBreaker};
pub use cache::{Cache, CacheError, InMemoryCache};
pub use error::GatewayError;
pub use flags::{FeatureFlags, Flag};
pub use gateway::{Gateway, GatewayStatsSnapshot, HealthStatus};
pub use pool::ConnectionPool;
pub use provider::{CallOptions, HttpProviderAdapter, MockProviderAdapter, ProviderAdapter};
pub use queue::{PriorityQueue, Queueable};
pub use request::{ChatMessage, ProviderTag, Request, Role};
pub use response::{BatchItemResult, BatchResponse, FinishReason, Response, Usage};
pub use response_cache::{ai_response_key, CachePartition, Freshness, ResponseCache};
pub use worker::{process_request, Job, WorkerContext};
