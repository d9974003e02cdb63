//! Axum app: shared state and router.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;

use gateway_config::GatewaySettings;
use gateway_core::{FeatureFlags, Gateway};
use memory_pipeline::{MemoryPipeline, MemorySupervisor};

use super::auth::require_api_key;
use super::handlers;
use super::stream::stream_chat;

/// Everything request handlers need, built once in `main` and shared behind
/// an `Arc` — mirrors how [`Gateway`] itself is shared with its worker pool.
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub memory: Arc<MemoryPipeline>,
    pub memory_supervisor: Arc<MemorySupervisor>,
    pub flags: Arc<FeatureFlags>,
    pub settings: Arc<GatewaySettings>,
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/v1/chat", post(handlers::chat))
        .route("/v1/batch", post(handlers::batch))
        .route("/v1/stream", post(stream_chat))
        .route("/v1/models", get(handlers::list_models))
        .route("/admin/stats", get(handlers::admin_stats))
        .route(
            "/admin/cache",
            get(handlers::admin_cache_status).delete(handlers::admin_cache_clear),
        )
        .route(
            "/admin/cache/invalidate-prefix",
            post(handlers::admin_cache_invalidate_prefix),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .with_state(state)
}
