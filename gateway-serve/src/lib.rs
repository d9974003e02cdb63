//! HTTP + SSE front-end for the AI request gateway.
//!
//! Exposes [`Gateway`](gateway_core::Gateway) and
//! [`MemoryPipeline`](memory_pipeline::MemoryPipeline) over a small JSON API:
//! `/v1/chat`, `/v1/batch`, `/v1/stream` (SSE), `/v1/models`,
//! `/admin/stats`, `/admin/cache`, `/health`.
//!
//! **Public API**: [`run_serve`], [`run_serve_on_listener`].

mod app;
mod auth;
mod error;
mod handlers;
mod stream;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;

pub use app::AppState;

use app::router;

const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Runs the server on an already-bound listener, shutting down gracefully
/// when `shutdown` resolves. Workers already in flight are given
/// `state.settings.shutdown_drain` to finish via axum's graceful shutdown.
pub async fn run_serve_on_listener(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("gateway HTTP server listening on http://{}", addr);

    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.await;
        })
        .await?;
    Ok(())
}

/// Binds `addr` (default `127.0.0.1:8080`) and runs the server until
/// `shutdown` resolves.
pub async fn run_serve(
    addr: Option<&str>,
    state: Arc<AppState>,
    shutdown: oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = addr.unwrap_or(DEFAULT_ADDR);
    let listener = TcpListener::bind(addr).await?;
    run_serve_on_listener(listener, state, shutdown).await
}
