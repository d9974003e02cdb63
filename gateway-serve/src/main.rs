//! Gateway binary entrypoint: loads configuration, builds the gateway and
//! memory pipeline, and serves the HTTP API until SIGTERM/SIGINT.

use std::process::ExitCode;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use gateway_config::GatewaySettings;
use gateway_core::{FeatureFlags, Gateway, HttpProviderAdapter, MockProviderAdapter, ProviderAdapter};
use gateway_serve::AppState;
use memory_pipeline::{InMemoryMemoryStore, MemoryPipeline, MemorySupervisor};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = gateway_config::load_and_apply(None) {
        eprintln!("warning: failed to load .env: {e}");
    }
    gateway_config::init_tracing();

    let settings = match GatewaySettings::from_env() {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::from(2);
        }
    };

    let gateway = Arc::new(Gateway::new(settings.clone()));

    let memory_provider: Arc<dyn ProviderAdapter> = if settings.primary.api_key.is_some() {
        Arc::new(HttpProviderAdapter::new(
            "memory",
            settings.primary.base_url.clone(),
            settings.primary.api_key.clone(),
        ))
    } else {
        Arc::new(MockProviderAdapter::new("memory"))
    };
    let memory = Arc::new(MemoryPipeline::new(
        Arc::new(InMemoryMemoryStore::new()),
        memory_provider,
        settings.primary.model.clone(),
    ));
    let memory_supervisor = Arc::new(MemorySupervisor::new(
        settings.memory_supervisor_concurrency,
        settings.breaker_failure_threshold,
        settings.breaker_cooldown,
    ));
    let flags = Arc::new(FeatureFlags::new(&settings));

    let state = Arc::new(AppState {
        gateway,
        memory,
        memory_supervisor,
        flags,
        settings: settings.clone(),
    });

    let addr = format!("0.0.0.0:{}", settings.port);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let drain = settings.shutdown_drain;
    let serve_task = tokio::spawn(gateway_serve::run_serve(Some(&addr), state, shutdown_rx));

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining in-flight requests (up to {:?})", drain);
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(drain, serve_task).await {
        Ok(Ok(Ok(()))) => {
            info!("server exited cleanly");
            ExitCode::SUCCESS
        }
        Ok(Ok(Err(e))) => {
            error!("server exited with error: {e}");
            ExitCode::FAILURE
        }
        Ok(Err(e)) => {
            error!("server task panicked: {e}");
            ExitCode::FAILURE
        }
        Err(_) => {
            warn!("shutdown drain period elapsed before the server finished; exiting anyway");
            ExitCode::FAILURE
        }
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sig = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sig.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
