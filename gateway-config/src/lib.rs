//! Load configuration for the gateway from project `.env` and the process
//! environment, then apply it with priority: **existing env > .env**.
//!
//! Call [`load_and_apply`] once at process start, before reading any
//! `GATEWAY_*` variable, then build a [`GatewaySettings`] with
//! [`GatewaySettings::from_env`].

mod dotenv;
mod settings;

use std::path::Path;
use thiserror::Error;

pub use settings::{GatewaySettings, ProviderSettings, SettingsError};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

/// Loads `.env` (current directory, or `override_dir` if given) and sets
/// environment variables only for keys that are **not** already set, so the
/// existing process environment always wins.
pub fn load_and_apply(override_dir: Option<&Path>) -> Result<(), LoadError> {
    let dotenv_map = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;
    for (key, value) in dotenv_map {
        if std::env::var(&key).is_err() {
            std::env::set_var(&key, value);
        }
    }
    Ok(())
}

/// Installs a `tracing_subscriber::fmt` subscriber driven by `RUST_LOG`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
