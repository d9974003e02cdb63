//! Typed, validated settings assembled from `GATEWAY_*` environment variables.
//!
//! [`load_and_apply`](crate::load_and_apply) should run first so that a
//! project `.env` file has already been folded into the process environment.

use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn env_or(key: &'static str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, SettingsError> {
    match env::var(key) {
        Ok(v) => v.parse().map_err(|_| SettingsError::Invalid {
            key,
            reason: format!("could not parse {v:?}"),
        }),
        Err(_) => Ok(default),
    }
}

/// Per-provider connection settings (`primary` / `secondary`).
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub tag: &'static str,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

/// Cache partition sizing, keyed by the partition name used throughout the
/// response cache (`ai_response`, `embedding`, ...).
#[derive(Debug, Clone)]
pub struct CachePartitionSettings {
    pub max_entries: usize,
    pub ttl: Duration,
}

/// Process-wide, immutable gateway configuration. Built once in `main` and
/// shared behind an `Arc` — nothing in the crate re-reads the environment
/// after startup.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub workers: usize,
    pub queue_capacity_per_level: usize,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown: Duration,
    pub retry_attempts: u32,
    pub memory_supervisor_concurrency: usize,
    pub cache_ai_response: CachePartitionSettings,
    pub cache_embedding: CachePartitionSettings,
    pub cache_memory_retrieval: CachePartitionSettings,
    pub cache_default: CachePartitionSettings,
    pub rollout_advanced_memory: u8,
    pub rollout_realtime_dedup: u8,
    pub rollout_enhanced_prompts: u8,
    pub rollout_batch_processing: u8,
    pub rollout_circuit_breakers: u8,
    pub primary: ProviderSettings,
    pub secondary: ProviderSettings,
    pub port: u16,
    pub api_key: Option<String>,
    pub shutdown_drain: Duration,
}

fn percentage(key: &'static str, default: u8) -> Result<u8, SettingsError> {
    let v: u32 = env_parse(key, default as u32)?;
    if v > 100 {
        return Err(SettingsError::Invalid {
            key,
            reason: "percentage must be 0..=100".to_string(),
        });
    }
    Ok(v as u8)
}

impl GatewaySettings {
    /// Reads and validates every `GATEWAY_*` variable, applying documented
    /// defaults for anything unset. Fails closed: out-of-range or
    /// unparsable values are rejected rather than silently clamped.
    pub fn from_env() -> Result<Self, SettingsError> {
        let workers: usize = env_parse("GATEWAY_WORKERS", 8)?;
        if workers == 0 {
            return Err(SettingsError::Invalid {
                key: "GATEWAY_WORKERS",
                reason: "must be at least 1".to_string(),
            });
        }

        let primary = ProviderSettings {
            tag: "primary",
            base_url: env_or("GATEWAY_PRIMARY_BASE_URL", ""),
            api_key: env::var("GATEWAY_PRIMARY_API_KEY").ok(),
            model: env_or("GATEWAY_PRIMARY_MODEL", "gpt-4o-mini"),
        };
        let secondary = ProviderSettings {
            tag: "secondary",
            base_url: env_or("GATEWAY_SECONDARY_BASE_URL", ""),
            api_key: env::var("GATEWAY_SECONDARY_API_KEY").ok(),
            model: env_or("GATEWAY_SECONDARY_MODEL", "gpt-4o-mini"),
        };
        if primary.api_key.is_some() && primary.base_url.is_empty() {
            return Err(SettingsError::Invalid {
                key: "GATEWAY_PRIMARY_BASE_URL",
                reason: "must be set when GATEWAY_PRIMARY_API_KEY is set".to_string(),
            });
        }
        if secondary.api_key.is_some() && secondary.base_url.is_empty() {
            return Err(SettingsError::Invalid {
                key: "GATEWAY_SECONDARY_BASE_URL",
                reason: "must be set when GATEWAY_SECONDARY_API_KEY is set".to_string(),
            });
        }

        Ok(GatewaySettings {
            workers,
            queue_capacity_per_level: env_parse("GATEWAY_QUEUE_CAPACITY", 256usize)?,
            batch_size: env_parse("GATEWAY_BATCH_SIZE", 32usize)?,
            batch_timeout: Duration::from_millis(env_parse("GATEWAY_BATCH_TIMEOUT_MS", 5_000u64)?),
            breaker_failure_threshold: env_parse("GATEWAY_BREAKER_THRESHOLD", 5u32)?,
            breaker_cooldown: Duration::from_secs(env_parse("GATEWAY_BREAKER_COOLDOWN_SECS", 60u64)?),
            retry_attempts: env_parse("GATEWAY_RETRY_ATTEMPTS", 3u32)?,
            memory_supervisor_concurrency: env_parse("GATEWAY_MEMORY_SUPERVISOR_CONCURRENCY", 2usize)?,
            cache_ai_response: CachePartitionSettings {
                max_entries: env_parse("GATEWAY_CACHE_AI_RESPONSE_ENTRIES", 2_000usize)?,
                ttl: Duration::from_secs(env_parse("GATEWAY_CACHE_AI_RESPONSE_TTL_SECS", 600u64)?),
            },
            cache_embedding: CachePartitionSettings {
                max_entries: env_parse("GATEWAY_CACHE_EMBEDDING_ENTRIES", 5_000usize)?,
                ttl: Duration::from_secs(env_parse("GATEWAY_CACHE_EMBEDDING_TTL_SECS", 3_600u64)?),
            },
            cache_memory_retrieval: CachePartitionSettings {
                max_entries: env_parse("GATEWAY_CACHE_MEMORY_RETRIEVAL_ENTRIES", 1_000usize)?,
                ttl: Duration::from_secs(env_parse(
                    "GATEWAY_CACHE_MEMORY_RETRIEVAL_TTL_SECS",
                    120u64,
                )?),
            },
            cache_default: CachePartitionSettings {
                max_entries: env_parse("GATEWAY_CACHE_DEFAULT_ENTRIES", 500usize)?,
                ttl: Duration::from_secs(env_parse("GATEWAY_CACHE_DEFAULT_TTL_SECS", 300u64)?),
            },
            rollout_advanced_memory: percentage("GATEWAY_ROLLOUT_ADVANCED_MEMORY", 100)?,
            rollout_realtime_dedup: percentage("GATEWAY_ROLLOUT_REALTIME_DEDUP", 100)?,
            rollout_enhanced_prompts: percentage("GATEWAY_ROLLOUT_ENHANCED_PROMPTS", 100)?,
            rollout_batch_processing: percentage("GATEWAY_ROLLOUT_BATCH_PROCESSING", 100)?,
            rollout_circuit_breakers: percentage("GATEWAY_ROLLOUT_CIRCUIT_BREAKERS", 100)?,
            primary,
            secondary,
            port: env_parse("GATEWAY_PORT", 8080u16)?,
            api_key: env::var("GATEWAY_API_KEY").ok(),
            shutdown_drain: Duration::from_secs(env_parse("GATEWAY_SHUTDOWN_DRAIN_SECS", 30u64)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // GatewaySettings::from_env reads the process environment, which is
    // process-global; serialize tests that touch it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_gateway_vars() {
        for (key, _) in env::vars() {
            if key.starts_with("GATEWAY_") {
                env::remove_var(key);
            }
        }
    }

    #[test]
    fn defaults_are_valid() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_gateway_vars();
        let settings = GatewaySettings::from_env().unwrap();
        assert_eq!(settings.workers, 8);
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.rollout_advanced_memory, 100);
    }

    #[test]
    fn zero_workers_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_gateway_vars();
        env::set_var("GATEWAY_WORKERS", "0");
        let err = GatewaySettings::from_env().unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { key: "GATEWAY_WORKERS", .. }));
        env::remove_var("GATEWAY_WORKERS");
    }

    #[test]
    fn api_key_without_base_url_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_gateway_vars();
        env::set_var("GATEWAY_PRIMARY_API_KEY", "secret");
        let err = GatewaySettings::from_env().unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid { key: "GATEWAY_PRIMARY_BASE_URL", .. }
        ));
        env::remove_var("GATEWAY_PRIMARY_API_KEY");
    }

    #[test]
    fn rollout_percentage_out_of_range_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_gateway_vars();
        env::set_var("GATEWAY_ROLLOUT_ADVANCED_MEMORY", "150");
        let err = GatewaySettings::from_env().unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid { key: "GATEWAY_ROLLOUT_ADVANCED_MEMORY", .. }
        ));
        env::remove_var("GATEWAY_ROLLOUT_ADVANCED_MEMORY");
    }
}
