//! Backing-store selection.
//!
//! Runs once before the cache serves traffic: resolve the Redis endpoint,
//! build a pool and `PING` it with bounded retries. The outcome is final for
//! the lifetime of the process.

use deadpool_redis::{Pool, Runtime};
use std::fmt;
use std::time::Duration;

use crate::config::{DEFAULT_LOCAL_ENDPOINT, Environment, RedisConfig};
use crate::distributed::RedisStore;
use crate::error::{CacheError, CacheResult};

/// Why the selector settled on the in-memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// `redis.enabled = false`
    Disabled,
    /// No endpoint configured outside development
    NotConfigured,
    /// Probe failed on every attempt
    Unreachable(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "redis disabled"),
            Self::NotConfigured => write!(f, "no redis endpoint configured"),
            Self::Unreachable(e) => write!(f, "redis unreachable: {e}"),
        }
    }
}

/// Result of probing the distributed store.
pub enum Selection {
    Distributed(RedisStore),
    Fallback(FallbackReason),
}

/// Decide which endpoint to probe, if any.
pub fn resolve_endpoint(
    config: &RedisConfig,
    environment: Environment,
) -> Result<String, FallbackReason> {
    if !config.enabled {
        return Err(FallbackReason::Disabled);
    }

    match config.endpoint() {
        Some(endpoint) => Ok(endpoint),
        None if environment.is_development() || config.use_default_endpoint => {
            Ok(DEFAULT_LOCAL_ENDPOINT.to_string())
        }
        None => Err(FallbackReason::NotConfigured),
    }
}

/// Build a connection pool sized and timed from `config`.
pub fn build_pool(endpoint: &str, config: &RedisConfig) -> CacheResult<Pool> {
    let timeout = config.timeout();
    let mut redis_config = deadpool_redis::Config::from_url(endpoint);
    let pool_config = redis_config
        .pool
        .get_or_insert_with(|| deadpool_redis::PoolConfig::new(config.pool_size));
    pool_config.max_size = config.pool_size;
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);

    Ok(redis_config.create_pool(Some(Runtime::Tokio1))?)
}

/// Probe the configured Redis endpoint.
pub async fn select(config: &RedisConfig, environment: Environment) -> Selection {
    let endpoint = match resolve_endpoint(config, environment) {
        Ok(endpoint) => endpoint,
        Err(reason) => return Selection::Fallback(reason),
    };

    tracing::info!(url = %redact(&endpoint), "Connecting to Redis");

    let pool = match build_pool(&endpoint, config) {
        Ok(pool) => pool,
        Err(e) => return Selection::Fallback(FallbackReason::Unreachable(e.to_string())),
    };

    let store = RedisStore::new(pool);
    match probe_with_retry(&store, config).await {
        Ok(()) => Selection::Distributed(store),
        Err(e) => Selection::Fallback(FallbackReason::Unreachable(e.to_string())),
    }
}

async fn probe_with_retry(store: &RedisStore, config: &RedisConfig) -> CacheResult<()> {
    let attempts = config.connect_retries.max(1);
    let base = Duration::from_millis(config.retry_backoff_ms);
    let max_backoff = base * 10;
    let mut backoff = base;
    let mut last_error = CacheError::Config("no connection attempt made".into());

    for attempt in 1..=attempts {
        match tokio::time::timeout(config.timeout(), store.ping()).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => last_error = e,
            Err(_) => {
                last_error = CacheError::Config(format!(
                    "ping timed out after {}ms",
                    config.timeout_ms
                ))
            }
        }

        tracing::debug!(
            attempt,
            attempts,
            error = %last_error,
            "Redis probe failed"
        );

        if attempt < attempts {
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(max_backoff);
        }
    }

    Err(last_error)
}

/// Hide credentials in a connection URL for logging.
pub fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
