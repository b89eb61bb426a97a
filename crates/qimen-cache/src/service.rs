//! Cache façade.
//!
//! [`CacheService`] exposes one key-value API over whichever backing store the
//! selector chose at startup. Callers never see errors: failures are logged
//! and degrade to a miss (`None`), `false`, or `0`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::{CacheConfig, Environment, RedisConfig};
use crate::distributed::RedisStore;
use crate::error::{CacheError, CacheResult};
use crate::metrics;
use crate::selector::{self, FallbackReason, Selection};
use crate::store::{FallbackStore, spawn_sweeper};

/// Backing store selected at startup. Never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackingMode {
    #[serde(rename = "redis")]
    Distributed,
    #[serde(rename = "memory")]
    Fallback,
}

impl BackingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackingMode::Distributed => "redis",
            BackingMode::Fallback => "memory",
        }
    }
}

impl std::fmt::Display for BackingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    #[serde(rename = "type")]
    pub mode: BackingMode,
    /// Entry count (`DBSIZE` in Redis mode)
    pub size: Option<usize>,
    /// Entry cap of the in-memory store
    pub capacity: Option<usize>,
    /// Approximate bytes held (Redis `used_memory` in Redis mode)
    pub memory_bytes: Option<u64>,
    pub hits: u64,
    pub misses: u64,
}

enum Backend {
    Distributed(RedisStore),
    Fallback(Arc<FallbackStore>),
}

struct Inner {
    backend: Backend,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    sweeper: Option<JoinHandle<()>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
    }
}

/// Cache service handle. Cheap to clone; clones share the same backing store.
#[derive(Clone)]
pub struct CacheService {
    inner: Arc<Inner>,
}

impl CacheService {
    /// Probe Redis and build a service over whichever store answered.
    ///
    /// Falls back to the in-memory store when Redis is disabled, not
    /// configured outside development, or unreachable after retries. The
    /// choice is permanent for this service.
    pub async fn connect(
        redis: &RedisConfig,
        cache: &CacheConfig,
        environment: Environment,
    ) -> Self {
        let cache = cache.clone().sanitized();
        match selector::select(redis, environment).await {
            Selection::Distributed(store) => {
                tracing::info!("✓ Connected to Redis successfully");
                Self::from_backend(Backend::Distributed(store), cache)
            }
            Selection::Fallback(reason) => {
                match &reason {
                    FallbackReason::Disabled => {
                        tracing::info!("Redis disabled, using in-memory cache")
                    }
                    FallbackReason::NotConfigured => tracing::warn!(
                        environment = ?environment,
                        "No Redis endpoint configured. Falling back to in-memory cache."
                    ),
                    FallbackReason::Unreachable(error) => tracing::warn!(
                        error = %error,
                        "Failed to connect to Redis. Falling back to in-memory cache."
                    ),
                }
                Self::in_memory(cache)
            }
        }
    }

    /// In-memory service. Starts the expiry sweep on the current Tokio runtime.
    ///
    /// Zero-valued settings are replaced by their defaults.
    pub fn in_memory(cache: CacheConfig) -> Self {
        let cache = cache.sanitized();
        let store = Arc::new(FallbackStore::new(cache.capacity));
        let sweeper = match tokio::runtime::Handle::try_current() {
            Ok(_) => match spawn_sweeper(&store, cache.sweep_interval()) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::warn!(error = %e, "Expiry sweep not started; relying on passive expiry");
                    None
                }
            },
            Err(_) => {
                tracing::warn!("No Tokio runtime; in-memory cache will rely on passive expiry");
                None
            }
        };

        Self {
            inner: Arc::new(Inner {
                backend: Backend::Fallback(store),
                config: cache,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                sweeper,
            }),
        }
    }

    /// Service over an already connected Redis pool.
    pub fn with_redis(pool: deadpool_redis::Pool, cache: CacheConfig) -> Self {
        Self::from_backend(Backend::Distributed(RedisStore::new(pool)), cache.sanitized())
    }

    fn from_backend(backend: Backend, config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                config,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                sweeper: None,
            }),
        }
    }

    pub fn mode(&self) -> BackingMode {
        match self.inner.backend {
            Backend::Distributed(_) => BackingMode::Distributed,
            Backend::Fallback(_) => BackingMode::Fallback,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Read and deserialize a value. `None` on miss or on any failure.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let result = self.try_get(key).await;
        let value = self.degrade("get", key, result, None);
        self.record_lookup(key, value.is_some());
        value
    }

    async fn try_get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let raw = match &self.inner.backend {
            Backend::Distributed(redis) => redis.get(key).await?,
            Backend::Fallback(store) => store.get(key)?,
        };
        decode(raw)
    }

    /// Serialize and store a value. `ttl` defaults to the configured TTL (300s).
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        let result = self.try_set(key, value, ttl).await;
        self.degrade("set", key, result.map(|()| true), false)
    }

    async fn try_set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let ttl = resolve_ttl(key, ttl, self.inner.config.default_ttl())?;
        let text = serde_json::to_string(value)?;
        match &self.inner.backend {
            Backend::Distributed(redis) => redis.set(key, &text, ttl).await?,
            Backend::Fallback(store) => store.set(key, text, ttl),
        }
        tracing::debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "cache set");
        Ok(())
    }

    /// Remove one key. `true` unless the backing store failed.
    pub async fn del(&self, key: &str) -> bool {
        let result = match &self.inner.backend {
            Backend::Distributed(redis) => redis.del(key).await,
            Backend::Fallback(store) => Ok(store.remove(key)),
        };
        self.degrade("del", key, result.map(|_| true), false)
    }

    /// Remove every key matching a Redis-style glob (`*`, `?`, `[...]`).
    pub async fn del_pattern(&self, pattern: &str) -> bool {
        let result = match &self.inner.backend {
            Backend::Distributed(redis) => redis.del_matching(pattern).await,
            Backend::Fallback(store) => Ok(store.remove_matching(pattern)),
        };
        match result {
            Ok(removed) => {
                tracing::debug!(pattern = %pattern, removed, "cache pattern delete");
                true
            }
            Err(e) => self.degrade("del_pattern", pattern, Err(e), false),
        }
    }

    /// True iff the key is present and not expired.
    pub async fn exists(&self, key: &str) -> bool {
        let result = match &self.inner.backend {
            Backend::Distributed(redis) => redis.exists(key).await,
            Backend::Fallback(store) => Ok(store.contains(key)),
        };
        self.degrade("exists", key, result, false)
    }

    /// Set one hash field. The whole hash expires `ttl` from now.
    pub async fn hset<T: Serialize + ?Sized>(
        &self,
        key: &str,
        field: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        let result = self.try_hset(key, field, value, ttl).await;
        self.degrade("hset", key, result.map(|()| true), false)
    }

    async fn try_hset<T: Serialize + ?Sized>(
        &self,
        key: &str,
        field: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let ttl = resolve_ttl(key, ttl, self.inner.config.default_ttl())?;
        let text = serde_json::to_string(value)?;
        match &self.inner.backend {
            Backend::Distributed(redis) => redis.hset(key, field, &text, ttl).await,
            Backend::Fallback(store) => store.hset(key, field, text, ttl),
        }
    }

    pub async fn hget<T: DeserializeOwned>(&self, key: &str, field: &str) -> Option<T> {
        let result = self.try_hget(key, field).await;
        let value = self.degrade("hget", key, result, None);
        self.record_lookup(key, value.is_some());
        value
    }

    async fn try_hget<T: DeserializeOwned>(&self, key: &str, field: &str) -> CacheResult<Option<T>> {
        let raw = match &self.inner.backend {
            Backend::Distributed(redis) => redis.hget(key, field).await?,
            Backend::Fallback(store) => store.hget(key, field)?,
        };
        decode(raw)
    }

    /// Atomically increment a counter and (re)apply its TTL (default 3600s).
    ///
    /// Returns the new value, or `0` if the operation failed.
    pub async fn incr(&self, key: &str, ttl: Option<Duration>) -> i64 {
        let result = self.try_incr(key, ttl).await;
        self.degrade("incr", key, result, 0)
    }

    async fn try_incr(&self, key: &str, ttl: Option<Duration>) -> CacheResult<i64> {
        let ttl = resolve_ttl(key, ttl, self.inner.config.default_incr_ttl())?;
        match &self.inner.backend {
            Backend::Distributed(redis) => redis.incr(key, ttl).await,
            Backend::Fallback(store) => store.incr(key, ttl),
        }
    }

    /// Mode plus approximate size and memory figures.
    pub async fn get_stats(&self) -> CacheStats {
        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);

        match &self.inner.backend {
            Backend::Fallback(store) => CacheStats {
                mode: BackingMode::Fallback,
                size: Some(store.len()),
                capacity: Some(store.capacity()),
                memory_bytes: Some(store.approximate_bytes() as u64),
                hits,
                misses,
            },
            Backend::Distributed(redis) => {
                let info = match redis.info().await {
                    Ok(info) => Some(info),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read Redis stats");
                        None
                    }
                };
                CacheStats {
                    mode: BackingMode::Distributed,
                    size: info.map(|i| i.keys),
                    capacity: None,
                    memory_bytes: info.and_then(|i| i.used_memory),
                    hits,
                    misses,
                }
            }
        }
    }

    /// Check if Redis answers (for health checks). Always false in memory mode.
    pub async fn is_distributed_available(&self) -> bool {
        match &self.inner.backend {
            Backend::Fallback(_) => false,
            Backend::Distributed(redis) => redis.ping().await.is_ok(),
        }
    }

    fn record_lookup(&self, key: &str, hit: bool) {
        let mode = self.mode().as_str();
        if hit {
            tracing::debug!(key = %key, mode, "cache hit");
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_hit(mode);
        } else {
            tracing::debug!(key = %key, mode, "cache miss");
            self.inner.misses.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_miss(mode);
        }
    }

    fn degrade<T>(
        &self,
        operation: &'static str,
        key: &str,
        result: CacheResult<T>,
        fallback: T,
    ) -> T {
        match result {
            Ok(value) => value,
            Err(e) => {
                let mode = self.mode().as_str();
                tracing::warn!(operation, key = %key, mode, error = %e, "cache operation failed");
                metrics::record_cache_error(mode, operation);
                fallback
            }
        }
    }
}

fn resolve_ttl(key: &str, ttl: Option<Duration>, default: Duration) -> CacheResult<Duration> {
    let ttl = ttl.unwrap_or(default);
    if ttl.as_millis() == 0 {
        return Err(CacheError::InvalidTtl(key.to_string()));
    }
    Ok(ttl)
}

fn decode<T: DeserializeOwned>(raw: Option<String>) -> CacheResult<Option<T>> {
    raw.map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(CacheError::from)
}
