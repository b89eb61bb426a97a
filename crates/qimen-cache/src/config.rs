//! Cache service configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default endpoint probed when no Redis endpoint is configured in development.
pub const DEFAULT_LOCAL_ENDPOINT: &str = "redis://127.0.0.1:6379";

/// Deployment environment the process runs in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[serde(alias = "dev", alias = "local", alias = "test")]
    Development,
    #[serde(alias = "prod")]
    Production,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" | "test" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// Redis connection settings.
///
/// Either `url` or `host` (plus `port`, `password`, `db`) identifies the
/// endpoint. `url` wins when both are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis (falls back to the in-memory store without it)
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Connection URL (e.g., "redis://localhost:6379/0")
    #[serde(default)]
    pub url: Option<String>,

    /// Host name, used when `url` is not set
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_redis_port")]
    pub port: u16,

    #[serde(default)]
    pub password: Option<String>,

    /// Logical database index
    #[serde(default)]
    pub db: i64,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,

    /// Probe attempts before giving up on Redis
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    /// Initial backoff between probe attempts in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Probe the local default endpoint even outside development
    #[serde(default)]
    pub use_default_endpoint: bool,
}

fn default_redis_enabled() -> bool {
    true
}

fn default_redis_port() -> u16 {
    6379
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

fn default_connect_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: None,
            host: None,
            port: default_redis_port(),
            password: None,
            db: 0,
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
            connect_retries: default_connect_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            use_default_endpoint: false,
        }
    }
}

impl RedisConfig {
    /// Configuration pointing at a single URL.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// The explicitly configured endpoint, if any.
    pub fn endpoint(&self) -> Option<String> {
        if let Some(url) = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            return Some(url.to_string());
        }

        let host = self.host.as_deref().map(str::trim).filter(|h| !h.is_empty())?;
        let auth = match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!(":{}@", urlencoding::encode(password)),
            None => String::new(),
        };
        Some(format!("redis://{auth}{host}:{}/{}", self.port, self.db))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.pool_size == 0 {
            return Err("redis.pool_size must be greater than zero".into());
        }
        if self.timeout_ms == 0 {
            return Err("redis.timeout_ms must be greater than zero".into());
        }
        if self.db < 0 {
            return Err("redis.db must not be negative".into());
        }
        Ok(())
    }
}

/// Fallback store and TTL defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries held by the in-memory fallback store
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// TTL applied by `set`/`hset` when the caller passes none
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// TTL applied by `incr` when the caller passes none
    #[serde(default = "default_incr_ttl_secs")]
    pub default_incr_ttl_secs: u64,

    /// Interval of the expired-entry sweep in fallback mode
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_capacity() -> usize {
    1_000
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_incr_ttl_secs() -> u64 {
    3_600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            default_ttl_secs: default_ttl_secs(),
            default_incr_ttl_secs: default_incr_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn default_incr_ttl(&self) -> Duration {
        Duration::from_secs(self.default_incr_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Replace zero values with their defaults, warning about each one.
    pub fn sanitized(mut self) -> Self {
        if self.capacity == 0 {
            tracing::warn!(default = default_capacity(), "cache.capacity is zero, using default");
            self.capacity = default_capacity();
        }
        if self.default_ttl_secs == 0 {
            tracing::warn!(default = default_ttl_secs(), "cache.default_ttl_secs is zero, using default");
            self.default_ttl_secs = default_ttl_secs();
        }
        if self.default_incr_ttl_secs == 0 {
            tracing::warn!(
                default = default_incr_ttl_secs(),
                "cache.default_incr_ttl_secs is zero, using default"
            );
            self.default_incr_ttl_secs = default_incr_ttl_secs();
        }
        if self.sweep_interval_secs == 0 {
            tracing::warn!(
                default = default_sweep_interval_secs(),
                "cache.sweep_interval_secs is zero, using default"
            );
            self.sweep_interval_secs = default_sweep_interval_secs();
        }
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("cache.capacity must be greater than zero".into());
        }
        if self.default_ttl_secs == 0 || self.default_incr_ttl_secs == 0 {
            return Err("cache default TTLs must be greater than zero".into());
        }
        if self.sweep_interval_secs == 0 {
            return Err("cache.sweep_interval_secs must be greater than zero".into());
        }
        Ok(())
    }
}
