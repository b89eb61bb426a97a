use qimen_cache::{CacheConfig, Environment, RedisConfig};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Deployment environment; decides whether a missing Redis endpoint
    /// probes the local default
    #[serde(default)]
    pub environment: Environment,
    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,
    /// In-memory fallback and TTL defaults
    #[serde(default)]
    pub cache: CacheConfig,
    /// Per-client request limits
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!(
                "logging.level must be one of {:?}, got '{}'",
                valid_levels, self.logging.level
            ));
        }
        self.redis.validate()?;
        self.cache.validate()?;
        if self.rate_limit.enabled {
            if self.rate_limit.max_requests == 0 {
                return Err("rate_limit.max_requests must be > 0".into());
            }
            if self.rate_limit.window_secs == 0 {
                return Err("rate_limit.window_secs must be > 0".into());
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3001
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Fixed-key request counter per client, stored in the cache.
///
/// Each request increments `{key_prefix}:{client}` and re-arms its TTL, so a
/// client is released once it stays quiet for a full window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Requests allowed per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_rate_limit_enabled() -> bool {
    true
}
fn default_max_requests() -> u32 {
    100
}
fn default_window_secs() -> u64 {
    15 * 60
}
fn default_key_prefix() -> String {
    "ratelimit".into()
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment as EnvSource, File, Map};
    use std::path::PathBuf;

    /// Default config file looked up in the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "qimen.toml";

    /// Conventional deployment variables mapped onto config keys.
    const CONVENTIONAL_VARS: &[(&str, &str)] = &[
        ("REDIS_URL", "redis.url"),
        ("REDIS_HOST", "redis.host"),
        ("REDIS_PORT", "redis.port"),
        ("REDIS_PASSWORD", "redis.password"),
        ("REDIS_DB", "redis.db"),
        ("APP_ENV", "environment"),
        ("PORT", "server.port"),
    ];

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let vars: Map<String, String> = std::env::vars().collect();
        load_config_with_env(path, &vars)
    }

    /// Load configuration reading environment overrides from `vars`.
    ///
    /// Precedence (lowest first): defaults, config file,
    /// `QIMEN__SECTION__KEY` variables, conventional variables like `REDIS_URL`.
    pub fn load_config_with_env(
        path: Option<&str>,
        vars: &Map<String, String>,
    ) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            return Err(format!("config file not found: {}", pathbuf.display()));
        }

        // Environment variable overrides, e.g., QIMEN__SERVER__PORT=9090
        builder = builder.add_source(
            EnvSource::with_prefix("QIMEN")
                .try_parsing(true)
                .separator("__")
                .source(Some(vars.clone())),
        );

        for (var, key) in CONVENTIONAL_VARS {
            let value = vars
                .get(*var)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            builder = builder
                .set_override_option(*key, value)
                .map_err(|e| format!("config override error for {var}: {e}"))?;
        }

        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        // Validate
        merged.validate()?;
        Ok(merged)
    }
}
