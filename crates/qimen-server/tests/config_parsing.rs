//! Configuration loading: file, `QIMEN__*` overrides and conventional variables.

use config::Map;
use qimen_cache::Environment;
use qimen_server::config::loader::load_config_with_env;
use std::io::Write;

fn env(pairs: &[(&str, &str)]) -> Map<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn test_defaults_without_file() {
    let cfg = load_config_with_env(None, &env(&[])).expect("defaults load");

    assert_eq!(cfg.server.port, 3001);
    assert_eq!(cfg.environment, Environment::Development);
    assert!(cfg.redis.enabled);
    assert!(cfg.redis.endpoint().is_none());
    assert_eq!(cfg.cache.capacity, 1000);
    assert_eq!(cfg.cache.default_ttl_secs, 300);
    assert_eq!(cfg.cache.sweep_interval_secs, 60);
    assert_eq!(cfg.rate_limit.max_requests, 100);
}

#[test]
fn test_file_values_are_loaded() {
    let file = write_config(
        r#"
environment = "production"

[server]
port = 9090

[redis]
url = "redis://cache.internal:6379/1"
pool_size = 4

[cache]
capacity = 50
"#,
    );

    let cfg = load_config_with_env(file.path().to_str(), &env(&[])).expect("file load");

    assert_eq!(cfg.server.port, 9090);
    assert_eq!(cfg.environment, Environment::Production);
    assert_eq!(
        cfg.redis.endpoint().as_deref(),
        Some("redis://cache.internal:6379/1")
    );
    assert_eq!(cfg.redis.pool_size, 4);
    assert_eq!(cfg.cache.capacity, 50);
}

#[test]
fn test_prefixed_env_overrides_file() {
    let file = write_config("[cache]\ncapacity = 50\n");
    let vars = env(&[("QIMEN__CACHE__CAPACITY", "25")]);

    let cfg = load_config_with_env(file.path().to_str(), &vars).expect("load");
    assert_eq!(cfg.cache.capacity, 25);
}

#[test]
fn test_conventional_redis_variables() {
    let vars = env(&[
        ("REDIS_HOST", "redis.svc"),
        ("REDIS_PORT", "6380"),
        ("REDIS_PASSWORD", "secret"),
        ("REDIS_DB", "3"),
        ("APP_ENV", "prod"),
    ]);

    let cfg = load_config_with_env(None, &vars).expect("load");
    assert_eq!(cfg.environment, Environment::Production);
    assert_eq!(
        cfg.redis.endpoint().as_deref(),
        Some("redis://:secret@redis.svc:6380/3")
    );
}

#[test]
fn test_redis_url_variable_wins_over_file() {
    let file = write_config("[redis]\nurl = \"redis://from-file:6379\"\n");
    let vars = env(&[("REDIS_URL", "redis://from-env:6379")]);

    let cfg = load_config_with_env(file.path().to_str(), &vars).expect("load");
    assert_eq!(cfg.redis.endpoint().as_deref(), Some("redis://from-env:6379"));
}

#[test]
fn test_invalid_log_level_is_rejected() {
    let vars = env(&[("QIMEN__LOGGING__LEVEL", "loud")]);
    let err = load_config_with_env(None, &vars).unwrap_err();
    assert!(err.contains("logging.level"));
}

#[test]
fn test_zero_capacity_is_rejected() {
    let file = write_config("[cache]\ncapacity = 0\n");
    assert!(load_config_with_env(file.path().to_str(), &env(&[])).is_err());
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let err = load_config_with_env(Some("/nonexistent/qimen.toml"), &env(&[])).unwrap_err();
    assert!(err.contains("not found"));
}
