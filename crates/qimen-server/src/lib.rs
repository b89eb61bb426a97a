//! HTTP host for the Qimen cache service.
//!
//! Loads configuration, selects the cache backing store once at startup and
//! serves health, cache statistics and Prometheus metrics behind a
//! cache-backed rate limiter.

pub mod config;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod server;

pub use config::{AppConfig, RateLimitConfig};
pub use server::{AppState, QimenServer, build_app};
