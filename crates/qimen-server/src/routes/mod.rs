//! API routes modules.
//!
//! Organized by functionality:
//! - `health` - Liveness and backing-store status
//! - `cache` - Cache statistics
//! - `metrics` - Prometheus exposition

pub mod cache;
pub mod health;
pub mod metrics;
