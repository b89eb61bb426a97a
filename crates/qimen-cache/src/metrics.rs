//! Cache metrics.
//!
//! Recorded through the `metrics` facade; the host process decides which
//! recorder (if any) is installed.

use metrics::{counter, gauge};

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_ERRORS_TOTAL: &str = "cache_errors_total";
    pub const CACHE_EVICTIONS_TOTAL: &str = "cache_evictions_total";
    pub const CACHE_EXPIRED_TOTAL: &str = "cache_expired_total";
    pub const CACHE_ENTRIES: &str = "cache_entries";
}

/// Record a cache hit.
pub fn record_cache_hit(mode: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "mode" => mode).increment(1);
}

/// Record a cache miss.
pub fn record_cache_miss(mode: &'static str) {
    counter!(names::CACHE_MISSES_TOTAL, "mode" => mode).increment(1);
}

/// Record an operation that degraded because of an internal error.
pub fn record_cache_error(mode: &'static str, operation: &'static str) {
    counter!(names::CACHE_ERRORS_TOTAL, "mode" => mode, "operation" => operation).increment(1);
}

/// Record a capacity eviction in the fallback store.
pub fn record_eviction() {
    counter!(names::CACHE_EVICTIONS_TOTAL).increment(1);
}

/// Record entries removed because their TTL elapsed.
pub fn record_expired(count: usize) {
    if count > 0 {
        counter!(names::CACHE_EXPIRED_TOTAL).increment(count as u64);
    }
}

/// Set the number of entries held by the fallback store.
pub fn set_cache_entries(count: usize) {
    gauge!(names::CACHE_ENTRIES).set(count as f64);
}
