//! Error types for cache operations

use thiserror::Error;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised inside the cache backends.
///
/// These never cross the [`CacheService`](crate::CacheService) boundary: the
/// façade logs them and degrades to a miss or a no-op.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Could not check a connection out of the pool
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// Could not build the connection pool
    #[error("Redis pool build error: {0}")]
    PoolBuild(#[from] deadpool_redis::CreatePoolError),

    /// Value could not be converted to or from JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TTL of zero was requested
    #[error("Invalid TTL for key {0}: must be at least one millisecond")]
    InvalidTtl(String),

    /// Operation against a key holding the wrong kind of value
    #[error("Wrong value type at key {0}")]
    WrongType(String),

    /// Increment would overflow a signed 64-bit integer
    #[error("Increment would overflow at key {0}")]
    Overflow(String),

    /// Increment on a value that is not an integer
    #[error("Value at key {0} is not an integer")]
    NotAnInteger(String),

    /// Invalid cache configuration
    #[error("Configuration error: {0}")]
    Config(String),
}
