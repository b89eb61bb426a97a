//! Cache service for the Qimen backend.
//!
//! ## Architecture
//!
//! - **Distributed store (Redis)**: shared by every instance, used when reachable at startup
//! - **Fallback store**: bounded in-process map with passive and periodic expiry
//! - **Façade**: [`CacheService`] presents one API over whichever store was selected
//!
//! ## Mode Selection
//!
//! ```text
//! connect() → probe Redis (PING, bounded retries)
//!                ├─ ok      → Distributed   (all calls go to Redis)
//!                └─ failed  → Fallback      (in-memory map + 60s sweep)
//! ```
//!
//! The selection is made once. A service that fell back to memory stays in
//! memory mode even if Redis becomes reachable later, and each process then
//! has its own private cache.

pub mod config;
pub mod distributed;
pub mod error;
pub mod metrics;
pub mod pattern;
pub mod selector;
pub mod service;
pub mod store;

pub use config::{CacheConfig, Environment, RedisConfig};
pub use error::{CacheError, CacheResult};
pub use pattern::glob_match;
pub use selector::FallbackReason;
pub use service::{BackingMode, CacheService, CacheStats};
pub use store::FallbackStore;
