//! In-memory fallback store.
//!
//! Used when no distributed store is reachable. Entries live in an
//! insertion-ordered map behind a single mutex, so every operation (including
//! read-modify-write ones like `incr` and `hset`) is atomic with respect to
//! the others.
//!
//! ## Expiry
//!
//! - **Passive**: a read that finds an expired entry removes it and reports a miss
//! - **Active**: [`spawn_sweeper`] periodically removes everything past its expiry
//!
//! ## Capacity
//!
//! Inserting a new key beyond `capacity` evicts the earliest-inserted entry.
//! Overwrites keep the entry's original position.

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{CacheError, CacheResult};
use crate::metrics;
use crate::pattern::glob_match;

/// What a key holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Serialized JSON text
    Value(String),
    /// Field → serialized JSON text
    Hash(HashMap<String, String>),
}

impl Slot {
    fn approximate_bytes(&self) -> usize {
        match self {
            Slot::Value(v) => v.len(),
            Slot::Hash(fields) => fields.iter().map(|(f, v)| f.len() + v.len()).sum(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub slot: Slot,
    pub expires_at: Instant,
}

impl StoredEntry {
    fn new(slot: Slot, ttl: Duration) -> Self {
        Self {
            slot,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Bounded, expiring key-value store local to this process.
#[derive(Debug)]
pub struct FallbackStore {
    entries: Mutex<IndexMap<String, StoredEntry>>,
    capacity: usize,
}

impl FallbackStore {
    /// Store holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(IndexMap::with_capacity(capacity.min(1024) + 1)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Read a plain value.
    pub fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self.entries.lock();
        match live_entry(&mut entries, key) {
            Some(StoredEntry {
                slot: Slot::Value(v),
                ..
            }) => Ok(Some(v.clone())),
            Some(_) => Err(CacheError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    /// Store a plain value, replacing whatever the key held.
    pub fn set(&self, key: &str, value: String, ttl: Duration) {
        let mut entries = self.entries.lock();
        insert_bounded(
            &mut entries,
            self.capacity,
            key,
            StoredEntry::new(Slot::Value(value), ttl),
        );
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        let removed = entries.shift_remove(key).is_some();
        if removed {
            metrics::set_cache_entries(entries.len());
            tracing::debug!(key = %key, "cache entry removed (memory)");
        }
        removed
    }

    /// Remove every key matching a glob pattern. Returns the number removed.
    pub fn remove_matching(&self, pattern: &str) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        let removed = before - entries.len();
        metrics::set_cache_entries(entries.len());
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        live_entry(&mut self.entries.lock(), key).is_some()
    }

    /// Set one field of a hash. The whole hash expires `ttl` from now.
    pub fn hset(&self, key: &str, field: &str, value: String, ttl: Duration) -> CacheResult<()> {
        let mut entries = self.entries.lock();
        let expires_at = Instant::now() + ttl;

        match live_entry(&mut entries, key) {
            Some(entry) => match &mut entry.slot {
                Slot::Hash(fields) => {
                    fields.insert(field.to_string(), value);
                    entry.expires_at = expires_at;
                }
                Slot::Value(_) => return Err(CacheError::WrongType(key.to_string())),
            },
            None => {
                let fields = HashMap::from([(field.to_string(), value)]);
                insert_bounded(
                    &mut entries,
                    self.capacity,
                    key,
                    StoredEntry {
                        slot: Slot::Hash(fields),
                        expires_at,
                    },
                );
            }
        }
        Ok(())
    }

    pub fn hget(&self, key: &str, field: &str) -> CacheResult<Option<String>> {
        let mut entries = self.entries.lock();
        match live_entry(&mut entries, key) {
            Some(StoredEntry {
                slot: Slot::Hash(fields),
                ..
            }) => Ok(fields.get(field).cloned()),
            Some(_) => Err(CacheError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    /// Increment the integer at `key` (missing counts as 0) and reset its expiry.
    pub fn incr(&self, key: &str, ttl: Duration) -> CacheResult<i64> {
        let mut entries = self.entries.lock();
        let expires_at = Instant::now() + ttl;

        match live_entry(&mut entries, key) {
            Some(entry) => {
                let Slot::Value(raw) = &entry.slot else {
                    return Err(CacheError::WrongType(key.to_string()));
                };
                let current: i64 = raw
                    .parse()
                    .map_err(|_| CacheError::NotAnInteger(key.to_string()))?;
                let next = current
                    .checked_add(1)
                    .ok_or_else(|| CacheError::Overflow(key.to_string()))?;
                entry.slot = Slot::Value(next.to_string());
                entry.expires_at = expires_at;
                Ok(next)
            }
            None => {
                insert_bounded(
                    &mut entries,
                    self.capacity,
                    key,
                    StoredEntry {
                        slot: Slot::Value("1".to_string()),
                        expires_at,
                    },
                );
                Ok(1)
            }
        }
    }

    /// Remove all expired entries. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        metrics::record_expired(removed);
        metrics::set_cache_entries(entries.len());
        removed
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Rough memory footprint of keys, values and entry bookkeeping.
    pub fn approximate_bytes(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .map(|(key, entry)| {
                key.len() + entry.slot.approximate_bytes() + std::mem::size_of::<StoredEntry>()
            })
            .sum()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        metrics::set_cache_entries(0);
    }
}

/// Look up a key, dropping it first if it has expired.
fn live_entry<'a>(
    entries: &'a mut IndexMap<String, StoredEntry>,
    key: &str,
) -> Option<&'a mut StoredEntry> {
    let expired = entries.get(key)?.is_expired(Instant::now());
    if expired {
        entries.shift_remove(key);
        metrics::record_expired(1);
        metrics::set_cache_entries(entries.len());
        return None;
    }
    entries.get_mut(key)
}

fn insert_bounded(
    entries: &mut IndexMap<String, StoredEntry>,
    capacity: usize,
    key: &str,
    entry: StoredEntry,
) {
    if let Some(existing) = entries.get_mut(key) {
        *existing = entry;
        return;
    }

    entries.insert(key.to_string(), entry);
    if entries.len() > capacity {
        if let Some((evicted, _)) = entries.shift_remove_index(0) {
            metrics::record_eviction();
            tracing::debug!(key = %evicted, capacity, "evicted oldest cache entry");
        }
    }
    metrics::set_cache_entries(entries.len());
}

/// Start the periodic expiry sweep for `store`.
///
/// The task holds only a weak reference and exits once the store is dropped.
/// A zero interval is rejected.
pub fn spawn_sweeper(
    store: &Arc<FallbackStore>,
    interval: Duration,
) -> CacheResult<JoinHandle<()>> {
    if interval.is_zero() {
        return Err(CacheError::Config(
            "sweep interval must be greater than zero".to_string(),
        ));
    }
    let store = Arc::downgrade(store);
    Ok(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(store) = store.upgrade() else {
                tracing::debug!("fallback store dropped, stopping sweeper");
                break;
            };
            let removed = store.purge_expired();
            if removed > 0 {
                tracing::debug!(removed, remaining = store.len(), "swept expired cache entries");
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn get_after_set_returns_value() {
        let store = FallbackStore::new(10);
        store.set("k", "\"v\"".into(), Duration::from_secs(5));
        assert_eq!(store.get("k").unwrap().as_deref(), Some("\"v\""));
        assert!(store.get("missing").unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn passive_expiry_removes_entry() {
        let store = FallbackStore::new(10);
        store.set("k", "1".into(), Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(store.contains("k"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.get("k").unwrap().is_none());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_drops_earliest_inserted() {
        let store = FallbackStore::new(3);
        store.set("a", "1".into(), Duration::from_secs(60));
        store.set("b", "2".into(), Duration::from_secs(60));
        store.set("c", "3".into(), Duration::from_secs(60));

        // Overwrite keeps position and does not evict
        store.set("a", "10".into(), Duration::from_secs(60));
        assert_eq!(store.len(), 3);

        store.set("d", "4".into(), Duration::from_secs(60));
        assert_eq!(store.len(), 3);
        assert!(!store.contains("a"));
        assert!(store.contains("b"));
        assert!(store.contains("d"));
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_is_not_lru() {
        let store = FallbackStore::new(2);
        store.set("a", "1".into(), Duration::from_secs(60));
        store.set("b", "2".into(), Duration::from_secs(60));
        // Reading "a" does not protect it
        assert!(store.get("a").unwrap().is_some());
        store.set("c", "3".into(), Duration::from_secs(60));
        assert!(!store.contains("a"));
        assert!(store.contains("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn incr_counts_and_refreshes_ttl() {
        let store = FallbackStore::new(10);
        assert_eq!(store.incr("hits", Duration::from_secs(10)).unwrap(), 1);

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(store.incr("hits", Duration::from_secs(10)).unwrap(), 2);

        // Still alive 8s after the second increment
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(store.get("hits").unwrap().as_deref(), Some("2"));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(store.get("hits").unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn incr_rejects_non_integer() {
        let store = FallbackStore::new(10);
        store.set("name", "\"qimen\"".into(), Duration::from_secs(10));
        assert!(matches!(
            store.incr("name", Duration::from_secs(10)),
            Err(CacheError::NotAnInteger(_))
        ));

        store.set("max", i64::MAX.to_string(), Duration::from_secs(10));
        assert!(matches!(
            store.incr("max", Duration::from_secs(10)),
            Err(CacheError::Overflow(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn hash_fields_share_expiry() {
        let store = FallbackStore::new(10);
        store
            .hset("chart:1", "palace", "\"kan\"".into(), Duration::from_secs(5))
            .unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;
        store
            .hset("chart:1", "star", "\"tianpeng\"".into(), Duration::from_secs(5))
            .unwrap();

        assert_eq!(
            store.hget("chart:1", "palace").unwrap().as_deref(),
            Some("\"kan\"")
        );
        assert!(store.hget("chart:1", "door").unwrap().is_none());
        assert_eq!(store.len(), 1);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(store.hget("chart:1", "star").unwrap().is_none());
        assert!(!store.contains("chart:1"));
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_type_access_is_an_error() {
        let store = FallbackStore::new(10);
        store.set("plain", "1".into(), Duration::from_secs(10));
        store
            .hset("hash", "f", "1".into(), Duration::from_secs(10))
            .unwrap();

        assert!(matches!(
            store.hset("plain", "f", "1".into(), Duration::from_secs(10)),
            Err(CacheError::WrongType(_))
        ));
        assert!(matches!(store.get("hash"), Err(CacheError::WrongType(_))));
        assert!(matches!(
            store.hget("plain", "f"),
            Err(CacheError::WrongType(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn remove_matching_anchors_glob_at_both_ends() {
        let store = FallbackStore::new(10);
        for key in ["session:1", "session:2", "user:1", "user:session:3"] {
            store.set(key, "1".into(), Duration::from_secs(10));
        }

        // `session:*` is a prefix match, unlike a substring search
        assert_eq!(store.remove_matching("session:*"), 2);
        assert!(store.contains("user:1"));
        assert!(store.contains("user:session:3"));
        assert!(!store.contains("session:1"));

        // Leading `*` matches the key anywhere
        assert_eq!(store.remove_matching("*session:*"), 1);
        assert!(!store.contains("user:session:3"));
        assert!(store.contains("user:1"));
    }

    #[tokio::test(start_paused = true)]
    async fn incr_rejects_padded_integer() {
        let store = FallbackStore::new(10);
        store.set("padded", " 5".into(), Duration::from_secs(10));
        assert!(matches!(
            store.incr("padded", Duration::from_secs(10)),
            Err(CacheError::NotAnInteger(_))
        ));
        assert_eq!(store.get("padded").unwrap().as_deref(), Some(" 5"));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_capacity_still_keeps_latest_key() {
        let store = FallbackStore::new(0);
        assert_eq!(store.capacity(), 1);
        store.set("a", "1".into(), Duration::from_secs(10));
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_rejects_zero_interval() {
        let store = Arc::new(FallbackStore::new(10));
        assert!(matches!(
            spawn_sweeper(&store, Duration::ZERO),
            Err(CacheError::Config(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_incr_is_atomic() {
        let store = Arc::new(FallbackStore::new(10));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let mut seen = Vec::with_capacity(250);
                    for _ in 0..250 {
                        seen.push(store.incr("counter", Duration::from_secs(60)).unwrap());
                        tokio::task::yield_now().await;
                    }
                    seen
                })
            })
            .collect();

        let mut seen = Vec::new();
        for task in tasks {
            seen.extend(task.await.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=2000).collect::<Vec<i64>>());
        assert_eq!(store.get("counter").unwrap().as_deref(), Some("2000"));
    }

    fn gauge_reads(rendered: &str, expected: u64) -> bool {
        rendered
            .lines()
            .any(|line| line == format!("{} {expected}", metrics::names::CACHE_ENTRIES))
    }

    #[tokio::test(start_paused = true)]
    async fn entries_gauge_follows_removals() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let store = FallbackStore::new(10);

        ::metrics::with_local_recorder(&recorder, || {
            store.set("a", "1".into(), Duration::from_secs(60));
            store.set("b", "1".into(), Duration::from_secs(1));
            store.set("c", "1".into(), Duration::from_secs(60));
        });
        assert!(gauge_reads(&handle.render(), 3));

        ::metrics::with_local_recorder(&recorder, || assert!(store.remove("a")));
        assert!(gauge_reads(&handle.render(), 2));

        tokio::time::advance(Duration::from_secs(2)).await;
        ::metrics::with_local_recorder(&recorder, || assert!(store.get("b").unwrap().is_none()));
        assert!(gauge_reads(&handle.render(), 1));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_expired_keeps_live_entries() {
        let store = FallbackStore::new(10);
        store.set("short", "1".into(), Duration::from_secs(1));
        store.set("long", "1".into(), Duration::from_secs(100));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.contains("long"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_on_interval() {
        let store = Arc::new(FallbackStore::new(10));
        let handle = spawn_sweeper(&store, Duration::from_secs(60)).unwrap();
        store.set("k", "1".into(), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(30)).await;
        // Expired but not yet swept
        assert_eq!(store.len(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(store.len(), 0);

        drop(store);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn approximate_bytes_grows_with_entries() {
        let store = FallbackStore::new(10);
        assert_eq!(store.approximate_bytes(), 0);
        store.set("key", "value".into(), Duration::from_secs(10));
        assert!(store.approximate_bytes() >= "key".len() + "value".len());
    }
}
