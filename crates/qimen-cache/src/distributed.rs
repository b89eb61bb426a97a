//! Redis-backed store.
//!
//! Thin typed wrapper over a `deadpool_redis` pool. Values are stored as the
//! JSON text produced by the façade; TTLs are applied in milliseconds so
//! sub-second expiries behave the same as in the fallback store.

use deadpool_redis::{Connection, Pool};
use redis::AsyncCommands;
use std::time::Duration;

use crate::error::CacheResult;

/// Keys fetched per `SCAN` round trip during pattern deletes.
const SCAN_BATCH: usize = 500;

#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

/// Server-side figures reported by `DBSIZE` and `INFO memory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedisInfo {
    pub keys: usize,
    pub used_memory: Option<u64>,
}

impl RedisStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn conn(&self) -> CacheResult<Connection> {
        Ok(self.pool.get().await?)
    }

    /// Round-trip a `PING` on a pooled connection.
    pub async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.get(key).await?)
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        conn.pset_ex::<_, _, ()>(key, value, ttl_millis(ttl)).await?;
        Ok(())
    }

    pub async fn del(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn().await?;
        let removed: usize = conn.del(key).await?;
        Ok(removed > 0)
    }

    /// Delete every key matching `pattern`, scanning in batches.
    pub async fn del_matching(&self, pattern: &str) -> CacheResult<usize> {
        let mut conn = self.conn().await?;
        let mut cursor: u64 = 0;
        let mut removed = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: usize = conn.del(&keys).await?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }

    pub async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.exists(key).await?)
    }

    /// Set a hash field and reset the whole hash's expiry in one transaction.
    pub async fn hset(&self, key: &str, field: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        let _: () = redis::pipe()
            .atomic()
            .hset(key, field, value)
            .ignore()
            .pexpire(key, ttl_millis(ttl) as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn hget(&self, key: &str, field: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.hget(key, field).await?)
    }

    /// Increment and set the expiry in one transaction.
    pub async fn incr(&self, key: &str, ttl: Duration) -> CacheResult<i64> {
        let mut conn = self.conn().await?;
        let (value,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .pexpire(key, ttl_millis(ttl) as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    pub async fn info(&self) -> CacheResult<RedisInfo> {
        let mut conn = self.conn().await?;
        let keys: usize = redis::cmd("DBSIZE").query_async(&mut conn).await?;
        let memory: String = redis::cmd("INFO").arg("memory").query_async(&mut conn).await?;
        Ok(RedisInfo {
            keys,
            used_memory: parse_used_memory(&memory),
        })
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(i64::MAX as u64).min(i64::MAX as u64)
}

fn parse_used_memory(info: &str) -> Option<u64> {
    info.lines()
        .find_map(|line| line.strip_prefix("used_memory:"))
        .and_then(|v| v.trim().parse().ok())
}
