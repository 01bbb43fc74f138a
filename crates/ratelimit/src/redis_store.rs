//! Redis-backed counters and cache, shared across processes.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::debug;

use crate::store::{CacheStore, CounterStore, WindowCount};
use crate::RateLimitError;

/// INCR, set the expiry on the first hit, and report the remaining TTL in one
/// round trip.
const INCREMENT_SCRIPT: &str = r"
local current = redis.call('incr', KEYS[1])
if current == 1 then
  redis.call('pexpire', KEYS[1], ARGV[1])
end
local ttl = redis.call('pttl', KEYS[1])
return {current, ttl}
";

pub struct RedisStore {
    conn: ConnectionManager,
    prefix: String,
    script: redis::Script,
}

impl RedisStore {
    /// Connect and verify the server answers PING.
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, RateLimitError> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!(url, "Redis store connected");
        Ok(Self {
            conn,
            prefix: prefix.into(),
            script: redis::Script::new(INCREMENT_SCRIPT),
        })
    }

    fn counter_key(&self, key: &str) -> String {
        format!("{}ratelimit:{key}", self.prefix)
    }

    fn cache_key(&self, key: &str) -> String {
        format!("{}cache:{key}", self.prefix)
    }
}

/// Escape glob metacharacters so `MATCH` treats the text literally.
fn escape_glob(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl CounterStore for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, RateLimitError> {
        let mut conn = self.conn.clone();
        let (count, ttl_ms): (i64, i64) = self
            .script
            .key(self.counter_key(key))
            .arg(window.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;
        Ok(WindowCount {
            count: count.max(0) as u64,
            // PTTL is negative when the key has no expiry
            ttl: if ttl_ms > 0 {
                Duration::from_millis(ttl_ms as u64)
            } else {
                window
            },
        })
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL")
            .arg(self.counter_key(key))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, RateLimitError> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("GET")
            .arg(self.cache_key(key))
            .query_async(&mut conn)
            .await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), RateLimitError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(self.cache_key(key))
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RateLimitError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL")
            .arg(self.cache_key(key))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, RateLimitError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", escape_glob(&self.cache_key(prefix)));
        let mut cursor: u64 = 0;
        let mut deleted = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            if !keys.is_empty() {
                let removed: u64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                deleted += removed;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        debug!(prefix, deleted, "Cache keys invalidated");
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> Result<bool, RateLimitError> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("EXISTS")
            .arg(self.cache_key(key))
            .query_async(&mut conn)
            .await?)
    }
}
