//! Counter and cache storage traits, with an in-process implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::RateLimitError;

/// The state of one fixed window after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Requests seen in the current window, including this one
    pub count: u64,
    /// Time until the window resets
    pub ttl: Duration,
}

/// Atomic per-key counters with a fixed expiry.
#[async_trait]
pub trait CounterStore: Send + Sync {
    fn name(&self) -> &str;

    /// Increment `key`, starting a new window of `window` if none is open.
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, RateLimitError>;

    async fn reset(&self, key: &str) -> Result<(), RateLimitError>;
}

/// String values with a time to live.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<String>, RateLimitError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), RateLimitError>;

    async fn delete(&self, key: &str) -> Result<(), RateLimitError>;

    /// Delete every key starting with `prefix`. Returns how many went.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, RateLimitError>;

    async fn exists(&self, key: &str) -> Result<bool, RateLimitError> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Writes between sweeps of expired entries.
const SWEEP_INTERVAL: u64 = 128;

/// Values keyed by string, each with its own deadline.
struct Expiring<V> {
    map: HashMap<String, (V, Instant)>,
    writes: u64,
}

impl<V> Default for Expiring<V> {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            writes: 0,
        }
    }
}

impl<V> Expiring<V> {
    /// Count a write and drop every expired entry once per interval.
    fn note_write(&mut self, now: Instant) {
        self.writes += 1;
        if self.writes % SWEEP_INTERVAL == 0 {
            self.map.retain(|_, (_, expires)| *expires > now);
        }
    }
}

/// Single-process store. Expired entries are dropped on access and swept
/// periodically as writes arrive.
#[derive(Default)]
pub struct InMemoryStore {
    counters: Mutex<Expiring<u64>>,
    entries: Mutex<Expiring<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, RateLimitError> {
        let now = Instant::now();
        let mut counters = self.counters.lock().await;
        counters.note_write(now);
        let entry = counters
            .map
            .entry(key.to_string())
            .or_insert((0, now + window));
        if entry.1 <= now {
            *entry = (0, now + window);
        }
        entry.0 += 1;
        Ok(WindowCount {
            count: entry.0,
            ttl: entry.1 - now,
        })
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        self.counters.lock().await.map.remove(key);
        Ok(())
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, RateLimitError> {
        let mut entries = self.entries.lock().await;
        match entries.map.get(key) {
            Some((_, expires)) if *expires <= Instant::now() => {
                entries.map.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), RateLimitError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.note_write(now);
        entries
            .map
            .insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RateLimitError> {
        self.entries.lock().await.map.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, RateLimitError> {
        let mut entries = self.entries.lock().await;
        let before = entries.map.len();
        entries.map.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.map.len()) as u64)
    }
}
