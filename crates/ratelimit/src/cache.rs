//! JSON response cache over a [`CacheStore`].
//!
//! Cache failures never fail the caller: a broken store reads as a miss and
//! writes are dropped with a warning.

use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::store::CacheStore;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// `<namespace>:<owner>:<digest>`, where the digest is the first 16 hex
/// chars of SHA-256 over the `:`-joined params. Everything cached for one
/// owner shares the [`owner_prefix`].
pub fn cache_key(namespace: &str, owner: &str, params: &[&str]) -> String {
    let digest = Sha256::digest(params.join(":").as_bytes());
    let hex = format!("{digest:x}");
    format!("{}{}", owner_prefix(namespace, owner), &hex[..16])
}

pub fn owner_prefix(namespace: &str, owner: &str) -> String {
    format!("{namespace}:{owner}:")
}

#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    default_ttl: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            default_ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "Discarding unreadable cache entry");
                None
            }
        }
    }

    /// Store `value` for `ttl`, or the default TTL when `None`.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Value not cacheable");
                return;
            }
        };
        if let Err(e) = self
            .store
            .set(key, &raw, ttl.unwrap_or(self.default_ttl))
            .await
        {
            warn!(key, error = %e, "Cache write failed");
        }
    }

    pub async fn delete(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!(key, error = %e, "Cache delete failed");
        }
    }

    /// Drop every entry under `prefix`. Failures are logged, not returned.
    pub async fn invalidate(&self, prefix: &str) {
        match self.store.delete_prefix(prefix).await {
            Ok(removed) => debug!(prefix, removed, "Cache invalidated"),
            Err(e) => warn!(prefix, error = %e, "Cache invalidation failed"),
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.store.exists(key).await.unwrap_or(false)
    }

    /// Return the cached value or compute, store and return it. Errors from
    /// `compute` are returned and not cached.
    pub async fn get_or_set<T, E, F, Fut>(&self, key: &str, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }
        let value = compute().await?;
        self.set(key, &value, None).await;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> ResponseCache {
        ResponseCache::new(Arc::new(InMemoryStore::new()))
    }

    #[test]
    fn keys_are_scoped_and_stable() {
        let a = cache_key("workout", "demo_user_001", &["7"]);
        let prefix = owner_prefix("workout", "demo_user_001");
        assert!(a.starts_with(&prefix));
        let digest = &a[prefix.len()..];
        assert_eq!(digest.len(), 16);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, cache_key("workout", "demo_user_001", &["7"]));
        assert_ne!(a, cache_key("workout", "demo_user_001", &["14"]));
    }

    #[tokio::test]
    async fn invalidate_drops_one_owner() {
        let cache = cache();
        let mine = cache_key("workout", "u1", &["7"]);
        let theirs = cache_key("workout", "u2", &["7"]);
        cache.set(&mine, &json!(1), None).await;
        cache.set(&theirs, &json!(2), None).await;

        cache.invalidate(&owner_prefix("workout", "u1")).await;
        assert!(!cache.exists(&mine).await);
        assert!(cache.exists(&theirs).await);
    }

    #[tokio::test]
    async fn get_or_set_computes_once() {
        let cache = cache();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let v: Result<Value, String> = cache
                .get_or_set("k", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"rate": 75}))
                })
                .await;
            assert_eq!(v.unwrap()["rate"], 75);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache = cache();
        let first: Result<Value, &str> = cache.get_or_set("k", || async { Err("boom") }).await;
        assert!(first.is_err());
        assert!(!cache.exists("k").await);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = cache().with_ttl(Duration::from_secs(10));
        cache.set("k", &json!(1), None).await;
        assert_eq!(cache.get::<Value>("k").await, Some(json!(1)));
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get::<Value>("k").await, None);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = cache();
        cache.set("k", &"v", Some(Duration::from_secs(60))).await;
        cache.delete("k").await;
        assert!(cache.get::<String>("k").await.is_none());
    }
}
