//! Rate limiting and response caching.
//!
//! Both sit on small storage traits so one process can run against memory
//! and a deployment can share Redis. Counters use a fixed window.

pub mod cache;
pub mod limiter;
pub mod redis_store;
pub mod store;

use resguard_config::RateLimitConfig;
use std::sync::Arc;
use tracing::{info, warn};

pub use cache::{ResponseCache, cache_key, owner_prefix};
pub use limiter::{RateDecision, RateLimiter};
pub use redis_store::RedisStore;
pub use store::{CacheStore, CounterStore, InMemoryStore, WindowCount};

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Counter and cache stores picked from configuration.
#[derive(Clone)]
pub struct Backends {
    pub counters: Arc<dyn CounterStore>,
    pub cache: Arc<dyn CacheStore>,
}

impl Backends {
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            counters: store.clone(),
            cache: store,
        }
    }

    /// Redis when a URL is configured and reachable, memory otherwise.
    pub async fn from_config(config: &RateLimitConfig) -> Self {
        let Some(url) = config.redis_url.as_deref().filter(|u| !u.is_empty()) else {
            return Self::in_memory();
        };
        match RedisStore::connect(url, config.key_prefix.clone()).await {
            Ok(store) => {
                info!("Using Redis for rate limits and cache");
                let store = Arc::new(store);
                Self {
                    counters: store.clone(),
                    cache: store,
                }
            }
            Err(e) => {
                warn!(error = %e, "Redis unavailable, using in-memory rate limits and cache");
                Self::in_memory()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_url_means_memory() {
        let backends = Backends::from_config(&RateLimitConfig::default()).await;
        assert_eq!(backends.counters.name(), "memory");
        assert_eq!(backends.cache.name(), "memory");
    }

    #[tokio::test]
    async fn unreachable_redis_falls_back() {
        let config = RateLimitConfig {
            redis_url: Some("redis://127.0.0.1:1".into()),
            ..RateLimitConfig::default()
        };
        let backends = Backends::from_config(&config).await;
        assert_eq!(backends.counters.name(), "memory");
    }
}
