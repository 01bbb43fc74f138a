//! Fixed-window rate limiter over a [`CounterStore`].

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::store::CounterStore;

/// The verdict for one request, with what the response headers need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Time until the window resets
    pub reset_after: Duration,
    /// Set when the request is refused; whole seconds, rounded up
    pub retry_after: Option<Duration>,
}

pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    /// Namespaces keys so limiters sharing a store do not share counters
    scope: String,
    max_requests: u64,
    window: Duration,
    message: String,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn CounterStore>,
        scope: impl Into<String>,
        max_requests: u64,
        window: Duration,
    ) -> Self {
        Self {
            store,
            scope: scope.into(),
            max_requests,
            window,
            message: "Too many requests, please try again later.".into(),
        }
    }

    /// 100 requests per 15 minutes.
    pub fn api(store: Arc<dyn CounterStore>) -> Self {
        Self::new(store, "api", 100, Duration::from_secs(15 * 60))
            .with_message("Too many API requests. Please try again in 15 minutes.")
    }

    /// 20 requests per minute. Each one costs a model call.
    pub fn agent(store: Arc<dyn CounterStore>) -> Self {
        Self::new(store, "agent", 20, Duration::from_secs(60))
            .with_message("Too many agent requests. Please try again in a minute.")
    }

    /// 50 requests per hour.
    pub fn workout(store: Arc<dyn CounterStore>) -> Self {
        Self::new(store, "workout", 50, Duration::from_secs(60 * 60))
            .with_message("Too many workout logs. Please try again later.")
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}:{key}", self.scope)
    }

    /// Count a request against `key`. Store failures allow the request.
    pub async fn check(&self, key: &str) -> RateDecision {
        let window = match self.store.increment(&self.scoped(key), self.window).await {
            Ok(window) => window,
            Err(e) => {
                warn!(
                    store = self.store.name(),
                    scope = %self.scope,
                    error = %e,
                    "Rate limit store unavailable, allowing request"
                );
                return RateDecision {
                    allowed: true,
                    limit: self.max_requests,
                    remaining: self.max_requests,
                    reset_after: self.window,
                    retry_after: None,
                };
            }
        };

        let allowed = window.count <= self.max_requests;
        RateDecision {
            allowed,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(window.count),
            reset_after: window.ttl,
            retry_after: (!allowed).then(|| Duration::from_secs(window.ttl.as_millis().div_ceil(1000) as u64)),
        }
    }

    /// Forget the counter for `key`.
    pub async fn reset(&self, key: &str) {
        if let Err(e) = self.store.reset(&self.scoped(key)).await {
            warn!(scope = %self.scope, error = %e, "Failed to reset rate limit");
        }
    }
}
