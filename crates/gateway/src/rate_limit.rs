//! Per-client rate limiting for `/api` routes.
//!
//! Every API request counts against the general limit. Agent turns and
//! workout logs also count against their own, tighter limits.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use resguard_ratelimit::{CounterStore, RateDecision, RateLimiter};

use crate::SharedState;

/// Clients that send this header are keyed by it instead of their address.
pub const SESSION_HEADER: &str = "x-session-id";

/// The three limiters the gateway applies.
pub struct Limits {
    pub api: RateLimiter,
    pub agent: RateLimiter,
    pub workout: RateLimiter,
}

impl Limits {
    pub fn new(counters: Arc<dyn CounterStore>) -> Self {
        Self {
            api: RateLimiter::api(counters.clone()),
            agent: RateLimiter::agent(counters.clone()),
            workout: RateLimiter::workout(counters),
        }
    }

    /// The limiters a request counts against, general limit first.
    fn for_request(&self, method: &Method, path: &str) -> Vec<&RateLimiter> {
        let mut limiters = vec![&self.api];
        if method == Method::POST {
            match path {
                "/api/agent" => limiters.push(&self.agent),
                "/api/workout/log" => limiters.push(&self.workout),
                _ => {}
            }
        }
        limiters
    }
}

/// Session header, then the first forwarded address, then "anonymous".
pub fn client_key(headers: &HeaderMap) -> String {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    if let Some(session) = header_str(SESSION_HEADER) {
        return format!("session:{session}");
    }
    if let Some(forwarded) = header_str("x-forwarded-for")
        && let Some(first) = forwarded.split(',').next().map(str::trim)
        && !first.is_empty()
    {
        return format!("ip:{first}");
    }
    "anonymous".to_string()
}

/// Rate limiting middleware. Requests outside `/api` pass untouched.
pub async fn rate_limit_middleware(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Response {
    if !state.rate_limit_enabled || !req.uri().path().starts_with("/api/") {
        return next.run(req).await;
    }

    let client = client_key(req.headers());
    let limiters = state.limits.for_request(req.method(), req.uri().path());

    let mut tightest: Option<RateDecision> = None;
    for limiter in limiters {
        let decision = limiter.check(&client).await;
        if !decision.allowed {
            warn!(
                client = %client.chars().take(40).collect::<String>(),
                path = %req.uri().path(),
                "Rate limit exceeded"
            );
            return too_many_requests(limiter.message(), &decision);
        }
        if tightest
            .as_ref()
            .is_none_or(|t| decision.remaining < t.remaining)
        {
            tightest = Some(decision);
        }
    }

    let mut response = next.run(req).await;
    if let Some(decision) = tightest {
        set_limit_headers(response.headers_mut(), &decision);
    }
    response
}

fn set_limit_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from(decision.reset_after.as_secs()),
    );
}

fn too_many_requests(message: &str, decision: &RateDecision) -> Response {
    let retry_after = decision.retry_after.unwrap_or(decision.reset_after).as_secs();
    let reset_at = chrono::Duration::from_std(decision.reset_after)
        .map(|d| (Utc::now() + d).to_rfc3339())
        .unwrap_or_else(|_| Utc::now().to_rfc3339());

    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "Rate limit exceeded",
            "message": message,
            "retryAfter": retry_after,
            "resetAt": reset_at,
        })),
    )
        .into_response();
    let headers = response.headers_mut();
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    set_limit_headers(headers, decision);
    response
}
