//! Gateway sessions kept in the shared cache store.
//!
//! A client echoes the `x-session-id` header it was given. Agent turns create
//! a session when none is presented; workout logs only resume one.

use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use resguard_ratelimit::{CacheStore, RateLimitError};

use crate::SharedState;
use crate::rate_limit::SESSION_HEADER;

/// One client session. Timestamps are Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub created_at: i64,
    pub last_activity: i64,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Session {
    fn new() -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            created_at: now,
            last_activity: now,
            data: Map::new(),
        }
    }
}

/// The session attached to a request, if any.
#[derive(Debug, Clone, Default)]
pub struct RequestSession(pub Option<Session>);

/// Reads and writes sessions with a sliding TTL.
pub struct SessionManager {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(session_id: &str) -> String {
        format!("session:{session_id}")
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<Session>, RateLimitError> {
        let Some(raw) = self.store.get(&Self::key(session_id)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(session_id, error = %e, "Discarding unreadable session");
                Ok(None)
            }
        }
    }

    /// Write the session and restart its TTL.
    pub async fn save(&self, session: &Session) -> Result<(), RateLimitError> {
        let raw = serde_json::to_string(session)
            .map_err(|e| RateLimitError::Unavailable(format!("Session not serializable: {e}")))?;
        self.store
            .set(&Self::key(&session.session_id), &raw, self.ttl)
            .await
    }

    pub async fn delete(&self, session_id: &str) -> Result<(), RateLimitError> {
        self.store.delete(&Self::key(session_id)).await
    }

    /// Resume the presented session, refreshing its activity time, or create
    /// a new one when `create` is set.
    pub async fn resume(
        &self,
        presented: Option<&str>,
        create: bool,
    ) -> Result<Option<Session>, RateLimitError> {
        if let Some(id) = presented
            && let Some(mut session) = self.get(id).await?
        {
            session.last_activity = Utc::now().timestamp_millis();
            self.save(&session).await?;
            return Ok(Some(session));
        }
        if !create {
            return Ok(None);
        }
        let session = Session::new();
        self.save(&session).await?;
        debug!(session_id = %session.session_id, "Session created");
        Ok(Some(session))
    }
}

/// How a route treats sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionMode {
    Create,
    Resume,
    Ignore,
}

fn mode_for(method: &Method, path: &str) -> SessionMode {
    if method != Method::POST {
        return SessionMode::Ignore;
    }
    match path {
        "/api/agent" => SessionMode::Create,
        "/api/workout/log" => SessionMode::Resume,
        _ => SessionMode::Ignore,
    }
}

/// Attach a [`RequestSession`] to every request and echo its id.
///
/// A failing store never fails the request; it only goes without a session.
pub async fn session_middleware(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Response {
    let mode = mode_for(req.method(), req.uri().path());
    let session = if mode == SessionMode::Ignore {
        None
    } else {
        let presented = req
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        match state.sessions.resume(presented, mode == SessionMode::Create).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Session store unavailable");
                None
            }
        }
    };

    let session_id = session.as_ref().map(|s| s.session_id.clone());
    req.extensions_mut().insert(RequestSession(session));
    let mut response = next.run(req).await;
    if let Some(id) = session_id
        && let Ok(value) = HeaderValue::from_str(&id)
    {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}
