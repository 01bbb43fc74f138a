//! HTTP API gateway for ResolutionGuard.
//!
//! Exposes the agent, workout logging and history, and pattern detection
//! over REST, plus a health check that reports store pool occupancy and
//! latency against the response-time targets.
//!
//! Built on Axum. Every `/api` route is rate limited per client; the two
//! read endpoints are served from a short-lived response cache that a
//! workout log invalidates for its user.

pub mod performance;
pub mod rate_limit;
pub mod session;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Extension, Query};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, header};
use axum::{
    Router,
    extract::State,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

use resguard_agent::{AgentLoop, NO_RESPONSE};
use resguard_config::AppConfig;
use resguard_core::error::{Error, StoreError, ToolError};
use resguard_core::event::EventBus;
use resguard_core::tool::{CallerContext, ToolName};
use resguard_ratelimit::{Backends, ResponseCache, cache_key, owner_prefix};
use resguard_store::{ConversationStore, StorePool};

pub use performance::PerformanceMonitor;
pub use rate_limit::Limits;
pub use session::{RequestSession, Session, SessionManager};

const WORKOUT_CACHE: &str = "workout";
const PATTERN_CACHE: &str = "pattern";

/// Shared application state for the gateway.
pub struct GatewayState {
    pub agent: Arc<AgentLoop>,
    pub limits: Limits,
    pub cache: ResponseCache,
    pub sessions: SessionManager,
    pub performance: PerformanceMonitor,
    pub rate_limit_enabled: bool,
    pub cors_origin: String,
    /// One conversation per process; turns run one at a time
    run_lock: Mutex<()>,
    start_time: Instant,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(agent: AgentLoop, backends: &Backends, config: &AppConfig) -> Self {
        Self {
            agent: Arc::new(agent),
            limits: Limits::new(backends.counters.clone()),
            cache: ResponseCache::new(backends.cache.clone())
                .with_ttl(Duration::from_secs(config.cache.ttl_secs)),
            sessions: SessionManager::new(
                backends.cache.clone(),
                Duration::from_secs(config.cache.session_ttl_secs),
            ),
            performance: PerformanceMonitor::new(),
            rate_limit_enabled: config.rate_limit.enabled,
            cors_origin: config.gateway.cors_origin.clone(),
            run_lock: Mutex::new(()),
            start_time: Instant::now(),
        }
    }

    fn pool(&self) -> &Arc<StorePool> {
        self.agent.store().pool()
    }
}

/// Build the Axum router with all gateway routes.
///
/// Layers, outermost first: trace, CORS for the frontend origin, a 1 MB
/// body limit, per-client rate limits on `/api`, then sessions.
pub fn build_router(state: SharedState) -> Router {
    let origin = match HeaderValue::from_str(&state.cors_origin) {
        Ok(origin) => AllowOrigin::exact(origin),
        Err(_) => {
            warn!(origin = %state.cors_origin, "Invalid CORS origin, allowing none");
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(rate_limit::SESSION_HEADER),
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/agent", post(agent_handler))
        .route("/api/workout/log", post(workout_log_handler))
        .route("/api/workout/history", get(workout_history_handler))
        .route("/api/patterns", get(patterns_handler))
        .route("/api/performance", get(performance_handler))
        .fallback(not_found_handler)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session::session_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ))
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// Opens the store, picks counter and cache backends, and serves until
/// Ctrl-C. The pool is drained before returning.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let pool = StorePool::open(&config.store);
    let store = ConversationStore::new(pool.clone());
    if config.store.seed_demo_data {
        store.seed_demo_data().await?;
    }

    let router = resguard_providers::router::build_from_config(&config);
    let provider = router
        .default()
        .ok_or("No default provider configured, set an API key")?;

    let events = Arc::new(EventBus::default());
    let agent = AgentLoop::from_config(&config, provider, store, events);
    let backends = Backends::from_config(&config.rate_limit).await;
    let state = Arc::new(GatewayState::new(agent, &backends, &config));

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped, closing store");
    pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}

fn error_body(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "error": error, "message": message.into() })),
    )
        .into_response()
}

/// Run one registered tool outside the agent loop.
async fn run_tool(state: &GatewayState, name: ToolName, arguments: Value) -> Result<Value, ToolError> {
    let registry = state.agent.dispatcher().registry();
    let tool = registry
        .get(name)
        .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
    let ctx = CallerContext::new(format!("HTTP {name}"));
    tool.execute(arguments, &ctx).await
}

// --- Handlers ---

async fn health_handler(State(state): State<SharedState>) -> Response {
    let pool = state.pool();
    if pool.is_closed() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "error": StoreError::Closed.to_string(),
            })),
        )
            .into_response();
    }

    let status = pool.status();
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": state.start_time.elapsed().as_secs_f64(),
        "database": {
            "activeConnections": status.active,
            "waitingQueue": status.waiting,
            "maxConnections": status.max,
        },
        "performance": state.performance.check_targets(),
    }))
    .into_response()
}

#[derive(Deserialize)]
struct AgentRequest {
    #[serde(default)]
    message: Option<String>,
}

async fn agent_handler(
    State(state): State<SharedState>,
    Extension(RequestSession(session)): Extension<RequestSession>,
    payload: Result<Json<AgentRequest>, JsonRejection>,
) -> Response {
    let message = payload
        .ok()
        .and_then(|Json(body)| body.message)
        .filter(|m| !m.trim().is_empty());
    let Some(message) = message else {
        return error_body(
            StatusCode::BAD_REQUEST,
            "Message required",
            "Please provide a message",
        );
    };

    info!(message_len = message.len(), "Agent request received");
    let started = Instant::now();
    let result = {
        let _turn = state.run_lock.lock().await;
        let llm_started = Instant::now();
        let result = state.agent.run_turn(&message).await;
        state
            .performance
            .record(performance::LLM_CALL, llm_started.elapsed());
        result
    };
    let elapsed = started.elapsed();
    state
        .performance
        .record(performance::AGENT_RESPONSE, elapsed);

    match result {
        Ok(turn) => {
            let duration_ms = elapsed.as_millis() as u64;
            Json(json!({
                "success": true,
                "response": turn.reply().unwrap_or(NO_RESPONSE),
                "sessionId": session.map(|s| s.session_id),
                "performance": {
                    "duration": duration_ms,
                    "target": performance::AGENT_TARGET_MS,
                    "passing": (duration_ms as f64) < performance::AGENT_TARGET_MS,
                },
            }))
            .into_response()
        }
        Err(e) => {
            error!(error = %e, "Agent processing failed");
            let status = match &e {
                Error::Store(StoreError::ConnectionTimeout { .. } | StoreError::Closed) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_body(status, "Agent error", e.to_string())
        }
    }
}

async fn workout_log_handler(
    State(state): State<SharedState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let arguments = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            return error_body(
                StatusCode::BAD_REQUEST,
                "Invalid workout data",
                rejection.body_text(),
            );
        }
    };

    let user_id = arguments
        .get("user_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    match run_tool(&state, ToolName::LogWorkout, arguments).await {
        Ok(result) => {
            if result["success"] == true
                && let Some(user_id) = user_id
            {
                state
                    .cache
                    .invalidate(&owner_prefix(WORKOUT_CACHE, &user_id))
                    .await;
                state
                    .cache
                    .invalidate(&owner_prefix(PATTERN_CACHE, &user_id))
                    .await;
            }
            Json(result).into_response()
        }
        Err(ToolError::InvalidArguments(reason)) => {
            error_body(StatusCode::BAD_REQUEST, "Invalid workout data", reason)
        }
        Err(e) => {
            error!(error = %e, "Workout logging failed");
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Workout logging failed",
                e.to_string(),
            )
        }
    }
}

#[derive(Deserialize)]
struct HistoryQuery {
    user_id: Option<String>,
    days_back: Option<String>,
}

async fn workout_history_handler(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let Some(user_id) = query.user_id.filter(|u| !u.is_empty()) else {
        return missing_user_id();
    };
    let days_back: u32 = query
        .days_back
        .and_then(|d| d.trim().parse().ok())
        .unwrap_or(7);

    let days = days_back.to_string();
    let key = cache_key(WORKOUT_CACHE, &user_id, &[days.as_str()]);
    cached_tool(
        &state,
        &key,
        ToolName::GetWorkoutHistory,
        json!({ "user_id": user_id, "days_back": days_back }),
        "Failed to fetch workout history",
    )
    .await
}

#[derive(Deserialize)]
struct PatternsQuery {
    user_id: Option<String>,
}

async fn patterns_handler(
    State(state): State<SharedState>,
    Query(query): Query<PatternsQuery>,
) -> Response {
    let Some(user_id) = query.user_id.filter(|u| !u.is_empty()) else {
        return missing_user_id();
    };

    let key = cache_key(PATTERN_CACHE, &user_id, &[]);
    cached_tool(
        &state,
        &key,
        ToolName::DetectPatterns,
        json!({ "user_id": user_id }),
        "Pattern detection failed",
    )
    .await
}

fn missing_user_id() -> Response {
    error_body(
        StatusCode::BAD_REQUEST,
        "User ID required",
        "Please provide user_id parameter",
    )
}

/// Serve a tool result from the cache, or run the tool and cache success.
async fn cached_tool(
    state: &GatewayState,
    key: &str,
    tool: ToolName,
    arguments: Value,
    failure: &str,
) -> Response {
    if let Some(hit) = state.cache.get::<Value>(key).await {
        return with_cache_header(Json(hit).into_response(), "HIT");
    }

    let started = Instant::now();
    let result = run_tool(state, tool, arguments).await;
    if tool == ToolName::DetectPatterns {
        state
            .performance
            .record(performance::PATTERN_ANALYSIS, started.elapsed());
    }

    match result {
        Ok(result) => {
            state.cache.set(key, &result, None).await;
            with_cache_header(Json(result).into_response(), "MISS")
        }
        Err(e) => {
            error!(tool = %tool, error = %e, "{failure}");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, failure, e.to_string())
        }
    }
}

async fn performance_handler(State(state): State<SharedState>) -> Response {
    let targets = state.performance.check_targets();
    Json(json!({
        "stats": state.performance.all_stats(),
        "passing": targets.passing(),
        "targets": targets,
    }))
    .into_response()
}

fn with_cache_header(mut response: Response, value: &'static str) -> Response {
    response
        .headers_mut()
        .insert("x-cache", HeaderValue::from_static(value));
    response
}

async fn not_found_handler(method: Method, uri: axum::http::Uri) -> Response {
    error_body(
        StatusCode::NOT_FOUND,
        "Not found",
        format!("Route {method} {} not found", uri.path()),
    )
}
