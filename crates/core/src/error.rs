//! Error types for the ResolutionGuard domain.
//!
//! Each bounded context has its own `thiserror` enum; the top-level
//! [`Error`] wraps them for callers that cross several contexts.

use thiserror::Error;

/// The top-level error type for agent operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures talking to a completion backend.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            Self::AuthenticationFailed(_) | Self::NotConfigured(_) => false,
        }
    }
}

/// Failures inside a domain tool. Always folded into a payload by the dispatcher.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures in the resource pool or the persisted document.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Database connection timeout after {waited_ms}ms")]
    ConnectionTimeout { waited_ms: u64 },

    #[error("Resource pool is closed")]
    Closed,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupt store document: {0}")]
    Corrupt(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid outcome {0}: must be success, skipped, or failed")]
    InvalidOutcome(String),

    #[error("Intervention {intervention_id} already closed as {outcome}")]
    AlreadyClosed {
        intervention_id: String,
        outcome: String,
    },
}
