//! Configuration loading, validation, and management for ResolutionGuard.
//!
//! Loads configuration from `~/.resguard/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.resguard/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Completion backend: "openai" (or any OpenAI-compatible name) or "gemini"
    #[serde(default = "default_provider")]
    pub default_provider: String,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    #[serde(default)]
    pub agent: AgentSettings,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub decision_log: DecisionLogConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    2000
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("store", &self.store)
            .field("rate_limit", &self.rate_limit)
            .field("cache", &self.cache)
            .field("decision_log", &self.decision_log)
            .field("gateway", &self.gateway)
            .field("providers", &self.providers)
            .finish()
    }
}

/// Per-provider overrides.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Completion rounds per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Deadline for one completion call
    #[serde(default = "default_completion_timeout_secs")]
    pub completion_timeout_secs: u64,

    /// Extra attempts on transient backend failures. 0 disables retry.
    #[serde(default)]
    pub max_retries: u32,

    /// Filled into tool arguments that omit `user_id`
    #[serde(default = "default_user_id")]
    pub default_user_id: String,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_completion_timeout_secs() -> u64 {
    60
}
fn default_user_id() -> String {
    "demo_user_001".into()
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            completion_timeout_secs: default_completion_timeout_secs(),
            max_retries: 0,
            default_user_id: default_user_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// The JSON document holding all collections
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Seed the demo profile on startup
    #[serde(default = "default_true")]
    pub seed_demo_data: bool,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./db.json")
}
fn default_max_connections() -> usize {
    10
}
fn default_acquire_timeout_ms() -> u64 {
    5000
}
fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            max_connections: default_max_connections(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            seed_demo_data: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Shared counter store; in-process counters when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_key_prefix() -> String {
    "resolution:".into()
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: default_key_prefix(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// Idle lifetime of a gateway session
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    300
}
fn default_session_ttl_secs() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLogConfig {
    #[serde(default = "default_decision_log_path")]
    pub path: PathBuf,
}

fn default_decision_log_path() -> PathBuf {
    PathBuf::from("./logs/decisions.json")
}

impl Default for DecisionLogConfig {
    fn default() -> Self {
        Self {
            path: default_decision_log_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// The one browser origin allowed by CORS
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

fn default_port() -> u16 {
    3001
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_cors_origin() -> String {
    "http://localhost:3000".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            cors_origin: default_cors_origin(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, then apply env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Environment variables take priority over the file.
    fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(provider) = env("RESGUARD_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = env("RESGUARD_MODEL") {
            self.default_model = model;
        }
        if self.api_key.is_none() {
            let provider_key = if self.default_provider == "gemini" {
                env("GEMINI_API_KEY")
            } else {
                env("OPENAI_API_KEY")
            };
            self.api_key = env("RESGUARD_API_KEY").or(provider_key);
        }
        if let Some(path) = env("RESGUARD_DB_PATH") {
            self.store.path = PathBuf::from(path);
        }
        if let Some(url) = env("REDIS_URL") {
            self.rate_limit.redis_url = Some(url);
        }
        if let Some(path) = env("RESGUARD_DECISION_LOG") {
            self.decision_log.path = PathBuf::from(path);
        }
        if let Some(port) = env("PORT").and_then(|p| p.parse().ok()) {
            self.gateway.port = port;
        }
        if let Some(origin) = env("FRONTEND_URL") {
            self.gateway.cors_origin = origin;
        }
        if let Some(ttl) = env("CACHE_TTL").and_then(|t| t.parse().ok()) {
            self.cache.ttl_secs = ttl;
        }
        if let Some(ttl) = env("SESSION_TTL").and_then(|t| t.parse().ok()) {
            self.cache.session_ttl_secs = ttl;
        }
    }

    /// `~/.resguard`
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".resguard")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }
        if self.store.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "store.max_connections must be at least 1".into(),
            ));
        }
        if self.agent.completion_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.completion_timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The API key for a provider, falling back to the global one.
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// The model to request from the default provider.
    pub fn active_model(&self) -> String {
        self.providers
            .get(&self.default_provider)
            .and_then(|p| p.default_model.clone())
            .unwrap_or_else(|| self.default_model.clone())
    }

    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentSettings::default(),
            store: StoreConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            decision_log: DecisionLogConfig::default(),
            gateway: GatewayConfig::default(),
            providers: HashMap::new(),
        }
    }
}

fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
