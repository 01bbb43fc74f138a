//! log_decision: append the agent's reasoning to a JSON audit file.
//!
//! The file holds one JSON array. Appends are serialized through a mutex and
//! the whole array is rewritten each time.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use resguard_core::error::ToolError;
use resguard_core::tool::{CallerContext, Tool, ToolName};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::parse_input;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEntry {
    pub log_id: String,
    pub timestamp: String,
    pub event_name: String,
    pub metrics: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_chain: Option<String>,
}

pub struct LogDecisionTool {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LogDecisionTool {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every entry recorded so far. A missing or unreadable file reads as empty.
    pub async fn entries(&self) -> Vec<DecisionEntry> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Entries to append to. A file that does not parse is moved aside
    /// rather than overwritten.
    async fn load_for_append(&self) -> std::io::Result<Vec<DecisionEntry>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str(&raw) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                let aside = self.path.with_extension(format!(
                    "corrupt-{}.json",
                    Utc::now().format("%Y%m%dT%H%M%S%3f")
                ));
                warn!(
                    path = %self.path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "Decision log does not parse, moving it aside"
                );
                tokio::fs::rename(&self.path, &aside).await?;
                Ok(Vec::new())
            }
        }
    }

    async fn append(&self, entry: DecisionEntry) -> std::io::Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load_for_append().await?;
        entries.push(entry);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_string_pretty(&entries)?;
        tokio::fs::write(&self.path, body).await
    }
}

#[derive(Debug, Deserialize)]
struct LogDecisionInput {
    event_name: String,
    #[serde(default)]
    metrics: Option<Value>,
    reasoning_chain: Option<String>,
}

#[async_trait]
impl Tool for LogDecisionTool {
    fn name(&self) -> ToolName {
        ToolName::LogDecision
    }

    fn description(&self) -> &str {
        "Log agent decisions and metrics for evaluation and transparency. Use this to track intervention decisions, reasoning chains, and outcomes."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "event_name": {
                    "type": "string",
                    "description": "Name of the event being logged (e.g., \"drift_detected\", \"intervention_deployed\")"
                },
                "metrics": {
                    "type": "object",
                    "description": "Metrics and data associated with this event"
                },
                "reasoning_chain": {
                    "type": "string",
                    "description": "Optional: the agent's reasoning process for this decision"
                }
            },
            "required": ["event_name", "metrics"]
        })
    }

    async fn execute(&self, arguments: Value, _ctx: &CallerContext) -> Result<Value, ToolError> {
        let input: LogDecisionInput = parse_input(self.name(), arguments)?;
        let entry = DecisionEntry {
            log_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event_name: input.event_name,
            metrics: input
                .metrics
                .filter(|m| !m.is_null())
                .unwrap_or_else(|| json!({})),
            reasoning_chain: input.reasoning_chain,
        };
        let log_id = entry.log_id.clone();
        let timestamp = entry.timestamp.clone();
        let event_name = entry.event_name.clone();

        if let Err(e) = self.append(entry).await {
            warn!(path = %self.path.display(), error = %e, "Failed to write decision log");
            return Ok(json!({
                "success": false,
                "error": "Failed to write decision log",
                "log_id": log_id,
            }));
        }

        info!(event = %event_name, %log_id, "Decision logged");
        Ok(json!({
            "success": true,
            "log_id": log_id,
            "timestamp": timestamp,
            "message": format!("Event \"{event_name}\" logged successfully"),
        }))
    }
}
