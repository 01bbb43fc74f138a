//! Tool dispatch: resolve a model-issued call, run it, and render the result.
//!
//! `execute` always returns a JSON string for the conversation. Unknown tools,
//! bad arguments and tool failures are reported to the model as
//! `{"error": ...}` payloads so the loop can continue.

use chrono::Utc;
use resguard_core::error::ToolError;
use resguard_core::event::{DomainEvent, EventBus};
use resguard_core::message::MessageToolCall;
use resguard_core::provider::ToolDefinition;
use resguard_core::tool::{CallerContext, ToolRegistry};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    events: Arc<EventBus>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, events: Arc<EventBus>) -> Self {
        Self { registry, events }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Run one tool call and return its payload.
    pub async fn execute(&self, call: &MessageToolCall, ctx: &CallerContext) -> String {
        let Some(tool) = self.registry.lookup(&call.name) else {
            warn!(tool = %call.name, "Model requested an unknown tool");
            return json!({"error": format!("Unknown tool: {}", call.name)}).to_string();
        };

        let start = Instant::now();
        let result = match parse_arguments(&call.arguments) {
            Ok(mut arguments) => {
                ctx.apply_defaults(&mut arguments);
                tool.execute(arguments, ctx).await
            }
            Err(e) => Err(e),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let (payload, success) = match result {
            Ok(value) => (value, true),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                (json!({"error": e.to_string(), "tool": call.name}), false)
            }
        };

        info!(tool = %call.name, duration_ms, success, "Tool executed");
        self.events.publish(DomainEvent::ToolExecuted {
            tool_name: call.name.clone(),
            success,
            duration_ms,
            timestamp: Utc::now(),
        });

        payload.to_string()
    }
}

/// Blank arguments mean no arguments.
fn parse_arguments(raw: &str) -> Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}
