//! Tool trait and the tagged registry of tool identities.
//!
//! The set of tools is closed: every tool has a [`ToolName`] variant, and the
//! registry is keyed by that enum. The wire name (a plain string) is only
//! resolved at the protocol boundary via [`ToolName::from_str`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Every tool the agent can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    AnalyzeCalendar,
    DetectPatterns,
    BookIntervention,
    SendNudge,
    LogWorkout,
    GetWorkoutHistory,
    FetchCommitmentStatus,
    LogDecision,
    RecordOutcome,
}

impl ToolName {
    pub const ALL: [ToolName; 9] = [
        ToolName::AnalyzeCalendar,
        ToolName::DetectPatterns,
        ToolName::BookIntervention,
        ToolName::SendNudge,
        ToolName::LogWorkout,
        ToolName::GetWorkoutHistory,
        ToolName::FetchCommitmentStatus,
        ToolName::LogDecision,
        ToolName::RecordOutcome,
    ];

    /// The name the completion backend uses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnalyzeCalendar => "analyze_calendar",
            Self::DetectPatterns => "detect_patterns",
            Self::BookIntervention => "book_intervention",
            Self::SendNudge => "send_nudge",
            Self::LogWorkout => "log_workout",
            Self::GetWorkoutHistory => "get_workout_history",
            Self::FetchCommitmentStatus => "fetch_commitment_status",
            Self::LogDecision => "log_decision",
            Self::RecordOutcome => "record_outcome",
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| ToolError::NotFound(s.to_string()))
    }
}

/// Information about who is calling, passed to every tool.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    /// The user message that started the current run
    pub user_message: String,

    /// Filled into `user_id` when the model leaves it out
    pub default_user_id: Option<String>,
}

impl CallerContext {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            default_user_id: None,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.default_user_id = Some(user_id.into());
        self
    }

    /// Insert the default `user_id` into an argument object that lacks one.
    pub fn apply_defaults(&self, arguments: &mut serde_json::Value) {
        let (Some(user_id), Some(obj)) = (&self.default_user_id, arguments.as_object_mut()) else {
            return;
        };
        obj.entry("user_id")
            .or_insert_with(|| serde_json::Value::String(user_id.clone()));
    }
}

/// The core Tool trait.
///
/// Tools are stateless; anything they persist goes through the store handle
/// they were built with. The returned JSON value is what the model sees.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &CallerContext,
    ) -> std::result::Result<serde_json::Value, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().as_str().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools, keyed by identity.
pub struct ToolRegistry {
    tools: BTreeMap<ToolName, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn get(&self, name: ToolName) -> Option<&dyn Tool> {
        self.tools.get(&name).map(|t| t.as_ref())
    }

    /// Resolve a wire name to a registered tool.
    pub fn lookup(&self, wire_name: &str) -> Option<&dyn Tool> {
        wire_name.parse::<ToolName>().ok().and_then(|n| self.get(n))
    }

    /// Tool definitions in a stable order (for sending to the model).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    pub fn names(&self) -> Vec<ToolName> {
        self.tools.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> ToolName {
            ToolName::LogDecision
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
            _ctx: &CallerContext,
        ) -> std::result::Result<serde_json::Value, ToolError> {
            Ok(arguments)
        }
    }

    #[test]
    fn wire_names_round_trip() {
        for name in ToolName::ALL {
            assert_eq!(name.as_str().parse::<ToolName>().unwrap(), name);
        }
        assert!(matches!(
            "rm_rf".parse::<ToolName>(),
            Err(ToolError::NotFound(n)) if n == "rm_rf"
        ));
    }

    #[test]
    fn serde_name_matches_wire_name() {
        let json = serde_json::to_string(&ToolName::FetchCommitmentStatus).unwrap();
        assert_eq!(json, "\"fetch_commitment_status\"");
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.lookup("log_decision").is_some());
        assert!(registry.lookup("send_nudge").is_none());
        assert!(registry.lookup("nonexistent").is_none());
        assert_eq!(registry.definitions()[0].name, "log_decision");
    }

    #[test]
    fn default_user_id_is_filled_only_when_missing() {
        let ctx = CallerContext::new("hi").with_user_id("demo_user_001");

        let mut args = serde_json::json!({"days_back": 7});
        ctx.apply_defaults(&mut args);
        assert_eq!(args["user_id"], "demo_user_001");

        let mut explicit = serde_json::json!({"user_id": "someone_else"});
        ctx.apply_defaults(&mut explicit);
        assert_eq!(explicit["user_id"], "someone_else");
    }

    #[tokio::test]
    async fn registry_executes_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let tool = registry.get(ToolName::LogDecision).unwrap();
        let out = tool
            .execute(serde_json::json!({"text": "hello"}), &CallerContext::default())
            .await
            .unwrap();
        assert_eq!(out["text"], "hello");
    }
}
