//! record_outcome: close a pending intervention.

use async_trait::async_trait;
use resguard_core::error::{StoreError, ToolError};
use resguard_core::tool::{CallerContext, Tool, ToolName};
use resguard_core::InterventionOutcome;
use resguard_store::ConversationStore;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::parse_input;

pub struct RecordOutcomeTool {
    store: ConversationStore,
}

impl RecordOutcomeTool {
    pub fn new(store: ConversationStore) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct RecordOutcomeInput {
    intervention_id: String,
    outcome: String,
    effectiveness: Option<f64>,
    feedback: Option<String>,
}

fn terminal_outcome(raw: &str) -> Option<InterventionOutcome> {
    match raw {
        "success" => Some(InterventionOutcome::Success),
        "skipped" => Some(InterventionOutcome::Skipped),
        "failed" => Some(InterventionOutcome::Failed),
        _ => None,
    }
}

#[async_trait]
impl Tool for RecordOutcomeTool {
    fn name(&self) -> ToolName {
        ToolName::RecordOutcome
    }

    fn description(&self) -> &str {
        "Record how a deployed intervention turned out (success, skipped, or failed). Each intervention can be closed once; the result feeds future recommendations."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "intervention_id": {
                    "type": "string",
                    "description": "ID returned by book_intervention"
                },
                "outcome": {
                    "type": "string",
                    "enum": ["success", "skipped", "failed"],
                    "description": "What happened after the intervention"
                },
                "effectiveness": {
                    "type": "number",
                    "description": "Optional effectiveness score between 0 and 1"
                },
                "feedback": {
                    "type": "string",
                    "description": "Optional feedback from the user"
                }
            },
            "required": ["intervention_id", "outcome"]
        })
    }

    async fn execute(&self, arguments: Value, _ctx: &CallerContext) -> Result<Value, ToolError> {
        let input: RecordOutcomeInput = parse_input(self.name(), arguments)?;
        let Some(outcome) = terminal_outcome(&input.outcome) else {
            return Ok(json!({
                "success": false,
                "error": "Outcome must be success, skipped, or failed",
            }));
        };

        let closed = match self
            .store
            .update_intervention_outcome(
                &input.intervention_id,
                outcome,
                input.effectiveness,
                input.feedback,
            )
            .await
        {
            Ok(closed) => closed,
            Err(e @ (StoreError::AlreadyClosed { .. } | StoreError::NotFound(_))) => {
                return Ok(json!({"success": false, "error": e.to_string()}));
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            intervention_id = %closed.intervention_id,
            kind = %closed.kind,
            outcome = closed.outcome.as_str(),
            "Intervention outcome recorded"
        );
        Ok(json!({
            "success": true,
            "intervention_id": closed.intervention_id,
            "type": closed.kind.as_str(),
            "outcome": closed.outcome.as_str(),
            "effectiveness_score": closed.effectiveness_score,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resguard_core::{Intervention, InterventionType, UserProfile};
    use resguard_store::StorePool;

    async fn setup() -> (RecordOutcomeTool, ConversationStore, String) {
        let store = ConversationStore::new(StorePool::in_memory());
        store.save_profile(UserProfile::new("u1", "Gym 4x/week")).await.unwrap();
        let intervention = Intervention::pending("u1", InterventionType::Calendar, "test");
        let id = intervention.intervention_id.clone();
        store.log_intervention(intervention).await.unwrap();
        (RecordOutcomeTool::new(store.clone()), store, id)
    }

    #[tokio::test]
    async fn closes_once_and_updates_profile() {
        let (tool, store, id) = setup().await;
        let out = tool
            .execute(
                json!({"intervention_id": id, "outcome": "success", "effectiveness": 0.9}),
                &CallerContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(out["success"], true);
        assert_eq!(out["type"], "calendar");
        assert_eq!(out["effectiveness_score"], 0.9);

        let profile = store.profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.effectiveness_of(InterventionType::Calendar), Some(0.9));

        let again = tool
            .execute(
                json!({"intervention_id": id, "outcome": "failed"}),
                &CallerContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(again["success"], false);
        assert!(again["error"].as_str().unwrap().contains("already"));
    }

    #[tokio::test]
    async fn pending_is_not_a_valid_outcome() {
        let (tool, _, id) = setup().await;
        let out = tool
            .execute(
                json!({"intervention_id": id, "outcome": "pending"}),
                &CallerContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(out["error"], "Outcome must be success, skipped, or failed");
    }

    #[tokio::test]
    async fn unknown_intervention_fails_in_payload() {
        let (tool, _, _) = setup().await;
        let out = tool
            .execute(
                json!({"intervention_id": "nope", "outcome": "skipped"}),
                &CallerContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(out["success"], false);
    }
}
