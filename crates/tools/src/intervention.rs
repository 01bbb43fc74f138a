//! book_intervention: deploy an intervention and record it as pending.

use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use resguard_core::error::ToolError;
use resguard_core::event::{DomainEvent, EventBus};
use resguard_core::tool::{CallerContext, Tool, ToolName};
use resguard_core::{Intervention, InterventionType};
use resguard_store::ConversationStore;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

use crate::parse_input;

pub const TRIGGERED_BY: &str = "pattern_detection";

pub struct BookInterventionTool {
    store: ConversationStore,
    events: Arc<EventBus>,
}

impl BookInterventionTool {
    pub fn new(store: ConversationStore, events: Arc<EventBus>) -> Self {
        Self { store, events }
    }
}

#[derive(Debug, Deserialize)]
struct BookInterventionInput {
    user_id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    details: Value,
}

fn detail_str<'a>(details: &'a Value, key: &str) -> Option<&'a str> {
    details.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn detail_or(details: &Value, key: &str, default: Value) -> Value {
    match details.get(key) {
        None | Some(Value::Null) => default,
        Some(v) => v.clone(),
    }
}

/// Render a detail for prose: strings bare, everything else as JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truthy(details: &Value, key: &str) -> bool {
    match details.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Null) | None => false,
        Some(_) => true,
    }
}

/// `(details, message)` for a known kind.
fn payload_for(kind: InterventionType, details: &Value, raw_kind: &str) -> (Value, String) {
    match kind {
        InterventionType::Calendar => {
            let tomorrow = (Utc::now() + Duration::days(1)).date_naive().to_string();
            let time = detail_str(details, "time").unwrap_or("6:00 AM");
            (
                json!({
                    "event_title": detail_str(details, "event_title").unwrap_or("Gym Workout"),
                    "time": time,
                    "date": detail_str(details, "date").map(String::from).unwrap_or(tomorrow),
                    "uber_booking": truthy(details, "book_uber").then_some("Uber booked for 5:45 AM"),
                }),
                format!(
                    "Calendar intervention deployed: {} scheduled for {time}",
                    detail_str(details, "event_title").unwrap_or("Workout")
                ),
            )
        }
        InterventionType::Message => (
            json!({
                "message_content": detail_str(details, "message_content")
                    .unwrap_or("Time to get back on track! Your goals are waiting."),
                "delivery_channel": detail_str(details, "channel").unwrap_or("push"),
            }),
            "Message intervention deployed".into(),
        ),
        InterventionType::Financial => {
            let stake = detail_or(details, "stake_amount", json!(100));
            (
                json!({
                    "stake_amount": stake,
                    "at_risk_amount": detail_or(details, "at_risk_amount", json!(20)),
                    "message": format!(
                        "Your ${} commitment is at risk. Complete today's workout to stay on track.",
                        display_value(&stake)
                    ),
                }),
                "Financial accountability intervention deployed".into(),
            )
        }
        InterventionType::Social => (
            json!({
                "accountability_buddy": detail_str(details, "buddy_name")
                    .unwrap_or("accountability buddy"),
                "message": detail_str(details, "message")
                    .unwrap_or("Your accountability buddy has been notified. They're counting on you!"),
                "notification_sent": true,
            }),
            "Social accountability intervention deployed".into(),
        ),
        InterventionType::Unknown => (
            json!({}),
            format!("Unknown intervention type: {raw_kind}"),
        ),
    }
}

#[async_trait]
impl Tool for BookInterventionTool {
    fn name(&self) -> ToolName {
        ToolName::BookIntervention
    }

    fn description(&self) -> &str {
        "Deploy an intervention to prevent resolution failure. Can book calendar events, send reminders, notify an accountability buddy, or trigger financial nudges. Every call records a new pending intervention."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user_id": {
                    "type": "string",
                    "description": "User ID to deploy intervention for"
                },
                "type": {
                    "type": "string",
                    "enum": ["calendar", "message", "financial", "social"],
                    "description": "Type of intervention to deploy"
                },
                "details": {
                    "type": "object",
                    "description": "Intervention-specific details (e.g., time for calendar booking, message content, stake amount)"
                }
            },
            "required": ["user_id", "type", "details"]
        })
    }

    async fn execute(&self, arguments: Value, _ctx: &CallerContext) -> Result<Value, ToolError> {
        let input: BookInterventionInput = parse_input(self.name(), arguments)?;
        let kind: InterventionType = input.kind.parse().unwrap_or(InterventionType::Unknown);

        let intervention = Intervention::pending(&input.user_id, kind, TRIGGERED_BY);
        let intervention_id = intervention.intervention_id.clone();
        let deployed_at = intervention.deployed_at;
        self.store.log_intervention(intervention).await?;

        info!(%intervention_id, user_id = %input.user_id, %kind, "Intervention booked");
        self.events.publish(DomainEvent::InterventionBooked {
            intervention_id: intervention_id.clone(),
            user_id: input.user_id.clone(),
            kind: kind.to_string(),
            timestamp: deployed_at,
        });

        let (details, message) = payload_for(kind, &input.details, &input.kind);
        Ok(json!({
            "success": kind != InterventionType::Unknown,
            "intervention_id": intervention_id,
            "type": kind.as_str(),
            "deployed_at": deployed_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            "details": details,
            "message": message,
        }))
    }
}
