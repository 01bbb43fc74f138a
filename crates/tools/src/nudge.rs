//! send_nudge and the channel routing behind it.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use resguard_core::channel::{DeliveryChannel, DeliveryReceipt, NudgeChannel, Urgency};
use resguard_core::error::ToolError;
use resguard_core::event::{DomainEvent, EventBus};
use resguard_core::tool::{CallerContext, Tool, ToolName};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::parse_input;

const PREVIEW_CHARS: usize = 50;

/// Routes a nudge to the sender registered for its channel.
#[derive(Clone, Default)]
pub struct DeliveryRouter {
    channels: HashMap<NudgeChannel, Arc<dyn DeliveryChannel>>,
}

impl DeliveryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, channel: Arc<dyn DeliveryChannel>) {
        self.channels.insert(channel.kind(), channel);
    }

    /// A router with a [`LoggingChannel`] behind every channel kind.
    pub fn with_logging_channels() -> Self {
        let mut router = Self::new();
        for kind in [NudgeChannel::Sms, NudgeChannel::Push, NudgeChannel::Email] {
            router.register(Arc::new(LoggingChannel::new(kind)));
        }
        router
    }

    pub fn get(&self, kind: NudgeChannel) -> Option<Arc<dyn DeliveryChannel>> {
        self.channels.get(&kind).cloned()
    }
}

/// A channel that only logs. Stands in for real SMS/push/email gateways.
pub struct LoggingChannel {
    kind: NudgeChannel,
}

impl LoggingChannel {
    pub fn new(kind: NudgeChannel) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl DeliveryChannel for LoggingChannel {
    fn kind(&self) -> NudgeChannel {
        self.kind
    }

    async fn send(&self, user_id: &str, message: &str, urgency: Urgency) -> DeliveryReceipt {
        info!(
            channel = %self.kind,
            user_id,
            urgency = urgency.as_str(),
            "Nudge: {message}"
        );
        DeliveryReceipt::delivered(format!("{}_{}", self.kind, uuid::Uuid::new_v4().simple()))
    }
}

fn preview(message: &str) -> String {
    if message.chars().count() > PREVIEW_CHARS {
        let head: String = message.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        message.to_string()
    }
}

pub struct SendNudgeTool {
    delivery: DeliveryRouter,
    events: Arc<EventBus>,
}

impl SendNudgeTool {
    pub fn new(delivery: DeliveryRouter, events: Arc<EventBus>) -> Self {
        Self { delivery, events }
    }

    async fn deliver(&self, input: &SendNudgeInput) -> DeliveryReceipt {
        let kind = match input.channel.parse::<NudgeChannel>() {
            Ok(kind) => kind,
            Err(e) => return DeliveryReceipt::failed(e),
        };
        match self.delivery.get(kind) {
            Some(channel) => channel.send(&input.user_id, &input.message, input.urgency).await,
            None => DeliveryReceipt::failed(format!("No sender configured for channel: {kind}")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendNudgeInput {
    user_id: String,
    message: String,
    channel: String,
    #[serde(default)]
    urgency: Urgency,
}

#[async_trait]
impl Tool for SendNudgeTool {
    fn name(&self) -> ToolName {
        ToolName::SendNudge
    }

    fn description(&self) -> &str {
        "Send an immediate nudge message to the user via SMS, push notification, or email"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user_id": {
                    "type": "string",
                    "description": "User ID to send nudge to"
                },
                "message": {
                    "type": "string",
                    "description": "The nudge message content"
                },
                "channel": {
                    "type": "string",
                    "enum": ["sms", "push", "email"],
                    "description": "Delivery channel for the nudge"
                },
                "urgency": {
                    "type": "string",
                    "enum": ["low", "medium", "high"],
                    "description": "Urgency level of the message"
                }
            },
            "required": ["user_id", "message", "channel"]
        })
    }

    async fn execute(&self, arguments: Value, _ctx: &CallerContext) -> Result<Value, ToolError> {
        let input: SendNudgeInput = parse_input(self.name(), arguments)?;
        let receipt = self.deliver(&input).await;
        let sent_at = Utc::now();

        if !receipt.success {
            warn!(
                channel = %input.channel,
                user_id = %input.user_id,
                error = receipt.error.as_deref().unwrap_or_default(),
                "Nudge delivery failed"
            );
        }
        self.events.publish(DomainEvent::NudgeSent {
            user_id: input.user_id.clone(),
            channel: input.channel.clone(),
            delivered: receipt.success,
            timestamp: sent_at,
        });

        let mut out = json!({
            "success": receipt.success,
            "message_id": receipt.provider_message_id,
            "channel": input.channel,
            "delivery_status": if receipt.success { "sent" } else { "failed" },
            "sent_at": sent_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            "message_preview": preview(&input.message),
        });
        if let Some(error) = receipt.error {
            out["error"] = Value::String(error);
        }
        Ok(out)
    }
}
