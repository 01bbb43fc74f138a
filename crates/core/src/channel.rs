//! Delivery channel trait: the abstraction over SMS, push, and email senders.
//!
//! Real providers live outside this workspace; a channel implementation
//! reports failure in its receipt instead of returning an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Where a nudge is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NudgeChannel {
    Sms,
    Push,
    Email,
}

impl NudgeChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Push => "push",
            Self::Email => "email",
        }
    }
}

impl std::fmt::Display for NudgeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NudgeChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sms" => Ok(Self::Sms),
            "push" => Ok(Self::Push),
            "email" => Ok(Self::Email),
            other => Err(format!("Unsupported channel: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryReceipt {
    pub fn delivered(provider_message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            provider_message_id: Some(provider_message_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            provider_message_id: None,
            error: Some(error.into()),
        }
    }
}

/// A sender for one kind of channel.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    fn kind(&self) -> NudgeChannel;

    /// Deliver a message. Must not panic; failures go in the receipt.
    async fn send(&self, user_id: &str, message: &str, urgency: Urgency) -> DeliveryReceipt;
}
