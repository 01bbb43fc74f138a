//! # ResolutionGuard Core
//!
//! Domain types, traits, and error definitions for the ResolutionGuard agent.
//! Every other crate depends inward on this one.
//!
//! Subsystems that talk to the outside world (completion backends, delivery
//! channels, the commitment ledger, tools) are defined as traits here so they
//! can be swapped by configuration and stubbed in tests.

pub mod channel;
pub mod domain;
pub mod error;
pub mod event;
pub mod ledger;
pub mod message;
pub mod provider;
pub mod tool;

pub use channel::{DeliveryChannel, DeliveryReceipt, NudgeChannel, Urgency};
pub use domain::{
    EscalationAdvice, EscalationStage, FormQuality, Intervention, InterventionOutcome,
    InterventionPreferences, InterventionType, PastIntervention, PatternAnalysis, RiskLevel, Signal,
    UserProfile, WorkoutLog,
};
pub use error::{Error, ProviderError, Result, StoreError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use ledger::{CommitmentStatus, LedgerClient, Milestone};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{CallerContext, Tool, ToolName, ToolRegistry};
