//! Domain tools for ResolutionGuard.
//!
//! Tools let the agent read the user's schedule and workout record, assess
//! drift, deploy interventions, and write an audit trail. Every tool is keyed
//! by a [`ToolName`] and takes a typed input parsed from the model's JSON.

pub mod calendar;
pub mod decision_log;
pub mod dispatcher;
pub mod escalation;
pub mod intervention;
pub mod ledger;
pub mod nudge;
pub mod outcome;
pub mod patterns;
pub mod workout;

use resguard_core::error::ToolError;
use resguard_core::event::EventBus;
use resguard_core::ledger::LedgerClient;
use resguard_core::tool::{ToolName, ToolRegistry};
use resguard_store::ConversationStore;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::Arc;

pub use dispatcher::ToolDispatcher;
pub use ledger::StubLedger;
pub use nudge::{DeliveryRouter, LoggingChannel};

/// Everything the tools need, with stub collaborators by default.
pub struct Toolkit {
    store: ConversationStore,
    delivery: DeliveryRouter,
    ledger: Arc<dyn LedgerClient>,
    decision_log: PathBuf,
    events: Arc<EventBus>,
}

impl Toolkit {
    pub fn new(store: ConversationStore) -> Self {
        Self {
            store,
            delivery: DeliveryRouter::with_logging_channels(),
            ledger: Arc::new(StubLedger),
            decision_log: PathBuf::from("./logs/decisions.json"),
            events: Arc::new(EventBus::default()),
        }
    }

    pub fn with_delivery(mut self, delivery: DeliveryRouter) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn LedgerClient>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_decision_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.decision_log = path.into();
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// A registry holding every domain tool.
    pub fn registry(&self) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(calendar::AnalyzeCalendarTool::new(
            self.store.clone(),
        )));
        registry.register(Box::new(patterns::DetectPatternsTool::new(
            self.store.clone(),
        )));
        registry.register(Box::new(intervention::BookInterventionTool::new(
            self.store.clone(),
            self.events.clone(),
        )));
        registry.register(Box::new(nudge::SendNudgeTool::new(
            self.delivery.clone(),
            self.events.clone(),
        )));
        registry.register(Box::new(workout::LogWorkoutTool::new(self.store.clone())));
        registry.register(Box::new(workout::GetWorkoutHistoryTool::new(
            self.store.clone(),
        )));
        registry.register(Box::new(ledger::FetchCommitmentStatusTool::new(
            self.ledger.clone(),
        )));
        registry.register(Box::new(decision_log::LogDecisionTool::new(
            self.decision_log.clone(),
        )));
        registry.register(Box::new(outcome::RecordOutcomeTool::new(
            self.store.clone(),
        )));
        registry
    }

    /// A dispatcher over [`Toolkit::registry`] publishing to the same bus.
    pub fn dispatcher(&self) -> ToolDispatcher {
        ToolDispatcher::new(Arc::new(self.registry()), self.events.clone())
    }
}

/// Parse a tool's typed input from its JSON arguments.
pub(crate) fn parse_input<T: DeserializeOwned>(
    tool: ToolName,
    arguments: serde_json::Value,
) -> Result<T, ToolError> {
    serde_json::from_value(arguments)
        .map_err(|e| ToolError::InvalidArguments(format!("{tool}: {e}")))
}

/// Round to `places` decimal places.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn default_days_back() -> f64 {
    7.0
}
