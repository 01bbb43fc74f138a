//! The agent reasoning loop implementation.

use chrono::Utc;
use resguard_config::{AgentSettings, AppConfig};
use resguard_core::error::ProviderError;
use resguard_core::event::{DomainEvent, EventBus};
use resguard_core::message::{Message, Role};
use resguard_core::provider::{Provider, ProviderRequest};
use resguard_core::tool::CallerContext;
use resguard_store::ConversationStore;
use resguard_tools::{ToolDispatcher, Toolkit};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::system_prompt::SYSTEM_PROMPT;

/// Appended when a run uses up its completion rounds.
pub const CEILING_NOTICE: &str =
    "I've reached the maximum number of reasoning steps for this request. Please provide further guidance.";

/// Shown when a run ends without any assistant text of its own.
pub const NO_RESPONSE: &str = "No response generated";

/// One finished run: the whole stored history and where this run began in it.
#[derive(Debug, Clone)]
pub struct Turn {
    pub history: Vec<Message>,
    start: usize,
}

impl Turn {
    /// The messages this run appended, starting with its user message.
    pub fn messages(&self) -> &[Message] {
        &self.history[self.start.min(self.history.len())..]
    }

    /// The newest non-empty assistant text this run produced.
    pub fn reply(&self) -> Option<&str> {
        self.messages()
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.content.trim().is_empty())
            .map(|m| m.content.as_str())
    }
}

/// The loop that alternates completions and tool calls over the stored history.
pub struct AgentLoop {
    /// The completion backend
    provider: Arc<dyn Provider>,

    /// Tool dispatch; also carries the event bus
    dispatcher: ToolDispatcher,

    /// Conversation history and domain records
    store: ConversationStore,

    model: String,

    temperature: f32,

    max_tokens: Option<u32>,

    /// Completion rounds per run
    max_iterations: u32,

    /// Deadline for each completion call
    completion_timeout: Duration,

    /// Filled into tool arguments that lack a `user_id`
    default_user_id: Option<String>,

    system_prompt: String,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        dispatcher: ToolDispatcher,
        store: ConversationStore,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            store,
            model: model.into(),
            temperature: 0.1,
            max_tokens: Some(2000),
            max_iterations: 10,
            completion_timeout: Duration::from_secs(60),
            default_user_id: None,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }

    /// A loop over the full toolkit, configured from `config`.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        store: ConversationStore,
        events: Arc<EventBus>,
    ) -> Self {
        let dispatcher = Toolkit::new(store.clone())
            .with_decision_log(config.decision_log.path.clone())
            .with_events(events)
            .dispatcher();
        Self::new(provider, dispatcher, store, config.active_model())
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_settings(&config.agent)
    }

    /// Apply the `[agent]` section of the configuration.
    pub fn with_settings(self, settings: &AgentSettings) -> Self {
        self.with_max_iterations(settings.max_iterations)
            .with_completion_timeout(Duration::from_secs(settings.completion_timeout_secs))
            .with_default_user_id(settings.default_user_id.clone())
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the maximum number of completion rounds per run.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    pub fn with_default_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.default_user_id = Some(user_id.into()).filter(|u: &String| !u.is_empty());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    async fn complete(&self, request: ProviderRequest) -> Result<Message, resguard_core::Error> {
        let response = tokio::time::timeout(self.completion_timeout, self.provider.complete(request))
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!(
                    "{} did not answer within {}s",
                    self.provider.name(),
                    self.completion_timeout.as_secs()
                ))
            })??;

        self.dispatcher.events().publish(DomainEvent::ResponseGenerated {
            model: response.model.clone(),
            tokens_used: response.usage.map(|u| u.total_tokens).unwrap_or(0),
            tool_calls: response.message.tool_calls.len(),
            timestamp: Utc::now(),
        });
        Ok(response.message)
    }

    /// Process one user message and return the full conversation history.
    pub async fn run(&self, user_message: &str) -> Result<Vec<Message>, resguard_core::Error> {
        self.run_turn(user_message).await.map(|turn| turn.history)
    }

    /// Process one user message.
    ///
    /// 1. Appends the user message
    /// 2. Requests a completion over the whole history
    /// 3. If tool calls come back, runs them in order and loops
    /// 4. Stops on a text answer, an empty answer, or the iteration ceiling
    ///
    /// Backend and store failures propagate and are published as
    /// [`DomainEvent::ErrorOccurred`]; tool failures do not.
    pub async fn run_turn(&self, user_message: &str) -> Result<Turn, resguard_core::Error> {
        let result = self.drive(user_message).await;
        if let Err(e) = &result {
            self.dispatcher.events().publish(DomainEvent::ErrorOccurred {
                context: "agent_run".into(),
                error_message: e.to_string(),
                timestamp: Utc::now(),
            });
        }
        result
    }

    async fn drive(&self, user_message: &str) -> Result<Turn, resguard_core::Error> {
        let start = self.store.messages().await?.len();
        self.store
            .append_messages(&[Message::user(user_message)])
            .await?;

        let mut ctx = CallerContext::new(user_message);
        ctx.default_user_id = self.default_user_id.clone();
        let tool_definitions = self.dispatcher.definitions();

        for iteration in 1..=self.max_iterations {
            debug!(iteration, "Agent loop iteration");

            let mut request = ProviderRequest::new(&self.model, self.store.messages().await?);
            request.system_prompt = Some(self.system_prompt.clone());
            request.temperature = self.temperature;
            request.max_tokens = self.max_tokens;
            request.tools = tool_definitions.clone();

            let message = self.complete(request).await?;

            if !message.has_tool_calls() {
                if message.content.trim().is_empty() {
                    warn!(iteration, "Empty completion with no tool calls, stopping");
                } else {
                    info!(iteration, "Agent completed");
                    self.store.append_messages(&[message]).await?;
                }
                return self.finish(start).await;
            }

            debug!(tool_count = message.tool_calls.len(), "Executing tool calls");
            let tool_calls = message.tool_calls.clone();
            self.store
                .append_messages(&[Message::assistant_with_tool_calls(
                    message.content,
                    message.tool_calls,
                )])
                .await?;

            for call in &tool_calls {
                let payload = self.dispatcher.execute(call, &ctx).await;
                self.store.save_tool_response(&call.id, &payload).await?;
            }
        }

        warn!(
            iterations = self.max_iterations,
            "Max iterations reached, closing the run"
        );
        self.dispatcher
            .events()
            .publish(DomainEvent::IterationCeilingReached {
                iterations: self.max_iterations,
                timestamp: Utc::now(),
            });
        self.store
            .append_messages(&[Message::assistant(CEILING_NOTICE)])
            .await?;
        self.finish(start).await
    }

    async fn finish(&self, start: usize) -> Result<Turn, resguard_core::Error> {
        Ok(Turn {
            history: self.store.messages().await?,
            start,
        })
    }
}
