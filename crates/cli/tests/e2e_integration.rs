//! End-to-end integration tests for ResolutionGuard.
//!
//! These drive the full pipeline from a user message through the agent loop,
//! the dispatcher and the domain tools down to the store, with a scripted
//! completion backend standing in for the model.

use std::sync::Arc;
use std::time::Duration;

use resguard_agent::{AgentLoop, CEILING_NOTICE, NO_RESPONSE};
use resguard_config::StoreConfig;
use resguard_core::error::{Error, ProviderError, StoreError};
use resguard_core::message::{Message, MessageToolCall, Role};
use resguard_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use resguard_core::tool::CallerContext;
use resguard_core::{InterventionOutcome, InterventionType};
use resguard_store::{ConversationStore, DEMO_USER_ID, InMemoryDocument, PoolOptions, StorePool};
use resguard_tools::{ToolDispatcher, Toolkit};
use serde_json::{Value, json};

// ── Mock Provider ────────────────────────────────────────────────────────

/// A provider that returns scripted messages in sequence, then repeats the
/// last one.
struct ScriptedProvider {
    responses: std::sync::Mutex<Vec<Message>>,
    call_count: std::sync::Mutex<usize>,
}

impl ScriptedProvider {
    fn new(responses: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            responses: std::sync::Mutex::new(responses),
            call_count: std::sync::Mutex::new(0),
        })
    }

    fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut count = self.call_count.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let message = responses[(*count).min(responses.len() - 1)].clone();
        *count += 1;
        Ok(ProviderResponse {
            message,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "e2e-model".into(),
        })
    }
}

fn tool_call(id: &str, name: &str, arguments: Value) -> MessageToolCall {
    MessageToolCall {
        id: id.into(),
        name: name.into(),
        arguments: arguments.to_string(),
    }
}

fn calls(tool_calls: Vec<MessageToolCall>) -> Message {
    Message::assistant_with_tool_calls("", tool_calls)
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Harness {
    store: ConversationStore,
    dispatcher: Arc<ToolDispatcher>,
    dir: tempfile::TempDir,
}

impl Harness {
    async fn new() -> Self {
        Self::with_pool(StorePool::in_memory()).await
    }

    async fn with_pool(pool: Arc<StorePool>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(pool);
        store.seed_demo_data().await.unwrap();
        let dispatcher = Arc::new(
            Toolkit::new(store.clone())
                .with_decision_log(dir.path().join("decisions.json"))
                .dispatcher(),
        );
        Self {
            store,
            dispatcher,
            dir,
        }
    }

    fn agent(&self, provider: Arc<dyn Provider>) -> AgentLoop {
        let dispatcher = Toolkit::new(self.store.clone())
            .with_decision_log(self.dir.path().join("decisions.json"))
            .dispatcher();
        AgentLoop::new(provider, dispatcher, self.store.clone(), "e2e-model")
            .with_default_user_id(DEMO_USER_ID)
    }

    async fn call(&self, name: &str, arguments: Value) -> Value {
        let raw = self
            .dispatcher
            .execute(
                &tool_call("direct", name, arguments),
                &CallerContext::new("e2e").with_user_id(DEMO_USER_ID),
            )
            .await;
        serde_json::from_str(&raw).unwrap()
    }
}

fn snapshot(rate: f64, missed: u32, signals: Value) -> Value {
    json!({
        "completion_rate": rate,
        "total_missed": missed,
        "drift_signals": signals,
    })
}

// ── Agent loop ───────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_detect_book_and_answer() {
    let h = Harness::new().await;
    let provider = ScriptedProvider::new(vec![
        calls(vec![tool_call(
            "call_1",
            "detect_patterns",
            json!({
                "user_id": DEMO_USER_ID,
                "calendar_data": snapshot(0.33, 3, json!([
                    {"signal": "Missed 3 consecutive workouts", "severity": "high"}
                ])),
            }),
        )]),
        calls(vec![
            tool_call(
                "call_2",
                "book_intervention",
                json!({"user_id": DEMO_USER_ID, "type": "calendar", "details": {"time": "7:00 AM"}}),
            ),
            tool_call(
                "call_3",
                "send_nudge",
                json!({"user_id": DEMO_USER_ID, "message": "Tomorrow 7 AM, gym bag is packed.", "channel": "push"}),
            ),
        ]),
        Message::assistant("I booked a 7 AM session and sent you a reminder."),
    ]);

    let history = h.agent(provider.clone()).run("Am I at risk?").await.unwrap();

    assert_eq!(provider.calls(), 3);
    let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            Role::User,
            Role::Assistant,
            Role::Tool,
            Role::Assistant,
            Role::Tool,
            Role::Tool,
            Role::Assistant,
        ]
    );
    assert_eq!(
        history.last().unwrap().content,
        "I booked a 7 AM session and sent you a reminder."
    );

    let patterns: Value = serde_json::from_str(&history[2].content).unwrap();
    assert_eq!(patterns["drift_detected"], true);
    assert_eq!(patterns["failure_risk"], "high");

    let interventions = h.store.interventions_for(DEMO_USER_ID).await.unwrap();
    assert_eq!(interventions.len(), 1);
    assert_eq!(interventions[0].kind, InterventionType::Calendar);
    assert_eq!(interventions[0].outcome, InterventionOutcome::Pending);
}

#[tokio::test]
async fn e2e_every_tool_call_is_answered_in_order() {
    let h = Harness::new().await;
    let provider = ScriptedProvider::new(vec![
        calls(vec![
            tool_call("a", "get_workout_history", json!({})),
            tool_call("b", "teleport", json!({})),
            tool_call("c", "log_workout", json!("not an object")),
        ]),
        Message::assistant("Done."),
    ]);

    let history = h.agent(provider).run("check").await.unwrap();

    let tool_messages: Vec<&Message> = history.iter().filter(|m| m.role == Role::Tool).collect();
    let ids: Vec<&str> = tool_messages
        .iter()
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);

    // user_id was filled from the caller context
    let history_result: Value = serde_json::from_str(&tool_messages[0].content).unwrap();
    assert_eq!(history_result["success"], true);

    let unknown: Value = serde_json::from_str(&tool_messages[1].content).unwrap();
    assert_eq!(unknown["error"], "Unknown tool: teleport");

    let invalid: Value = serde_json::from_str(&tool_messages[2].content).unwrap();
    assert_eq!(invalid["tool"], "log_workout");
    assert!(invalid["error"].is_string());
}

#[tokio::test]
async fn e2e_ceiling_closes_the_turn() {
    let h = Harness::new().await;
    let provider = ScriptedProvider::new(vec![calls(vec![tool_call(
        "loop",
        "analyze_calendar",
        json!({"user_id": DEMO_USER_ID}),
    )])]);

    let history = h
        .agent(provider.clone())
        .with_max_iterations(3)
        .run("keep thinking")
        .await
        .unwrap();

    assert_eq!(provider.calls(), 3);
    let last = history.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.content, CEILING_NOTICE);
    assert_eq!(history.iter().filter(|m| m.role == Role::Tool).count(), 3);
}

#[tokio::test]
async fn e2e_empty_completion_stops_without_error() {
    let h = Harness::new().await;
    let provider = ScriptedProvider::new(vec![Message::assistant("")]);
    let history = h.agent(provider.clone()).run("").await.unwrap();
    assert_eq!(provider.calls(), 1);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::User);
}

#[tokio::test]
async fn e2e_reply_comes_from_the_current_run_only() {
    let h = Harness::new().await;
    let provider = ScriptedProvider::new(vec![
        Message::assistant("First answer"),
        calls(vec![tool_call("t1", "get_workout_history", json!({}))]),
        Message::assistant(""),
    ]);
    let agent = h.agent(provider);

    let first = agent.run_turn("first question").await.unwrap();
    assert_eq!(first.reply(), Some("First answer"));

    // A tool round followed by an empty completion leaves nothing to show
    let second = agent.run_turn("second question").await.unwrap();
    assert_eq!(second.messages()[0].content, "second question");
    assert_eq!(second.messages().len(), 3);
    assert_eq!(second.reply().unwrap_or(NO_RESPONSE), NO_RESPONSE);
}

#[tokio::test]
async fn e2e_pool_contention_surfaces_as_timeout() {
    let pool = Arc::new(StorePool::new(
        Arc::new(InMemoryDocument::new()),
        PoolOptions {
            max_connections: 1,
            acquire_timeout: Duration::from_millis(50),
        },
    ));
    let h = Harness::with_pool(pool.clone()).await;
    let _held = pool.acquire().await.unwrap();

    let provider = ScriptedProvider::new(vec![Message::assistant("unreachable")]);
    let err = h.agent(provider.clone()).run("hello").await.unwrap_err();

    assert!(matches!(
        err,
        Error::Store(StoreError::ConnectionTimeout { .. })
    ));
    assert_eq!(provider.calls(), 0);
}

// ── Domain tools through the dispatcher ──────────────────────────────────

#[tokio::test]
async fn e2e_high_drift_scenario() {
    let h = Harness::new().await;
    let result = h
        .call(
            "detect_patterns",
            json!({
                "calendar_data": snapshot(0.33, 3, json!([
                    {"signal": "Missed 3 consecutive workouts", "severity": "high"}
                ])).to_string(),
            }),
        )
        .await;

    assert_eq!(result["drift_detected"], true);
    assert_eq!(result["failure_risk"], "high");
    assert_eq!(result["confidence"], 0.87);
    // Demo profile opted into financial stakes
    assert_eq!(result["recommended_intervention"], "financial");
    assert_eq!(result["escalation"]["stage"], "nominal");
}

#[tokio::test]
async fn e2e_moderate_drift_scenario() {
    let h = Harness::new().await;
    let result = h
        .call(
            "detect_patterns",
            json!({"calendar_data": snapshot(0.6, 1, json!([]))}),
        )
        .await;

    assert_eq!(result["drift_detected"], true);
    assert_eq!(result["failure_risk"], "medium");
    assert_eq!(result["confidence"], 0.65);
}

#[tokio::test]
async fn e2e_risk_never_falls_as_completion_drops() {
    let h = Harness::new().await;
    let rank = |risk: &Value| match risk.as_str() {
        Some("low") => 0,
        Some("medium") => 1,
        Some("high") => 2,
        other => panic!("unexpected risk {other:?}"),
    };

    let mut previous = 0;
    for rate in [1.0, 0.9, 0.75, 0.7, 0.5, 0.49, 0.2, 0.0] {
        let result = h
            .call(
                "detect_patterns",
                json!({"calendar_data": snapshot(rate, 0, json!([]))}),
            )
            .await;
        let current = rank(&result["failure_risk"]);
        assert!(current >= previous, "risk fell at completion rate {rate}");
        previous = current;
    }
    assert_eq!(previous, 2);
}

#[tokio::test]
async fn e2e_booking_always_creates_a_new_pending_row() {
    let h = Harness::new().await;
    let args = json!({"type": "message", "details": {"message": "You've got this"}});
    let first = h.call("book_intervention", args.clone()).await;
    let second = h.call("book_intervention", args).await;

    assert_eq!(first["success"], true);
    assert_ne!(first["intervention_id"], second["intervention_id"]);

    let stored = h.store.interventions_for(DEMO_USER_ID).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|i| i.outcome == InterventionOutcome::Pending));
    assert!(stored.iter().all(|i| i.triggered_by == "pattern_detection"));
}

#[tokio::test]
async fn e2e_unknown_intervention_type_is_recorded() {
    let h = Harness::new().await;
    let result = h
        .call("book_intervention", json!({"type": "carrier_pigeon"}))
        .await;
    assert_eq!(result["success"], false);
    assert_eq!(result["type"], "unknown");

    let stored = h.store.interventions_for(DEMO_USER_ID).await.unwrap();
    assert_eq!(stored[0].kind, InterventionType::Unknown);
}

#[tokio::test]
async fn e2e_outcomes_close_exactly_once() {
    let h = Harness::new().await;
    let booked = h.call("book_intervention", json!({"type": "social"})).await;
    let id = booked["intervention_id"].clone();

    let closed = h
        .call(
            "record_outcome",
            json!({"intervention_id": id, "outcome": "success", "effectiveness": 0.9}),
        )
        .await;
    assert_eq!(closed["success"], true);
    assert_eq!(closed["effectiveness_score"], 0.9);

    let again = h
        .call(
            "record_outcome",
            json!({"intervention_id": id, "outcome": "failed"}),
        )
        .await;
    assert_eq!(again["success"], false);

    let stored = h.store.interventions_for(DEMO_USER_ID).await.unwrap();
    assert_eq!(stored[0].outcome, InterventionOutcome::Success);
}

#[tokio::test]
async fn e2e_escalation_ladder_climbs_on_failure() {
    let h = Harness::new().await;
    let mut rungs = Vec::new();

    for _ in 0..5 {
        let patterns = h
            .call(
                "detect_patterns",
                json!({"calendar_data": snapshot(0.4, 2, json!([]))}),
            )
            .await;
        let rung = patterns["escalation"]["next_rung"]
            .as_str()
            .unwrap()
            .to_string();

        let booked = h.call("book_intervention", json!({"type": rung})).await;
        h.call(
            "record_outcome",
            json!({"intervention_id": booked["intervention_id"], "outcome": "failed"}),
        )
        .await;
        rungs.push(rung);
        // Keep deployment times strictly ordered
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    assert_eq!(
        rungs,
        vec!["message", "calendar", "social", "financial", "financial"]
    );

    let final_view = h
        .call(
            "detect_patterns",
            json!({"calendar_data": snapshot(0.4, 2, json!([]))}),
        )
        .await;
    assert_eq!(final_view["escalation"]["stage"], "critical");
    assert_eq!(final_view["escalation"]["failed_interventions"], 5);
}

#[tokio::test]
async fn e2e_zero_duration_workout_is_rejected() {
    let h = Harness::new().await;
    let result = h
        .call(
            "log_workout",
            json!({"exercise_type": "squats", "duration_minutes": 0, "form_quality": "good"}),
        )
        .await;

    assert_eq!(result["success"], false);
    assert_eq!(result["error"], "Duration must be greater than 0 minutes");
    assert!(h.store.workouts_for(DEMO_USER_ID, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn e2e_concurrent_workout_logs_are_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        path: dir.path().join("db.json"),
        ..StoreConfig::default()
    };
    let h = Harness::with_pool(StorePool::open(&config)).await;

    let mut handles = Vec::new();
    for n in 0..20 {
        let dispatcher = h.dispatcher.clone();
        handles.push(tokio::spawn(async move {
            dispatcher
                .execute(
                    &tool_call(
                        &format!("w{n}"),
                        "log_workout",
                        json!({
                            "user_id": DEMO_USER_ID,
                            "exercise_type": "pushups",
                            "duration_minutes": 10 + n,
                            "form_quality": "good"
                        }),
                    ),
                    &CallerContext::new("concurrent"),
                )
                .await
        }));
    }
    for handle in handles {
        let raw = handle.await.unwrap();
        let result: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(result["success"], true, "{raw}");
    }

    let workouts = h.store.workouts_for(DEMO_USER_ID, None).await.unwrap();
    assert_eq!(workouts.len(), 20);

    let history = h
        .call("get_workout_history", json!({"days_back": 7}))
        .await;
    assert_eq!(history["stats"]["total_workouts"], 20);
    assert_eq!(history["stats"]["completion_rate"], 100);
}

#[tokio::test]
async fn e2e_decision_log_accumulates() {
    let h = Harness::new().await;
    for event in ["drift_detected", "intervention_booked"] {
        let result = h
            .call(
                "log_decision",
                json!({"event_name": event, "metrics": {"confidence": 0.87}}),
            )
            .await;
        assert_eq!(result["success"], true);
    }

    let raw = std::fs::read_to_string(h.dir.path().join("decisions.json")).unwrap();
    let entries: Vec<Value> = serde_json::from_str(&raw).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1]["event_name"], "intervention_booked");
}

#[tokio::test]
async fn e2e_commitment_status_from_stub_ledger() {
    let h = Harness::new().await;
    let status = h.call("fetch_commitment_status", json!({})).await;
    assert_eq!(status["user_id"], DEMO_USER_ID);
    assert_eq!(status["status"], "active");
    assert_eq!(status["milestones"].as_array().map(Vec::len), Some(4));
}
