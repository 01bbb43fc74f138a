//! detect_patterns: drift assessment from a calendar snapshot and profile.

use async_trait::async_trait;
use resguard_core::error::ToolError;
use resguard_core::tool::{CallerContext, Tool, ToolName};
use resguard_core::{InterventionType, PatternAnalysis, RiskLevel, Signal, UserProfile};
use resguard_store::ConversationStore;
use serde::Deserialize;
use tracing::debug;

use crate::{escalation, parse_input, round_to};

/// The fields of an `analyze_calendar` result that drive the assessment.
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarSnapshot {
    pub completion_rate: f64,
    #[serde(default)]
    pub drift_signals: Vec<SnapshotSignal>,
    #[serde(default)]
    pub total_missed: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotSignal {
    pub signal: String,
    #[serde(default)]
    pub severity: String,
}

impl SnapshotSignal {
    fn severity(&self) -> RiskLevel {
        match self.severity.as_str() {
            "high" => RiskLevel::High,
            "medium" => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}

impl CalendarSnapshot {
    /// Accept the snapshot either as a JSON string or an inline object.
    /// Anything unparseable counts as no snapshot.
    pub fn from_argument(value: Option<&serde_json::Value>) -> Option<Self> {
        match value? {
            serde_json::Value::String(s) => serde_json::from_str(s).ok(),
            v @ serde_json::Value::Object(_) => serde_json::from_value(v.clone()).ok(),
            _ => None,
        }
    }
}

/// Best intervention for a drifting user.
///
/// Starts at message with effectiveness 0; social then calendar replace it
/// when opted in and strictly more effective; financial wins whenever the
/// user has opted into it.
fn recommend(profile: &UserProfile) -> InterventionType {
    let mut best = InterventionType::Message;
    let mut best_effectiveness = 0.0;

    for kind in [InterventionType::Social, InterventionType::Calendar] {
        if let Some(e) = profile.effectiveness_of(kind)
            && profile.allows(kind)
            && e > best_effectiveness
        {
            best = kind;
            best_effectiveness = e;
        }
    }

    if profile.allows(InterventionType::Financial) {
        best = InterventionType::Financial;
    }
    best
}

/// Assess drift. Escalation advice is attached by the tool, not here.
pub fn assess(profile: &UserProfile, snapshot: Option<&CalendarSnapshot>) -> PatternAnalysis {
    let mut signals = Vec::new();
    let mut drift_detected = false;
    let mut confidence: f64 = 0.0;
    let mut failure_risk = RiskLevel::Low;

    match snapshot {
        Some(cal) => {
            signals.extend(cal.drift_signals.iter().map(|s| Signal {
                signal: s.signal.clone(),
                severity: s.severity(),
                confidence: s.severity().signal_confidence(),
            }));

            if cal.completion_rate < 0.5 {
                drift_detected = true;
                confidence = 0.85;
                failure_risk = RiskLevel::High;
                signals.push(Signal {
                    signal: format!(
                        "Completion rate dropped to {}%",
                        (cal.completion_rate * 100.0).round()
                    ),
                    severity: RiskLevel::High,
                    confidence: 0.9,
                });
            } else if cal.completion_rate < 0.75 || cal.total_missed >= 2 {
                drift_detected = true;
                confidence = 0.65;
                failure_risk = RiskLevel::Medium;
            }

            let consecutive_high = cal
                .drift_signals
                .iter()
                .any(|s| s.signal.contains("consecutive") && s.severity() == RiskLevel::High);
            if consecutive_high {
                drift_detected = true;
                confidence = confidence.max(0.87);
                failure_risk = RiskLevel::High;
            }
        }
        None => {
            confidence = 0.3;
            signals.push(Signal {
                signal: "Insufficient data for pattern analysis".into(),
                severity: RiskLevel::Low,
                confidence: 0.3,
            });
        }
    }

    let recommended_intervention = drift_detected.then(|| recommend(profile));

    let reasoning = if drift_detected {
        let mut text = format!(
            "User shows {failure_risk} drift risk with {}% confidence. Detected {} warning signals. ",
            (confidence * 100.0).round(),
            signals.len()
        );
        if let Some(cal) = snapshot {
            text.push_str(&format!(
                "Calendar shows {}% completion rate with {} missed workouts. ",
                (cal.completion_rate * 100.0).round(),
                cal.total_missed
            ));
        }
        match recommended_intervention {
            Some(kind) => text.push_str(&format!(
                "Recommend {kind} intervention based on past effectiveness ({}).",
                profile.effectiveness_of(kind).unwrap_or(0.0)
            )),
            None => text.push_str("Need more data to recommend intervention."),
        }
        text
    } else {
        "No significant drift detected. User appears to be on track.".to_string()
    };

    PatternAnalysis {
        drift_detected,
        confidence: round_to(confidence, 2),
        signals,
        failure_risk,
        recommended_intervention,
        reasoning,
        escalation: None,
    }
}

pub struct DetectPatternsTool {
    store: ConversationStore,
}

impl DetectPatternsTool {
    pub fn new(store: ConversationStore) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct DetectPatternsInput {
    user_id: String,
    #[serde(default)]
    calendar_data: Option<serde_json::Value>,
}

#[async_trait]
impl Tool for DetectPatternsTool {
    fn name(&self) -> ToolName {
        ToolName::DetectPatterns
    }

    fn description(&self) -> &str {
        "Analyze user behavior patterns to detect drift signals and assess failure risk. Returns a structured assessment with confidence scores, a recommended intervention, and the escalation status."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "user_id": {
                    "type": "string",
                    "description": "User ID to analyze patterns for"
                },
                "calendar_data": {
                    "type": "string",
                    "description": "Optional: JSON string of analyze_calendar results to inform pattern detection"
                }
            },
            "required": ["user_id"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _ctx: &CallerContext,
    ) -> Result<serde_json::Value, ToolError> {
        let input: DetectPatternsInput = parse_input(self.name(), arguments)?;

        let Some(profile) = self.store.profile(&input.user_id).await? else {
            return Ok(serde_json::json!({
                "error": "User profile not found",
                "user_id": input.user_id,
            }));
        };

        let snapshot = CalendarSnapshot::from_argument(input.calendar_data.as_ref());
        let mut analysis = assess(&profile, snapshot.as_ref());

        let history = self.store.interventions_for(&input.user_id).await?;
        analysis.escalation = Some(escalation::advise(&history));

        debug!(
            user_id = %input.user_id,
            drift = analysis.drift_detected,
            risk = %analysis.failure_risk,
            confidence = analysis.confidence,
            "Pattern assessment"
        );

        serde_json::to_value(analysis).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })
    }
}
