//! Persisted records and derived assessments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which intervention kinds the user has opted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterventionPreferences {
    pub social: bool,
    pub financial: bool,
    pub calendar: bool,
}

impl Default for InterventionPreferences {
    fn default() -> Self {
        Self {
            social: true,
            financial: true,
            calendar: true,
        }
    }
}

/// Kind of intervention. Ordered by escalation intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterventionType {
    Message,
    Calendar,
    Social,
    Financial,
    /// Anything the booking tool did not recognize.
    #[serde(other)]
    Unknown,
}

impl InterventionType {
    /// The escalation ladder, least to most intense.
    pub const LADDER: [InterventionType; 4] = [
        InterventionType::Message,
        InterventionType::Calendar,
        InterventionType::Social,
        InterventionType::Financial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Calendar => "calendar",
            Self::Social => "social",
            Self::Financial => "financial",
            Self::Unknown => "unknown",
        }
    }

    /// Position on the ladder; `None` for [`InterventionType::Unknown`].
    pub fn rung(&self) -> Option<usize> {
        Self::LADDER.iter().position(|t| t == self)
    }

    /// One rung up, capped at financial. Unknown restarts at message.
    pub fn escalate(&self) -> InterventionType {
        match self.rung() {
            Some(i) => Self::LADDER[(i + 1).min(Self::LADDER.len() - 1)],
            None => InterventionType::Message,
        }
    }
}

impl std::fmt::Display for InterventionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterventionType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "message" => Self::Message,
            "calendar" => Self::Calendar,
            "social" => Self::Social,
            "financial" => Self::Financial,
            _ => Self::Unknown,
        })
    }
}

/// A recorded effectiveness measurement for a past intervention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PastIntervention {
    #[serde(rename = "type")]
    pub kind: InterventionType,
    /// In `[0, 1]`
    pub effectiveness: f64,
    pub timestamp: DateTime<Utc>,
}

/// One profile per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub resolution_text: String,
    pub start_date: DateTime<Utc>,
    pub stake_amount: f64,
    #[serde(default)]
    pub intervention_preferences: InterventionPreferences,
    #[serde(default)]
    pub past_interventions: Vec<PastIntervention>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>, resolution_text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            resolution_text: resolution_text.into(),
            start_date: Utc::now(),
            stake_amount: 100.0,
            intervention_preferences: InterventionPreferences::default(),
            past_interventions: Vec::new(),
        }
    }

    /// Effectiveness of the earliest recorded intervention of a kind.
    pub fn effectiveness_of(&self, kind: InterventionType) -> Option<f64> {
        self.past_interventions
            .iter()
            .find(|p| p.kind == kind)
            .map(|p| p.effectiveness)
    }

    pub fn allows(&self, kind: InterventionType) -> bool {
        let prefs = &self.intervention_preferences;
        match kind {
            InterventionType::Social => prefs.social,
            InterventionType::Financial => prefs.financial,
            InterventionType::Calendar => prefs.calendar,
            InterventionType::Message => true,
            InterventionType::Unknown => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterventionOutcome {
    Pending,
    Success,
    Skipped,
    Failed,
}

impl InterventionOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// A deployed intervention and its eventual outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub intervention_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: InterventionType,
    pub triggered_by: String,
    pub deployed_at: DateTime<Utc>,
    pub outcome: InterventionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effectiveness_score: Option<f64>,
}

impl Intervention {
    /// A fresh pending intervention with a new id.
    pub fn pending(
        user_id: impl Into<String>,
        kind: InterventionType,
        triggered_by: impl Into<String>,
    ) -> Self {
        Self {
            intervention_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            kind,
            triggered_by: triggered_by.into(),
            deployed_at: Utc::now(),
            outcome: InterventionOutcome::Pending,
            user_feedback: None,
            effectiveness_score: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormQuality {
    Excellent,
    #[default]
    Good,
    Fair,
    NeedsImprovement,
}

impl FormQuality {
    pub fn is_solid(&self) -> bool {
        matches!(self, Self::Excellent | Self::Good)
    }
}

/// A completed workout. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutLog {
    pub workout_id: String,
    pub user_id: String,
    pub exercise_type: String,
    pub duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sets: Option<u32>,
    #[serde(default)]
    pub form_quality: FormQuality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Self-asserted by the logging tool.
    pub verified: bool,
}

/// Severity of a signal, or overall failure risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Confidence attached to a signal of this severity.
    pub fn signal_confidence(&self) -> f64 {
        match self {
            Self::High => 0.9,
            Self::Medium => 0.7,
            Self::Low => 0.5,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single drift signal in an assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub signal: String,
    pub severity: RiskLevel,
    pub confidence: f64,
}

/// Where a user sits on the escalation ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationStage {
    Nominal,
    Nudged,
    Escalated,
    Critical,
}

/// Advisory next step derived from intervention history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationAdvice {
    pub stage: EscalationStage,
    pub next_rung: InterventionType,
    pub failed_interventions: usize,
}

/// Result of pattern detection. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAnalysis {
    pub drift_detected: bool,
    pub confidence: f64,
    pub signals: Vec<Signal>,
    pub failure_risk: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_intervention: Option<InterventionType>,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationAdvice>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_escalates_and_caps() {
        assert_eq!(InterventionType::Message.escalate(), InterventionType::Calendar);
        assert_eq!(InterventionType::Calendar.escalate(), InterventionType::Social);
        assert_eq!(InterventionType::Social.escalate(), InterventionType::Financial);
        assert_eq!(InterventionType::Financial.escalate(), InterventionType::Financial);
        assert_eq!(InterventionType::Unknown.escalate(), InterventionType::Message);
    }

    #[test]
    fn unrecognized_type_parses_as_unknown() {
        assert_eq!("teleport".parse::<InterventionType>().unwrap(), InterventionType::Unknown);
        let kind: InterventionType = serde_json::from_str("\"teleport\"").unwrap();
        assert_eq!(kind, InterventionType::Unknown);
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"unknown\"");
    }

    #[test]
    fn earliest_effectiveness_wins() {
        let mut profile = UserProfile::new("u1", "Run 3x/week");
        for eff in [0.2, 0.9] {
            profile.past_interventions.push(PastIntervention {
                kind: InterventionType::Social,
                effectiveness: eff,
                timestamp: Utc::now(),
            });
        }
        assert_eq!(profile.effectiveness_of(InterventionType::Social), Some(0.2));
        assert_eq!(profile.effectiveness_of(InterventionType::Calendar), None);
    }

    #[test]
    fn risk_levels_are_ordered() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
    }

    #[test]
    fn intervention_serializes_type_field() {
        let iv = Intervention::pending("u1", InterventionType::Calendar, "pattern_detection");
        let json = serde_json::to_value(&iv).unwrap();
        assert_eq!(json["type"], "calendar");
        assert_eq!(json["outcome"], "pending");
        assert!(json.get("user_feedback").is_none());
    }

    #[test]
    fn form_quality_defaults_to_good() {
        assert_eq!(FormQuality::default(), FormQuality::Good);
        let q: FormQuality = serde_json::from_str("\"needs_improvement\"").unwrap();
        assert!(!q.is_solid());
    }
}
