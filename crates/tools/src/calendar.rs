//! analyze_calendar: the user's gym schedule against their workout record.
//!
//! The schedule is fixed at four sessions a week (Mon, Wed, Fri, Sat at
//! 06:00 AM). A session counts as completed when any workout was logged that
//! day, so the analysis is fully determined by stored data and the date.

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use resguard_core::error::ToolError;
use resguard_core::tool::{CallerContext, Tool, ToolName};
use resguard_core::RiskLevel;
use resguard_store::ConversationStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{default_days_back, parse_input, round_to};

const SCHEDULED_DAYS: [Weekday; 4] = [Weekday::Mon, Weekday::Wed, Weekday::Fri, Weekday::Sat];
const SESSION_TIME: &str = "06:00 AM";
const SESSION_TITLES: [&str; 4] = ["Legs", "Chest", "Arms", "Back"];
const MAX_DAYS_BACK: u32 = 365;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub date: NaiveDate,
    pub time: String,
    pub title: String,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftSignal {
    pub signal: String,
    pub severity: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarAnalysis {
    pub events: Vec<CalendarEvent>,
    pub drift_signals: Vec<DriftSignal>,
    pub completion_rate: f64,
    pub total_scheduled: u32,
    pub total_completed: u32,
    pub total_missed: u32,
    pub next_scheduled: Option<String>,
}

fn is_scheduled(date: NaiveDate) -> bool {
    SCHEDULED_DAYS.contains(&date.weekday())
}

/// Analyze the `days_back` days ending on `today`.
pub fn analyze(today: NaiveDate, days_back: u32, workout_days: &HashSet<NaiveDate>) -> CalendarAnalysis {
    let days_back = days_back.clamp(1, MAX_DAYS_BACK);

    let events: Vec<CalendarEvent> = (0..days_back)
        .rev()
        .map(|i| today - Duration::days(i64::from(i)))
        .filter(|date| is_scheduled(*date))
        .enumerate()
        .map(|(n, date)| {
            let completed = workout_days.contains(&date);
            CalendarEvent {
                date,
                time: SESSION_TIME.into(),
                title: format!("Gym - {}", SESSION_TITLES[n % SESSION_TITLES.len()]),
                completed,
                skipped_reason: (!completed).then(|| "No workout logged".to_string()),
            }
        })
        .collect();

    let total_scheduled = events.len() as u32;
    let total_completed = events.iter().filter(|e| e.completed).count() as u32;
    let total_missed = total_scheduled - total_completed;
    let completion_rate = if total_scheduled > 0 {
        f64::from(total_completed) / f64::from(total_scheduled)
    } else {
        0.0
    };

    let mut drift_signals = Vec::new();

    let consecutive_missed = events.iter().rev().take_while(|e| !e.completed).count();
    if consecutive_missed >= 2 {
        drift_signals.push(DriftSignal {
            signal: format!("Missed {consecutive_missed} consecutive workouts"),
            severity: if consecutive_missed >= 3 {
                RiskLevel::High
            } else {
                RiskLevel::Medium
            },
        });
    }

    if completion_rate < 0.5 {
        drift_signals.push(DriftSignal {
            signal: format!("Low completion rate: {}%", (completion_rate * 100.0).round()),
            severity: if completion_rate < 0.3 {
                RiskLevel::High
            } else {
                RiskLevel::Medium
            },
        });
    }

    if completion_rate < 0.6 {
        drift_signals.push(DriftSignal {
            signal: "No workout scheduled for tomorrow".into(),
            severity: RiskLevel::Medium,
        });
    }

    let tomorrow = today + Duration::days(1);
    let next_scheduled = is_scheduled(tomorrow).then(|| format!("{tomorrow} at {SESSION_TIME}"));

    CalendarAnalysis {
        events,
        drift_signals,
        completion_rate: round_to(completion_rate, 2),
        total_scheduled,
        total_completed,
        total_missed,
        next_scheduled,
    }
}

pub struct AnalyzeCalendarTool {
    store: ConversationStore,
}

impl AnalyzeCalendarTool {
    pub fn new(store: ConversationStore) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeCalendarInput {
    user_id: String,
    #[serde(default = "default_days_back")]
    days_back: f64,
}

#[async_trait]
impl Tool for AnalyzeCalendarTool {
    fn name(&self) -> ToolName {
        ToolName::AnalyzeCalendar
    }

    fn description(&self) -> &str {
        "Read the user's workout calendar to detect patterns, gaps, and drift signals. Returns scheduled sessions with completion status."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "user_id": {
                    "type": "string",
                    "description": "User ID to analyze calendar for"
                },
                "days_back": {
                    "type": "number",
                    "description": "How many days back to analyze (default: 7)"
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
        let input: AnalyzeCalendarInput = parse_input(self.name(), arguments)?;
        let days_back = input.days_back.max(1.0).round() as u32;
        let today = Utc::now().date_naive();
        let since = Utc::now() - Duration::days(i64::from(days_back.min(MAX_DAYS_BACK)));

        let workout_days: HashSet<NaiveDate> = self
            .store
            .workouts_for(&input.user_id, Some(since))
            .await?
            .iter()
            .map(|w| w.timestamp.date_naive())
            .collect();

        let analysis = analyze(today, days_back, &workout_days);
        serde_json::to_value(analysis).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resguard_core::{FormQuality, WorkoutLog};
    use resguard_store::StorePool;

    // 2025-01-13 is a Monday.
    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[test]
    fn schedule_is_four_days_a_week() {
        let analysis = analyze(date(19), 7, &HashSet::new());
        let days: Vec<_> = analysis.events.iter().map(|e| e.date.weekday()).collect();
        assert_eq!(
            days,
            vec![Weekday::Mon, Weekday::Wed, Weekday::Fri, Weekday::Sat]
        );
        assert!(analysis.events.iter().all(|e| e.time == "06:00 AM"));
        assert_eq!(analysis.events[0].title, "Gym - Legs");
        assert_eq!(analysis.events[3].title, "Gym - Back");
    }

    #[test]
    fn nothing_logged_raises_every_signal() {
        let analysis = analyze(date(19), 7, &HashSet::new());
        assert_eq!(analysis.total_scheduled, 4);
        assert_eq!(analysis.total_missed, 4);
        assert_eq!(analysis.completion_rate, 0.0);

        let signals: Vec<_> = analysis
            .drift_signals
            .iter()
            .map(|s| (s.signal.as_str(), s.severity))
            .collect();
        assert_eq!(
            signals,
            vec![
                ("Missed 4 consecutive workouts", RiskLevel::High),
                ("Low completion rate: 0%", RiskLevel::High),
                ("No workout scheduled for tomorrow", RiskLevel::Medium),
            ]
        );
        assert_eq!(
            analysis.events[0].skipped_reason.as_deref(),
            Some("No workout logged")
        );
    }

    #[test]
    fn two_trailing_misses_are_medium() {
        // Mon 13, Wed 15 done; Fri 17, Sat 18 missed
        let done: HashSet<_> = [date(13), date(15)].into_iter().collect();
        let analysis = analyze(date(19), 7, &done);
        assert_eq!(analysis.completion_rate, 0.5);
        assert_eq!(analysis.drift_signals[0].signal, "Missed 2 consecutive workouts");
        assert_eq!(analysis.drift_signals[0].severity, RiskLevel::Medium);
        // 0.5 is not low, but under 0.6
        assert_eq!(analysis.drift_signals.len(), 2);
    }

    #[test]
    fn fully_on_track_has_no_signals() {
        let done: HashSet<_> = [date(13), date(15), date(17), date(18)].into_iter().collect();
        let analysis = analyze(date(19), 7, &done);
        assert_eq!(analysis.completion_rate, 1.0);
        assert!(analysis.drift_signals.is_empty());
    }

    #[test]
    fn next_scheduled_only_when_tomorrow_is_a_gym_day() {
        // Sunday 19 -> Monday 20 is scheduled
        assert_eq!(
            analyze(date(19), 7, &HashSet::new()).next_scheduled.as_deref(),
            Some("2025-01-20 at 06:00 AM")
        );
        // Monday 20 -> Tuesday is not
        assert!(analyze(date(20), 7, &HashSet::new()).next_scheduled.is_none());
    }

    #[tokio::test]
    async fn tool_reads_workouts_from_store() {
        let store = ConversationStore::new(StorePool::in_memory());
        store
            .append_workout(WorkoutLog {
                workout_id: "w1".into(),
                user_id: "u1".into(),
                exercise_type: "running".into(),
                duration_minutes: 30,
                reps: None,
                sets: None,
                form_quality: FormQuality::Good,
                notes: None,
                timestamp: Utc::now(),
                verified: true,
            })
            .await
            .unwrap();

        let tool = AnalyzeCalendarTool::new(store);
        let out = tool
            .execute(
                serde_json::json!({"user_id": "u1", "days_back": 14}),
                &CallerContext::default(),
            )
            .await
            .unwrap();
        let analysis: CalendarAnalysis = serde_json::from_value(out).unwrap();
        assert_eq!(analysis.total_scheduled, 8);
        assert!(analysis.total_completed <= 1);
    }

    #[tokio::test]
    async fn missing_user_id_is_invalid() {
        let tool = AnalyzeCalendarTool::new(ConversationStore::new(StorePool::in_memory()));
        let err = tool
            .execute(serde_json::json!({}), &CallerContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
