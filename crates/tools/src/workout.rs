//! log_workout and get_workout_history.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use resguard_core::error::ToolError;
use resguard_core::tool::{CallerContext, Tool, ToolName};
use resguard_core::{FormQuality, WorkoutLog};
use resguard_store::ConversationStore;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::info;

use crate::{default_days_back, parse_input, round_to};

/// Sessions per week the commitment expects.
const EXPECTED_PER_WEEK: f64 = 4.0;
const RECENT_WINDOW: usize = 7;
const ON_TRACK_RATE: u32 = 75;

pub struct LogWorkoutTool {
    store: ConversationStore,
}

impl LogWorkoutTool {
    pub fn new(store: ConversationStore) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct LogWorkoutInput {
    user_id: String,
    exercise_type: String,
    duration_minutes: f64,
    reps: Option<u32>,
    sets: Option<u32>,
    #[serde(default)]
    form_quality: FormQuality,
    notes: Option<String>,
}

#[async_trait]
impl Tool for LogWorkoutTool {
    fn name(&self) -> ToolName {
        ToolName::LogWorkout
    }

    fn description(&self) -> &str {
        "Log a completed workout session with exercise details, duration, and form quality. Used to verify commitment contract progress."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user_id": {
                    "type": "string",
                    "description": "User ID logging the workout"
                },
                "exercise_type": {
                    "type": "string",
                    "description": "Type of exercise performed (e.g., squats, pushups, running, yoga)"
                },
                "duration_minutes": {
                    "type": "number",
                    "description": "Duration of workout in minutes"
                },
                "reps": {
                    "type": "number",
                    "description": "Number of repetitions (optional)"
                },
                "sets": {
                    "type": "number",
                    "description": "Number of sets (optional)"
                },
                "form_quality": {
                    "type": "string",
                    "enum": ["excellent", "good", "fair", "needs_improvement"],
                    "description": "Quality of exercise form"
                },
                "notes": {
                    "type": "string",
                    "description": "Additional notes about the workout"
                }
            },
            "required": ["user_id", "exercise_type", "duration_minutes"]
        })
    }

    async fn execute(&self, arguments: Value, _ctx: &CallerContext) -> Result<Value, ToolError> {
        let input: LogWorkoutInput = parse_input(self.name(), arguments)?;
        if input.duration_minutes <= 0.0 {
            return Ok(json!({
                "success": false,
                "error": "Duration must be greater than 0 minutes",
            }));
        }

        let duration = input.duration_minutes.round().max(1.0) as u32;
        let workout = WorkoutLog {
            workout_id: uuid::Uuid::new_v4().to_string(),
            user_id: input.user_id.clone(),
            exercise_type: input.exercise_type.clone(),
            duration_minutes: duration,
            reps: input.reps,
            sets: input.sets,
            form_quality: input.form_quality,
            notes: input.notes.filter(|n| !n.is_empty()),
            timestamp: Utc::now(),
            verified: true,
        };
        let workout_id = workout.workout_id.clone();
        self.store.append_workout(workout).await?;
        info!(%workout_id, user_id = %input.user_id, exercise = %input.exercise_type, duration, "Workout logged");

        let history = self.store.workouts_for(&input.user_id, None).await?;
        let total_workouts = history.len();
        let total_minutes: u64 = history.iter().map(|w| u64::from(w.duration_minutes)).sum();
        let today = Utc::now().date_naive();
        let workouts_today = history
            .iter()
            .filter(|w| w.timestamp.date_naive() == today)
            .count();

        Ok(json!({
            "success": true,
            "workout_id": workout_id,
            "message": format!(
                "Workout logged successfully! {} for {duration} minutes",
                input.exercise_type
            ),
            "stats": {
                "total_workouts": total_workouts,
                "total_minutes": total_minutes,
                "workouts_today": workouts_today,
                "recent_workouts": total_workouts.min(RECENT_WINDOW),
                "average_duration": average(total_minutes, total_workouts),
            },
            "commitment_status": if workouts_today > 0 {
                "Daily workout requirement met ✓"
            } else {
                "First workout of the day logged"
            },
            "form_feedback": if input.form_quality.is_solid() {
                "Great job maintaining proper form!"
            } else {
                "Remember to focus on form quality for better results and injury prevention."
            },
        }))
    }
}

fn average(total_minutes: u64, count: usize) -> u64 {
    if count == 0 {
        0
    } else {
        (total_minutes as f64 / count as f64).round() as u64
    }
}

pub struct GetWorkoutHistoryTool {
    store: ConversationStore,
}

impl GetWorkoutHistoryTool {
    pub fn new(store: ConversationStore) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct GetWorkoutHistoryInput {
    user_id: String,
    #[serde(default = "default_days_back")]
    days_back: f64,
}

/// Percentage of expected sessions completed, capped at 100.
pub fn completion_rate(total_workouts: usize, days_back: f64) -> u32 {
    let expected = (days_back / 7.0 * EXPECTED_PER_WEEK).ceil();
    if expected <= 0.0 {
        return 0;
    }
    ((total_workouts as f64 / expected * 100.0).round() as u32).min(100)
}

fn commitment_message(rate: u32) -> String {
    if rate >= ON_TRACK_RATE {
        format!("Excellent! You're meeting your commitment with {rate}% completion rate.")
    } else if rate >= 50 {
        format!(
            "You're on the right track, but there's room for improvement. Current completion: {rate}%"
        )
    } else {
        format!(
            "Warning: Low completion rate ({rate}%). Consider booking interventions to get back on track."
        )
    }
}

#[async_trait]
impl Tool for GetWorkoutHistoryTool {
    fn name(&self) -> ToolName {
        ToolName::GetWorkoutHistory
    }

    fn description(&self) -> &str {
        "Retrieve workout history for a user, showing logged exercises, progress, and commitment contract verification status."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user_id": {
                    "type": "string",
                    "description": "User ID to retrieve workout history for"
                },
                "days_back": {
                    "type": "number",
                    "description": "Number of days of history to retrieve (default: 7)"
                }
            },
            "required": ["user_id"]
        })
    }

    async fn execute(&self, arguments: Value, _ctx: &CallerContext) -> Result<Value, ToolError> {
        let input: GetWorkoutHistoryInput = parse_input(self.name(), arguments)?;
        let days_back = input.days_back.clamp(1.0, 365.0);

        let all = self.store.workouts_for(&input.user_id, None).await?;
        if all.is_empty() {
            return Ok(json!({
                "success": true,
                "workouts": [],
                "message": "No workout history found. Start logging workouts to track progress!",
                "stats": {
                    "total_workouts": 0,
                    "total_minutes": 0,
                    "completion_rate": 0,
                },
            }));
        }

        let cutoff = Utc::now() - Duration::seconds((days_back * 86_400.0) as i64);
        let workouts: Vec<&WorkoutLog> = all.iter().filter(|w| w.timestamp >= cutoff).collect();

        let total_workouts = workouts.len();
        let total_minutes: u64 = workouts.iter().map(|w| u64::from(w.duration_minutes)).sum();
        let rate = completion_rate(total_workouts, days_back);

        let mut breakdown: BTreeMap<&str, u32> = BTreeMap::new();
        for w in &workouts {
            *breakdown.entry(w.exercise_type.as_str()).or_default() += 1;
        }
        let weeks = (days_back / 7.0).max(1.0);

        let entries: Vec<Value> = workouts
            .iter()
            .map(|w| {
                json!({
                    "date": w.timestamp.date_naive().to_string(),
                    "time": w.timestamp.format("%I:%M %p").to_string(),
                    "exercise": w.exercise_type,
                    "duration": w.duration_minutes,
                    "reps": w.reps,
                    "sets": w.sets,
                    "form_quality": w.form_quality,
                    "notes": w.notes,
                })
            })
            .collect();

        Ok(json!({
            "success": true,
            "workouts": entries,
            "stats": {
                "total_workouts": total_workouts,
                "total_minutes": total_minutes,
                "average_duration": average(total_minutes, total_workouts),
                "completion_rate": rate,
                "workouts_per_week": round_to(total_workouts as f64 / weeks, 1),
                "exercise_breakdown": breakdown,
            },
            "commitment_analysis": {
                "on_track": rate >= ON_TRACK_RATE,
                "message": commitment_message(rate),
            },
        }))
    }
}
