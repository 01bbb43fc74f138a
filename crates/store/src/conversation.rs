//! Conversation store: typed operations over the pooled document.
//!
//! Each operation is one pool transaction. Upserts are keyed by `user_id`
//! for profiles and `intervention_id` for interventions.

use chrono::{Duration, Utc};
use resguard_core::error::StoreError;
use resguard_core::{
    Intervention, InterventionOutcome, InterventionType, Message, PastIntervention, UserProfile,
    WorkoutLog,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::pool::StorePool;

pub const DEMO_USER_ID: &str = "demo_user_001";

#[derive(Clone)]
pub struct ConversationStore {
    pool: Arc<StorePool>,
}

impl ConversationStore {
    pub fn new(pool: Arc<StorePool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<StorePool> {
        &self.pool
    }

    // --- messages ---

    pub async fn append_messages(&self, messages: &[Message]) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }
        let batch = messages.to_vec();
        self.pool
            .write(move |doc| {
                doc.messages.extend(batch);
                Ok(())
            })
            .await
    }

    pub async fn messages(&self) -> Result<Vec<Message>, StoreError> {
        self.pool.read(|doc| doc.messages.clone()).await
    }

    pub async fn clear_messages(&self) -> Result<(), StoreError> {
        self.pool
            .write(|doc| {
                doc.messages.clear();
                Ok(())
            })
            .await
    }

    /// Append the `tool` message answering `tool_call_id`.
    pub async fn save_tool_response(
        &self,
        tool_call_id: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        self.append_messages(&[Message::tool_result(tool_call_id, content)])
            .await
    }

    // --- profiles ---

    pub async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        self.pool
            .read(|doc| {
                doc.user_profiles
                    .iter()
                    .find(|p| p.user_id == user_id)
                    .cloned()
            })
            .await
    }

    /// Insert or replace by `user_id`.
    pub async fn save_profile(&self, profile: UserProfile) -> Result<(), StoreError> {
        self.pool
            .write(move |doc| {
                match doc
                    .user_profiles
                    .iter_mut()
                    .find(|p| p.user_id == profile.user_id)
                {
                    Some(existing) => *existing = profile,
                    None => doc.user_profiles.push(profile),
                }
                Ok(())
            })
            .await
    }

    // --- interventions ---

    pub async fn log_intervention(&self, intervention: Intervention) -> Result<(), StoreError> {
        debug!(
            intervention_id = %intervention.intervention_id,
            user_id = %intervention.user_id,
            kind = %intervention.kind,
            "Logging intervention"
        );
        self.pool
            .write(move |doc| {
                doc.interventions.push(intervention);
                Ok(())
            })
            .await
    }

    /// A user's interventions, oldest first.
    pub async fn interventions_for(&self, user_id: &str) -> Result<Vec<Intervention>, StoreError> {
        self.pool
            .read(|doc| {
                doc.interventions
                    .iter()
                    .filter(|i| i.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .await
    }

    /// Close a pending intervention.
    ///
    /// The effectiveness (given, or 1.0 for success and 0.0 otherwise) is also
    /// appended to the owner's `past_interventions`.
    pub async fn update_intervention_outcome(
        &self,
        intervention_id: &str,
        outcome: InterventionOutcome,
        effectiveness: Option<f64>,
        feedback: Option<String>,
    ) -> Result<Intervention, StoreError> {
        if !outcome.is_terminal() {
            return Err(StoreError::InvalidOutcome(outcome.as_str().to_string()));
        }
        let effectiveness = effectiveness
            .unwrap_or(if outcome == InterventionOutcome::Success {
                1.0
            } else {
                0.0
            })
            .clamp(0.0, 1.0);

        self.pool
            .write(move |doc| {
                let intervention = doc
                    .interventions
                    .iter_mut()
                    .find(|i| i.intervention_id == intervention_id)
                    .ok_or_else(|| {
                        StoreError::NotFound(format!("Intervention {intervention_id}"))
                    })?;

                if intervention.outcome.is_terminal() {
                    return Err(StoreError::AlreadyClosed {
                        intervention_id: intervention_id.to_string(),
                        outcome: intervention.outcome.as_str().to_string(),
                    });
                }

                intervention.outcome = outcome;
                intervention.effectiveness_score = Some(effectiveness);
                if feedback.is_some() {
                    intervention.user_feedback = feedback;
                }
                let closed = intervention.clone();

                if closed.kind != InterventionType::Unknown {
                    if let Some(profile) = doc
                        .user_profiles
                        .iter_mut()
                        .find(|p| p.user_id == closed.user_id)
                    {
                        profile.past_interventions.push(PastIntervention {
                            kind: closed.kind,
                            effectiveness,
                            timestamp: Utc::now(),
                        });
                    }
                }

                Ok(closed)
            })
            .await
    }

    // --- workouts ---

    pub async fn append_workout(&self, workout: WorkoutLog) -> Result<(), StoreError> {
        self.pool
            .write(move |doc| {
                doc.workout_logs.push(workout);
                Ok(())
            })
            .await
    }

    /// A user's workouts at or after `since`, oldest first.
    pub async fn workouts_for(
        &self,
        user_id: &str,
        since: Option<chrono::DateTime<Utc>>,
    ) -> Result<Vec<WorkoutLog>, StoreError> {
        self.pool
            .read(|doc| {
                doc.workout_logs
                    .iter()
                    .filter(|w| w.user_id == user_id)
                    .filter(|w| since.is_none_or(|s| w.timestamp >= s))
                    .cloned()
                    .collect()
            })
            .await
    }

    /// Insert the demo profile when no profiles exist yet.
    pub async fn seed_demo_data(&self) -> Result<bool, StoreError> {
        let seeded = self
            .pool
            .write(|doc| {
                if !doc.user_profiles.is_empty() {
                    return Ok(false);
                }
                let now = Utc::now();
                let mut profile = UserProfile::new(DEMO_USER_ID, "Gym 4x/week for 8 weeks");
                profile.start_date = now - Duration::days(7);
                profile.stake_amount = 100.0;
                profile.past_interventions = vec![
                    PastIntervention {
                        kind: InterventionType::Social,
                        effectiveness: 0.73,
                        timestamp: now - Duration::days(3),
                    },
                    PastIntervention {
                        kind: InterventionType::Calendar,
                        effectiveness: 0.68,
                        timestamp: now - Duration::days(5),
                    },
                ];
                doc.user_profiles.push(profile);
                Ok(true)
            })
            .await?;

        if seeded {
            info!(user_id = DEMO_USER_ID, "Demo data initialized");
        }
        Ok(seeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resguard_core::FormQuality;

    fn store() -> ConversationStore {
        ConversationStore::new(StorePool::in_memory())
    }

    fn workout(user_id: &str, minutes: u32) -> WorkoutLog {
        WorkoutLog {
            workout_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            exercise_type: "squats".into(),
            duration_minutes: minutes,
            reps: None,
            sets: None,
            form_quality: FormQuality::Good,
            notes: None,
            timestamp: Utc::now(),
            verified: true,
        }
    }

    #[tokio::test]
    async fn messages_append_in_order_and_clear() {
        let store = store();
        store
            .append_messages(&[Message::user("first"), Message::assistant("second")])
            .await
            .unwrap();
        store.save_tool_response("call_1", "{}").await.unwrap();

        let history = store.messages().await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "first");
        assert_eq!(history[2].tool_call_id.as_deref(), Some("call_1"));

        store.clear_messages().await.unwrap();
        assert!(store.messages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn profile_upsert_replaces() {
        let store = store();
        let mut profile = UserProfile::new("u1", "Run 3x/week");
        store.save_profile(profile.clone()).await.unwrap();
        profile.stake_amount = 250.0;
        store.save_profile(profile).await.unwrap();

        let loaded = store.profile("u1").await.unwrap().unwrap();
        assert_eq!(loaded.stake_amount, 250.0);
        assert!(store.profile("nobody").await.unwrap().is_none());
        assert_eq!(
            store.pool().read(|d| d.user_profiles.len()).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn outcome_closes_once_and_feeds_profile() {
        let store = store();
        store
            .save_profile(UserProfile::new("u1", "Gym"))
            .await
            .unwrap();
        let intervention = Intervention::pending("u1", InterventionType::Message, "test");
        let id = intervention.intervention_id.clone();
        store.log_intervention(intervention).await.unwrap();

        let closed = store
            .update_intervention_outcome(
                &id,
                InterventionOutcome::Failed,
                None,
                Some("No response".into()),
            )
            .await
            .unwrap();
        assert_eq!(closed.outcome, InterventionOutcome::Failed);
        assert_eq!(closed.effectiveness_score, Some(0.0));
        assert_eq!(closed.user_feedback.as_deref(), Some("No response"));

        let again = store
            .update_intervention_outcome(&id, InterventionOutcome::Success, None, None)
            .await;
        assert!(matches!(again, Err(StoreError::AlreadyClosed { .. })));

        let profile = store.profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.past_interventions.len(), 1);
        assert_eq!(
            profile.effectiveness_of(InterventionType::Message),
            Some(0.0)
        );
    }

    #[tokio::test]
    async fn unknown_intervention_is_not_found() {
        let result = store()
            .update_intervention_outcome("missing", InterventionOutcome::Success, None, None)
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn pending_is_not_a_closing_outcome() {
        let result = store()
            .update_intervention_outcome("any", InterventionOutcome::Pending, None, None)
            .await;
        match result {
            Err(StoreError::InvalidOutcome(outcome)) => assert_eq!(outcome, "pending"),
            other => panic!("Expected InvalidOutcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn workouts_filter_by_user_and_window() {
        let store = store();
        let mut old = workout("u1", 30);
        old.timestamp = Utc::now() - Duration::days(30);
        store.append_workout(old).await.unwrap();
        store.append_workout(workout("u1", 45)).await.unwrap();
        store.append_workout(workout("u2", 20)).await.unwrap();

        assert_eq!(store.workouts_for("u1", None).await.unwrap().len(), 2);
        let recent = store
            .workouts_for("u1", Some(Utc::now() - Duration::days(7)))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].duration_minutes, 45);
    }

    #[tokio::test]
    async fn demo_seed_is_idempotent() {
        let store = store();
        assert!(store.seed_demo_data().await.unwrap());
        assert!(!store.seed_demo_data().await.unwrap());

        let profile = store.profile(DEMO_USER_ID).await.unwrap().unwrap();
        assert_eq!(profile.resolution_text, "Gym 4x/week for 8 weeks");
        assert_eq!(
            profile.effectiveness_of(InterventionType::Social),
            Some(0.73)
        );
        assert_eq!(
            profile.effectiveness_of(InterventionType::Calendar),
            Some(0.68)
        );
    }
}
