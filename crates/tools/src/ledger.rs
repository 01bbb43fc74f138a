//! fetch_commitment_status and the stub ledger behind it.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use resguard_core::error::ToolError;
use resguard_core::ledger::{CommitmentStatus, LedgerClient, Milestone};
use resguard_core::tool::{CallerContext, Tool, ToolName};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::parse_input;

/// A fixed four-milestone commitment. The contract address is derived from
/// the user id so repeated reads agree.
pub struct StubLedger;

impl StubLedger {
    fn contract_address(user_id: &str) -> String {
        let digest = format!("{:x}", Sha256::digest(user_id.as_bytes()));
        format!("0x{}", &digest[..40])
    }
}

#[async_trait]
impl LedgerClient for StubLedger {
    async fn fetch_status(&self, user_id: &str) -> Result<CommitmentStatus, String> {
        let now = Utc::now();
        let today = now.date_naive();
        let milestone = |id: u32, weeks: &str, offset_days: i64| Milestone {
            id,
            target_date: today + Duration::days(offset_days),
            description: format!("Week {weeks}: Complete 8 workouts"),
            completed: false,
            verified_at: None,
        };

        let mut first = milestone(1, "1-2", 0);
        first.completed = true;
        first.verified_at = Some(now - Duration::days(1));

        Ok(CommitmentStatus {
            user_id: user_id.to_string(),
            contract_address: Self::contract_address(user_id),
            stake_amount: "100".into(),
            stake_currency: "USDC".into(),
            status: "active".into(),
            milestones: vec![
                first,
                milestone(2, "3-4", 14),
                milestone(3, "5-6", 28),
                milestone(4, "7-8", 42),
            ],
            earnings_to_date: "12.50".into(),
            bonus_percentage: 10,
        })
    }
}

pub struct FetchCommitmentStatusTool {
    ledger: Arc<dyn LedgerClient>,
}

impl FetchCommitmentStatusTool {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }
}

#[derive(Debug, Deserialize)]
struct FetchCommitmentStatusInput {
    user_id: String,
}

#[async_trait]
impl Tool for FetchCommitmentStatusTool {
    fn name(&self) -> ToolName {
        ToolName::FetchCommitmentStatus
    }

    fn description(&self) -> &str {
        "Check the user's financial commitment: stake amount, milestones, and earnings to date."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user_id": {
                    "type": "string",
                    "description": "User ID to fetch the commitment for"
                }
            },
            "required": ["user_id"]
        })
    }

    async fn execute(&self, arguments: Value, _ctx: &CallerContext) -> Result<Value, ToolError> {
        let input: FetchCommitmentStatusInput = parse_input(self.name(), arguments)?;
        let status = self
            .ledger
            .fetch_status(&input.user_id)
            .await
            .map_err(|reason| ToolError::ExecutionFailed {
                tool_name: self.name().to_string(),
                reason,
            })?;
        serde_json::to_value(status).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OfflineLedger;

    #[async_trait]
    impl LedgerClient for OfflineLedger {
        async fn fetch_status(&self, _: &str) -> Result<CommitmentStatus, String> {
            Err("rpc endpoint unreachable".into())
        }
    }

    #[tokio::test]
    async fn stub_status_shape() {
        let out = FetchCommitmentStatusTool::new(Arc::new(StubLedger))
            .execute(json!({"user_id": "u1"}), &CallerContext::default())
            .await
            .unwrap();
        assert_eq!(out["stake_amount"], "100");
        assert_eq!(out["stake_currency"], "USDC");
        assert_eq!(out["earnings_to_date"], "12.50");
        assert_eq!(out["bonus_percentage"], 10);

        let milestones = out["milestones"].as_array().unwrap();
        assert_eq!(milestones.len(), 4);
        assert_eq!(milestones[0]["completed"], true);
        assert!(milestones[0].get("verified_at").is_some());
        assert!(milestones[1].get("verified_at").is_none());
        assert_eq!(milestones[3]["description"], "Week 7-8: Complete 8 workouts");
    }

    #[tokio::test]
    async fn contract_address_is_stable_per_user() {
        let a = StubLedger.fetch_status("u1").await.unwrap().contract_address;
        let b = StubLedger.fetch_status("u1").await.unwrap().contract_address;
        let c = StubLedger.fetch_status("u2").await.unwrap().contract_address;
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 42);
        assert!(a.starts_with("0x"));
    }

    #[tokio::test]
    async fn ledger_failure_is_an_execution_error() {
        let err = FetchCommitmentStatusTool::new(Arc::new(OfflineLedger))
            .execute(json!({"user_id": "u1"}), &CallerContext::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rpc endpoint unreachable"));
    }
}
