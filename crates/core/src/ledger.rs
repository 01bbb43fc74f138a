//! Commitment ledger interface.
//!
//! The staking contract is an external collaborator; the agent only reads
//! its status.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: u32,
    pub target_date: NaiveDate,
    pub description: String,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// A user's financial commitment as seen by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitmentStatus {
    pub user_id: String,
    pub contract_address: String,
    /// Decimal string, as ledgers report it
    pub stake_amount: String,
    pub stake_currency: String,
    /// active, completed, or forfeited
    pub status: String,
    pub milestones: Vec<Milestone>,
    pub earnings_to_date: String,
    pub bonus_percentage: u32,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn fetch_status(&self, user_id: &str) -> Result<CommitmentStatus, String>;
}
