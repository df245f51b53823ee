//! Persistence boundary
//!
//! The core reads and writes exactly two things: a per-user credit balance
//! and an append-only usage ledger. Everything else about the relational
//! store belongs to the collaborator behind [`CreditStore`]; each call is
//! assumed atomic at the row level.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Failures from the persistence collaborator
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Terminal state of one generation attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UsageOutcome {
    Completed,
    Failed { error_kind: String },
}

/// One append-only ledger entry per completed or failed-after-reservation
/// attempt. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub user_id: String,
    pub provider: String,
    pub model: String,
    pub billable_units: u64,
    pub cost: f64,
    pub credits_charged: i64,
    pub elapsed_seconds: f64,
    pub outcome: UsageOutcome,
    pub created_at: DateTime<Utc>,
}

/// Boundary trait for the persistence collaborator
#[async_trait]
pub trait CreditStore: Send + Sync {
    async fn load_credit_balance(&self, user_id: &str) -> Result<i64, StoreError>;

    async fn update_credit_balance(&self, user_id: &str, new_balance: i64)
        -> Result<(), StoreError>;

    async fn persist_usage_record(&self, record: &UsageRecord) -> Result<(), StoreError>;
}

/// In-memory store for embedding and tests. Unknown users start at zero.
#[derive(Debug, Default)]
pub struct MemoryStore {
    balances: DashMap<String, i64>,
    records: RwLock<Vec<UsageRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, user_id: impl Into<String>, balance: i64) {
        self.balances.insert(user_id.into(), balance);
    }

    pub fn balance(&self, user_id: &str) -> i64 {
        self.balances.get(user_id).map(|b| *b).unwrap_or(0)
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.read().clone()
    }
}

#[async_trait]
impl CreditStore for MemoryStore {
    async fn load_credit_balance(&self, user_id: &str) -> Result<i64, StoreError> {
        Ok(self.balance(user_id))
    }

    async fn update_credit_balance(
        &self,
        user_id: &str,
        new_balance: i64,
    ) -> Result<(), StoreError> {
        self.balances.insert(user_id.to_string(), new_balance);
        Ok(())
    }

    async fn persist_usage_record(&self, record: &UsageRecord) -> Result<(), StoreError> {
        self.records.write().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.load_credit_balance("nobody").await.unwrap(), 0);

        store.set_balance("alice", 100);
        assert_eq!(store.load_credit_balance("alice").await.unwrap(), 100);

        store.update_credit_balance("alice", 97).await.unwrap();
        assert_eq!(store.balance("alice"), 97);
    }

    #[tokio::test]
    async fn usage_records_append() {
        let store = MemoryStore::new();
        let record = UsageRecord {
            id: Uuid::new_v4(),
            user_id: "alice".to_string(),
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            billable_units: 30,
            cost: 0.0009,
            credits_charged: 1,
            elapsed_seconds: 0.8,
            outcome: UsageOutcome::Completed,
            created_at: Utc::now(),
        };
        store.persist_usage_record(&record).await.unwrap();
        store.persist_usage_record(&record).await.unwrap();
        assert_eq!(store.records().len(), 2);
    }
}
