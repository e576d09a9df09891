//! Store seams for the three durable collections.
//!
//! Every method is keyed by owner and/or id; no implementation scans or locks
//! a whole collection. `db::PgStore` is the production implementation and
//! `memory::MemoryStore` backs tests and local runs.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::{
    CallbackOutcome, FileRecord, LedgerEntry, NewFile, NewLedgerEntry, NewTransaction, OwnerId,
    Transaction, TransactionStatus, UnknownStatus,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("duplicate transaction_ref: {0}")]
    DuplicateRef(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<UnknownStatus> for StoreError {
    fn from(value: UnknownStatus) -> Self {
        Self::Corrupt(value.to_string())
    }
}

/// Result of a compare-and-set callback write on a transaction.
#[derive(Debug, Clone)]
pub struct StatusChange {
    /// Row after the write (or unchanged row when `applied` is false).
    pub transaction: Transaction,
    pub previous: TransactionStatus,
    pub previous_outcome: Option<CallbackOutcome>,
    /// False when the terminal policy refused to overwrite a different
    /// terminal status.
    pub applied: bool,
}

impl StatusChange {
    /// True when this write recorded an outcome different from the last
    /// one applied. A cancel after a failure counts even though the status
    /// stays `failed`.
    pub fn transitioned(&self) -> bool {
        self.applied && self.previous_outcome != self.transaction.last_outcome
    }
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert_transaction(&self, new: NewTransaction) -> Result<Transaction, StoreError>;

    async fn set_gateway_response(
        &self,
        transaction_ref: &str,
        response: &Value,
    ) -> Result<(), StoreError>;

    /// Atomically records `outcome` (and the status it maps to) and replaces
    /// `gateway_response` for the row with `transaction_ref`. Returns `None`
    /// when no such row exists.
    ///
    /// When `overwrite_terminal` is false and the row already holds a
    /// different terminal status, nothing is written.
    async fn apply_status(
        &self,
        transaction_ref: &str,
        outcome: CallbackOutcome,
        payload: &Value,
        overwrite_terminal: bool,
    ) -> Result<Option<StatusChange>, StoreError>;

    async fn has_successful_transaction(&self, owner: OwnerId) -> Result<bool, StoreError>;

    async fn find_by_ref(&self, transaction_ref: &str) -> Result<Option<Transaction>, StoreError>;

    /// Newest first.
    async fn list_transactions(&self, owner: OwnerId) -> Result<Vec<Transaction>, StoreError>;
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn insert_file(&self, new: NewFile) -> Result<FileRecord, StoreError>;

    /// Unscoped lookup used by the processing worker.
    async fn get_file(&self, file_id: i32) -> Result<Option<FileRecord>, StoreError>;

    async fn get_owned_file(
        &self,
        owner: OwnerId,
        file_id: i32,
    ) -> Result<Option<FileRecord>, StoreError>;

    /// Newest first.
    async fn list_files(&self, owner: OwnerId) -> Result<Vec<FileRecord>, StoreError>;

    /// Returns false when the row no longer exists.
    async fn mark_completed(&self, file_id: i32, word_count: i64) -> Result<bool, StoreError>;

    async fn mark_failed(&self, file_id: i32) -> Result<bool, StoreError>;

    /// Resets status to processing and clears the word count.
    async fn mark_processing(&self, file_id: i32) -> Result<bool, StoreError>;

    async fn delete_file(&self, owner: OwnerId, file_id: i32) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError>;

    /// Newest first, at most `limit` entries.
    async fn list_recent(&self, owner: OwnerId, limit: i64) -> Result<Vec<LedgerEntry>, StoreError>;
}
