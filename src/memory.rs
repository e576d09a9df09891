// src/memory.rs
//
// In-process store used by the test suite and by local runs without DATABASE_URL.
// A single mutex guards all three collections, which gives the same
// per-call atomicity the Postgres store gets from row locks.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::models::{
    CallbackOutcome, FileRecord, FileStatus, LedgerEntry, NewFile, NewLedgerEntry,
    NewTransaction, OwnerId, Transaction, TransactionStatus,
};
use crate::store::{FileStore, LedgerStore, StatusChange, StoreError, TransactionStore};

#[derive(Default)]
struct Tables {
    transactions: Vec<Transaction>,
    files: Vec<FileRecord>,
    ledger: Vec<LedgerEntry>,
    next_transaction_id: i32,
    next_file_id: i32,
    next_ledger_id: i32,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Every ledger entry in append order, regardless of owner.
    pub fn ledger_snapshot(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self.tables()?.ledger.clone())
    }

    pub fn transaction_count(&self) -> Result<usize, StoreError> {
        Ok(self.tables()?.transactions.len())
    }

    pub fn file_count(&self) -> Result<usize, StoreError> {
        Ok(self.tables()?.files.len())
    }
}

fn newest_first<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> (chrono::DateTime<Utc>, i32),
{
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
    items
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn insert_transaction(&self, new: NewTransaction) -> Result<Transaction, StoreError> {
        let mut tables = self.tables()?;
        if tables
            .transactions
            .iter()
            .any(|t| t.transaction_ref == new.transaction_ref)
        {
            return Err(StoreError::DuplicateRef(new.transaction_ref));
        }

        tables.next_transaction_id += 1;
        let now = Utc::now();
        let transaction = Transaction {
            id: tables.next_transaction_id,
            owner_id: new.owner_id,
            transaction_ref: new.transaction_ref,
            amount: new.amount,
            status: TransactionStatus::Initiated,
            last_outcome: None,
            gateway_response: Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
        };
        tables.transactions.push(transaction.clone());
        Ok(transaction)
    }

    async fn set_gateway_response(
        &self,
        transaction_ref: &str,
        response: &Value,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        if let Some(t) = tables
            .transactions
            .iter_mut()
            .find(|t| t.transaction_ref == transaction_ref)
        {
            t.gateway_response = response.clone();
            t.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn apply_status(
        &self,
        transaction_ref: &str,
        outcome: CallbackOutcome,
        payload: &Value,
        overwrite_terminal: bool,
    ) -> Result<Option<StatusChange>, StoreError> {
        let mut tables = self.tables()?;
        let Some(t) = tables
            .transactions
            .iter_mut()
            .find(|t| t.transaction_ref == transaction_ref)
        else {
            return Ok(None);
        };

        let previous = t.status;
        let previous_outcome = t.last_outcome;
        let status = outcome.status();
        if previous.is_terminal() && previous != status && !overwrite_terminal {
            return Ok(Some(StatusChange {
                transaction: t.clone(),
                previous,
                previous_outcome,
                applied: false,
            }));
        }

        t.status = status;
        t.last_outcome = Some(outcome);
        t.gateway_response = payload.clone();
        t.updated_at = Utc::now();

        Ok(Some(StatusChange {
            transaction: t.clone(),
            previous,
            previous_outcome,
            applied: true,
        }))
    }

    async fn has_successful_transaction(&self, owner: OwnerId) -> Result<bool, StoreError> {
        Ok(self
            .tables()?
            .transactions
            .iter()
            .any(|t| t.owner_id == owner && t.status == TransactionStatus::Success))
    }

    async fn find_by_ref(&self, transaction_ref: &str) -> Result<Option<Transaction>, StoreError> {
        Ok(self
            .tables()?
            .transactions
            .iter()
            .find(|t| t.transaction_ref == transaction_ref)
            .cloned())
    }

    async fn list_transactions(&self, owner: OwnerId) -> Result<Vec<Transaction>, StoreError> {
        let owned = self
            .tables()?
            .transactions
            .iter()
            .filter(|t| t.owner_id == owner)
            .cloned()
            .collect();
        Ok(newest_first(owned, |t| (t.created_at, t.id)))
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn insert_file(&self, new: NewFile) -> Result<FileRecord, StoreError> {
        let mut tables = self.tables()?;
        tables.next_file_id += 1;
        let file = FileRecord {
            id: tables.next_file_id,
            owner_id: new.owner_id,
            stored_path: new.stored_path,
            display_name: new.display_name,
            status: FileStatus::Processing,
            word_count: None,
            created_at: Utc::now(),
        };
        tables.files.push(file.clone());
        Ok(file)
    }

    async fn get_file(&self, file_id: i32) -> Result<Option<FileRecord>, StoreError> {
        Ok(self
            .tables()?
            .files
            .iter()
            .find(|f| f.id == file_id)
            .cloned())
    }

    async fn get_owned_file(
        &self,
        owner: OwnerId,
        file_id: i32,
    ) -> Result<Option<FileRecord>, StoreError> {
        Ok(self
            .tables()?
            .files
            .iter()
            .find(|f| f.id == file_id && f.owner_id == owner)
            .cloned())
    }

    async fn list_files(&self, owner: OwnerId) -> Result<Vec<FileRecord>, StoreError> {
        let owned = self
            .tables()?
            .files
            .iter()
            .filter(|f| f.owner_id == owner)
            .cloned()
            .collect();
        Ok(newest_first(owned, |f| (f.created_at, f.id)))
    }

    async fn mark_completed(&self, file_id: i32, word_count: i64) -> Result<bool, StoreError> {
        let mut tables = self.tables()?;
        let Some(f) = tables.files.iter_mut().find(|f| f.id == file_id) else {
            return Ok(false);
        };
        f.status = FileStatus::Completed;
        f.word_count = Some(word_count);
        Ok(true)
    }

    async fn mark_failed(&self, file_id: i32) -> Result<bool, StoreError> {
        let mut tables = self.tables()?;
        let Some(f) = tables.files.iter_mut().find(|f| f.id == file_id) else {
            return Ok(false);
        };
        f.status = FileStatus::Failed;
        Ok(true)
    }

    async fn mark_processing(&self, file_id: i32) -> Result<bool, StoreError> {
        let mut tables = self.tables()?;
        let Some(f) = tables.files.iter_mut().find(|f| f.id == file_id) else {
            return Ok(false);
        };
        f.status = FileStatus::Processing;
        f.word_count = None;
        Ok(true)
    }

    async fn delete_file(&self, owner: OwnerId, file_id: i32) -> Result<bool, StoreError> {
        let mut tables = self.tables()?;
        let before = tables.files.len();
        tables
            .files
            .retain(|f| !(f.id == file_id && f.owner_id == owner));
        Ok(tables.files.len() < before)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        let mut tables = self.tables()?;
        tables.next_ledger_id += 1;
        let entry = LedgerEntry {
            id: tables.next_ledger_id,
            owner_id: entry.owner_id,
            action: entry.action,
            metadata: entry.metadata,
            timestamp: Utc::now(),
        };
        tables.ledger.push(entry.clone());
        Ok(entry)
    }

    async fn list_recent(&self, owner: OwnerId, limit: i64) -> Result<Vec<LedgerEntry>, StoreError> {
        let owned = self
            .tables()?
            .ledger
            .iter()
            .filter(|e| e.owner_id == Some(owner))
            .cloned()
            .collect();
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(newest_first(owned, |e| (e.timestamp, e.id))
            .into_iter()
            .take(limit)
            .collect())
    }
}
