// src/ledger.rs

use std::sync::Arc;

use serde_json::Value;

use crate::models::{LedgerAction, LedgerEntry, NewLedgerEntry, OwnerId};
use crate::store::{LedgerStore, StoreError};

/// Append-only activity log.
///
/// Writes are best effort: a failed append is logged as a ledger write
/// failure and never reverses or blocks the state change that triggered it.
/// Callers append only after their own mutation has committed.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn record(
        &self,
        owner: Option<OwnerId>,
        action: LedgerAction,
        metadata: Value,
    ) -> Option<LedgerEntry> {
        let entry = NewLedgerEntry {
            owner_id: owner,
            action,
            metadata,
        };
        match self.store.append(entry).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::error!(
                    "ledger write failure action={} owner={:?}: {e}",
                    action.as_str(),
                    owner
                );
                None
            }
        }
    }

    pub async fn recent(&self, owner: OwnerId, limit: i64) -> Result<Vec<LedgerEntry>, StoreError> {
        self.store.list_recent(owner, limit).await
    }
}
