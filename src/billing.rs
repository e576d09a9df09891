// src/billing.rs

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::OwnerId;
use crate::store::{StoreError, TransactionStore};

/// Decides whether an owner may upload right now.
///
/// Call sites only see this trait, so a per-upload debit model can replace
/// the existence check without touching the upload path.
#[async_trait]
pub trait UploadGate: Send + Sync {
    async fn may_upload(&self, owner: OwnerId) -> Result<bool, StoreError>;
}

/// Any successful transaction authorizes every upload of its owner.
pub struct AnySuccessfulPayment {
    transactions: Arc<dyn TransactionStore>,
}

impl AnySuccessfulPayment {
    pub fn new(transactions: Arc<dyn TransactionStore>) -> Self {
        Self { transactions }
    }
}

#[async_trait]
impl UploadGate for AnySuccessfulPayment {
    async fn may_upload(&self, owner: OwnerId) -> Result<bool, StoreError> {
        self.transactions.has_successful_transaction(owner).await
    }
}
