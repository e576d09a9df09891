// src/payments.rs

use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::gateway::{redirect_url, CustomerFields, PaymentGateway, PaymentRequest};
use crate::ledger::Ledger;
use crate::models::{LedgerAction, NewTransaction, OwnerId, Principal, Transaction};

pub use crate::models::CallbackOutcome;
use crate::store::TransactionStore;

/// What happens when a callback disagrees with an already terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalPolicy {
    /// Later callback wins.
    Overwrite,
    /// First terminal status sticks; later differing callbacks are refused.
    KeepFirst,
}

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub store_id: String,
    pub amount: String,
    pub currency: String,
    pub default_method: String,
    /// Base for the success/fail/cancel URLs handed to the gateway.
    pub callback_base_url: String,
    pub terminal_policy: TerminalPolicy,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            store_id: "aamarpaytest".to_string(),
            amount: "100".to_string(),
            currency: "BDT".to_string(),
            default_method: "VISA".to_string(),
            callback_base_url: "http://localhost:8065".to_string(),
            terminal_policy: TerminalPolicy::Overwrite,
        }
    }
}

impl CallbackOutcome {
    fn ledger_entry(self, transaction: &Transaction) -> (LedgerAction, Value) {
        let tran_id = &transaction.transaction_ref;
        match self {
            Self::Success => (
                LedgerAction::PaymentSuccess,
                json!({"transaction": tran_id, "amount": transaction.amount}),
            ),
            Self::Failed => (
                LedgerAction::PaymentFailed,
                json!({"transaction": tran_id, "reason": "Gateway failure"}),
            ),
            Self::Cancelled => (
                LedgerAction::PaymentCancelled,
                json!({"transaction": tran_id}),
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CallbackResult {
    /// A new outcome was recorded and a ledger entry was appended.
    Applied(Transaction),
    /// Redelivery of the last recorded outcome; payload replaced, no new entry.
    Duplicate(Transaction),
    /// Refused by [`TerminalPolicy::KeepFirst`].
    Refused(Transaction),
    /// Failed/cancelled notice for a ref we never issued.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct PaymentInitiation {
    pub transaction: Transaction,
    pub redirect_url: String,
}

#[derive(Clone)]
pub struct PaymentOrchestrator {
    transactions: Arc<dyn TransactionStore>,
    gateway: Arc<dyn PaymentGateway>,
    ledger: Ledger,
    settings: PaymentSettings,
}

impl PaymentOrchestrator {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        gateway: Arc<dyn PaymentGateway>,
        ledger: Ledger,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            transactions,
            gateway,
            ledger,
            settings,
        }
    }

    /// Records an `initiated` transaction and asks the gateway for a payment
    /// page.
    ///
    /// A gateway failure leaves the row `initiated`: the gateway may still
    /// settle the payment, and its callback is authoritative.
    pub async fn initiate(
        &self,
        principal: &Principal,
        method: Option<&str>,
    ) -> Result<PaymentInitiation, AppError> {
        let mut transaction = self
            .transactions
            .insert_transaction(NewTransaction {
                owner_id: principal.id,
                transaction_ref: Uuid::new_v4().to_string(),
                amount: self.settings.amount.clone(),
            })
            .await?;

        self.ledger
            .record(
                Some(principal.id),
                LedgerAction::PaymentInitiated,
                json!({"transaction": transaction.transaction_ref, "amount": transaction.amount}),
            )
            .await;

        let request = self.build_request(principal, &transaction.transaction_ref, method);
        let response = match self.gateway.create_payment(&request).await {
            Ok(r) => r,
            Err(e) => {
                log::error!(
                    "gateway create_payment error tran_id={} user_id={}: {e}",
                    transaction.transaction_ref,
                    principal.id
                );
                return Err(AppError::Gateway(e));
            }
        };

        self.transactions
            .set_gateway_response(&transaction.transaction_ref, &response)
            .await?;
        transaction.gateway_response = response.clone();

        match redirect_url(&response) {
            Some(redirect_url) => Ok(PaymentInitiation {
                transaction,
                redirect_url,
            }),
            None => {
                log::warn!(
                    "gateway returned no redirect tran_id={}",
                    transaction.transaction_ref
                );
                Err(AppError::PaymentNotCreated { raw: response })
            }
        }
    }

    /// Applies a gateway callback. Safe under duplicate and concurrent
    /// delivery: the store performs a locked compare-and-set on the last
    /// applied outcome, and only a different outcome appends to the ledger.
    /// A cancel after a failure keeps the `failed` status but is still
    /// recorded as `payment_cancelled`.
    pub async fn apply_callback(
        &self,
        transaction_ref: &str,
        outcome: CallbackOutcome,
        payload: Value,
    ) -> Result<CallbackResult, AppError> {
        let transaction_ref = transaction_ref.trim();
        if transaction_ref.is_empty() {
            return Err(AppError::Validation("missing tran_id".to_string()));
        }

        let overwrite = self.settings.terminal_policy == TerminalPolicy::Overwrite;
        let change = self
            .transactions
            .apply_status(transaction_ref, outcome, &payload, overwrite)
            .await?;

        let Some(change) = change else {
            return match outcome {
                CallbackOutcome::Success => {
                    log::warn!("success callback for unknown tran_id={transaction_ref}");
                    Err(AppError::NotFound("transaction"))
                }
                _ => {
                    log::info!(
                        "ignoring {} callback for unknown tran_id={transaction_ref}",
                        outcome.as_str()
                    );
                    Ok(CallbackResult::Ignored)
                }
            };
        };

        if !change.applied {
            log::warn!(
                "refused {} callback for terminal tran_id={transaction_ref} status={}",
                outcome.as_str(),
                change.previous.as_str()
            );
            return Ok(CallbackResult::Refused(change.transaction));
        }

        if !change.transitioned() {
            return Ok(CallbackResult::Duplicate(change.transaction));
        }

        if change.previous.is_terminal() && change.previous != change.transaction.status {
            log::warn!(
                "terminal status overwritten tran_id={transaction_ref} from={} to={}",
                change.previous.as_str(),
                change.transaction.status.as_str()
            );
        }

        let (action, metadata) = outcome.ledger_entry(&change.transaction);
        self.ledger
            .record(Some(change.transaction.owner_id), action, metadata)
            .await;

        Ok(CallbackResult::Applied(change.transaction))
    }

    pub async fn has_successful_transaction(&self, owner: OwnerId) -> Result<bool, AppError> {
        Ok(self.transactions.has_successful_transaction(owner).await?)
    }

    pub async fn list_transactions(&self, owner: OwnerId) -> Result<Vec<Transaction>, AppError> {
        Ok(self.transactions.list_transactions(owner).await?)
    }

    fn build_request(
        &self,
        principal: &Principal,
        transaction_ref: &str,
        method: Option<&str>,
    ) -> PaymentRequest {
        let base = self.settings.callback_base_url.trim_end_matches('/');
        let payment_type = method
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.settings.default_method.as_str());

        PaymentRequest {
            store_id: self.settings.store_id.clone(),
            amount: self.settings.amount.clone(),
            payment_type: payment_type.to_string(),
            currency: self.settings.currency.clone(),
            transaction_ref: transaction_ref.to_string(),
            success_url: format!("{base}/payment/success"),
            fail_url: format!("{base}/payment/fail"),
            cancel_url: format!("{base}/payment/cancel"),
            customer: CustomerFields {
                cus_name: principal
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("user-{}", principal.id)),
                cus_email: principal.email.clone().unwrap_or_default(),
                cus_add1: "Dhaka".to_string(),
                cus_add2: "Dhaka".to_string(),
                cus_city: "Dhaka".to_string(),
                cus_country: "Bangladesh".to_string(),
                cus_phone: "01711111111".to_string(),
                cus_postcode: "1000".to_string(),
            },
            shipping_method: "NO".to_string(),
            num_of_item: "1".to_string(),
            product_name: "File Upload Service".to_string(),
            product_profile: "general".to_string(),
            product_category: "Service".to_string(),
        }
    }
}
