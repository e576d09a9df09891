pub mod api;
pub mod billing;
pub mod blob;
pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod extract;
pub mod files;
pub mod gateway;
pub mod ledger;
pub mod memory;
pub mod models;
pub mod payments;
pub mod queue;
pub mod store;
pub mod worker;

use std::sync::Arc;

use billing::AnySuccessfulPayment;
use blob::BlobStore;
use config::Config;
use files::FileService;
use gateway::PaymentGateway;
use ledger::Ledger;
use payments::PaymentOrchestrator;
use queue::JobQueue;
use store::{FileStore, LedgerStore, TransactionStore};
use worker::ProcessingWorker;

#[derive(Clone)]
pub struct AppState {
    pub payments: PaymentOrchestrator,
    pub files: FileService,
    pub ledger: Ledger,
    pub jwt_secret: String,
    pub dashboard_url: String,
    pub activity_window: i64,
}

/// The adapters a running service is assembled from. Postgres/S3/RabbitMQ in
/// production, in-memory ones in tests and local runs.
#[derive(Clone)]
pub struct Backends {
    pub transactions: Arc<dyn TransactionStore>,
    pub files: Arc<dyn FileStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub queue: Arc<dyn JobQueue>,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl Backends {
    pub fn worker(&self) -> ProcessingWorker {
        ProcessingWorker::new(
            self.files.clone(),
            self.blobs.clone(),
            Ledger::new(self.ledger.clone()),
        )
    }

    pub fn app_state(&self, config: &Config) -> AppState {
        let ledger = Ledger::new(self.ledger.clone());
        let payments = PaymentOrchestrator::new(
            self.transactions.clone(),
            self.gateway.clone(),
            ledger.clone(),
            config.payments.clone(),
        );
        let files = FileService::new(
            self.files.clone(),
            self.blobs.clone(),
            self.queue.clone(),
            Arc::new(AnySuccessfulPayment::new(self.transactions.clone())),
            ledger.clone(),
        );

        AppState {
            payments,
            files,
            ledger,
            jwt_secret: config.jwt_secret.clone(),
            dashboard_url: config.dashboard_url.clone(),
            activity_window: config.activity_window,
        }
    }
}
