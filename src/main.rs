// src/main.rs
use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use dotenvy::dotenv;
use tracing_subscriber::{fmt, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use wordgate::blob::{BlobStore, LocalBlobStore, S3BlobStore};
use wordgate::config::{BlobBackend, Config};
use wordgate::db::PgStore;
use wordgate::gateway::HttpGateway;
use wordgate::memory::MemoryStore;
use wordgate::queue::{JobQueue, MemoryQueue, RabbitQueue};
use wordgate::store::{FileStore, LedgerStore, TransactionStore};
use wordgate::{api, docs, Backends};

async fn index() -> impl Responder {
    HttpResponse::Ok().body("Service ready!")
}

type Stores = (
    Arc<dyn TransactionStore>,
    Arc<dyn FileStore>,
    Arc<dyn LedgerStore>,
);

async fn open_stores(config: &Config) -> Stores {
    match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url).await.expect("Failed to connect to DB");
            store.migrate().await.expect("Failed to run migrations");
            let store = Arc::new(store);
            let stores: Stores = (store.clone(), store.clone(), store);
            stores
        }
        None => {
            log::warn!("DATABASE_URL not set, using the in-memory store");
            let store = Arc::new(MemoryStore::new());
            let stores: Stores = (store.clone(), store.clone(), store);
            stores
        }
    }
}

async fn open_blobs(config: &Config) -> Arc<dyn BlobStore> {
    match &config.blob_backend {
        BlobBackend::S3 { bucket, endpoint } => {
            Arc::new(S3BlobStore::from_env(bucket, endpoint.as_deref()).await)
        }
        BlobBackend::Local { root } => {
            log::info!("storing uploads under {root}");
            Arc::new(LocalBlobStore::new(root.as_str()))
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
    {
        eprintln!("logging init failed: {e}");
    }

    let config = Config::from_env().map_err(std::io::Error::other)?;

    let (transactions, files, ledger) = open_stores(&config).await;
    let blobs = open_blobs(&config).await;
    let gateway = Arc::new(
        HttpGateway::new(config.gateway_endpoint.clone(), config.gateway_timeout)
            .map_err(std::io::Error::other)?,
    );

    // The queue needs the worker and the worker needs the stores, so the
    // backends are assembled in two steps.
    let rabbit = match &config.rabbitmq_url {
        Some(url) => Some(
            RabbitQueue::connect(url)
                .await
                .expect("Failed to connect to RabbitMQ"),
        ),
        None => None,
    };
    let memory_queue = Arc::new(MemoryQueue::new());
    let queue: Arc<dyn JobQueue> = match &rabbit {
        Some(q) => Arc::new(q.clone()),
        None => {
            log::warn!("RABBITMQ_URL not set, processing jobs in-process");
            memory_queue.clone()
        }
    };

    let backends = Backends {
        transactions,
        files,
        ledger,
        blobs,
        queue,
        gateway,
    };

    let worker = Arc::new(backends.worker());
    match &rabbit {
        Some(q) => q.start_consumers(worker, config.worker_concurrency),
        None => memory_queue.start_consumer(worker),
    }

    let state = web::Data::new(backends.app_state(&config));
    let bind_addr = config.bind_addr.clone();
    log::info!("listening on {bind_addr}");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/", web::get().to(index))
            .service(
                SwaggerUi::new("/docs/{_:.*}")
                    .url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
            )
            .configure(api::configure)
    })
    .bind(bind_addr)?
    .run()
    .await
}
