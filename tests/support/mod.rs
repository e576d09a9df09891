#![allow(dead_code)]

use std::env;
use std::sync::{Arc, OnceLock};

use httpmock::Method::POST;
use httpmock::{Mock, MockServer};
use serde_json::{json, Value};
use sqlx::PgPool;
use tempfile::TempDir;
use tokio::sync::{Mutex, MutexGuard};

use wordgate::blob::LocalBlobStore;
use wordgate::config::Config;
use wordgate::memory::MemoryStore;
use wordgate::models::{OwnerId, Principal, TransactionStatus};
use wordgate::payments::CallbackOutcome;
use wordgate::queue::MemoryQueue;
use wordgate::worker::ProcessingWorker;
use wordgate::{AppState, Backends};

pub const GATEWAY_PATH: &str = "/jsonpost.php";
pub const JWT_SECRET: &str = "test-secret";

/// Everything a service test needs, wired over in-memory adapters and a
/// temporary blob directory. The gateway points at `gateway_url`.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub queue: Arc<MemoryQueue>,
    pub blobs: Arc<LocalBlobStore>,
    pub backends: Backends,
    pub state: AppState,
    pub worker: ProcessingWorker,
    pub config: Config,
    pub blob_dir: TempDir,
}

impl Harness {
    pub fn new(gateway_url: &str) -> Self {
        Self::with_env(gateway_url, &[])
    }

    pub fn with_env(gateway_url: &str, extra: &[(&str, &str)]) -> Self {
        let gateway_endpoint = format!("{gateway_url}{GATEWAY_PATH}");
        let mut vars: Vec<(String, String)> = vec![
            ("JWT_SECRET".to_string(), JWT_SECRET.to_string()),
            ("GATEWAY_ENDPOINT".to_string(), gateway_endpoint),
            ("GATEWAY_TIMEOUT_SECS".to_string(), "2".to_string()),
            ("CALLBACK_BASE_URL".to_string(), "http://files.test".to_string()),
            ("DASHBOARD_URL".to_string(), "/dashboard/".to_string()),
        ];
        for (k, v) in extra {
            vars.retain(|(name, _)| name != k);
            vars.push((k.to_string(), v.to_string()));
        }
        let config = Config::from_lookup(|name| {
            vars.iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        })
        .expect("test config");

        let blob_dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let blobs = Arc::new(LocalBlobStore::new(blob_dir.path()));
        let gateway = Arc::new(
            wordgate::gateway::HttpGateway::new(
                config.gateway_endpoint.clone(),
                config.gateway_timeout,
            )
            .expect("gateway client"),
        );

        let backends = Backends {
            transactions: store.clone(),
            files: store.clone(),
            ledger: store.clone(),
            blobs: blobs.clone(),
            queue: queue.clone(),
            gateway,
        };
        let worker = backends.worker();
        let state = backends.app_state(&config);

        Self {
            store,
            queue,
            blobs,
            backends,
            state,
            worker,
            config,
            blob_dir,
        }
    }

    /// Records a settled payment for `owner` through the callback path.
    pub async fn grant_payment(&self, owner: OwnerId) -> String {
        let transaction = seed_transaction(&self.store, owner).await;
        self.state
            .payments
            .apply_callback(
                &transaction,
                CallbackOutcome::Success,
                json!({"tran_id": transaction, "pay_status": "Successful"}),
            )
            .await
            .expect("apply success callback");
        transaction
    }

    pub fn ledger_actions(&self) -> Vec<String> {
        self.store
            .ledger_snapshot()
            .expect("ledger snapshot")
            .into_iter()
            .map(|e| e.action.as_str().to_string())
            .collect()
    }

    pub async fn transaction_status(&self, transaction_ref: &str) -> TransactionStatus {
        use wordgate::store::TransactionStore;
        self.store
            .find_by_ref(transaction_ref)
            .await
            .expect("find_by_ref")
            .expect("transaction exists")
            .status
    }
}

/// Inserts an `initiated` transaction directly, skipping the gateway.
pub async fn seed_transaction(store: &MemoryStore, owner: OwnerId) -> String {
    use wordgate::models::NewTransaction;
    use wordgate::store::TransactionStore;

    let transaction_ref = uuid::Uuid::new_v4().to_string();
    store
        .insert_transaction(NewTransaction {
            owner_id: owner,
            transaction_ref: transaction_ref.clone(),
            amount: "100".to_string(),
        })
        .await
        .expect("insert transaction");
    transaction_ref
}

pub fn principal(id: OwnerId) -> Principal {
    Principal {
        id,
        name: Some(format!("User {id}")),
        email: Some(format!("user{id}@example.com")),
    }
}

/// Gateway that answers with a payment page link.
pub fn mock_gateway_ok<'a>(server: &'a MockServer, body: Value) -> Mock<'a> {
    server.mock(|when, then| {
        when.method(POST).path(GATEWAY_PATH);
        then.status(200).json_body(body);
    })
}

pub fn build_multipart_body(
    boundary: &str,
    field_name: &str,
    filename: &str,
    content_type: &str,
    data: &[u8],
) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field_name}\"; filename=\"{filename}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

/// Minimal `.docx` container with one `w:p` per paragraph.
pub fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    let mut body = String::new();
    for p in paragraphs {
        body.push_str(&format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"));
    }
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        zip.start_file("word/document.xml", SimpleFileOptions::default())
            .expect("start docx entry");
        zip.write_all(document.as_bytes()).expect("write docx entry");
        zip.finish().expect("finish docx");
    }
    cursor.into_inner()
}

fn split_db_url(url: &str) -> Result<(String, String), String> {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base.to_string(), Some(query)),
        None => (url.to_string(), None),
    };

    let db_start = base
        .rfind('/')
        .ok_or_else(|| "invalid database url".to_string())?;
    if db_start + 1 >= base.len() {
        return Err("database name is empty".to_string());
    }

    let db_name = base[db_start + 1..].to_string();
    let mut admin_url = format!("{}postgres", &base[..db_start + 1]);
    if let Some(query) = query {
        admin_url = format!("{admin_url}?{query}");
    }

    Ok((admin_url, db_name))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

static TEST_DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub struct TestDb {
    pub pool: PgPool,
    _guard: MutexGuard<'static, ()>,
}

/// Recreates the database named by `TEST_DATABASE_URL` and runs migrations.
/// `None` when the variable is unset, so Postgres tests skip themselves.
pub async fn init_test_db() -> Option<TestDb> {
    dotenvy::dotenv().ok();
    let Ok(test_url) = env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping postgres test");
        return None;
    };
    let (admin_url, db_name) =
        split_db_url(&test_url).expect("invalid TEST_DATABASE_URL format");

    let lock = TEST_DB_LOCK.get_or_init(|| Mutex::new(()));
    let guard = lock.lock().await;

    let admin_pool = PgPool::connect(&admin_url)
        .await
        .expect("connect admin db");

    let _ = sqlx::query("SELECT pg_advisory_lock(424242)")
        .execute(&admin_pool)
        .await;

    let quoted_name = quote_identifier(&db_name);
    let drop_sql = format!("DROP DATABASE IF EXISTS {quoted_name} WITH (FORCE)");
    let create_sql = format!("CREATE DATABASE {quoted_name}");

    let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
    if let Err(e) = sqlx::query(&create_sql).execute(&admin_pool).await {
        eprintln!("create test db error: {e}");
        let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
        sqlx::query(&create_sql)
            .execute(&admin_pool)
            .await
            .expect("create test db retry");
    }

    let _ = sqlx::query("SELECT pg_advisory_unlock(424242)")
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;

    let pool = PgPool::connect(&test_url)
        .await
        .expect("connect test db");
    sqlx::migrate!().run(&pool).await.expect("migrations");
    Some(TestDb { pool, _guard: guard })
}
