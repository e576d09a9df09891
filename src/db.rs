// src/db.rs

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::models::{
    CallbackOutcome, FileRecord, LedgerEntry, NewFile, NewLedgerEntry, NewTransaction, OwnerId,
    Transaction,
};
use crate::store::{FileStore, LedgerStore, StatusChange, StoreError, TransactionStore};

const TRANSACTION_COLUMNS: &str = "id, owner_id, transaction_ref, amount::text AS amount, status, \
                                   last_outcome, gateway_response, created_at, updated_at";

const FILE_COLUMNS: &str = "id, owner_id, stored_path, display_name, status, word_count, created_at";

/// PostgreSQL-backed implementation of every store trait.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migrations failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn transaction_from_row(r: &PgRow) -> Result<Transaction, StoreError> {
    let status: String = r.try_get("status")?;
    let last_outcome: Option<String> = r.try_get("last_outcome")?;
    Ok(Transaction {
        id: r.try_get("id")?,
        owner_id: r.try_get("owner_id")?,
        transaction_ref: r.try_get("transaction_ref")?,
        amount: r.try_get("amount")?,
        status: status.parse()?,
        last_outcome: last_outcome
            .as_deref()
            .map(str::parse::<CallbackOutcome>)
            .transpose()?,
        gateway_response: r.try_get("gateway_response")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
    })
}

fn file_from_row(r: &PgRow) -> Result<FileRecord, StoreError> {
    let status: String = r.try_get("status")?;
    Ok(FileRecord {
        id: r.try_get("id")?,
        owner_id: r.try_get("owner_id")?,
        stored_path: r.try_get("stored_path")?,
        display_name: r.try_get("display_name")?,
        status: status.parse()?,
        word_count: r.try_get("word_count")?,
        created_at: r.try_get("created_at")?,
    })
}

fn ledger_from_row(r: &PgRow) -> Result<LedgerEntry, StoreError> {
    let action: String = r.try_get("action")?;
    Ok(LedgerEntry {
        id: r.try_get("id")?,
        owner_id: r.try_get("owner_id")?,
        action: action.parse()?,
        metadata: r.try_get("metadata")?,
        timestamp: r.try_get("created_at")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl TransactionStore for PgStore {
    async fn insert_transaction(&self, new: NewTransaction) -> Result<Transaction, StoreError> {
        let sql = format!(
            r#"INSERT INTO transactions (owner_id, transaction_ref, amount, status, gateway_response)
               VALUES ($1, $2, $3::numeric, 'initiated', '{{}}'::jsonb)
               RETURNING {TRANSACTION_COLUMNS}"#
        );
        let row = sqlx::query(&sql)
            .bind(new.owner_id)
            .bind(&new.transaction_ref)
            .bind(&new.amount)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::DuplicateRef(new.transaction_ref.clone())
                } else {
                    StoreError::Database(e)
                }
            })?;

        transaction_from_row(&row)
    }

    async fn set_gateway_response(
        &self,
        transaction_ref: &str,
        response: &Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"UPDATE transactions
               SET gateway_response = $1, updated_at = NOW()
               WHERE transaction_ref = $2"#,
        )
        .bind(response)
        .bind(transaction_ref)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn apply_status(
        &self,
        transaction_ref: &str,
        outcome: CallbackOutcome,
        payload: &Value,
        overwrite_terminal: bool,
    ) -> Result<Option<StatusChange>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Row lock serialises racing deliveries of the same callback.
        let select = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE transaction_ref = $1 FOR UPDATE"
        );
        let Some(row) = sqlx::query(&select)
            .bind(transaction_ref)
            .fetch_optional(&mut *tx)
            .await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };

        let current = transaction_from_row(&row)?;
        let previous = current.status;
        let previous_outcome = current.last_outcome;
        let status = outcome.status();

        if previous.is_terminal() && previous != status && !overwrite_terminal {
            tx.rollback().await?;
            return Ok(Some(StatusChange {
                transaction: current,
                previous,
                previous_outcome,
                applied: false,
            }));
        }

        let update = format!(
            r#"UPDATE transactions
               SET status = $1, last_outcome = $2, gateway_response = $3, updated_at = NOW()
               WHERE id = $4
               RETURNING {TRANSACTION_COLUMNS}"#
        );
        let row = sqlx::query(&update)
            .bind(status.as_str())
            .bind(outcome.as_str())
            .bind(payload)
            .bind(current.id)
            .fetch_one(&mut *tx)
            .await?;
        let transaction = transaction_from_row(&row)?;

        tx.commit().await?;

        Ok(Some(StatusChange {
            transaction,
            previous,
            previous_outcome,
            applied: true,
        }))
    }

    async fn has_successful_transaction(&self, owner: OwnerId) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"SELECT EXISTS(
                   SELECT 1 FROM transactions WHERE owner_id = $1 AND status = 'success'
               ) AS paid"#,
        )
        .bind(owner)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("paid")?)
    }

    async fn find_by_ref(&self, transaction_ref: &str) -> Result<Option<Transaction>, StoreError> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE transaction_ref = $1");
        let row = sqlx::query(&sql)
            .bind(transaction_ref)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn list_transactions(&self, owner: OwnerId) -> Result<Vec<Transaction>, StoreError> {
        let sql = format!(
            r#"SELECT {TRANSACTION_COLUMNS}
               FROM transactions
               WHERE owner_id = $1
               ORDER BY created_at DESC, id DESC"#
        );
        let rows = sqlx::query(&sql).bind(owner).fetch_all(&self.pool).await?;

        rows.iter().map(transaction_from_row).collect()
    }
}

#[async_trait]
impl FileStore for PgStore {
    async fn insert_file(&self, new: NewFile) -> Result<FileRecord, StoreError> {
        let sql = format!(
            r#"INSERT INTO files (owner_id, stored_path, display_name, status)
               VALUES ($1, $2, $3, 'processing')
               RETURNING {FILE_COLUMNS}"#
        );
        let row = sqlx::query(&sql)
            .bind(new.owner_id)
            .bind(&new.stored_path)
            .bind(&new.display_name)
            .fetch_one(&self.pool)
            .await?;

        file_from_row(&row)
    }

    async fn get_file(&self, file_id: i32) -> Result<Option<FileRecord>, StoreError> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(file_from_row).transpose()
    }

    async fn get_owned_file(
        &self,
        owner: OwnerId,
        file_id: i32,
    ) -> Result<Option<FileRecord>, StoreError> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE id = $1 AND owner_id = $2");
        let row = sqlx::query(&sql)
            .bind(file_id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(file_from_row).transpose()
    }

    async fn list_files(&self, owner: OwnerId) -> Result<Vec<FileRecord>, StoreError> {
        let sql = format!(
            r#"SELECT {FILE_COLUMNS}
               FROM files
               WHERE owner_id = $1
               ORDER BY created_at DESC, id DESC"#
        );
        let rows = sqlx::query(&sql).bind(owner).fetch_all(&self.pool).await?;

        rows.iter().map(file_from_row).collect()
    }

    async fn mark_completed(&self, file_id: i32, word_count: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"UPDATE files
               SET status = 'completed', word_count = $1
               WHERE id = $2"#,
        )
        .bind(word_count)
        .bind(file_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(&self, file_id: i32) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE files SET status = 'failed' WHERE id = $1")
            .bind(file_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_processing(&self, file_id: i32) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE files SET status = 'processing', word_count = NULL WHERE id = $1",
        )
        .bind(file_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_file(&self, owner: OwnerId, file_id: i32) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM files WHERE id = $1 AND owner_id = $2")
            .bind(file_id)
            .bind(owner)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn append(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        let row = sqlx::query(
            r#"INSERT INTO ledger_entries (owner_id, action, metadata)
               VALUES ($1, $2, $3)
               RETURNING id, owner_id, action, metadata, created_at"#,
        )
        .bind(entry.owner_id)
        .bind(entry.action.as_str())
        .bind(&entry.metadata)
        .fetch_one(&self.pool)
        .await?;

        ledger_from_row(&row)
    }

    async fn list_recent(&self, owner: OwnerId, limit: i64) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT id, owner_id, action, metadata, created_at
               FROM ledger_entries
               WHERE owner_id = $1
               ORDER BY created_at DESC, id DESC
               LIMIT $2"#,
        )
        .bind(owner)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(ledger_from_row).collect()
    }
}
