// src/worker.rs

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use crate::blob::{BlobError, BlobStore};
use crate::extract::{self, DocumentKind, ExtractError};
use crate::ledger::Ledger;
use crate::models::{FileRecord, LedgerAction};
use crate::store::{FileStore, StoreError};

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("blob error: {0}")]
    Blob(#[from] BlobError),
    #[error("stored content missing for key {0}")]
    ContentMissing(String),
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed { word_count: i64 },
    /// The file row is gone; nothing to do and nothing to retry.
    Dropped,
}

/// Turns a stored upload into its word count.
///
/// Safe to re-run on the same file: a second run over the same bytes writes
/// the same terminal state.
pub struct ProcessingWorker {
    files: Arc<dyn FileStore>,
    blobs: Arc<dyn BlobStore>,
    ledger: Ledger,
}

impl ProcessingWorker {
    pub fn new(files: Arc<dyn FileStore>, blobs: Arc<dyn BlobStore>, ledger: Ledger) -> Self {
        Self {
            files,
            blobs,
            ledger,
        }
    }

    pub async fn process(&self, file_id: i32) -> Result<ProcessOutcome, ProcessingError> {
        let file = match self.files.get_file(file_id).await {
            Ok(Some(file)) => file,
            Ok(None) => {
                log::warn!("dropping job for missing file file_id={file_id}");
                return Ok(ProcessOutcome::Dropped);
            }
            Err(e) => {
                let err = ProcessingError::from(e);
                self.record_failure(file_id, None, &err).await;
                return Err(err);
            }
        };

        match self.count(&file).await {
            Ok(word_count) => match self.files.mark_completed(file.id, word_count).await {
                Ok(true) => {
                    self.ledger
                        .record(
                            Some(file.owner_id),
                            LedgerAction::FileProcessed,
                            json!({"file_id": file.id, "word_count": word_count}),
                        )
                        .await;
                    Ok(ProcessOutcome::Completed { word_count })
                }
                Ok(false) => {
                    log::warn!("file deleted during processing file_id={file_id}");
                    Ok(ProcessOutcome::Dropped)
                }
                Err(e) => {
                    let err = ProcessingError::from(e);
                    self.record_failure(file.id, Some(&file), &err).await;
                    Err(err)
                }
            },
            Err(err) => {
                self.record_failure(file.id, Some(&file), &err).await;
                Err(err)
            }
        }
    }

    async fn count(&self, file: &FileRecord) -> Result<i64, ProcessingError> {
        let kind = DocumentKind::from_path(&file.stored_path);
        if kind == DocumentKind::Unrecognized {
            return Ok(0);
        }

        let bytes = self
            .blobs
            .get(&file.stored_path)
            .await?
            .ok_or_else(|| ProcessingError::ContentMissing(file.stored_path.clone()))?;

        Ok(extract::count_words(kind, &bytes)?)
    }

    async fn record_failure(&self, file_id: i32, file: Option<&FileRecord>, err: &ProcessingError) {
        if file.is_some() {
            if let Err(e) = self.files.mark_failed(file_id).await {
                log::error!("could not mark file failed file_id={file_id}: {e}");
            }
        }

        self.ledger
            .record(
                file.map(|f| f.owner_id),
                LedgerAction::FileProcessingFailed,
                json!({"file_id": file_id, "error": err.to_string()}),
            )
            .await;
    }
}
