// src/files.rs

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::billing::UploadGate;
use crate::blob::BlobStore;
use crate::error::AppError;
use crate::extract::{self, ALLOWED_EXTENSIONS};
use crate::ledger::Ledger;
use crate::models::{FileRecord, LedgerAction, NewFile, OwnerId};
use crate::queue::{JobQueue, ProcessFileJob};
use crate::store::FileStore;

/// Upload size cap, inclusive.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Download {
    pub display_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct FileService {
    files: Arc<dyn FileStore>,
    blobs: Arc<dyn BlobStore>,
    queue: Arc<dyn JobQueue>,
    gate: Arc<dyn UploadGate>,
    ledger: Ledger,
}

impl FileService {
    pub fn new(
        files: Arc<dyn FileStore>,
        blobs: Arc<dyn BlobStore>,
        queue: Arc<dyn JobQueue>,
        gate: Arc<dyn UploadGate>,
        ledger: Ledger,
    ) -> Self {
        Self {
            files,
            blobs,
            queue,
            gate,
            ledger,
        }
    }

    pub async fn ensure_may_upload(&self, owner: OwnerId) -> Result<(), AppError> {
        if self.gate.may_upload(owner).await? {
            Ok(())
        } else {
            Err(AppError::PaymentRequired)
        }
    }

    /// Stores the bytes, creates a `processing` row and enqueues the word
    /// count. Returns without waiting for processing.
    pub async fn accept_upload(
        &self,
        owner: OwnerId,
        bytes: Vec<u8>,
        display_name: &str,
    ) -> Result<FileRecord, AppError> {
        self.ensure_may_upload(owner).await?;

        let display_name = sanitize(display_name);
        if display_name.is_empty() {
            return Err(AppError::Validation("file name is required".to_string()));
        }

        let extension = match extract::extension_of(&display_name) {
            Some(ext) if extract::is_allowed(&display_name) => ext,
            _ => {
                return Err(AppError::UnsupportedType {
                    allowed: ALLOWED_EXTENSIONS.join(", "),
                })
            }
        };

        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(AppError::TooLarge {
                max_mb: MAX_UPLOAD_BYTES / (1024 * 1024),
            });
        }
        if bytes.is_empty() {
            return Err(AppError::Validation("the submitted file is empty".to_string()));
        }

        let stored_path = format!("uploads/{owner}/{}{extension}", Uuid::new_v4());
        self.blobs
            .put(&stored_path, bytes, content_type_for(&extension))
            .await?;

        let file = match self
            .files
            .insert_file(NewFile {
                owner_id: owner,
                stored_path: stored_path.clone(),
                display_name,
            })
            .await
        {
            Ok(f) => f,
            Err(e) => {
                // No row points at the bytes yet; remove them.
                if let Err(cleanup) = self.blobs.delete(&stored_path).await {
                    log::error!("orphaned upload key={stored_path}: {cleanup}");
                }
                return Err(e.into());
            }
        };

        self.ledger
            .record(
                Some(owner),
                LedgerAction::FileUploaded,
                json!({"file_id": file.id, "filename": file.display_name}),
            )
            .await;

        self.enqueue_or_fail(owner, file.id).await?;

        Ok(file)
    }

    pub async fn list_files(&self, owner: OwnerId) -> Result<Vec<FileRecord>, AppError> {
        Ok(self.files.list_files(owner).await?)
    }

    pub async fn download(&self, owner: OwnerId, file_id: i32) -> Result<Download, AppError> {
        let file = self.owned(owner, file_id).await?;
        let Some(bytes) = self.blobs.get(&file.stored_path).await? else {
            log::warn!("content missing file_id={} key={}", file.id, file.stored_path);
            return Err(AppError::ContentMissing);
        };

        self.ledger
            .record(
                Some(owner),
                LedgerAction::FileDownloaded,
                json!({"file_id": file.id, "filename": file.display_name}),
            )
            .await;

        Ok(Download {
            display_name: file.display_name,
            bytes,
        })
    }

    /// Deletes the bytes first, then the row.
    ///
    /// If the row delete fails the row survives without content; downloads
    /// then report `ContentMissing` and repeating the delete finishes the job.
    pub async fn delete(&self, owner: OwnerId, file_id: i32) -> Result<(), AppError> {
        let file = self.owned(owner, file_id).await?;

        self.blobs.delete(&file.stored_path).await?;
        if !self.files.delete_file(owner, file.id).await? {
            return Err(AppError::NotFound("file"));
        }

        self.ledger
            .record(
                Some(owner),
                LedgerAction::FileDeleted,
                json!({"file_id": file.id, "filename": file.display_name}),
            )
            .await;
        Ok(())
    }

    /// Puts a file back to `processing` and re-enqueues it.
    pub async fn reprocess(&self, owner: OwnerId, file_id: i32) -> Result<FileRecord, AppError> {
        let file = self.owned(owner, file_id).await?;
        if !self.files.mark_processing(file.id).await? {
            return Err(AppError::NotFound("file"));
        }

        self.ledger
            .record(
                Some(owner),
                LedgerAction::FileReprocessRequested,
                json!({"file_id": file.id}),
            )
            .await;

        self.enqueue_or_fail(owner, file.id).await?;

        self.owned(owner, file.id).await
    }

    /// Enqueues the word count. A file whose job could not be queued is
    /// marked `failed` so it never sits in `processing` with nothing behind it.
    async fn enqueue_or_fail(&self, owner: OwnerId, file_id: i32) -> Result<(), AppError> {
        let Err(e) = self.queue.enqueue(ProcessFileJob { file_id }).await else {
            return Ok(());
        };

        log::error!("enqueue failed file_id={file_id}: {e}");
        self.files.mark_failed(file_id).await?;
        self.ledger
            .record(
                Some(owner),
                LedgerAction::FileProcessingFailed,
                json!({"file_id": file_id, "error": format!("enqueue failed: {e}")}),
            )
            .await;
        Err(e.into())
    }

    async fn owned(&self, owner: OwnerId, file_id: i32) -> Result<FileRecord, AppError> {
        self.files
            .get_owned_file(owner, file_id)
            .await?
            .ok_or(AppError::NotFound("file"))
    }
}

fn sanitize(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    base.chars()
        .filter(|c| c.is_alphanumeric() || *c == '.' || *c == '_' || *c == '-' || *c == ' ')
        .collect::<String>()
        .trim()
        .to_string()
}

fn content_type_for(extension: &str) -> &'static str {
    match extension {
        ".txt" => "text/plain; charset=utf-8",
        ".docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}
