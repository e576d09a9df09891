// src/api/handlers.rs

use actix_multipart::Multipart;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::web::ReqData;
use actix_web::{delete, get, post, web, HttpResponse};
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::files::MAX_UPLOAD_BYTES;
use crate::models::{FileRecord, LedgerEntry, Principal, Transaction};
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    pub file: FileRecord,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardResponse {
    pub has_payment: bool,
    pub files: Vec<FileRecord>,
    pub transactions: Vec<Transaction>,
    pub activities: Vec<LedgerEntry>,
}

struct UploadedPart {
    filename: String,
    bytes: Vec<u8>,
}

/// Reads the `file` part (or the first part carrying a filename). Keeps at
/// most one byte past the cap so oversize uploads are still detected.
async fn read_upload(mut payload: Multipart) -> Result<Option<UploadedPart>, AppError> {
    let mut found: Option<UploadedPart> = None;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?;

        let filename = field.content_disposition().get_filename().map(str::to_string);
        let is_file_part = field.name() == "file" || filename.is_some();
        if found.is_some() || !is_file_part {
            while field.next().await.is_some() {}
            continue;
        }

        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| AppError::Validation(format!("upload interrupted: {e}")))?;
            let room = (MAX_UPLOAD_BYTES + 1).saturating_sub(bytes.len());
            bytes.extend_from_slice(&data[..data.len().min(room)]);
        }

        found = Some(UploadedPart {
            filename: filename.unwrap_or_default(),
            bytes,
        });
    }

    Ok(found)
}

#[utoipa::path(
    post,
    path = "/api/upload",
    tag = "files",
    responses(
        (status = 201, description = "File stored, processing started", body = UploadResponse),
        (status = 400, description = "Unsupported type or invalid upload"),
        (status = 402, description = "No successful payment"),
        (status = 413, description = "File larger than 10MB")
    )
)]
#[post("/upload")]
pub async fn upload(
    payload: Multipart,
    state: web::Data<AppState>,
    principal: ReqData<Principal>,
) -> Result<HttpResponse, AppError> {
    let owner = principal.id;

    let Some(part) = read_upload(payload).await? else {
        state.files.ensure_may_upload(owner).await?;
        return Err(AppError::Validation("No file provided".to_string()));
    };

    let file = state
        .files
        .accept_upload(owner, part.bytes, &part.filename)
        .await?;

    Ok(HttpResponse::Created().json(UploadResponse {
        message: "File uploaded and processing started.".to_string(),
        file,
    }))
}

#[utoipa::path(
    get,
    path = "/api/files",
    tag = "files",
    responses((status = 200, description = "Caller's files, newest first", body = [FileRecord]))
)]
#[get("/files")]
pub async fn list_files(
    state: web::Data<AppState>,
    principal: ReqData<Principal>,
) -> Result<HttpResponse, AppError> {
    let files = state.files.list_files(principal.id).await?;
    Ok(HttpResponse::Ok().json(files))
}

#[utoipa::path(
    get,
    path = "/api/files/{file_id}/download",
    tag = "files",
    params(("file_id" = i32, Path, description = "File id")),
    responses(
        (status = 200, description = "File bytes as an attachment"),
        (status = 404, description = "Unknown file, or content missing from storage")
    )
)]
#[get("/files/{file_id}/download")]
pub async fn download_file(
    state: web::Data<AppState>,
    principal: ReqData<Principal>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let download = state.files.download(principal.id, path.into_inner()).await?;

    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(download.display_name)],
        })
        .body(download.bytes))
}

#[utoipa::path(
    delete,
    path = "/api/files/{file_id}",
    tag = "files",
    params(("file_id" = i32, Path, description = "File id")),
    responses(
        (status = 200, description = "File and content deleted"),
        (status = 404, description = "Unknown file")
    )
)]
#[delete("/files/{file_id}")]
pub async fn delete_file(
    state: web::Data<AppState>,
    principal: ReqData<Principal>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    state.files.delete(principal.id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({"message": "File deleted successfully"})))
}

#[utoipa::path(
    post,
    path = "/api/files/{file_id}/reprocess",
    tag = "files",
    params(("file_id" = i32, Path, description = "File id")),
    responses(
        (status = 202, description = "File queued again", body = FileRecord),
        (status = 404, description = "Unknown file")
    )
)]
#[post("/files/{file_id}/reprocess")]
pub async fn reprocess_file(
    state: web::Data<AppState>,
    principal: ReqData<Principal>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let file = state.files.reprocess(principal.id, path.into_inner()).await?;
    Ok(HttpResponse::Accepted().json(file))
}

#[utoipa::path(
    get,
    path = "/api/transactions",
    tag = "payments",
    responses((status = 200, description = "Caller's transactions, newest first", body = [Transaction]))
)]
#[get("/transactions")]
pub async fn list_transactions(
    state: web::Data<AppState>,
    principal: ReqData<Principal>,
) -> Result<HttpResponse, AppError> {
    let transactions = state.payments.list_transactions(principal.id).await?;
    Ok(HttpResponse::Ok().json(transactions))
}

#[utoipa::path(
    get,
    path = "/api/activity",
    tag = "activity",
    responses((status = 200, description = "Recent ledger entries, newest first", body = [LedgerEntry]))
)]
#[get("/activity")]
pub async fn list_activity(
    state: web::Data<AppState>,
    principal: ReqData<Principal>,
) -> Result<HttpResponse, AppError> {
    let entries = state
        .ledger
        .recent(principal.id, state.activity_window)
        .await?;
    Ok(HttpResponse::Ok().json(entries))
}

#[utoipa::path(
    get,
    path = "/api/dashboard",
    tag = "activity",
    responses((status = 200, description = "Payment flag plus the caller's lists", body = DashboardResponse))
)]
#[get("/dashboard")]
pub async fn dashboard(
    state: web::Data<AppState>,
    principal: ReqData<Principal>,
) -> Result<HttpResponse, AppError> {
    let owner = principal.id;
    let has_payment = state.payments.has_successful_transaction(owner).await?;
    let files = state.files.list_files(owner).await?;
    let transactions = state.payments.list_transactions(owner).await?;
    let activities = state.ledger.recent(owner, state.activity_window).await?;

    Ok(HttpResponse::Ok().json(DashboardResponse {
        has_payment,
        files,
        transactions,
        activities,
    }))
}
