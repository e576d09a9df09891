// src/error.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::{json, Value};
use thiserror::Error;

use crate::blob::BlobError;
use crate::gateway::GatewayError;
use crate::queue::QueueError;
use crate::store::StoreError;

/// Request-facing failures. Each variant is a structured result for the
/// immediate caller; none of them is retried automatically.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("payment required before upload")]
    PaymentRequired,
    #[error("invalid file type, only {allowed} files are allowed")]
    UnsupportedType { allowed: String },
    #[error("file too large, maximum size is {max_mb}MB")]
    TooLarge { max_mb: usize },
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("file content missing from storage")]
    ContentMissing,
    #[error("gateway_error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("failed to create payment")]
    PaymentNotCreated { raw: Value },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::PaymentRequired => "payment_required",
            AppError::UnsupportedType { .. } => "unsupported_type",
            AppError::TooLarge { .. } => "too_large",
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::ContentMissing => "content_missing",
            AppError::Gateway(_) => "gateway_error",
            AppError::PaymentNotCreated { .. } => "payment_not_created",
            AppError::Store(_) | AppError::Blob(_) | AppError::Queue(_) => "internal_error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::PaymentRequired => StatusCode::PAYMENT_REQUIRED,
            AppError::UnsupportedType { .. }
            | AppError::Validation(_)
            | AppError::PaymentNotCreated { .. } => StatusCode::BAD_REQUEST,
            AppError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NotFound(_) | AppError::ContentMissing => StatusCode::NOT_FOUND,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Store(_) | AppError::Blob(_) | AppError::Queue(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("request failed: {self}");
        }

        let body = match self {
            AppError::Gateway(e) => json!({
                "error": self.code(),
                "detail": "gateway_error",
                "message": e.to_string(),
            }),
            AppError::PaymentNotCreated { raw } => json!({
                "error": self.code(),
                "detail": "failed to create payment",
                "raw": raw,
            }),
            AppError::Store(_) | AppError::Blob(_) | AppError::Queue(_) => json!({
                "error": self.code(),
                "message": "internal error",
            }),
            _ => json!({
                "error": self.code(),
                "message": self.to_string(),
            }),
        };

        HttpResponse::build(status).json(body)
    }
}
