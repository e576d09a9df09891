// src/models.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Opaque principal id. Users themselves live outside this service.
pub type OwnerId = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Initiated,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Initiated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Processing,
    Completed,
    Failed,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Which gateway callback was delivered. `Cancelled` shares the `failed`
/// status but is recorded separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallbackOutcome {
    Success,
    Failed,
    Cancelled,
}

impl CallbackOutcome {
    pub fn status(self) -> TransactionStatus {
        match self {
            Self::Success => TransactionStatus::Success,
            Self::Failed | Self::Cancelled => TransactionStatus::Failed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status value: {}", self.0)
    }
}

impl FromStr for TransactionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiated" => Ok(Self::Initiated),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl FromStr for CallbackOutcome {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl FromStr for FileStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Transaction {
    pub id: i32,
    pub owner_id: OwnerId,
    /// Client-generated correlation id shared with the gateway. Immutable.
    pub transaction_ref: String,
    pub amount: String,
    pub status: TransactionStatus,
    /// Outcome of the last callback applied; `None` until one arrives.
    pub last_outcome: Option<CallbackOutcome>,
    /// Last payload received from the gateway, replaced wholesale.
    #[schema(value_type = Object)]
    pub gateway_response: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub owner_id: OwnerId,
    pub transaction_ref: String,
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FileRecord {
    pub id: i32,
    pub owner_id: OwnerId,
    /// Key into the blob area.
    #[serde(skip_serializing)]
    pub stored_path: String,
    pub display_name: String,
    pub status: FileStatus,
    /// Set once processing completes.
    pub word_count: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFile {
    pub owner_id: OwnerId,
    pub stored_path: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAction {
    PaymentInitiated,
    PaymentSuccess,
    PaymentFailed,
    PaymentCancelled,
    FileUploaded,
    FileDownloaded,
    FileDeleted,
    FileProcessed,
    FileProcessingFailed,
    FileReprocessRequested,
}

impl LedgerAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PaymentInitiated => "payment_initiated",
            Self::PaymentSuccess => "payment_success",
            Self::PaymentFailed => "payment_failed",
            Self::PaymentCancelled => "payment_cancelled",
            Self::FileUploaded => "file_uploaded",
            Self::FileDownloaded => "file_downloaded",
            Self::FileDeleted => "file_deleted",
            Self::FileProcessed => "file_processed",
            Self::FileProcessingFailed => "file_processing_failed",
            Self::FileReprocessRequested => "file_reprocess_requested",
        }
    }
}

impl FromStr for LedgerAction {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = match s {
            "payment_initiated" => Self::PaymentInitiated,
            "payment_success" => Self::PaymentSuccess,
            "payment_failed" => Self::PaymentFailed,
            "payment_cancelled" => Self::PaymentCancelled,
            "file_uploaded" => Self::FileUploaded,
            "file_downloaded" => Self::FileDownloaded,
            "file_deleted" => Self::FileDeleted,
            "file_processed" => Self::FileProcessed,
            "file_processing_failed" => Self::FileProcessingFailed,
            "file_reprocess_requested" => Self::FileReprocessRequested,
            other => return Err(UnknownStatus(other.to_string())),
        };
        Ok(action)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LedgerEntry {
    pub id: i32,
    /// `None` when the acting principal could not be resolved.
    pub owner_id: Option<OwnerId>,
    pub action: LedgerAction,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub owner_id: Option<OwnerId>,
    pub action: LedgerAction,
    pub metadata: serde_json::Value,
}

/// Authenticated caller, passed explicitly through every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: OwnerId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Principal {
    pub fn new(id: OwnerId) -> Self {
        Self {
            id,
            name: None,
            email: None,
        }
    }
}
