use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::MinorUnits;

/// Typed failures of the ledger. Every validation failure is returned to the
/// caller; none of these are logged-and-ignored inside the ledger.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient funds in account {account_id}: requested {requested}, available {available}")]
    InsufficientFunds {
        account_id: Uuid,
        requested: MinorUnits,
        available: MinorUnits,
    },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Account {owner_account_id} already has {limit} active sub-accounts")]
    CapacityExceeded { owner_account_id: Uuid, limit: usize },
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid external reference: {0}")]
    InvalidReference(String),
    #[error("External reference {0} was already applied to a different account or amount")]
    ExternalReferenceConflict(String),
    #[error("Account {0} is retired")]
    AccountRetired(Uuid),
    #[error("Account {0} cannot own sub-accounts")]
    NotPrimaryAccount(Uuid),
    #[error("Account {sub_account_id} is not an active sub-account of {owner_account_id}")]
    NotSubAccount {
        owner_account_id: Uuid,
        sub_account_id: Uuid,
    },
    #[error("User {0} already has a primary account")]
    AccountExists(Uuid),
    #[error("Cannot transfer from account {0} to itself")]
    SelfTransfer(Uuid),
    #[error("Ledger projection of account {0} does not fit a balance")]
    ProjectionOutOfRange(Uuid),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl LedgerError {
    pub fn account_not_found(id: Uuid) -> Self {
        LedgerError::NotFound(format!("Account {} not found", id))
    }

    /// Systemic failures; everything else is a caller or user-recoverable condition.
    pub fn is_systemic(&self) -> bool {
        matches!(self, LedgerError::StorageUnavailable(_))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(value: sqlx::Error) -> Self {
        LedgerError::StorageUnavailable(value.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("External error: {0}")]
    External(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AppError::Ledger(err) => ledger_error_response(err),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg).into_response(),
            AppError::External(msg) => (StatusCode::BAD_GATEWAY, msg).into_response(),
        }
    }
}

fn ledger_error_response(err: LedgerError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        LedgerError::InsufficientFunds { account_id, requested, available } => (
            StatusCode::PAYMENT_REQUIRED,
            Json(json!({
                "error": "insufficient_funds",
                "message": message,
                "account_id": account_id,
                "requested": requested,
                "available": available,
            })),
        )
            .into_response(),
        LedgerError::NotFound(_) | LedgerError::NotSubAccount { .. } => {
            (StatusCode::NOT_FOUND, message).into_response()
        }
        LedgerError::CapacityExceeded { owner_account_id, limit } => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": "capacity_exceeded",
                "message": message,
                "owner_account_id": owner_account_id,
                "limit": limit,
            })),
        )
            .into_response(),
        LedgerError::AccountRetired(_)
        | LedgerError::ExternalReferenceConflict(_)
        | LedgerError::AccountExists(_) => (StatusCode::CONFLICT, message).into_response(),
        LedgerError::InvalidAmount(_)
        | LedgerError::InvalidReference(_)
        | LedgerError::NotPrimaryAccount(_)
        | LedgerError::SelfTransfer(_) => (StatusCode::BAD_REQUEST, message).into_response(),
        LedgerError::ProjectionOutOfRange(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
        }
        LedgerError::StorageUnavailable(_) => {
            let mut headers = HeaderMap::new();
            headers.insert("Retry-After", HeaderValue::from_static("5"));
            (StatusCode::SERVICE_UNAVAILABLE, headers, "Storage unavailable").into_response()
        }
    }
}
