use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    AccountSummary, CreditRequest, DebitRequest, OpenAccount, Page, PageRequest, PostingReceipt,
    TransactionRecord,
};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(open_account))
        .route("/:id", get(get_account))
        .route("/:id/transactions", get(list_transactions))
        .route("/:id/credit", post(credit_account))
        .route("/:id/debit", post(debit_account))
}

pub async fn open_account(
    State(state): State<AppState>,
    Json(data): Json<OpenAccount>,
) -> Result<(StatusCode, Json<AccountSummary>), AppError> {
    info!("POST /accounts - Opening primary account for user {}", data.user_id);
    let account = state
        .ledger
        .open_primary_account(data.user_id)
        .await
        .map_err(|e| {
            error!("Failed to open account for user {}: {}", data.user_id, e);
            e
        })?;
    Ok((StatusCode::CREATED, Json(account.into())))
}

pub async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AccountSummary>, AppError> {
    info!("GET /accounts/{} - Fetching account", id);
    let account = state.ledger.account(id).await.map_err(|e| {
        error!("Failed to fetch account {}: {}", id, e);
        e
    })?;
    Ok(Json(account.into()))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<TransactionRecord>>, AppError> {
    info!(
        "GET /accounts/{}/transactions - before {:?}, limit {}",
        id,
        page.before,
        page.limit()
    );
    let history = state.ledger.history(id, &page).await.map_err(|e| {
        error!("Failed to fetch transactions for account {}: {}", id, e);
        e
    })?;
    Ok(Json(history))
}

pub async fn credit_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(data): Json<CreditRequest>,
) -> Result<Json<PostingReceipt>, AppError> {
    info!("POST /accounts/{}/credit - Crediting {}", id, data.amount);
    let reference = data
        .external_reference
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());
    let receipt = state
        .ledger
        .credit(id, data.amount, &data.description, reference)
        .await
        .map_err(|e| {
            error!("Failed to credit account {}: {}", id, e);
            e
        })?;
    Ok(Json(receipt))
}

pub async fn debit_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(data): Json<DebitRequest>,
) -> Result<Json<PostingReceipt>, AppError> {
    info!("POST /accounts/{}/debit - Debiting {}", id, data.amount);
    let receipt = state
        .ledger
        .debit(id, data.amount, &data.description)
        .await
        .map_err(|e| {
            error!("Failed to debit account {}: {}", id, e);
            e
        })?;
    Ok(Json(receipt))
}
