use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    Account, CreateSubAccount, RetiredSubAccount, SubAccountCreated, SubAccountPermissions,
    TransferOutcome, TransferRequest,
};
use crate::state::AppState;

// Mounted under /api/accounts
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id/sub-accounts", get(list_sub_accounts).post(create_sub_account))
        .route("/:id/sub-accounts/:sub_id", delete(retire_sub_account))
        .route("/:id/sub-accounts/:sub_id/transfer", post(transfer_to_sub_account))
        .route("/:id/sub-accounts/:sub_id/reclaim", post(reclaim_from_sub_account))
        .route("/:id/sub-accounts/:sub_id/permissions", put(update_permissions))
}

pub async fn list_sub_accounts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Account>>, AppError> {
    info!("GET /accounts/{}/sub-accounts - Listing sub-accounts", id);
    let subs = state.delegation.list_sub_accounts(id).await.map_err(|e| {
        error!("Failed to list sub-accounts of {}: {}", id, e);
        e
    })?;
    Ok(Json(subs))
}

pub async fn create_sub_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(data): Json<CreateSubAccount>,
) -> Result<(StatusCode, Json<SubAccountCreated>), AppError> {
    info!(
        "POST /accounts/{}/sub-accounts - Creating sub-account (initial transfer {})",
        id, data.initial_transfer
    );
    let created = state.delegation.create_sub_account(id, data).await.map_err(|e| {
        error!("Failed to create sub-account under {}: {}", id, e);
        e
    })?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn transfer_to_sub_account(
    State(state): State<AppState>,
    Path((id, sub_id)): Path<(Uuid, Uuid)>,
    Json(data): Json<TransferRequest>,
) -> Result<Json<TransferOutcome>, AppError> {
    info!("POST /accounts/{}/sub-accounts/{}/transfer - {}", id, sub_id, data.amount);
    let outcome = state
        .delegation
        .transfer_funds(id, sub_id, data.amount)
        .await
        .map_err(|e| {
            error!("Failed to transfer from {} to {}: {}", id, sub_id, e);
            e
        })?;
    Ok(Json(outcome))
}

pub async fn reclaim_from_sub_account(
    State(state): State<AppState>,
    Path((id, sub_id)): Path<(Uuid, Uuid)>,
    Json(data): Json<TransferRequest>,
) -> Result<Json<TransferOutcome>, AppError> {
    info!("POST /accounts/{}/sub-accounts/{}/reclaim - {}", id, sub_id, data.amount);
    let outcome = state
        .delegation
        .reclaim_funds(id, sub_id, data.amount)
        .await
        .map_err(|e| {
            error!("Failed to reclaim from {} to {}: {}", sub_id, id, e);
            e
        })?;
    Ok(Json(outcome))
}

pub async fn update_permissions(
    State(state): State<AppState>,
    Path((id, sub_id)): Path<(Uuid, Uuid)>,
    Json(data): Json<SubAccountPermissions>,
) -> Result<Json<Account>, AppError> {
    info!("PUT /accounts/{}/sub-accounts/{}/permissions", id, sub_id);
    let account = state
        .delegation
        .update_permissions(id, sub_id, data)
        .await
        .map_err(|e| {
            error!("Failed to update permissions of {}: {}", sub_id, e);
            e
        })?;
    Ok(Json(account))
}

pub async fn retire_sub_account(
    State(state): State<AppState>,
    Path((id, sub_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<RetiredSubAccount>, AppError> {
    info!("DELETE /accounts/{}/sub-accounts/{} - Retiring sub-account", id, sub_id);
    let retired = state
        .delegation
        .retire_sub_account(id, sub_id)
        .await
        .map_err(|e| {
            error!("Failed to retire sub-account {}: {}", sub_id, e);
            e
        })?;
    Ok(Json(retired))
}
