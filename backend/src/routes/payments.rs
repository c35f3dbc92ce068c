use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use tracing::{error, info};

use crate::errors::AppError;
use crate::models::{ConfirmPayment, PostingReceipt};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/confirm", post(confirm_payment))
}

/// Payment-processor confirmation. Safe to deliver more than once.
pub async fn confirm_payment(
    State(state): State<AppState>,
    Json(data): Json<ConfirmPayment>,
) -> Result<Json<PostingReceipt>, AppError> {
    info!(
        "POST /payments/confirm - Payment {} for account {}",
        data.external_payment_id, data.account_id
    );
    let receipt = state
        .payments
        .confirm_external_payment(data.account_id, data.amount, &data.external_payment_id)
        .await
        .map_err(|e| {
            error!("Failed to confirm payment {}: {}", data.external_payment_id, e);
            e
        })?;
    Ok(Json(receipt))
}
