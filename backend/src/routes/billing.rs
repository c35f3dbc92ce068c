use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use tracing::{error, info};

use crate::errors::AppError;
use crate::models::{NumberPurchaseCharge, NumberPurchaseReceipt, SmsCharge, SmsChargeReceipt};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sms", post(charge_sms))
        .route("/numbers", post(charge_number_purchase))
}

pub async fn charge_sms(
    State(state): State<AppState>,
    Json(data): Json<SmsCharge>,
) -> Result<Json<SmsChargeReceipt>, AppError> {
    info!("POST /billing/sms - Charging account {}", data.account_id);
    let receipt = state
        .billing
        .charge_sms(data.account_id, &data.recipient, &data.body)
        .await
        .map_err(|e| {
            error!("Failed to charge SMS to account {}: {}", data.account_id, e);
            e
        })?;
    Ok(Json(receipt))
}

pub async fn charge_number_purchase(
    State(state): State<AppState>,
    Json(data): Json<NumberPurchaseCharge>,
) -> Result<Json<NumberPurchaseReceipt>, AppError> {
    info!(
        "POST /billing/numbers - Charging account {} for {}",
        data.account_id, data.phone_number
    );
    let receipt = state
        .billing
        .charge_number_purchase(data.account_id, &data.phone_number, data.price)
        .await
        .map_err(|e| {
            error!("Failed to charge number purchase to account {}: {}", data.account_id, e);
            e
        })?;
    Ok(Json(receipt))
}
