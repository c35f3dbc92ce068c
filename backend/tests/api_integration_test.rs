/// HTTP API integration tests
///
/// Drives the full axum router over the in-memory ledger store with
/// `tower::ServiceExt::oneshot`, covering:
/// - account opening, credit/debit and paginated history
/// - payment confirmation replay
/// - sub-account lifecycle and the capacity limit
/// - SMS billing and permission checks
/// - error-to-status mapping (402, 404, 409, 400, 403, 503)
/// - reconciliation trigger

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use smsdash_backend::app::create_app;
use smsdash_backend::config::{AppConfig, StoreKind};
use smsdash_backend::state::AppState;
use smsdash_backend::store::MemoryLedgerStore;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_app() -> (MemoryLedgerStore, Router) {
    let store = MemoryLedgerStore::new();
    let config = AppConfig {
        store: StoreKind::Memory,
        sms_segment_cost: 4,
        job_scheduler_enabled: false,
        ..AppConfig::default()
    };
    let state = AppState::new(Arc::new(store.clone()), &config);
    (store, create_app(state))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn open_account(app: &Router) -> String {
    let (status, body) = send(app, Method::POST, "/api/accounts", Some(json!({ "user_id": Uuid::new_v4() }))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

async fn confirm(app: &Router, account_id: &str, amount: i64, reference: &str) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/api/payments/confirm",
        Some(json!({
            "account_id": account_id,
            "amount": amount,
            "external_payment_id": reference,
        })),
    )
    .await
}

// ---------------------------------------------------------------------------
// Accounts and payments
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_check() {
    let (_, app) = test_app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_open_account_and_read_balance() {
    let (_, app) = test_app();
    let id = open_account(&app).await;

    let (status, body) = send(&app, Method::GET, &format!("/api/accounts/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 0);
    assert_eq!(body["kind"], "primary");
    assert_eq!(body["status"], "active");
}

#[tokio::test]
async fn test_payment_confirmation_replay_is_idempotent() {
    let (store, app) = test_app();
    let id = open_account(&app).await;

    let (status, first) = confirm(&app, &id, 10_000, "pay_1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["balance"], 10_000);
    assert_eq!(first["replayed"], false);

    let (status, second) = confirm(&app, &id, 10_000, "pay_1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["replayed"], true);
    assert_eq!(second["transaction"]["id"], first["transaction"]["id"]);

    let account_id: Uuid = id.parse().unwrap();
    assert_eq!(store.transactions_for(account_id).len(), 1);

    let (status, _) = confirm(&app, &id, 9_999, "pay_1").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = confirm(&app, &id, 100, "  ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_debit_beyond_balance_returns_payment_required() {
    let (_, app) = test_app();
    let id = open_account(&app).await;
    confirm(&app, &id, 500, "pay_2").await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/accounts/{}/debit", id),
        Some(json!({ "amount": 1000, "description": "sms" })),
    )
    .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "insufficient_funds");
    assert_eq!(body["available"], 500);
    assert_eq!(body["requested"], 1000);
}

#[tokio::test]
async fn test_transaction_history_is_paginated_newest_first() {
    let (_, app) = test_app();
    let id = open_account(&app).await;
    for amount in 1..=3 {
        send(
            &app,
            Method::POST,
            &format!("/api/accounts/{}/credit", id),
            Some(json!({ "amount": amount, "description": "adjustment" })),
        )
        .await;
    }

    let (status, page) = send(&app, Method::GET, &format!("/api/accounts/{}/transactions?limit=2", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
    assert_eq!(page["items"][0]["amount"], 3);

    let cursor = page["next_cursor"].as_i64().unwrap();
    let (_, rest) = send(
        &app,
        Method::GET,
        &format!("/api/accounts/{}/transactions?limit=2&before={}", id, cursor),
        None,
    )
    .await;
    assert_eq!(rest["items"].as_array().unwrap().len(), 1);
    assert_eq!(rest["items"][0]["amount"], 1);
    assert!(rest["next_cursor"].is_null());
}

#[tokio::test]
async fn test_unknown_account_is_not_found() {
    let (_, app) = test_app();
    let (status, _) = send(&app, Method::GET, &format!("/api/accounts/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_storage_outage_returns_retryable_503() {
    let (store, app) = test_app();
    let id = open_account(&app).await;
    store.set_unavailable(true);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/accounts/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()["retry-after"], "5");
}

// ---------------------------------------------------------------------------
// Sub-accounts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sub_account_lifecycle() {
    let (_, app) = test_app();
    let owner = open_account(&app).await;
    confirm(&app, &owner, 5000, "pay_3").await;
    let base = format!("/api/accounts/{}/sub-accounts", owner);

    let (status, created) = send(&app, Method::POST, &base, Some(json!({ "initial_transfer": 2000, "label": "support" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["account"]["balance"], 2000);
    assert_eq!(created["funding"]["owner_balance"], 3000);
    let sub = created["account"]["id"].as_str().unwrap().to_string();

    let (status, moved) = send(&app, Method::POST, &format!("{}/{}/transfer", base, sub), Some(json!({ "amount": 500 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["sub_balance"], 2500);

    let (status, back) = send(&app, Method::POST, &format!("{}/{}/reclaim", base, sub), Some(json!({ "amount": 100 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(back["owner_balance"], 2600);

    let (status, updated) = send(
        &app,
        Method::PUT,
        &format!("{}/{}/permissions", base, sub),
        Some(json!({ "send_sms": false, "view_billing": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["permissions"]["send_sms"], false);

    let (status, retired) = send(&app, Method::DELETE, &format!("{}/{}", base, sub), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(retired["swept"], 2400);
    assert_eq!(retired["owner_balance"], 5000);

    let (status, list) = send(&app, Method::GET, &base, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list[0]["status"], "retired");
}

#[tokio::test]
async fn test_sub_account_capacity_and_funding_errors() {
    let (_, app) = test_app();
    let owner = open_account(&app).await;
    let base = format!("/api/accounts/{}/sub-accounts", owner);

    let (status, _) = send(&app, Method::POST, &base, Some(json!({ "initial_transfer": 10 }))).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

    for _ in 0..3 {
        let (status, _) = send(&app, Method::POST, &base, Some(json!({}))).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, body) = send(&app, Method::POST, &base, Some(json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "capacity_exceeded");
    assert_eq!(body["limit"], 3);

    let stranger = Uuid::new_v4();
    let (status, _) = send(&app, Method::POST, &format!("{}/{}/transfer", base, stranger), Some(json!({ "amount": 1 }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Billing and administration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sms_billing_and_permissions() {
    let (_, app) = test_app();
    let owner = open_account(&app).await;
    confirm(&app, &owner, 1000, "pay_4").await;
    let (_, created) = send(
        &app,
        Method::POST,
        &format!("/api/accounts/{}/sub-accounts", owner),
        Some(json!({ "initial_transfer": 100 })),
    )
    .await;
    let sub = created["account"]["id"].as_str().unwrap().to_string();

    let (status, receipt) = send(
        &app,
        Method::POST,
        "/api/billing/sms",
        Some(json!({ "account_id": sub, "recipient": "+14155550123", "body": "Your code is 123456" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["cost"], 4);
    assert_eq!(receipt["balance"], 96);
    assert_eq!(receipt["segments"]["encoding"], "gsm7");
    assert_eq!(receipt["transaction"]["description"], "SMS to +*******0123");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/billing/numbers",
        Some(json!({ "account_id": sub, "phone_number": "+14155550100", "price": 50 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/billing/sms",
        Some(json!({ "account_id": owner, "recipient": "not-a-number", "body": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reconcile_endpoint_reports_clean_ledger() {
    let (_, app) = test_app();
    let owner = open_account(&app).await;
    confirm(&app, &owner, 1000, "pay_5").await;

    let (status, report) = send(&app, Method::POST, "/api/admin/reconcile?repair=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["accounts_checked"], 1);
    assert!(report["drifts"].as_array().unwrap().is_empty());
    assert!(report["orphaned_transfers"].as_array().unwrap().is_empty());

    let (status, runs) = send(&app, Method::GET, "/api/admin/jobs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(runs.as_array().unwrap().is_empty());
}
