use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::routes::{accounts, admin, billing, health, payments, sub_accounts};
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::<AppState>::new()
        .nest("/health", health::router())
        .nest("/api/accounts", accounts::router().merge(sub_accounts::router()))
        .nest("/api/payments", payments::router())
        .nest("/api/billing", billing::router())
        .nest("/api/admin", admin::router())
        .layer(cors)
        .with_state(state)
}
