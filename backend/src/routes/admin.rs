use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{error, info, warn};

use crate::errors::AppError;
use crate::models::{ReconcileParams, ReconciliationReport};
use crate::services::job_scheduler_service::JobRun;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reconcile", post(run_reconciliation))
        .route("/jobs", get(recent_job_runs))
}

/// Run reconciliation now. Repairs are only applied with `?repair=true`.
pub async fn run_reconciliation(
    State(state): State<AppState>,
    Query(params): Query<ReconcileParams>,
) -> Result<Json<ReconciliationReport>, AppError> {
    info!("POST /admin/reconcile - Running reconciliation (repair: {})", params.repair);
    let report = state.reconciliation.run(params.repair).await.map_err(|e| {
        error!("Reconciliation failed: {}", e);
        e
    })?;
    if !report.is_clean() {
        warn!(
            "Reconciliation found {} drift(s) and {} orphaned transfer(s)",
            report.drifts.len(),
            report.orphaned_transfers.len()
        );
    }
    Ok(Json(report))
}

/// GET /api/admin/jobs - Latest run of each background job
pub async fn recent_job_runs(State(state): State<AppState>) -> Json<Vec<JobRun>> {
    info!("GET /admin/jobs - Listing recent job runs");
    Json(state.job_runs.recent())
}
