//! Ledger Reconciliation Background Job
//!
//! Runs on `RECONCILIATION_SCHEDULE` (default: hourly at :20) and checks
//! every account's cached balance against its transaction log, plus any
//! transfer whose debit leg never got its matching credit. Repairs are only
//! applied when `RECONCILIATION_AUTO_REPAIR` is set; otherwise findings are
//! logged at `error` for an operator to act on.

use crate::errors::AppError;
use crate::services::job_scheduler_service::{JobContext, JobResult};
use tracing::{info, warn};

pub async fn reconcile_ledger(ctx: JobContext) -> Result<JobResult, AppError> {
    let report = ctx.reconciliation.run(ctx.auto_repair).await?;

    let unresolved_drifts = report.drifts.iter().filter(|d| !d.repaired).count();
    let unresolved_transfers = report
        .orphaned_transfers
        .len()
        .saturating_sub(report.transfers_reversed);
    let failed = report.accounts_failed + unresolved_drifts + unresolved_transfers;

    if report.is_clean() {
        info!("Ledger is consistent across {} accounts", report.accounts_checked);
    } else if failed > 0 {
        warn!(
            "Ledger reconciliation left {} unresolved finding(s); rerun with repair or investigate",
            failed
        );
    }

    Ok(JobResult {
        items_processed: (report.accounts_checked - report.accounts_failed) as i32,
        items_failed: failed as i32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::job_scheduler_service::JobRunLog;
    use crate::services::ledger_service::LedgerService;
    use crate::services::reconciliation_service::ReconciliationService;
    use crate::store::{AccountStore, LedgerBackend, LedgerUnit, MemoryLedgerStore};
    use std::sync::Arc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_job_counts_unrepaired_drift_as_failed() {
        let store = MemoryLedgerStore::new();
        let ledger = LedgerService::new(Arc::new(store.clone()));
        let account = ledger.open_primary_account(Uuid::new_v4()).await.unwrap();
        ledger.credit(account.id, 100, "topup", None).await.unwrap();

        let mut unit = store.begin().await.unwrap();
        unit.lock_accounts(&[account.id]).await.unwrap();
        unit.set_balance(account.id, 10).await.unwrap();
        unit.commit().await.unwrap();

        let mut ctx = JobContext {
            reconciliation: ReconciliationService::new(ledger.clone()),
            auto_repair: false,
            job_runs: Arc::new(JobRunLog::new()),
        };
        let result = reconcile_ledger(ctx.clone()).await.unwrap();
        assert_eq!(result, JobResult { items_processed: 1, items_failed: 1 });

        ctx.auto_repair = true;
        let result = reconcile_ledger(ctx).await.unwrap();
        assert_eq!(result.items_failed, 0);
        assert_eq!(ledger.balance(account.id).await.unwrap(), 100);
    }
}
