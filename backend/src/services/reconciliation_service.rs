//! Reconciliation Service
//!
//! Offline check of the ledger invariants. For every account the cached
//! balance is compared with the projection of its completed records, and
//! transfers whose debit legs were never matched by credits are reported.
//! With `repair`, orphaned transfers are reversed first (the reversal is a
//! new credit, so it changes the projection) and drifted balances are then
//! re-projected from the log.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use crate::errors::LedgerError;
use crate::models::ReconciliationReport;
use crate::services::ledger_service::LedgerService;

const ACCOUNT_CHECK_CONCURRENCY: usize = 8;

#[derive(Clone)]
pub struct ReconciliationService {
    ledger: LedgerService,
}

impl ReconciliationService {
    pub fn new(ledger: LedgerService) -> Self {
        Self { ledger }
    }

    pub async fn run(&self, repair: bool) -> Result<ReconciliationReport, LedgerError> {
        let started_at = Utc::now();
        info!("Starting ledger reconciliation (repair: {})", repair);

        let orphaned_transfers = self.ledger.unbalanced_transfers().await?;
        let mut transfers_reversed = 0;
        for orphan in &orphaned_transfers {
            error!(
                "Transfer {} debited {} from account {} but credited only {}",
                orphan.transfer_id, orphan.debited, orphan.debited_account_id, orphan.credited
            );
            if !repair {
                continue;
            }
            match self.ledger.reverse_orphaned_transfer(orphan).await {
                Ok(Some(_)) => transfers_reversed += 1,
                Ok(None) => {}
                Err(e) => warn!("Could not reverse transfer {}: {}", orphan.transfer_id, e),
            }
        }

        let account_ids = self.ledger.account_ids().await?;
        let checks: Vec<_> = stream::iter(account_ids.iter().copied())
            .map(|account_id| async move { (account_id, self.ledger.check_balance(account_id, repair).await) })
            .buffer_unordered(ACCOUNT_CHECK_CONCURRENCY)
            .collect()
            .await;

        let mut drifts = Vec::new();
        let mut accounts_failed = 0;
        for (account_id, outcome) in checks {
            match outcome {
                Ok(Some(drift)) => {
                    error!(
                        "Balance drift on account {}: recorded {}, ledger {} (repaired: {})",
                        drift.account_id, drift.recorded_balance, drift.projected_balance, drift.repaired
                    );
                    drifts.push(drift);
                }
                Ok(None) => {}
                Err(e) => {
                    accounts_failed += 1;
                    warn!("Could not reconcile account {}: {}", account_id, e);
                }
            }
        }
        drifts.sort_by_key(|d| d.account_id);

        let report = ReconciliationReport {
            accounts_checked: account_ids.len(),
            accounts_failed,
            drifts,
            orphaned_transfers,
            transfers_reversed,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            "Reconciliation finished: {} accounts, {} drifted, {} orphaned transfers ({} reversed)",
            report.accounts_checked,
            report.drifts.len(),
            report.orphaned_transfers.len(),
            report.transfers_reversed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::models::{Direction, MinorUnits, NewTransaction};
    use crate::store::{AccountStore, LedgerBackend, LedgerUnit, MemoryLedgerStore, TransactionLog};

    fn service() -> (MemoryLedgerStore, LedgerService, ReconciliationService) {
        let store = MemoryLedgerStore::new();
        let ledger = LedgerService::new(Arc::new(store.clone()));
        let reconciliation = ReconciliationService::new(ledger.clone());
        (store, ledger, reconciliation)
    }

    /// Write a debit leg with no matching credit, as a crash between the two
    /// legs of a non-atomic transfer would leave behind.
    async fn orphan_debit(store: &MemoryLedgerStore, account_id: Uuid, amount: MinorUnits) -> Uuid {
        let transfer_id = Uuid::new_v4();
        let mut unit = store.begin().await.unwrap();
        unit.lock_accounts(&[account_id]).await.unwrap();
        let balance = unit.get_balance(account_id).await.unwrap();
        unit.append(
            NewTransaction::completed(account_id, Direction::Debit, amount, "transfer to sub-account")
                .with_transfer_id(Some(transfer_id)),
        )
        .await
        .unwrap();
        unit.set_balance(account_id, balance - amount).await.unwrap();
        unit.commit().await.unwrap();
        transfer_id
    }

    #[tokio::test]
    async fn test_clean_ledger_reports_nothing() {
        let (_, ledger, reconciliation) = service();
        let account = ledger.open_primary_account(Uuid::new_v4()).await.unwrap();
        ledger.credit(account.id, 1000, "topup", None).await.unwrap();
        ledger.debit(account.id, 250, "sms").await.unwrap();

        let report = reconciliation.run(false).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.accounts_checked, 1);
    }

    #[tokio::test]
    async fn test_orphaned_transfer_is_reported_then_reversed() {
        let (store, ledger, reconciliation) = service();
        let account = ledger.open_primary_account(Uuid::new_v4()).await.unwrap();
        ledger.credit(account.id, 1000, "topup", None).await.unwrap();
        let transfer_id = orphan_debit(&store, account.id, 400).await;

        let report = reconciliation.run(false).await.unwrap();
        assert_eq!(report.orphaned_transfers.len(), 1);
        assert_eq!(report.orphaned_transfers[0].transfer_id, transfer_id);
        assert_eq!(report.orphaned_transfers[0].missing(), 400);
        assert_eq!(report.transfers_reversed, 0);
        assert_eq!(ledger.balance(account.id).await.unwrap(), 600);

        let repaired = reconciliation.run(true).await.unwrap();
        assert_eq!(repaired.transfers_reversed, 1);
        assert!(repaired.drifts.is_empty());
        assert_eq!(ledger.balance(account.id).await.unwrap(), 1000);

        assert!(reconciliation.run(false).await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_drift_is_repaired_from_the_log() {
        let (store, ledger, reconciliation) = service();
        let account = ledger.open_primary_account(Uuid::new_v4()).await.unwrap();
        ledger.credit(account.id, 700, "topup", None).await.unwrap();

        let mut unit = store.begin().await.unwrap();
        unit.lock_accounts(&[account.id]).await.unwrap();
        unit.set_balance(account.id, 50).await.unwrap();
        unit.commit().await.unwrap();

        let report = reconciliation.run(true).await.unwrap();
        assert_eq!(report.drifts.len(), 1);
        assert!(report.drifts[0].repaired);
        assert_eq!(report.drifts[0].recorded_balance, 50);
        assert_eq!(ledger.balance(account.id).await.unwrap(), 700);
    }

    #[tokio::test]
    async fn test_storage_outage_fails_the_run() {
        let (store, _, reconciliation) = service();
        store.set_unavailable(true);

        let err = reconciliation.run(false).await.unwrap_err();
        assert!(err.is_systemic());
    }

    #[tokio::test]
    async fn test_lifetime_totals_past_i64_do_not_abort_the_run() {
        let (store, ledger, reconciliation) = service();
        let busy = ledger.open_primary_account(Uuid::new_v4()).await.unwrap();
        ledger.credit(busy.id, MinorUnits::MAX - 1, "topup", None).await.unwrap();
        ledger.debit(busy.id, MinorUnits::MAX - 1, "spend").await.unwrap();
        ledger.credit(busy.id, 2, "topup", None).await.unwrap();

        // Two maximal credits written past the ledger: no balance can match them.
        let broken = ledger.open_primary_account(Uuid::new_v4()).await.unwrap();
        let mut unit = store.begin().await.unwrap();
        unit.lock_accounts(&[broken.id]).await.unwrap();
        for _ in 0..2 {
            unit.append(NewTransaction::completed(broken.id, Direction::Credit, MinorUnits::MAX, "import"))
                .await
                .unwrap();
        }
        unit.commit().await.unwrap();

        let report = reconciliation.run(true).await.unwrap();
        assert_eq!(report.accounts_checked, 2);
        assert_eq!(report.accounts_failed, 1);
        assert!(report.drifts.is_empty());
        assert_eq!(ledger.balance(busy.id).await.unwrap(), 2);
    }
}
