use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::error;
use uuid::Uuid;

use super::{lock_order, AccountStore, LedgerBackend, LedgerUnit, TransactionLog};
use crate::db::{account_queries, transaction_queries};
use crate::errors::LedgerError;
use crate::models::{
    Account, LedgerTotals, MinorUnits, NewTransaction, Page, PageRequest, TransactionRecord,
    TransferImbalance,
};

const EXTERNAL_REFERENCE_CONSTRAINT: &str = "transactions_external_reference_key";
const PRIMARY_PER_USER_CONSTRAINT: &str = "accounts_primary_per_user";

/// PostgreSQL-backed ledger. Each unit is one database transaction; account
/// locks are `SELECT ... FOR UPDATE` row locks.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerBackend for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, LedgerError> {
        let tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to begin ledger transaction: {}", e);
            LedgerError::from(e)
        })?;
        Ok(Box::new(PgUnit { tx }))
    }
}

pub struct PgUnit {
    tx: Transaction<'static, Postgres>,
}

fn corrupt(what: &str, err: String) -> LedgerError {
    error!("Corrupt {} row: {}", what, err);
    LedgerError::StorageUnavailable(format!("corrupt {} row: {}", what, err))
}

fn to_account(row: account_queries::AccountRow) -> Result<Account, LedgerError> {
    Account::try_from(row).map_err(|e| corrupt("account", e))
}

fn to_record(row: transaction_queries::TransactionRow) -> Result<TransactionRecord, LedgerError> {
    TransactionRecord::try_from(row).map_err(|e| corrupt("transaction", e))
}

/// Translate unique-index violations into their domain meaning.
fn map_write_error(err: sqlx::Error, reference: Option<&str>, user_id: Option<Uuid>) -> LedgerError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.constraint() {
            Some(EXTERNAL_REFERENCE_CONSTRAINT) => {
                return LedgerError::ExternalReferenceConflict(reference.unwrap_or_default().to_string());
            }
            Some(PRIMARY_PER_USER_CONSTRAINT) => {
                if let Some(user_id) = user_id {
                    return LedgerError::AccountExists(user_id);
                }
            }
            _ => {}
        }
    }
    LedgerError::from(err)
}

#[async_trait]
impl AccountStore for PgUnit {
    async fn fetch_account(&mut self, id: Uuid) -> Result<Option<Account>, LedgerError> {
        account_queries::fetch_one(&mut *self.tx, id)
            .await?
            .map(to_account)
            .transpose()
    }

    async fn set_balance(&mut self, id: Uuid, balance: MinorUnits) -> Result<(), LedgerError> {
        match account_queries::update_balance(&mut *self.tx, id, balance).await? {
            0 => Err(LedgerError::account_not_found(id)),
            _ => Ok(()),
        }
    }

    async fn insert_account(&mut self, account: &Account) -> Result<(), LedgerError> {
        account_queries::insert(&mut *self.tx, account)
            .await
            .map_err(|e| map_write_error(e, None, Some(account.owner_user_id)))
    }

    async fn update_account(&mut self, account: &Account) -> Result<(), LedgerError> {
        match account_queries::update_metadata(&mut *self.tx, account).await? {
            0 => Err(LedgerError::account_not_found(account.id)),
            _ => Ok(()),
        }
    }

    async fn find_primary_account(&mut self, user_id: Uuid) -> Result<Option<Account>, LedgerError> {
        account_queries::fetch_primary_for_user(&mut *self.tx, user_id)
            .await?
            .map(to_account)
            .transpose()
    }

    async fn list_sub_accounts(&mut self, owner_account_id: Uuid) -> Result<Vec<Account>, LedgerError> {
        account_queries::fetch_sub_accounts(&mut *self.tx, owner_account_id)
            .await?
            .into_iter()
            .map(to_account)
            .collect()
    }

    async fn list_account_ids(&mut self) -> Result<Vec<Uuid>, LedgerError> {
        Ok(account_queries::fetch_all_ids(&mut *self.tx).await?)
    }
}

#[async_trait]
impl TransactionLog for PgUnit {
    async fn append(&mut self, record: NewTransaction) -> Result<TransactionRecord, LedgerError> {
        let row = transaction_queries::insert(&mut *self.tx, &record)
            .await
            .map_err(|e| map_write_error(e, record.external_reference.as_deref(), None))?;
        to_record(row)
    }

    async fn find_by_external_reference(
        &mut self,
        reference: &str,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        transaction_queries::fetch_by_external_reference(&mut *self.tx, reference)
            .await?
            .map(to_record)
            .transpose()
    }

    async fn list_by_account(
        &mut self,
        account_id: Uuid,
        page: &PageRequest,
    ) -> Result<Page<TransactionRecord>, LedgerError> {
        let limit = page.limit();
        let records = transaction_queries::fetch_page(&mut *self.tx, account_id, page.before, limit)
            .await?
            .into_iter()
            .map(to_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::from_overfetch(records, limit))
    }

    async fn ledger_totals(&mut self, account_id: Uuid) -> Result<LedgerTotals, LedgerError> {
        let row = transaction_queries::fetch_totals(&mut *self.tx, account_id).await?;
        Ok(LedgerTotals {
            credits: row.credits,
            debits: row.debits,
        })
    }

    async fn transfer_legs(&mut self, transfer_id: Uuid) -> Result<Vec<TransactionRecord>, LedgerError> {
        transaction_queries::fetch_transfer_legs(&mut *self.tx, transfer_id)
            .await?
            .into_iter()
            .map(to_record)
            .collect()
    }

    async fn unbalanced_transfers(&mut self) -> Result<Vec<TransferImbalance>, LedgerError> {
        let rows = transaction_queries::fetch_unbalanced_transfers(&mut *self.tx).await?;
        Ok(rows
            .into_iter()
            .map(|row| TransferImbalance {
                transfer_id: row.transfer_id,
                debited_account_id: row.debited_account_id,
                debited: row.debited,
                credited: row.credited,
            })
            .collect())
    }
}

#[async_trait]
impl LedgerUnit for PgUnit {
    async fn lock_accounts(&mut self, ids: &[Uuid]) -> Result<(), LedgerError> {
        let ordered = lock_order(ids);
        account_queries::lock_for_update(&mut *self.tx, &ordered).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        self.tx.commit().await.map_err(|e| {
            error!("Failed to commit ledger transaction: {}", e);
            LedgerError::from(e)
        })
    }
}
