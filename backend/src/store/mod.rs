//! Persistence boundary of the ledger.
//!
//! `AccountStore` and `TransactionLog` carry no business validation; they are
//! implemented together by a [`LedgerUnit`], a unit of work whose writes become
//! visible atomically on [`LedgerUnit::commit`] and are discarded if the unit is
//! dropped. Callers must hold the account lock (see [`LedgerUnit::lock_accounts`])
//! before reading a balance they intend to overwrite.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::LedgerError;
use crate::models::{
    Account, LedgerTotals, MinorUnits, NewTransaction, Page, PageRequest, TransactionRecord,
    TransferImbalance,
};

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

#[async_trait]
pub trait AccountStore: Send {
    async fn fetch_account(&mut self, id: Uuid) -> Result<Option<Account>, LedgerError>;

    async fn get_balance(&mut self, id: Uuid) -> Result<MinorUnits, LedgerError> {
        self.fetch_account(id)
            .await?
            .map(|account| account.balance)
            .ok_or_else(|| LedgerError::account_not_found(id))
    }

    /// Unconditional overwrite; only the ledger calls this, after validating the amount.
    async fn set_balance(&mut self, id: Uuid, balance: MinorUnits) -> Result<(), LedgerError>;

    async fn insert_account(&mut self, account: &Account) -> Result<(), LedgerError>;

    /// Persist status, label and permissions. Balance is only changed through `set_balance`.
    async fn update_account(&mut self, account: &Account) -> Result<(), LedgerError>;

    async fn find_primary_account(&mut self, user_id: Uuid) -> Result<Option<Account>, LedgerError>;

    /// All sub-accounts of an owner, retired ones included.
    async fn list_sub_accounts(&mut self, owner_account_id: Uuid) -> Result<Vec<Account>, LedgerError>;

    async fn list_account_ids(&mut self) -> Result<Vec<Uuid>, LedgerError>;
}

#[async_trait]
pub trait TransactionLog: Send {
    /// Write once; the log assigns id, sequence and creation time.
    async fn append(&mut self, record: NewTransaction) -> Result<TransactionRecord, LedgerError>;

    async fn find_by_external_reference(
        &mut self,
        reference: &str,
    ) -> Result<Option<TransactionRecord>, LedgerError>;

    /// Newest first.
    async fn list_by_account(
        &mut self,
        account_id: Uuid,
        page: &PageRequest,
    ) -> Result<Page<TransactionRecord>, LedgerError>;

    async fn ledger_totals(&mut self, account_id: Uuid) -> Result<LedgerTotals, LedgerError>;

    async fn transfer_legs(&mut self, transfer_id: Uuid) -> Result<Vec<TransactionRecord>, LedgerError>;

    async fn unbalanced_transfers(&mut self) -> Result<Vec<TransferImbalance>, LedgerError>;
}

#[async_trait]
pub trait LedgerUnit: AccountStore + TransactionLog {
    /// Take exclusive locks on the given accounts, in ascending id order, held
    /// until the unit commits or is dropped.
    async fn lock_accounts(&mut self, ids: &[Uuid]) -> Result<(), LedgerError>;

    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;
}

#[async_trait]
pub trait LedgerBackend: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, LedgerError>;
}

/// Sorted, de-duplicated lock order shared by every backend.
pub(crate) fn lock_order(ids: &[Uuid]) -> Vec<Uuid> {
    let mut ordered = ids.to_vec();
    ordered.sort();
    ordered.dedup();
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_order_sorts_and_dedups() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        assert_eq!(lock_order(&[b, a, b]), vec![a, b]);
    }
}
