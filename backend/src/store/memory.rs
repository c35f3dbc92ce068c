use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{lock_order, AccountStore, LedgerBackend, LedgerUnit, TransactionLog};
use crate::errors::LedgerError;
use crate::models::{
    Account, AccountKind, Direction, LedgerTotals, MinorUnits, NewTransaction, Page, PageRequest,
    TransactionRecord, TransactionStatus, TransferImbalance,
};

#[derive(Default)]
struct MemoryData {
    accounts: HashMap<Uuid, Account>,
    transactions: Vec<TransactionRecord>,
    by_reference: HashMap<String, usize>,
    primary_by_user: HashMap<Uuid, Uuid>,
}

#[derive(Default)]
struct MemoryState {
    data: RwLock<MemoryData>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    sequence: AtomicI64,
    unavailable: AtomicBool,
    fail_next_commit: AtomicBool,
}

/// Process-local ledger store.
///
/// Per-account `tokio` mutexes give the single-writer-per-account discipline;
/// staged writes are applied under one write lock at commit, so a unit is
/// all-or-nothing. Used for tests and `LEDGER_STORE=memory` deployments.
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<MemoryState>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `StorageUnavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next commit, discarding that unit's writes.
    pub fn fail_next_commit(&self) {
        self.state.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Per-account lock entries currently held or awaited.
    pub fn lock_count(&self) -> usize {
        self.state.locks.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.state.data.read().transactions.len()
    }

    pub fn transactions_for(&self, account_id: Uuid) -> Vec<TransactionRecord> {
        self.state
            .data
            .read()
            .transactions
            .iter()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LedgerBackend for MemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, LedgerError> {
        if self.state.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(Box::new(MemoryUnit {
            state: self.state.clone(),
            locks: HeldLocks {
                state: self.state.clone(),
                held: Vec::new(),
            },
            accounts: HashMap::new(),
            inserted: Vec::new(),
            transactions: Vec::new(),
        }))
    }
}

fn unavailable() -> LedgerError {
    LedgerError::StorageUnavailable("in-memory store marked unavailable".to_string())
}

/// Account locks taken by one unit. An entry leaves the lock map once its
/// last holder or waiter is gone, so the map only tracks accounts in use.
struct HeldLocks {
    state: Arc<MemoryState>,
    held: Vec<(Uuid, OwnedMutexGuard<()>)>,
}

impl HeldLocks {
    fn holds(&self, id: Uuid) -> bool {
        self.held.iter().any(|(held, _)| *held == id)
    }
}

impl Drop for HeldLocks {
    fn drop(&mut self) {
        for (id, guard) in self.held.drain(..) {
            drop(guard);
            // Clones are only made under the shard lock, so a count of one means no waiter.
            self.state
                .locks
                .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}

pub struct MemoryUnit {
    state: Arc<MemoryState>,
    locks: HeldLocks,
    accounts: HashMap<Uuid, Account>,
    inserted: Vec<Uuid>,
    transactions: Vec<TransactionRecord>,
}

impl MemoryUnit {
    fn check_available(&self) -> Result<(), LedgerError> {
        if self.state.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }

    /// Committed records followed by this unit's staged ones.
    fn visible_transactions<F>(&self, mut keep: F) -> Vec<TransactionRecord>
    where
        F: FnMut(&TransactionRecord) -> bool,
    {
        let mut records: Vec<TransactionRecord> = {
            let data = self.state.data.read();
            data.transactions.iter().filter(|t| keep(t)).cloned().collect()
        };
        records.extend(self.transactions.iter().filter(|t| keep(t)).cloned());
        records
    }
}

#[async_trait]
impl AccountStore for MemoryUnit {
    async fn fetch_account(&mut self, id: Uuid) -> Result<Option<Account>, LedgerError> {
        self.check_available()?;
        if let Some(staged) = self.accounts.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.state.data.read().accounts.get(&id).cloned())
    }

    async fn set_balance(&mut self, id: Uuid, balance: MinorUnits) -> Result<(), LedgerError> {
        let mut account = self
            .fetch_account(id)
            .await?
            .ok_or_else(|| LedgerError::account_not_found(id))?;
        account.balance = balance;
        account.updated_at = Utc::now();
        self.accounts.insert(id, account);
        Ok(())
    }

    async fn insert_account(&mut self, account: &Account) -> Result<(), LedgerError> {
        self.check_available()?;
        self.accounts.insert(account.id, account.clone());
        self.inserted.push(account.id);
        Ok(())
    }

    async fn update_account(&mut self, account: &Account) -> Result<(), LedgerError> {
        let current = self
            .fetch_account(account.id)
            .await?
            .ok_or_else(|| LedgerError::account_not_found(account.id))?;
        let mut updated = account.clone();
        updated.balance = current.balance;
        updated.updated_at = Utc::now();
        self.accounts.insert(account.id, updated);
        Ok(())
    }

    async fn find_primary_account(&mut self, user_id: Uuid) -> Result<Option<Account>, LedgerError> {
        self.check_available()?;
        let staged = self
            .accounts
            .values()
            .find(|a| a.kind == AccountKind::Primary && a.owner_user_id == user_id)
            .cloned();
        if staged.is_some() {
            return Ok(staged);
        }
        let data = self.state.data.read();
        Ok(data
            .primary_by_user
            .get(&user_id)
            .and_then(|id| data.accounts.get(id))
            .cloned())
    }

    async fn list_sub_accounts(&mut self, owner_account_id: Uuid) -> Result<Vec<Account>, LedgerError> {
        self.check_available()?;
        let mut subs: HashMap<Uuid, Account> = {
            let data = self.state.data.read();
            data.accounts
                .values()
                .filter(|a| a.is_sub_account_of(owner_account_id))
                .map(|a| (a.id, a.clone()))
                .collect()
        };
        for staged in self.accounts.values().filter(|a| a.is_sub_account_of(owner_account_id)) {
            subs.insert(staged.id, staged.clone());
        }
        let mut subs: Vec<Account> = subs.into_values().collect();
        subs.sort_by_key(|a| (a.created_at, a.id));
        Ok(subs)
    }

    async fn list_account_ids(&mut self) -> Result<Vec<Uuid>, LedgerError> {
        self.check_available()?;
        let mut ids: Vec<Uuid> = self.state.data.read().accounts.keys().copied().collect();
        ids.extend(self.accounts.keys().copied());
        Ok(lock_order(&ids))
    }
}

#[async_trait]
impl TransactionLog for MemoryUnit {
    async fn append(&mut self, record: NewTransaction) -> Result<TransactionRecord, LedgerError> {
        self.check_available()?;
        let sequence = self.state.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let record = record.into_record(sequence);
        self.transactions.push(record.clone());
        Ok(record)
    }

    async fn find_by_external_reference(
        &mut self,
        reference: &str,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        self.check_available()?;
        if let Some(staged) = self
            .transactions
            .iter()
            .find(|t| t.external_reference.as_deref() == Some(reference))
        {
            return Ok(Some(staged.clone()));
        }
        let data = self.state.data.read();
        Ok(data
            .by_reference
            .get(reference)
            .and_then(|idx| data.transactions.get(*idx))
            .cloned())
    }

    async fn list_by_account(
        &mut self,
        account_id: Uuid,
        page: &PageRequest,
    ) -> Result<Page<TransactionRecord>, LedgerError> {
        self.check_available()?;
        let before = page.before;
        let mut records = self.visible_transactions(|t| {
            t.account_id == account_id && before.map_or(true, |cursor| t.sequence < cursor)
        });
        records.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        let limit = page.limit();
        records.truncate(limit as usize + 1);
        Ok(Page::from_overfetch(records, limit))
    }

    async fn ledger_totals(&mut self, account_id: Uuid) -> Result<LedgerTotals, LedgerError> {
        self.check_available()?;
        let records = self.visible_transactions(|t| {
            t.account_id == account_id && t.status == TransactionStatus::Completed
        });
        let mut totals = LedgerTotals::default();
        for record in records {
            totals.add(record.direction, record.amount);
        }
        Ok(totals)
    }

    async fn transfer_legs(&mut self, transfer_id: Uuid) -> Result<Vec<TransactionRecord>, LedgerError> {
        self.check_available()?;
        let mut legs = self.visible_transactions(|t| t.transfer_id == Some(transfer_id));
        legs.sort_by_key(|t| t.sequence);
        Ok(legs)
    }

    async fn unbalanced_transfers(&mut self) -> Result<Vec<TransferImbalance>, LedgerError> {
        self.check_available()?;
        let legs = self.visible_transactions(|t| {
            t.transfer_id.is_some() && t.status == TransactionStatus::Completed
        });
        Ok(find_imbalances(legs))
    }
}

/// Group transfer legs by `transfer_id` and keep those where debits exceed credits.
pub(crate) fn find_imbalances(mut legs: Vec<TransactionRecord>) -> Vec<TransferImbalance> {
    legs.sort_by_key(|t| t.sequence);
    let mut grouped: HashMap<Uuid, TransferImbalance> = HashMap::new();
    for leg in legs {
        let Some(transfer_id) = leg.transfer_id else {
            continue;
        };
        let entry = grouped.entry(transfer_id).or_insert(TransferImbalance {
            transfer_id,
            debited_account_id: leg.account_id,
            debited: 0,
            credited: 0,
        });
        match leg.direction {
            Direction::Debit => {
                if entry.debited == 0 {
                    entry.debited_account_id = leg.account_id;
                }
                entry.debited += leg.amount;
            }
            Direction::Credit => entry.credited += leg.amount,
        }
    }
    let mut imbalances: Vec<TransferImbalance> = grouped
        .into_values()
        .filter(|i| i.debited > i.credited)
        .collect();
    imbalances.sort_by_key(|i| i.transfer_id);
    imbalances
}

#[async_trait]
impl LedgerUnit for MemoryUnit {
    async fn lock_accounts(&mut self, ids: &[Uuid]) -> Result<(), LedgerError> {
        self.check_available()?;
        for id in lock_order(ids) {
            if self.locks.holds(id) {
                continue;
            }
            let lock = self.state.locks.entry(id).or_default().value().clone();
            let guard = lock.lock_owned().await;
            self.locks.held.push((id, guard));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        let unit = *self;
        unit.check_available()?;
        if unit.state.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::StorageUnavailable(
                "commit failed (injected)".to_string(),
            ));
        }

        let mut data = unit.state.data.write();

        for record in &unit.transactions {
            if let Some(reference) = &record.external_reference {
                if data.by_reference.contains_key(reference) {
                    return Err(LedgerError::ExternalReferenceConflict(reference.clone()));
                }
            }
        }
        for id in &unit.inserted {
            if let Some(account) = unit.accounts.get(id) {
                if account.kind == AccountKind::Primary
                    && data.primary_by_user.contains_key(&account.owner_user_id)
                {
                    return Err(LedgerError::AccountExists(account.owner_user_id));
                }
            }
        }

        for (id, account) in unit.accounts {
            if account.kind == AccountKind::Primary && unit.inserted.contains(&id) {
                data.primary_by_user.insert(account.owner_user_id, id);
            }
            data.accounts.insert(id, account);
        }
        for record in unit.transactions {
            if let Some(reference) = &record.external_reference {
                let idx = data.transactions.len();
                data.by_reference.insert(reference.clone(), idx);
            }
            data.transactions.push(record);
        }
        Ok(())
    }
}
