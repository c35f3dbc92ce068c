//! Ledger Service
//!
//! The only component that mutates balances. Every mutation appends a
//! `TransactionRecord` first and then projects the new balance into the
//! account store, inside one [`LedgerUnit`] that holds the account lock, so
//! `balance == sum(credits) - sum(debits)` and `balance >= 0` hold after every
//! committed unit.
//!
//! Multi-account operations (transfers, sub-account funding) run both legs in
//! the same unit; the shared `transfer_id` on the legs lets reconciliation
//! detect a debit without its credit on stores that cannot commit atomically.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::LedgerError;
use crate::models::{
    Account, BalanceDrift, Direction, MinorUnits, NewTransaction, Page, PageRequest,
    PostingReceipt, TransactionRecord, TransferImbalance,
};
use crate::store::{AccountStore, LedgerBackend, LedgerUnit, TransactionLog};

/// One requested balance change.
#[derive(Debug, Clone, Copy)]
pub struct Posting<'a> {
    pub account_id: Uuid,
    pub amount: MinorUnits,
    pub description: &'a str,
    pub external_reference: Option<&'a str>,
    pub transfer_id: Option<Uuid>,
}

impl<'a> Posting<'a> {
    pub fn new(account_id: Uuid, amount: MinorUnits, description: &'a str) -> Self {
        Self {
            account_id,
            amount,
            description,
            external_reference: None,
            transfer_id: None,
        }
    }

    pub fn with_external_reference(mut self, reference: Option<&'a str>) -> Self {
        self.external_reference = reference;
        self
    }

    pub fn with_transfer_id(mut self, transfer_id: Uuid) -> Self {
        self.transfer_id = Some(transfer_id);
        self
    }
}

#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub transfer_id: Uuid,
    pub debit: PostingReceipt,
    pub credit: PostingReceipt,
}

#[derive(Clone)]
pub struct LedgerService {
    backend: Arc<dyn LedgerBackend>,
}

impl LedgerService {
    pub fn new(backend: Arc<dyn LedgerBackend>) -> Self {
        Self { backend }
    }

    pub(crate) async fn begin(&self) -> Result<Box<dyn LedgerUnit>, LedgerError> {
        self.backend.begin().await
    }

    /// Create the user's primary account with a zero balance, or return the existing one.
    pub async fn open_primary_account(&self, user_id: Uuid) -> Result<Account, LedgerError> {
        let mut unit = self.begin().await?;
        if let Some(existing) = unit.find_primary_account(user_id).await? {
            return Ok(existing);
        }
        let account = Account::new_primary(user_id);
        let inserted = match unit.insert_account(&account).await {
            Ok(()) => unit.commit().await,
            Err(e) => Err(e),
        };
        match inserted {
            Ok(()) => {
                info!("Opened primary account {} for user {}", account.id, user_id);
                Ok(account)
            }
            // Lost a race with a concurrent open for the same user.
            Err(LedgerError::AccountExists(_)) => {
                let mut unit = self.begin().await?;
                unit.find_primary_account(user_id)
                    .await?
                    .ok_or(LedgerError::AccountExists(user_id))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn account(&self, account_id: Uuid) -> Result<Account, LedgerError> {
        let mut unit = self.begin().await?;
        unit.fetch_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::account_not_found(account_id))
    }

    pub async fn balance(&self, account_id: Uuid) -> Result<MinorUnits, LedgerError> {
        let mut unit = self.begin().await?;
        unit.get_balance(account_id).await
    }

    pub async fn history(
        &self,
        account_id: Uuid,
        page: &PageRequest,
    ) -> Result<Page<TransactionRecord>, LedgerError> {
        let mut unit = self.begin().await?;
        if unit.fetch_account(account_id).await?.is_none() {
            return Err(LedgerError::account_not_found(account_id));
        }
        unit.list_by_account(account_id, page).await
    }

    pub async fn credit(
        &self,
        account_id: Uuid,
        amount: MinorUnits,
        description: &str,
        external_reference: Option<&str>,
    ) -> Result<PostingReceipt, LedgerError> {
        let mut unit = self.begin().await?;
        unit.lock_accounts(&[account_id]).await?;
        let posting = Posting::new(account_id, amount, description)
            .with_external_reference(external_reference);
        let receipt = post_credit(unit.as_mut(), posting).await?;
        unit.commit().await?;
        Ok(receipt)
    }

    pub async fn debit(
        &self,
        account_id: Uuid,
        amount: MinorUnits,
        description: &str,
    ) -> Result<PostingReceipt, LedgerError> {
        let mut unit = self.begin().await?;
        unit.lock_accounts(&[account_id]).await?;
        let receipt = post_debit(unit.as_mut(), Posting::new(account_id, amount, description)).await?;
        unit.commit().await?;
        Ok(receipt)
    }

    /// Move funds between two accounts as one unit.
    pub async fn transfer(
        &self,
        from: Uuid,
        to: Uuid,
        amount: MinorUnits,
        debit_description: &str,
        credit_description: &str,
    ) -> Result<TransferReceipt, LedgerError> {
        let mut unit = self.begin().await?;
        unit.lock_accounts(&[from, to]).await?;
        let receipt = post_transfer(unit.as_mut(), from, to, amount, debit_description, credit_description).await?;
        unit.commit().await?;
        Ok(receipt)
    }

    pub async fn account_ids(&self) -> Result<Vec<Uuid>, LedgerError> {
        let mut unit = self.begin().await?;
        unit.list_account_ids().await
    }

    pub async fn unbalanced_transfers(&self) -> Result<Vec<TransferImbalance>, LedgerError> {
        let mut unit = self.begin().await?;
        unit.unbalanced_transfers().await
    }

    /// Compare an account's cached balance with its ledger projection. With
    /// `repair`, a drifted balance is re-projected when the projection is
    /// non-negative.
    pub async fn check_balance(
        &self,
        account_id: Uuid,
        repair: bool,
    ) -> Result<Option<BalanceDrift>, LedgerError> {
        let mut unit = self.begin().await?;
        unit.lock_accounts(&[account_id]).await?;
        let recorded = unit.get_balance(account_id).await?;
        let projected = unit
            .ledger_totals(account_id)
            .await?
            .projected_balance()
            .ok_or(LedgerError::ProjectionOutOfRange(account_id))?;
        if recorded == projected {
            return Ok(None);
        }

        let repaired = repair && projected >= 0;
        if repaired {
            unit.set_balance(account_id, projected).await?;
            unit.commit().await?;
            warn!(
                "Re-projected balance of account {} from {} to {}",
                account_id, recorded, projected
            );
        }
        Ok(Some(BalanceDrift {
            account_id,
            recorded_balance: recorded,
            projected_balance: projected,
            repaired,
        }))
    }

    /// Compensate a transfer whose credit leg never landed by crediting the
    /// missing amount back to the debited account under the same `transfer_id`.
    /// Returns `None` when the transfer is already balanced.
    pub async fn reverse_orphaned_transfer(
        &self,
        imbalance: &TransferImbalance,
    ) -> Result<Option<PostingReceipt>, LedgerError> {
        let mut unit = self.begin().await?;
        unit.lock_accounts(&[imbalance.debited_account_id]).await?;

        let legs = unit.transfer_legs(imbalance.transfer_id).await?;
        let missing: MinorUnits = -legs.iter().map(TransactionRecord::signed_amount).sum::<MinorUnits>();
        if missing <= 0 {
            return Ok(None);
        }

        let posting = Posting::new(imbalance.debited_account_id, missing, "Reversal of incomplete transfer")
            .with_transfer_id(imbalance.transfer_id);
        let receipt = post_credit(unit.as_mut(), posting).await?;
        unit.commit().await?;
        warn!(
            "Reversed incomplete transfer {}: credited {} back to account {}",
            imbalance.transfer_id, missing, imbalance.debited_account_id
        );
        Ok(Some(receipt))
    }
}

fn ensure_positive(amount: MinorUnits) -> Result<(), LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

async fn load_account(unit: &mut dyn LedgerUnit, account_id: Uuid) -> Result<Account, LedgerError> {
    unit.fetch_account(account_id)
        .await?
        .ok_or_else(|| LedgerError::account_not_found(account_id))
}

fn ensure_active(account: &Account) -> Result<(), LedgerError> {
    if !account.is_active() {
        return Err(LedgerError::AccountRetired(account.id));
    }
    Ok(())
}

/// Apply a credit inside a unit that already holds the account lock.
pub(crate) async fn post_credit(
    unit: &mut dyn LedgerUnit,
    posting: Posting<'_>,
) -> Result<PostingReceipt, LedgerError> {
    ensure_positive(posting.amount)?;
    let account = load_account(unit, posting.account_id).await?;

    if let Some(reference) = posting.external_reference {
        if let Some(existing) = unit.find_by_external_reference(reference).await? {
            if existing.account_id != account.id
                || existing.amount != posting.amount
                || existing.direction != Direction::Credit
            {
                warn!(
                    "External reference {} replayed against account {} with amount {} but was applied to {} for {}",
                    reference, account.id, posting.amount, existing.account_id, existing.amount
                );
                return Err(LedgerError::ExternalReferenceConflict(reference.to_string()));
            }
            info!("Replayed external reference {} on account {}; no new credit", reference, account.id);
            return Ok(PostingReceipt {
                transaction: existing,
                balance: account.balance,
                replayed: true,
            });
        }
    }

    ensure_active(&account)?;
    let balance = account
        .balance
        .checked_add(posting.amount)
        .ok_or_else(|| LedgerError::InvalidAmount(format!("credit of {} overflows balance", posting.amount)))?;

    let record = NewTransaction::completed(account.id, Direction::Credit, posting.amount, posting.description)
        .with_external_reference(posting.external_reference)
        .with_transfer_id(posting.transfer_id);
    let transaction = unit.append(record).await?;
    unit.set_balance(account.id, balance).await?;

    info!(
        "Credited {} to account {} (balance {} -> {}, tx {})",
        posting.amount, account.id, account.balance, balance, transaction.id
    );
    Ok(PostingReceipt {
        transaction,
        balance,
        replayed: false,
    })
}

/// Apply an all-or-nothing debit inside a unit that already holds the account lock.
pub(crate) async fn post_debit(
    unit: &mut dyn LedgerUnit,
    posting: Posting<'_>,
) -> Result<PostingReceipt, LedgerError> {
    ensure_positive(posting.amount)?;
    let account = load_account(unit, posting.account_id).await?;
    ensure_active(&account)?;

    if posting.amount > account.balance {
        warn!(
            "Rejected debit of {} from account {}: balance is {}",
            posting.amount, account.id, account.balance
        );
        return Err(LedgerError::InsufficientFunds {
            account_id: account.id,
            requested: posting.amount,
            available: account.balance,
        });
    }
    let balance = account.balance - posting.amount;

    let record = NewTransaction::completed(account.id, Direction::Debit, posting.amount, posting.description)
        .with_transfer_id(posting.transfer_id);
    let transaction = unit.append(record).await?;
    unit.set_balance(account.id, balance).await?;

    info!(
        "Debited {} from account {} (balance {} -> {}, tx {})",
        posting.amount, account.id, account.balance, balance, transaction.id
    );
    Ok(PostingReceipt {
        transaction,
        balance,
        replayed: false,
    })
}

/// Debit `from` and credit `to` under one fresh `transfer_id`. Both accounts must be locked.
pub(crate) async fn post_transfer(
    unit: &mut dyn LedgerUnit,
    from: Uuid,
    to: Uuid,
    amount: MinorUnits,
    debit_description: &str,
    credit_description: &str,
) -> Result<TransferReceipt, LedgerError> {
    if from == to {
        return Err(LedgerError::SelfTransfer(from));
    }
    let transfer_id = Uuid::new_v4();
    let debit = post_debit(unit, Posting::new(from, amount, debit_description).with_transfer_id(transfer_id)).await?;
    let credit = post_credit(unit, Posting::new(to, amount, credit_description).with_transfer_id(transfer_id)).await?;
    Ok(TransferReceipt {
        transfer_id,
        debit,
        credit,
    })
}
