use tracing::info;
use uuid::Uuid;

use crate::errors::LedgerError;
use crate::models::{
    Account, AccountKind, AccountStatus, CreateSubAccount, MinorUnits, RetiredSubAccount,
    SubAccountCreated, SubAccountPermissions, TransferOutcome,
};
use crate::services::ledger_service::{post_transfer, LedgerService, TransferReceipt};
use crate::store::{AccountStore, LedgerUnit};

/// Hard cap on non-retired sub-accounts per owner.
pub const MAX_ACTIVE_SUB_ACCOUNTS: usize = 3;

const FUNDING_DEBIT: &str = "sub-account funding";
const FUNDING_CREDIT: &str = "initial funding from owner";
const TRANSFER_DEBIT: &str = "transfer to sub-account";
const TRANSFER_CREDIT: &str = "transfer from owner";
const RECLAIM_DEBIT: &str = "funds reclaimed by owner";
const RECLAIM_CREDIT: &str = "funds reclaimed from sub-account";

/// Sub-Account Delegation Manager.
///
/// Owns the per-owner cap and mediates owner <-> sub-account fund movement
/// through the ledger. Every operation locks the owner (and the sub-account
/// when it exists) for its whole unit, so the cap check and the funding legs
/// commit together.
#[derive(Clone)]
pub struct DelegationService {
    ledger: LedgerService,
}

impl DelegationService {
    pub fn new(ledger: LedgerService) -> Self {
        Self { ledger }
    }

    /// Create a sub-account, optionally funded from the owner.
    ///
    /// If the owner cannot cover `initial_transfer`, creation is rejected
    /// with `InsufficientFunds` and nothing is written.
    pub async fn create_sub_account(
        &self,
        owner_account_id: Uuid,
        input: CreateSubAccount,
    ) -> Result<SubAccountCreated, LedgerError> {
        if input.initial_transfer < 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "initial transfer cannot be negative, got {}",
                input.initial_transfer
            )));
        }

        let mut unit = self.ledger.begin().await?;
        unit.lock_accounts(&[owner_account_id]).await?;
        let owner = load_owner(unit.as_mut(), owner_account_id).await?;

        let active = unit
            .list_sub_accounts(owner.id)
            .await?
            .iter()
            .filter(|a| a.is_active())
            .count();
        if active >= MAX_ACTIVE_SUB_ACCOUNTS {
            return Err(LedgerError::CapacityExceeded {
                owner_account_id: owner.id,
                limit: MAX_ACTIVE_SUB_ACCOUNTS,
            });
        }

        let label = input
            .label
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        let mut sub = Account::new_sub(&owner, label, input.permissions.unwrap_or_default());
        unit.insert_account(&sub).await?;

        let funding = if input.initial_transfer > 0 {
            let receipt = post_transfer(
                unit.as_mut(),
                owner.id,
                sub.id,
                input.initial_transfer,
                FUNDING_DEBIT,
                FUNDING_CREDIT,
            )
            .await?;
            sub.balance = receipt.credit.balance;
            Some(outcome(&receipt))
        } else {
            None
        };

        unit.commit().await?;
        info!(
            "Created sub-account {} under {} ({} of {} active, funded {})",
            sub.id,
            owner.id,
            active + 1,
            MAX_ACTIVE_SUB_ACCOUNTS,
            input.initial_transfer
        );
        Ok(SubAccountCreated { account: sub, funding })
    }

    /// Owner -> sub-account.
    pub async fn transfer_funds(
        &self,
        owner_account_id: Uuid,
        sub_account_id: Uuid,
        amount: MinorUnits,
    ) -> Result<TransferOutcome, LedgerError> {
        let mut unit = self.ledger.begin().await?;
        unit.lock_accounts(&[owner_account_id, sub_account_id]).await?;
        load_owner(unit.as_mut(), owner_account_id).await?;
        load_sub(unit.as_mut(), owner_account_id, sub_account_id).await?;

        let receipt = post_transfer(
            unit.as_mut(),
            owner_account_id,
            sub_account_id,
            amount,
            TRANSFER_DEBIT,
            TRANSFER_CREDIT,
        )
        .await?;
        unit.commit().await?;
        Ok(outcome(&receipt))
    }

    /// Sub-account -> owner.
    pub async fn reclaim_funds(
        &self,
        owner_account_id: Uuid,
        sub_account_id: Uuid,
        amount: MinorUnits,
    ) -> Result<TransferOutcome, LedgerError> {
        let mut unit = self.ledger.begin().await?;
        unit.lock_accounts(&[owner_account_id, sub_account_id]).await?;
        load_owner(unit.as_mut(), owner_account_id).await?;
        load_sub(unit.as_mut(), owner_account_id, sub_account_id).await?;

        let receipt = post_transfer(
            unit.as_mut(),
            sub_account_id,
            owner_account_id,
            amount,
            RECLAIM_DEBIT,
            RECLAIM_CREDIT,
        )
        .await?;
        unit.commit().await?;
        Ok(TransferOutcome {
            transfer_id: receipt.transfer_id,
            owner_balance: receipt.credit.balance,
            sub_balance: receipt.debit.balance,
        })
    }

    /// Sweep any remaining balance back to the owner, then retire the
    /// sub-account. The record is kept so its history stays attributable.
    pub async fn retire_sub_account(
        &self,
        owner_account_id: Uuid,
        sub_account_id: Uuid,
    ) -> Result<RetiredSubAccount, LedgerError> {
        let mut unit = self.ledger.begin().await?;
        unit.lock_accounts(&[owner_account_id, sub_account_id]).await?;
        let owner = load_owner(unit.as_mut(), owner_account_id).await?;
        let mut sub = load_sub(unit.as_mut(), owner_account_id, sub_account_id).await?;

        let swept = sub.balance;
        let owner_balance = if swept > 0 {
            let receipt = post_transfer(
                unit.as_mut(),
                sub.id,
                owner.id,
                swept,
                RECLAIM_DEBIT,
                RECLAIM_CREDIT,
            )
            .await?;
            receipt.credit.balance
        } else {
            owner.balance
        };

        sub.status = AccountStatus::Retired;
        sub.balance = 0;
        unit.update_account(&sub).await?;
        unit.commit().await?;
        info!(
            "Retired sub-account {} of {} (swept {} back to owner)",
            sub.id, owner.id, swept
        );
        Ok(RetiredSubAccount {
            account: sub,
            swept,
            owner_balance,
        })
    }

    pub async fn update_permissions(
        &self,
        owner_account_id: Uuid,
        sub_account_id: Uuid,
        permissions: SubAccountPermissions,
    ) -> Result<Account, LedgerError> {
        let mut unit = self.ledger.begin().await?;
        unit.lock_accounts(&[owner_account_id, sub_account_id]).await?;
        load_owner(unit.as_mut(), owner_account_id).await?;
        let mut sub = load_sub(unit.as_mut(), owner_account_id, sub_account_id).await?;

        sub.permissions = Some(permissions);
        unit.update_account(&sub).await?;
        unit.commit().await?;
        info!("Updated permissions of sub-account {}", sub.id);
        Ok(sub)
    }

    /// All sub-accounts of an owner, retired ones included.
    pub async fn list_sub_accounts(&self, owner_account_id: Uuid) -> Result<Vec<Account>, LedgerError> {
        let mut unit = self.ledger.begin().await?;
        if unit.fetch_account(owner_account_id).await?.is_none() {
            return Err(LedgerError::account_not_found(owner_account_id));
        }
        unit.list_sub_accounts(owner_account_id).await
    }
}

fn outcome(receipt: &TransferReceipt) -> TransferOutcome {
    TransferOutcome {
        transfer_id: receipt.transfer_id,
        owner_balance: receipt.debit.balance,
        sub_balance: receipt.credit.balance,
    }
}

async fn load_owner(unit: &mut dyn LedgerUnit, owner_account_id: Uuid) -> Result<Account, LedgerError> {
    let owner = unit
        .fetch_account(owner_account_id)
        .await?
        .ok_or_else(|| LedgerError::account_not_found(owner_account_id))?;
    if owner.kind != AccountKind::Primary {
        return Err(LedgerError::NotPrimaryAccount(owner.id));
    }
    if !owner.is_active() {
        return Err(LedgerError::AccountRetired(owner.id));
    }
    Ok(owner)
}

async fn load_sub(
    unit: &mut dyn LedgerUnit,
    owner_account_id: Uuid,
    sub_account_id: Uuid,
) -> Result<Account, LedgerError> {
    match unit.fetch_account(sub_account_id).await? {
        Some(sub) if sub.is_sub_account_of(owner_account_id) && sub.is_active() => Ok(sub),
        _ => Err(LedgerError::NotSubAccount {
            owner_account_id,
            sub_account_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::{Permission, TransactionRecord};
    use crate::store::MemoryLedgerStore;

    struct Fixture {
        store: MemoryLedgerStore,
        ledger: LedgerService,
        delegation: DelegationService,
    }

    fn fixture() -> Fixture {
        let store = MemoryLedgerStore::new();
        let ledger = LedgerService::new(Arc::new(store.clone()));
        let delegation = DelegationService::new(ledger.clone());
        Fixture { store, ledger, delegation }
    }

    async fn funded_owner(f: &Fixture, amount: MinorUnits) -> Account {
        let owner = f.ledger.open_primary_account(Uuid::new_v4()).await.unwrap();
        if amount > 0 {
            f.ledger.credit(owner.id, amount, "topup", None).await.unwrap();
        }
        owner
    }

    fn funding(amount: MinorUnits) -> CreateSubAccount {
        CreateSubAccount {
            initial_transfer: amount,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_funded_sub_account_writes_two_records() {
        let f = fixture();
        let owner = funded_owner(&f, 5000).await;
        let before = f.store.transaction_count();

        let created = f.delegation.create_sub_account(owner.id, funding(2000)).await.unwrap();

        assert_eq!(f.ledger.balance(owner.id).await.unwrap(), 3000);
        assert_eq!(f.ledger.balance(created.account.id).await.unwrap(), 2000);
        assert_eq!(created.account.balance, 2000);
        assert_eq!(f.store.transaction_count() - before, 2);

        let owner_debits: Vec<TransactionRecord> = f.store.transactions_for(owner.id);
        let sub_credits: Vec<TransactionRecord> = f.store.transactions_for(created.account.id);
        assert_eq!(sub_credits.len(), 1);
        assert_eq!(owner_debits.last().unwrap().transfer_id, sub_credits[0].transfer_id);
    }

    #[tokio::test]
    async fn test_fourth_active_sub_account_exceeds_capacity() {
        let f = fixture();
        let owner = funded_owner(&f, 0).await;
        for _ in 0..MAX_ACTIVE_SUB_ACCOUNTS {
            f.delegation.create_sub_account(owner.id, funding(0)).await.unwrap();
        }

        let err = f.delegation.create_sub_account(owner.id, funding(0)).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::CapacityExceeded {
                owner_account_id: owner.id,
                limit: MAX_ACTIVE_SUB_ACCOUNTS,
            }
        );
    }

    #[tokio::test]
    async fn test_retiring_frees_a_slot_and_sweeps_balance() {
        let f = fixture();
        let owner = funded_owner(&f, 900).await;
        let first = f.delegation.create_sub_account(owner.id, funding(300)).await.unwrap();
        f.delegation.create_sub_account(owner.id, funding(0)).await.unwrap();
        f.delegation.create_sub_account(owner.id, funding(0)).await.unwrap();

        let retired = f
            .delegation
            .retire_sub_account(owner.id, first.account.id)
            .await
            .unwrap();
        assert_eq!(retired.swept, 300);
        assert_eq!(retired.owner_balance, 900);
        assert_eq!(retired.account.status, AccountStatus::Retired);
        assert_eq!(f.ledger.balance(first.account.id).await.unwrap(), 0);

        f.delegation.create_sub_account(owner.id, funding(0)).await.unwrap();
        let subs = f.delegation.list_sub_accounts(owner.id).await.unwrap();
        assert_eq!(subs.len(), 4);
        assert_eq!(subs.iter().filter(|s| s.is_active()).count(), 3);
    }

    #[tokio::test]
    async fn test_underfunded_creation_is_rejected_without_side_effects() {
        let f = fixture();
        let owner = funded_owner(&f, 100).await;
        let before = f.store.transaction_count();

        let err = f.delegation.create_sub_account(owner.id, funding(500)).await.unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientFunds { requested: 500, available: 100, .. }));
        assert!(f.delegation.list_sub_accounts(owner.id).await.unwrap().is_empty());
        assert_eq!(f.ledger.balance(owner.id).await.unwrap(), 100);
        assert_eq!(f.store.transaction_count(), before);
    }

    #[tokio::test]
    async fn test_transfer_and_reclaim_between_owner_and_sub() {
        let f = fixture();
        let owner = funded_owner(&f, 1000).await;
        let sub = f.delegation.create_sub_account(owner.id, funding(0)).await.unwrap().account;

        let out = f.delegation.transfer_funds(owner.id, sub.id, 700).await.unwrap();
        assert_eq!((out.owner_balance, out.sub_balance), (300, 700));

        let back = f.delegation.reclaim_funds(owner.id, sub.id, 200).await.unwrap();
        assert_eq!((back.owner_balance, back.sub_balance), (500, 500));

        let err = f.delegation.transfer_funds(owner.id, sub.id, 501).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert!(f.ledger.unbalanced_transfers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_requires_ownership() {
        let f = fixture();
        let owner = funded_owner(&f, 1000).await;
        let stranger = funded_owner(&f, 1000).await;
        let sub = f.delegation.create_sub_account(stranger.id, funding(0)).await.unwrap().account;

        let err = f.delegation.transfer_funds(owner.id, sub.id, 100).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::NotSubAccount {
                owner_account_id: owner.id,
                sub_account_id: sub.id,
            }
        );
        assert_eq!(f.ledger.balance(owner.id).await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn test_retired_sub_account_rejects_transfers() {
        let f = fixture();
        let owner = funded_owner(&f, 1000).await;
        let sub = f.delegation.create_sub_account(owner.id, funding(0)).await.unwrap().account;
        f.delegation.retire_sub_account(owner.id, sub.id).await.unwrap();

        let err = f.delegation.transfer_funds(owner.id, sub.id, 100).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotSubAccount { .. }));
        assert!(matches!(
            f.ledger.credit(sub.id, 100, "topup", None).await,
            Err(LedgerError::AccountRetired(_))
        ));
    }

    #[tokio::test]
    async fn test_sub_account_cannot_own_sub_accounts() {
        let f = fixture();
        let owner = funded_owner(&f, 0).await;
        let sub = f.delegation.create_sub_account(owner.id, funding(0)).await.unwrap().account;

        let err = f.delegation.create_sub_account(sub.id, funding(0)).await.unwrap_err();
        assert_eq!(err, LedgerError::NotPrimaryAccount(sub.id));
    }

    #[tokio::test]
    async fn test_update_permissions_persists() {
        let f = fixture();
        let owner = funded_owner(&f, 0).await;
        let sub = f.delegation.create_sub_account(owner.id, funding(0)).await.unwrap().account;
        assert!(!sub.can(Permission::BuyNumbers));

        let permissions = SubAccountPermissions {
            buy_numbers: true,
            ..SubAccountPermissions::default()
        };
        f.delegation.update_permissions(owner.id, sub.id, permissions).await.unwrap();

        let reloaded = f.ledger.account(sub.id).await.unwrap();
        assert!(reloaded.can(Permission::BuyNumbers));
    }
}
