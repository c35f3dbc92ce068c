use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::MinorUnits;
use super::transaction::Direction;

/// Sums of completed records for one account. Lifetime totals outgrow
/// `MinorUnits` long before a balance does, so they are kept unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerTotals {
    pub credits: BigDecimal,
    pub debits: BigDecimal,
}

impl LedgerTotals {
    pub fn add(&mut self, direction: Direction, amount: MinorUnits) {
        match direction {
            Direction::Credit => self.credits = &self.credits + BigDecimal::from(amount),
            Direction::Debit => self.debits = &self.debits + BigDecimal::from(amount),
        }
    }

    /// `None` when credits minus debits is not a representable balance.
    pub fn projected_balance(&self) -> Option<MinorUnits> {
        (&self.credits - &self.debits).to_i64()
    }
}

/// A transfer whose debit legs exceed its credit legs, i.e. funds left one
/// account without arriving anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferImbalance {
    pub transfer_id: Uuid,
    pub debited_account_id: Uuid,
    pub debited: MinorUnits,
    pub credited: MinorUnits,
}

impl TransferImbalance {
    pub fn missing(&self) -> MinorUnits {
        self.debited - self.credited
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceDrift {
    pub account_id: Uuid,
    pub recorded_balance: MinorUnits,
    pub projected_balance: MinorUnits,
    pub repaired: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub accounts_checked: usize,
    pub accounts_failed: usize,
    pub drifts: Vec<BalanceDrift>,
    pub orphaned_transfers: Vec<TransferImbalance>,
    pub transfers_reversed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.drifts.is_empty() && self.orphaned_transfers.is_empty() && self.accounts_failed == 0
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReconcileParams {
    #[serde(default)]
    pub repair: bool,
}
