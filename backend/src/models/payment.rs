use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::MinorUnits;
use super::transaction::TransactionRecord;

// Body of the payment-processor callback / client-side confirmation call.
#[derive(Debug, Deserialize)]
pub struct ConfirmPayment {
    pub account_id: Uuid,
    pub amount: MinorUnits,
    pub external_payment_id: String,
}

/// Result of applying a credit or debit. `replayed` is set when an external
/// reference had already been applied and the original record is returned.
#[derive(Debug, Clone, Serialize)]
pub struct PostingReceipt {
    pub transaction: TransactionRecord,
    pub balance: MinorUnits,
    pub replayed: bool,
}
