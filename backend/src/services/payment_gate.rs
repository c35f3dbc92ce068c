use tracing::info;
use uuid::Uuid;

use crate::errors::LedgerError;
use crate::models::{MinorUnits, PostingReceipt};
use crate::services::ledger_service::LedgerService;

const TOP_UP_DESCRIPTION: &str = "Wallet top-up";

/// Turns a confirmed external payment into exactly one credit. Confirmation
/// callbacks may arrive more than once; the external payment id is the
/// idempotency key, so a repeat returns the original record.
#[derive(Clone)]
pub struct PaymentGate {
    ledger: LedgerService,
}

impl PaymentGate {
    pub fn new(ledger: LedgerService) -> Self {
        Self { ledger }
    }

    pub async fn confirm_external_payment(
        &self,
        account_id: Uuid,
        amount: MinorUnits,
        external_payment_id: &str,
    ) -> Result<PostingReceipt, LedgerError> {
        let reference = external_payment_id.trim();
        if reference.is_empty() {
            return Err(LedgerError::InvalidReference(
                "external payment id must not be empty".to_string(),
            ));
        }

        let receipt = self
            .ledger
            .credit(account_id, amount, TOP_UP_DESCRIPTION, Some(reference))
            .await?;
        if !receipt.replayed {
            info!(
                "Confirmed payment {} for account {}: +{}",
                reference, account_id, amount
            );
        }
        Ok(receipt)
    }
}
