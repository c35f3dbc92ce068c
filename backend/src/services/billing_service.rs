use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{AppError, LedgerError};
use crate::models::{MinorUnits, NumberPurchaseReceipt, Permission, SmsChargeReceipt};
use crate::services::ledger_service::{post_debit, LedgerService, Posting};
use crate::services::sms_segments::count_segments;
use crate::store::{AccountStore, LedgerUnit};

pub const DEFAULT_SEGMENT_COST: MinorUnits = 1;

fn e164() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+[1-9][0-9]{6,14}$").expect("E.164 pattern compiles"))
}

pub fn validate_e164(number: &str) -> Result<(), AppError> {
    if e164().is_match(number) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "phone number must be E.164 (+ and 7-15 digits), got {:?}",
            number
        )))
    }
}

/// Mask all but the last four digits, e.g. `+*******4567`.
pub fn redact_phone_number(number: &str) -> String {
    let digits: Vec<char> = number.chars().filter(char::is_ascii_digit).collect();
    let keep = digits.len().min(4);
    let masked = "*".repeat(digits.len() - keep);
    let tail: String = digits[digits.len() - keep..].iter().collect();
    format!("+{}{}", masked, tail)
}

/// Charges the usage collaborators (SMS sends, number purchases) make against
/// a wallet. Each charge is a single all-or-nothing debit.
#[derive(Clone)]
pub struct BillingService {
    ledger: LedgerService,
    segment_cost: MinorUnits,
}

impl BillingService {
    pub fn new(ledger: LedgerService, segment_cost: MinorUnits) -> Self {
        Self { ledger, segment_cost }
    }

    pub async fn charge_sms(
        &self,
        account_id: Uuid,
        recipient: &str,
        body: &str,
    ) -> Result<SmsChargeReceipt, AppError> {
        validate_e164(recipient)?;
        let segments = count_segments(body);
        if segments.segments == 0 {
            return Err(AppError::Validation("message body must not be empty".to_string()));
        }
        let cost = self
            .segment_cost
            .checked_mul(segments.segments as MinorUnits)
            .ok_or_else(|| AppError::Validation("message is too long to price".to_string()))?;

        let description = format!("SMS to {}", redact_phone_number(recipient));
        let mut unit = self.ledger.begin().await?;
        unit.lock_accounts(&[account_id]).await?;
        authorize(unit.as_mut(), account_id, Permission::SendSms).await?;
        let receipt = post_debit(unit.as_mut(), Posting::new(account_id, cost, &description)).await?;
        unit.commit().await?;

        info!(
            "Charged {} for {} {:?} segment(s) on account {}",
            cost, segments.segments, segments.encoding, account_id
        );
        Ok(SmsChargeReceipt {
            segments,
            cost,
            transaction: receipt.transaction,
            balance: receipt.balance,
        })
    }

    pub async fn charge_number_purchase(
        &self,
        account_id: Uuid,
        phone_number: &str,
        price: MinorUnits,
    ) -> Result<NumberPurchaseReceipt, AppError> {
        validate_e164(phone_number)?;

        let description = format!("Phone number purchase {}", phone_number);
        let mut unit = self.ledger.begin().await?;
        unit.lock_accounts(&[account_id]).await?;
        authorize(unit.as_mut(), account_id, Permission::BuyNumbers).await?;
        let receipt = post_debit(unit.as_mut(), Posting::new(account_id, price, &description)).await?;
        unit.commit().await?;

        info!("Charged {} for number {} on account {}", price, phone_number, account_id);
        Ok(NumberPurchaseReceipt {
            phone_number: phone_number.to_string(),
            transaction: receipt.transaction,
            balance: receipt.balance,
        })
    }
}

async fn authorize(
    unit: &mut dyn LedgerUnit,
    account_id: Uuid,
    permission: Permission,
) -> Result<(), AppError> {
    let account = unit
        .fetch_account(account_id)
        .await?
        .ok_or_else(|| LedgerError::account_not_found(account_id))?;
    if !account.can(permission) {
        warn!("Account {} lacks permission {}", account_id, permission);
        return Err(AppError::Forbidden(format!(
            "account {} is not allowed to {}",
            account_id, permission
        )));
    }
    Ok(())
}
