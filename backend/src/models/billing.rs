use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::MinorUnits;
use super::transaction::TransactionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SmsEncoding {
    Gsm7,
    Ucs2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentInfo {
    pub encoding: SmsEncoding,
    /// Septets for GSM-7, UTF-16 code units for UCS-2.
    pub units: usize,
    pub segments: usize,
}

#[derive(Debug, Deserialize)]
pub struct SmsCharge {
    pub account_id: Uuid,
    pub recipient: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct SmsChargeReceipt {
    pub segments: SegmentInfo,
    pub cost: MinorUnits,
    pub transaction: TransactionRecord,
    pub balance: MinorUnits,
}

#[derive(Debug, Deserialize)]
pub struct NumberPurchaseCharge {
    pub account_id: Uuid,
    pub phone_number: String,
    pub price: MinorUnits,
}

#[derive(Debug, Serialize)]
pub struct NumberPurchaseReceipt {
    pub phone_number: String,
    pub transaction: TransactionRecord,
    pub balance: MinorUnits,
}
