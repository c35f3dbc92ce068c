use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::{Account, SubAccountPermissions};
use super::money::MinorUnits;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSubAccount {
    #[serde(default)]
    pub initial_transfer: MinorUnits,
    pub label: Option<String>,
    pub permissions: Option<SubAccountPermissions>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub amount: MinorUnits,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub transfer_id: Uuid,
    pub owner_balance: MinorUnits,
    pub sub_balance: MinorUnits,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubAccountCreated {
    pub account: Account,
    pub funding: Option<TransferOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetiredSubAccount {
    pub account: Account,
    pub swept: MinorUnits,
    pub owner_balance: MinorUnits,
}
