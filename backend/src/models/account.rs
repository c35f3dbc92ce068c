use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::{to_decimal, MinorUnits};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Primary,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Retired,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Primary => "primary",
            AccountKind::Sub => "sub",
        }
    }
}

impl FromStr for AccountKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(AccountKind::Primary),
            "sub" => Ok(AccountKind::Sub),
            other => Err(format!("unknown account kind: {}", other)),
        }
    }
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Retired => "retired",
        }
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "retired" => Ok(AccountStatus::Retired),
            other => Err(format!("unknown account status: {}", other)),
        }
    }
}

/// Operations a sub-account's credentials may be allowed to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    SendSms,
    BuyNumbers,
    ViewBilling,
    ManageWebhooks,
    ManageApiKeys,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Permission::SendSms => "send_sms",
            Permission::BuyNumbers => "buy_numbers",
            Permission::ViewBilling => "view_billing",
            Permission::ManageWebhooks => "manage_webhooks",
            Permission::ManageApiKeys => "manage_api_keys",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAccountPermissions {
    #[serde(default)]
    pub send_sms: bool,
    #[serde(default)]
    pub buy_numbers: bool,
    #[serde(default)]
    pub view_billing: bool,
    #[serde(default)]
    pub manage_webhooks: bool,
    #[serde(default)]
    pub manage_api_keys: bool,
}

impl Default for SubAccountPermissions {
    fn default() -> Self {
        Self {
            send_sms: true,
            buy_numbers: false,
            view_billing: true,
            manage_webhooks: false,
            manage_api_keys: false,
        }
    }
}

impl SubAccountPermissions {
    pub fn allows(&self, permission: Permission) -> bool {
        match permission {
            Permission::SendSms => self.send_sms,
            Permission::BuyNumbers => self.buy_numbers,
            Permission::ViewBilling => self.view_billing,
            Permission::ManageWebhooks => self.manage_webhooks,
            Permission::ManageApiKeys => self.manage_api_keys,
        }
    }
}

// A balance-holding principal: a user's primary wallet or a delegated sub-account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub kind: AccountKind,
    pub status: AccountStatus,
    pub balance: MinorUnits,
    pub parent_account_id: Option<Uuid>,
    pub label: Option<String>,
    pub permissions: Option<SubAccountPermissions>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new_primary(owner_user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_user_id,
            kind: AccountKind::Primary,
            status: AccountStatus::Active,
            balance: 0,
            parent_account_id: None,
            label: None,
            permissions: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn new_sub(
        owner: &Account,
        label: Option<String>,
        permissions: SubAccountPermissions,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_user_id: owner.owner_user_id,
            kind: AccountKind::Sub,
            status: AccountStatus::Active,
            balance: 0,
            parent_account_id: Some(owner.id),
            label,
            permissions: Some(permissions),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn is_sub_account_of(&self, owner_id: Uuid) -> bool {
        self.kind == AccountKind::Sub && self.parent_account_id == Some(owner_id)
    }

    /// Primary accounts may do everything; sub-accounts only what their owner granted.
    pub fn can(&self, permission: Permission) -> bool {
        match self.kind {
            AccountKind::Primary => true,
            AccountKind::Sub => self
                .permissions
                .map(|p| p.allows(permission))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpenAccount {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct AccountSummary {
    #[serde(flatten)]
    pub account: Account,
    pub balance_display: BigDecimal,
}

impl From<Account> for AccountSummary {
    fn from(account: Account) -> Self {
        let balance_display = to_decimal(account.balance);
        Self { account, balance_display }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_account_inherits_owner_user() {
        let owner = Account::new_primary(Uuid::new_v4());
        let sub = Account::new_sub(&owner, Some("support".into()), SubAccountPermissions::default());

        assert_eq!(sub.owner_user_id, owner.owner_user_id);
        assert!(sub.is_sub_account_of(owner.id));
        assert!(!owner.is_sub_account_of(sub.id));
        assert_eq!(sub.balance, 0);
    }

    #[test]
    fn test_permissions_gate_sub_accounts_only() {
        let owner = Account::new_primary(Uuid::new_v4());
        let sub = Account::new_sub(&owner, None, SubAccountPermissions::default());

        assert!(owner.can(Permission::BuyNumbers));
        assert!(sub.can(Permission::SendSms));
        assert!(!sub.can(Permission::BuyNumbers));
    }

    #[test]
    fn test_kind_and_status_parse_from_storage_strings() {
        assert_eq!("sub".parse::<AccountKind>().unwrap(), AccountKind::Sub);
        assert_eq!("retired".parse::<AccountStatus>().unwrap(), AccountStatus::Retired);
        assert!("closed".parse::<AccountStatus>().is_err());
    }
}
