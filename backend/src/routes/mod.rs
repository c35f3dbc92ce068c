pub(crate) mod accounts;
pub(crate) mod admin;
pub(crate) mod billing;
pub(crate) mod health;
pub(crate) mod payments;
pub(crate) mod sub_accounts;
