mod account;
mod billing;
mod money;
mod payment;
mod reconciliation;
mod sub_account;
mod transaction;

pub use account::{
    Account, AccountKind, AccountStatus, AccountSummary, OpenAccount, Permission,
    SubAccountPermissions,
};
pub use billing::{
    NumberPurchaseCharge, NumberPurchaseReceipt, SegmentInfo, SmsCharge, SmsChargeReceipt,
    SmsEncoding,
};
pub use money::{to_decimal, MinorUnits};
pub use payment::{ConfirmPayment, PostingReceipt};
pub use reconciliation::{
    BalanceDrift, LedgerTotals, ReconcileParams, ReconciliationReport, TransferImbalance,
};
pub use sub_account::{
    CreateSubAccount, RetiredSubAccount, SubAccountCreated, TransferOutcome, TransferRequest,
};
pub use transaction::{
    CreditRequest, DebitRequest, Direction, NewTransaction, Page, PageRequest, TransactionRecord,
    TransactionStatus, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
