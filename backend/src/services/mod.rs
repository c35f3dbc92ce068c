pub mod billing_service;
pub mod delegation_service;
pub mod job_scheduler_service;
pub mod ledger_service;
pub mod payment_gate;
pub mod reconciliation_service;
pub mod sms_segments;
