//! Background Jobs Module
//!
//! Jobs are registered with the job scheduler service and executed on a cron
//! schedule, independently of user requests. Each job is idempotent and can
//! be re-run safely.
//!
//! # Available Jobs
//!
//! - `reconciliation_job` - Detects (and optionally repairs) balance drift and
//!   incomplete transfers in the wallet ledger

pub mod reconciliation_job;
