use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::billing_service::BillingService;
use crate::services::delegation_service::DelegationService;
use crate::services::job_scheduler_service::{JobContext, JobRunLog};
use crate::services::ledger_service::LedgerService;
use crate::services::payment_gate::PaymentGate;
use crate::services::reconciliation_service::ReconciliationService;
use crate::store::LedgerBackend;

#[derive(Clone)]
pub struct AppState {
    pub ledger: LedgerService,
    pub delegation: DelegationService,
    pub payments: PaymentGate,
    pub billing: BillingService,
    pub reconciliation: ReconciliationService,
    pub job_runs: Arc<JobRunLog>,
    pub auto_repair: bool,
}

impl AppState {
    pub fn new(backend: Arc<dyn LedgerBackend>, config: &AppConfig) -> Self {
        let ledger = LedgerService::new(backend);
        Self {
            delegation: DelegationService::new(ledger.clone()),
            payments: PaymentGate::new(ledger.clone()),
            billing: BillingService::new(ledger.clone(), config.sms_segment_cost),
            reconciliation: ReconciliationService::new(ledger.clone()),
            job_runs: Arc::new(JobRunLog::new()),
            auto_repair: config.reconciliation_auto_repair,
            ledger,
        }
    }

    pub fn job_context(&self) -> JobContext {
        JobContext {
            reconciliation: self.reconciliation.clone(),
            auto_repair: self.auto_repair,
            job_runs: self.job_runs.clone(),
        }
    }
}
