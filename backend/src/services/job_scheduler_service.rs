use crate::errors::AppError;
use crate::jobs::reconciliation_job;
use crate::services::reconciliation_service::ReconciliationService;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};
use uuid::Uuid;

// Context passed to job functions
#[derive(Clone)]
pub struct JobContext {
    pub reconciliation: ReconciliationService,
    pub auto_repair: bool,
    pub job_runs: Arc<JobRunLog>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRun {
    pub id: Uuid,
    pub job_name: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub items_processed: i32,
    pub items_failed: i32,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
}

/// Latest run of each job, kept in memory.
#[derive(Debug, Default)]
pub struct JobRunLog {
    runs: DashMap<String, JobRun>,
}

impl JobRunLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_start(&self, job_name: &str) -> Uuid {
        let run = JobRun {
            id: Uuid::new_v4(),
            job_name: job_name.to_string(),
            status: JobStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            items_processed: 0,
            items_failed: 0,
            error_message: None,
            duration_ms: None,
        };
        let id = run.id;
        self.runs.insert(job_name.to_string(), run);
        id
    }

    fn record_finish(&self, job_name: &str, job_id: Uuid, outcome: &Result<JobResult, AppError>, duration_ms: i64) {
        let Some(mut run) = self.runs.get_mut(job_name) else {
            return;
        };
        if run.id != job_id {
            return;
        }
        run.completed_at = Some(Utc::now());
        run.duration_ms = Some(duration_ms);
        match outcome {
            Ok(result) => {
                run.status = JobStatus::Success;
                run.items_processed = result.items_processed;
                run.items_failed = result.items_failed;
            }
            Err(e) => {
                run.status = JobStatus::Failed;
                run.error_message = Some(e.to_string());
            }
        }
    }

    /// Most recent first.
    pub fn recent(&self) -> Vec<JobRun> {
        let mut runs: Vec<JobRun> = self.runs.iter().map(|r| r.value().clone()).collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs
    }
}

pub struct JobSchedulerService {
    scheduler: JobScheduler,
    context: JobContext,
}

impl JobSchedulerService {
    pub async fn new(context: JobContext) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::External(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self { scheduler, context })
    }

    /// Start all scheduled jobs
    pub async fn start(&mut self, reconciliation_schedule: &str) -> Result<(), AppError> {
        info!("Starting job scheduler...");

        self.schedule_job(
            reconciliation_schedule,
            "reconcile_ledger",
            "Ledger reconciliation",
            reconciliation_job::reconcile_ledger,
        )
        .await?;

        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::External(format!("Failed to start scheduler: {}", e)))?;

        info!("Job scheduler started");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), AppError> {
        info!("Stopping job scheduler...");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::External(format!("Failed to stop scheduler: {}", e)))?;
        info!("Job scheduler stopped");
        Ok(())
    }

    /// Helper to schedule a job with tracking
    async fn schedule_job<F, Fut>(
        &mut self,
        schedule: &str,
        job_name: &'static str,
        description: &str,
        job_fn: F,
    ) -> Result<(), AppError>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<JobResult, AppError>> + Send + 'static,
    {
        let context = self.context.clone();
        let job_fn = Arc::new(job_fn);

        let job = Job::new_async(schedule, move |_uuid, _l| {
            let context = context.clone();
            let job_fn = job_fn.clone();
            Box::pin(async move {
                let _ = execute_job_with_tracking(job_name, context, job_fn.as_ref()).await;
            })
        })
        .map_err(|e| AppError::External(format!("Failed to create job {}: {}", job_name, e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::External(format!("Failed to add job {}: {}", job_name, e)))?;

        info!("Scheduled: {} - {} [cron: {}]", job_name, description, schedule);
        Ok(())
    }
}

// Job tracking wrapper
pub async fn execute_job_with_tracking<F, Fut>(
    job_name: &str,
    context: JobContext,
    job_fn: &F,
) -> Result<JobResult, AppError>
where
    F: Fn(JobContext) -> Fut,
    Fut: std::future::Future<Output = Result<JobResult, AppError>>,
{
    info!("Starting job: {}", job_name);
    let started_at = Utc::now();
    let job_runs = context.job_runs.clone();
    let job_id = job_runs.record_start(job_name);

    let result = job_fn(context).await;

    let duration_ms = (Utc::now() - started_at).num_milliseconds();
    match &result {
        Ok(job_result) => info!(
            "Job completed: {} (processed: {}, failed: {}, duration: {}ms)",
            job_name, job_result.items_processed, job_result.items_failed, duration_ms
        ),
        Err(e) => error!("Job failed: {} - {}", job_name, e),
    }
    job_runs.record_finish(job_name, job_id, &result, duration_ms);
    result
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobResult {
    pub items_processed: i32,
    pub items_failed: i32,
}
