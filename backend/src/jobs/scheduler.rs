// Job Scheduler - Cron-driven runner for the due-work poller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::workflows::{PollReport, WorkflowEngine};

pub const DUE_WORK_POLLER: &str = "due_work_poller";

const MAX_EXECUTION_LOGS: usize = 100;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionLog {
    pub id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub items_processed: i32,
    pub errors: Vec<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    PartialFailure,
}

impl JobStatus {
    fn from_report(report: &PollReport) -> Self {
        let failed = report.continuations.failed + report.agents.failed;
        let errors = report.errors();
        if failed == 0 && errors.is_empty() {
            JobStatus::Completed
        } else if report.processed() > failed {
            JobStatus::PartialFailure
        } else {
            JobStatus::Failed
        }
    }
}

type ExecutionLogs = Arc<RwLock<Vec<JobExecutionLog>>>;

pub struct JobScheduler {
    scheduler: TokioScheduler,
    engine: WorkflowEngine,
    config: EngineConfig,
    execution_logs: ExecutionLogs,
}

impl JobScheduler {
    pub async fn new(engine: WorkflowEngine, config: EngineConfig) -> JobResult<Self> {
        let scheduler = TokioScheduler::new().await?;

        Ok(Self {
            scheduler,
            engine,
            config,
            execution_logs: Arc::new(RwLock::new(Vec::new())),
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        info!("Starting background job scheduler");

        self.schedule_due_work_poller().await?;
        self.scheduler.start().await?;

        info!("Background job scheduler started successfully");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down background job scheduler");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    async fn schedule_due_work_poller(&self) -> JobResult<()> {
        let cron_expr = self.config.poll_cron.clone();
        if cron_expr.trim().is_empty() {
            return Err(JobError::ConfigError("WORKFLOW_POLL_CRON is empty".to_string()));
        }

        let engine = self.engine.clone();
        let logs = self.execution_logs.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let engine = engine.clone();
            let logs = logs.clone();

            Box::pin(async move {
                run_due_work_poller(&engine, &logs).await;
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled due-work poller on '{}'", cron_expr);

        Ok(())
    }

    pub async fn get_execution_logs(&self) -> Vec<JobExecutionLog> {
        self.execution_logs.read().await.clone()
    }

    pub async fn run_job_now(&self, job_name: &str) -> JobResult<JobExecutionLog> {
        match job_name {
            DUE_WORK_POLLER => Ok(run_due_work_poller(&self.engine, &self.execution_logs).await),
            _ => Err(JobError::ConfigError(format!("Unknown job: {}", job_name))),
        }
    }
}

async fn run_due_work_poller(engine: &WorkflowEngine, logs: &ExecutionLogs) -> JobExecutionLog {
    let started_at = Utc::now();
    let report = engine.poll_once().await;
    let completed_at = Utc::now();

    let log = JobExecutionLog {
        id: Uuid::new_v4(),
        job_name: DUE_WORK_POLLER.to_string(),
        started_at,
        completed_at: Some(completed_at),
        status: JobStatus::from_report(&report),
        items_processed: report.processed() as i32,
        errors: report.errors(),
        duration_ms: Some((completed_at - started_at).num_milliseconds()),
    };

    if log.status != JobStatus::Completed {
        warn!(
            "Due-work poller finished {:?}: {} items, {} errors",
            log.status,
            log.items_processed,
            log.errors.len()
        );
    }

    push_log(logs, log.clone()).await;
    log
}

async fn push_log(logs: &ExecutionLogs, log: JobExecutionLog) {
    let mut logs = logs.write().await;
    logs.push(log);
    if logs.len() > MAX_EXECUTION_LOGS {
        let excess = logs.len() - MAX_EXECUTION_LOGS;
        logs.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::workflows::SweepReport;

    fn engine() -> WorkflowEngine {
        let store = Arc::new(InMemoryStore::new());
        WorkflowEngine::builder(store.clone(), store).build()
    }

    fn log(name: &str) -> JobExecutionLog {
        JobExecutionLog {
            id: Uuid::new_v4(),
            job_name: name.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            status: JobStatus::Running,
            items_processed: 0,
            errors: vec![],
            duration_ms: None,
        }
    }

    #[tokio::test]
    async fn test_log_ring_keeps_last_hundred() {
        let logs: ExecutionLogs = Arc::new(RwLock::new(Vec::new()));
        for i in 0..105 {
            push_log(&logs, log(&format!("job-{}", i))).await;
        }

        let logs = logs.read().await;
        assert_eq!(logs.len(), MAX_EXECUTION_LOGS);
        assert_eq!(logs[0].job_name, "job-5");
        assert_eq!(logs[99].job_name, "job-104");
    }

    #[test]
    fn test_status_from_report() {
        assert_eq!(JobStatus::from_report(&PollReport::default()), JobStatus::Completed);

        let partial = PollReport {
            continuations: SweepReport {
                processed: 2,
                succeeded: 1,
                failed: 1,
                ..Default::default()
            },
            agents: SweepReport::default(),
        };
        assert_eq!(JobStatus::from_report(&partial), JobStatus::PartialFailure);

        let failed = PollReport {
            continuations: SweepReport {
                errors: vec!["Failed to load due continuations".to_string()],
                ..Default::default()
            },
            agents: SweepReport::default(),
        };
        assert_eq!(JobStatus::from_report(&failed), JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_run_job_now() {
        let scheduler = JobScheduler::new(engine(), EngineConfig::default()).await.unwrap();

        let log = scheduler.run_job_now(DUE_WORK_POLLER).await.unwrap();
        assert_eq!(log.status, JobStatus::Completed);
        assert_eq!(log.items_processed, 0);
        assert_eq!(scheduler.get_execution_logs().await.len(), 1);

        assert!(matches!(
            scheduler.run_job_now("recurring_billing").await,
            Err(JobError::ConfigError(_))
        ));
    }
}
