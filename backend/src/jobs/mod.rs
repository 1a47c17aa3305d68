// Background Jobs Service
//
// Scheduled background jobs for the workflow engine. Jobs are scheduled using
// tokio-cron-scheduler; the only job today drives the due-work poller.

pub mod scheduler;

pub use scheduler::{JobError, JobExecutionLog, JobResult, JobScheduler, JobStatus, DUE_WORK_POLLER};
