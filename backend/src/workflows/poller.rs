// Due-Work Poller - Periodic sweep that resumes due continuations and agent schedules

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::ledger::ExecutionStatus;
use super::scheduler::{ContinuationStatus, ScheduledContinuation, SuspendResumeScheduler};
use crate::agents::AgentScheduleSweep;
use crate::services::Clock;
use crate::store::WorkflowStore;

/// Counters for one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items another poller claimed first
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl SweepReport {
    pub fn record_success(&mut self) {
        self.processed += 1;
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, error: Option<String>) {
        self.processed += 1;
        self.failed += 1;
        if let Some(error) = error {
            self.errors.push(error);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollReport {
    pub continuations: SweepReport,
    pub agents: SweepReport,
}

impl PollReport {
    pub fn processed(&self) -> usize {
        self.continuations.processed + self.agents.processed
    }

    pub fn errors(&self) -> Vec<String> {
        self.continuations
            .errors
            .iter()
            .chain(self.agents.errors.iter())
            .cloned()
            .collect()
    }
}

/// Finds due work and drives it to a terminal state.
///
/// Items in one poll are handled one after another. Overlapping polls are
/// safe: each item is claimed (`pending -> processing`) before any work and
/// skipped when the claim is lost.
#[derive(Clone)]
pub struct DueWorkPoller {
    store: Arc<dyn WorkflowStore>,
    scheduler: SuspendResumeScheduler,
    agents: Option<AgentScheduleSweep>,
    clock: Arc<dyn Clock>,
    batch_size: i64,
    agent_batch_size: i64,
}

impl DueWorkPoller {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        scheduler: SuspendResumeScheduler,
        clock: Arc<dyn Clock>,
        batch_size: i64,
    ) -> Self {
        Self {
            store,
            scheduler,
            agents: None,
            clock,
            batch_size,
            agent_batch_size: batch_size,
        }
    }

    pub fn with_agent_sweep(mut self, agents: AgentScheduleSweep, batch_size: i64) -> Self {
        self.agents = Some(agents);
        self.agent_batch_size = batch_size;
        self
    }

    /// One pass over due continuations, then over due agent schedules.
    pub async fn poll_once(&self) -> PollReport {
        let continuations = self.sweep_continuations().await;
        let agents = match &self.agents {
            Some(agents) => agents.sweep(self.agent_batch_size).await,
            None => SweepReport::default(),
        };

        if continuations.processed > 0 || agents.processed > 0 {
            info!(
                "Due-work poll: {} continuations ({} ok, {} failed), {} agent tasks ({} ok, {} failed)",
                continuations.processed,
                continuations.succeeded,
                continuations.failed,
                agents.processed,
                agents.succeeded,
                agents.failed
            );
        }

        PollReport {
            continuations,
            agents,
        }
    }

    async fn sweep_continuations(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let due = match self.store.due_continuations(self.clock.now(), self.batch_size).await {
            Ok(due) => due,
            Err(e) => {
                error!("Failed to load due continuations: {}", e);
                report.errors.push(format!("Failed to load due continuations: {}", e));
                return report;
            }
        };

        for continuation in due {
            match self.store.claim_continuation(continuation.id, self.clock.now()).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(continuation_id = %continuation.id, "Continuation already claimed, skipping");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(continuation_id = %continuation.id, "Failed to claim continuation: {}", e);
                    report.errors.push(format!("Continuation {}: claim failed: {}", continuation.id, e));
                    continue;
                }
            }

            self.process(&continuation, &mut report).await;
        }

        report
    }

    /// Resume one claimed continuation and settle it as completed or failed.
    async fn process(&self, continuation: &ScheduledContinuation, report: &mut SweepReport) {
        let resumed = AssertUnwindSafe(self.scheduler.resume(continuation))
            .catch_unwind()
            .await;
        let resumed = match resumed {
            Ok(resumed) => resumed,
            Err(payload) => {
                let message = format!("Resume panicked: {}", panic_message(payload.as_ref()));
                error!(
                    continuation_id = %continuation.id,
                    execution_id = %continuation.execution_id,
                    "{}", message
                );
                self.abort_execution(continuation, &message, report).await;
                report.record_failure(Some(format!("Continuation {}: {}", continuation.id, message)));
                self.finish(continuation, ContinuationStatus::Failed, Some(message), report)
                    .await;
                return;
            }
        };

        let (status, error_message) = match resumed {
            Ok(summary) if summary.all_succeeded() => {
                report.record_success();
                (ContinuationStatus::Completed, None)
            }
            Ok(summary) => {
                let failed = summary.new_results().iter().filter(|r| !r.success).count();
                report.record_failure(None);
                (
                    ContinuationStatus::Failed,
                    Some(format!("{} resumed action(s) failed", failed)),
                )
            }
            Err(e) => {
                error!(
                    continuation_id = %continuation.id,
                    execution_id = %continuation.execution_id,
                    "Failed to resume workflow: {}", e
                );
                let message = format!("[{}] {}", e.error_code(), e);
                report.record_failure(Some(format!("Continuation {}: {}", continuation.id, message)));
                (ContinuationStatus::Failed, Some(message))
            }
        };

        self.finish(continuation, status, error_message, report).await;
    }

    /// Fail the run a panicked resume left `running`.
    async fn abort_execution(&self, continuation: &ScheduledContinuation, message: &str, report: &mut SweepReport) {
        let ledger = self.scheduler.ledger();
        let aborted = match ledger.load(continuation.tenant_id, continuation.execution_id).await {
            Ok(mut execution) if execution.status == ExecutionStatus::Running => {
                ledger.abort(&mut execution, message).await
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = aborted {
            error!(
                execution_id = %continuation.execution_id,
                "Failed to mark execution failed: {}", e
            );
            report
                .errors
                .push(format!("Execution {}: could not be marked failed: {}", continuation.execution_id, e));
        }
    }

    async fn finish(
        &self,
        continuation: &ScheduledContinuation,
        status: ContinuationStatus,
        error_message: Option<String>,
        report: &mut SweepReport,
    ) {
        if let Err(e) = self
            .store
            .finish_continuation(continuation.id, status, error_message.as_deref(), self.clock.now())
            .await
        {
            error!(
                continuation_id = %continuation.id,
                "Failed to mark continuation {}: {}", status, e
            );
            report
                .errors
                .push(format!("Continuation {}: could not be marked {}: {}", continuation.id, status, e));
        }
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
