// Suspend/Resume Scheduler - Parks a paused run and picks it up again later

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::actions::{Action, ExecutionResult};
use super::context::ExecutionContext;
use super::engine::WorkflowDefinition;
use super::ledger::{ExecutionLedger, ExecutionStatus, WorkflowExecution};
use super::normalize::deserialize_actions;
use super::runner::{ActionRunner, RunOutcome};
use super::triggers::TriggerType;
use crate::error::{EngineError, EngineResult, StoreResult};
use crate::services::Clock;
use crate::store::WorkflowStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ContinuationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContinuationStatus::Pending => "pending",
            ContinuationStatus::Processing => "processing",
            ContinuationStatus::Completed => "completed",
            ContinuationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ContinuationStatus::Pending),
            "processing" => Some(ContinuationStatus::Processing),
            "completed" => Some(ContinuationStatus::Completed),
            "failed" => Some(ContinuationStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ContinuationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The "resume here" record written when a run pauses on a wait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledContinuation {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    #[serde(deserialize_with = "deserialize_actions")]
    pub remaining_actions: Vec<Action>,
    pub context: ExecutionContext,
    pub due_at: DateTime<Utc>,
    pub status: ContinuationStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// How a run (fresh or resumed) was left.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    pub results: Vec<ExecutionResult>,
    /// Index into `results` of the first result produced by this call
    pub first_new_result: usize,
    /// Set when the run paused again
    pub continuation_id: Option<Uuid>,
}

impl RunSummary {
    /// Results produced by this call only.
    pub fn new_results(&self) -> &[ExecutionResult] {
        self.results.get(self.first_new_result..).unwrap_or(&[])
    }

    /// Whether every action run by this call succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.new_results().iter().all(|r| r.success)
    }
}

#[derive(Clone)]
pub struct SuspendResumeScheduler {
    store: Arc<dyn WorkflowStore>,
    ledger: ExecutionLedger,
    runner: ActionRunner,
    clock: Arc<dyn Clock>,
}

impl SuspendResumeScheduler {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        ledger: ExecutionLedger,
        runner: ActionRunner,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            ledger,
            runner,
            clock,
        }
    }

    pub fn ledger(&self) -> &ExecutionLedger {
        &self.ledger
    }

    /// Open a ledger row for `workflow` and run it from the top.
    pub async fn start(
        &self,
        workflow: &WorkflowDefinition,
        context: &ExecutionContext,
        trigger_type: TriggerType,
    ) -> EngineResult<RunSummary> {
        let mut execution = self.ledger.open(workflow, context, trigger_type).await?;
        let outcome = self
            .runner
            .run(&mut execution, workflow.actions.clone(), context, Vec::new())
            .await;
        self.settle(&mut execution, context, outcome, 0).await
    }

    /// Persist one continuation for a paused run, then mark the run `paused`.
    pub async fn suspend(
        &self,
        execution: &mut WorkflowExecution,
        remaining: Vec<Action>,
        context: &ExecutionContext,
        due_at: DateTime<Utc>,
        results: &[ExecutionResult],
    ) -> StoreResult<ScheduledContinuation> {
        let continuation = ScheduledContinuation {
            id: Uuid::new_v4(),
            execution_id: execution.id,
            workflow_id: execution.workflow_id,
            tenant_id: execution.tenant_id,
            user_id: execution.user_id,
            remaining_actions: remaining,
            context: context.clone(),
            due_at,
            status: ContinuationStatus::Pending,
            error_message: None,
            created_at: self.clock.now(),
            processed_at: None,
        };

        self.store.insert_continuation(&continuation).await?;
        self.ledger.mark_paused(execution, results).await?;

        info!(
            execution_id = %execution.id,
            continuation_id = %continuation.id,
            "Workflow paused until {} ({} actions remaining)",
            due_at,
            continuation.remaining_actions.len()
        );
        Ok(continuation)
    }

    /// Continue a paused run from `continuation`, seeded with the results
    /// already on its ledger row. Settles exactly like a fresh run, including
    /// pausing again on a later wait.
    pub async fn resume(&self, continuation: &ScheduledContinuation) -> EngineResult<RunSummary> {
        let mut execution = self
            .store
            .get_execution(continuation.tenant_id, continuation.execution_id)
            .await?
            .ok_or(EngineError::ExecutionNotFound(continuation.execution_id))?;

        if execution.status.is_terminal() {
            return Err(EngineError::ExecutionFinished {
                id: execution.id,
                status: execution.status,
            });
        }

        let prior = execution.action_results.clone();
        let first_new_result = prior.len();
        self.ledger.mark_running(&mut execution).await?;

        info!(
            execution_id = %execution.id,
            continuation_id = %continuation.id,
            "Resuming workflow ({} actions remaining)",
            continuation.remaining_actions.len()
        );

        let outcome = self
            .runner
            .run(
                &mut execution,
                continuation.remaining_actions.clone(),
                &continuation.context,
                prior,
            )
            .await;
        self.settle(&mut execution, &continuation.context, outcome, first_new_result)
            .await
    }

    /// Pause again if the run stopped on a wait with work left, otherwise
    /// finalize. A wait with nothing after it completes the run.
    async fn settle(
        &self,
        execution: &mut WorkflowExecution,
        context: &ExecutionContext,
        outcome: RunOutcome,
        first_new_result: usize,
    ) -> EngineResult<RunSummary> {
        let continuation_id = match outcome.due_at {
            Some(due_at) if outcome.paused && !outcome.remaining.is_empty() => {
                let continuation = self
                    .suspend(execution, outcome.remaining, context, due_at, &outcome.results)
                    .await?;
                Some(continuation.id)
            }
            _ => {
                self.ledger.finalize(execution, &outcome.results).await?;
                None
            }
        };

        Ok(RunSummary {
            execution_id: execution.id,
            status: execution.status,
            results: outcome.results,
            first_new_result,
            continuation_id,
        })
    }
}
