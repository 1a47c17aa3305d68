// Execution Ledger - Durable record of one workflow run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::actions::ExecutionResult;
use super::context::ExecutionContext;
use super::engine::WorkflowDefinition;
use super::scheduler::ScheduledContinuation;
use super::triggers::TriggerType;
use crate::error::{StoreError, StoreResult};
use crate::services::Clock;
use crate::store::WorkflowStore;

/// Error message stored on a run in which at least one action failed.
pub const AGGREGATE_FAILURE_MESSAGE: &str = "One or more actions failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Paused => "paused",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(ExecutionStatus::Running),
            "paused" => Some(ExecutionStatus::Paused),
            "completed" => Some(ExecutionStatus::Completed),
            "failed" => Some(ExecutionStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }

    /// `running -> {running, paused, completed, failed}`, `paused -> running`.
    /// Nothing leaves a terminal state. `running -> running` is a progress write.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Running, Running) | (Running, Paused) | (Running, Completed) | (Running, Failed) | (Paused, Running)
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One workflow run.
///
/// While `paused`, the real position of the run lives in its latest
/// [`ScheduledContinuation`]; `action_results` only holds what has run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub trigger_type: TriggerType,
    /// Frozen copy of the context the run was triggered with
    pub context: ExecutionContext,
    pub status: ExecutionStatus,
    pub action_results: Vec<ExecutionResult>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowExecution {
    pub fn has_failures(&self) -> bool {
        self.action_results.iter().any(|r| !r.success)
    }
}

/// Status and result bookkeeping for workflow runs.
#[derive(Clone)]
pub struct ExecutionLedger {
    store: Arc<dyn WorkflowStore>,
    clock: Arc<dyn Clock>,
}

impl ExecutionLedger {
    pub fn new(store: Arc<dyn WorkflowStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create the `running` row for a fresh run.
    pub async fn open(
        &self,
        workflow: &WorkflowDefinition,
        context: &ExecutionContext,
        trigger_type: TriggerType,
    ) -> StoreResult<WorkflowExecution> {
        let now = self.clock.now();
        let execution = WorkflowExecution {
            id: Uuid::new_v4(),
            workflow_id: workflow.id,
            tenant_id: workflow.tenant_id,
            user_id: context.user_id,
            trigger_type,
            context: context.clone(),
            status: ExecutionStatus::Running,
            action_results: Vec::new(),
            error_message: None,
            started_at: now,
            completed_at: None,
            updated_at: now,
        };

        self.store.insert_execution(&execution).await?;
        info!(
            execution_id = %execution.id,
            workflow_id = %workflow.id,
            "Started workflow execution for '{}'", workflow.name
        );
        Ok(execution)
    }

    /// Overwrite the stored results with the full list accumulated so far.
    /// Writing the same list twice leaves the row unchanged.
    pub async fn record_progress(
        &self,
        execution: &mut WorkflowExecution,
        results: &[ExecutionResult],
    ) -> StoreResult<()> {
        execution.action_results = results.to_vec();
        self.write(execution, ExecutionStatus::Running).await?;
        debug!(
            execution_id = %execution.id,
            "Recorded progress ({} results)", results.len()
        );
        Ok(())
    }

    pub async fn mark_paused(
        &self,
        execution: &mut WorkflowExecution,
        results: &[ExecutionResult],
    ) -> StoreResult<()> {
        execution.action_results = results.to_vec();
        self.write(execution, ExecutionStatus::Paused).await
    }

    /// `paused -> running` at the start of a resume.
    pub async fn mark_running(&self, execution: &mut WorkflowExecution) -> StoreResult<()> {
        self.write(execution, ExecutionStatus::Running).await
    }

    /// Settle a run that reached the end of its actions: `completed` if every
    /// result succeeded, otherwise `failed` with an aggregate message.
    pub async fn finalize(
        &self,
        execution: &mut WorkflowExecution,
        results: &[ExecutionResult],
    ) -> StoreResult<ExecutionStatus> {
        execution.action_results = results.to_vec();
        let status = if execution.has_failures() {
            execution.error_message = Some(AGGREGATE_FAILURE_MESSAGE.to_string());
            ExecutionStatus::Failed
        } else {
            execution.error_message = None;
            ExecutionStatus::Completed
        };
        execution.completed_at = Some(self.clock.now());

        self.write(execution, status).await?;
        info!(
            execution_id = %execution.id,
            workflow_id = %execution.workflow_id,
            "Workflow execution {} ({} actions recorded)", status, results.len()
        );
        Ok(status)
    }

    /// `running -> failed` for a run that was cut off before it could settle.
    pub async fn abort(&self, execution: &mut WorkflowExecution, message: &str) -> StoreResult<()> {
        execution.error_message = Some(message.to_string());
        execution.completed_at = Some(self.clock.now());
        self.write(execution, ExecutionStatus::Failed).await?;
        warn!(execution_id = %execution.id, "Workflow execution aborted: {}", message);
        Ok(())
    }

    pub async fn load(&self, tenant_id: Uuid, execution_id: Uuid) -> StoreResult<WorkflowExecution> {
        self.store
            .get_execution(tenant_id, execution_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Workflow execution {}", execution_id)))
    }

    /// Run history, newest first.
    pub async fn history(
        &self,
        tenant_id: Uuid,
        workflow_id: Option<Uuid>,
        limit: i64,
    ) -> StoreResult<Vec<WorkflowExecution>> {
        self.store.list_executions(tenant_id, workflow_id, limit).await
    }

    pub async fn continuations(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
    ) -> StoreResult<Vec<ScheduledContinuation>> {
        self.store
            .continuations_for_execution(tenant_id, execution_id)
            .await
    }

    async fn write(&self, execution: &mut WorkflowExecution, next: ExecutionStatus) -> StoreResult<()> {
        if !execution.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                id: execution.id,
                from: execution.status,
                to: next,
            });
        }
        execution.status = next;
        execution.updated_at = self.clock.now();
        self.store.update_execution(execution).await
    }
}
