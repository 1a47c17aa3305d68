//! Datastore ports for the workflow and agent engines.
//!
//! Every read and write is scoped by tenant, except the due-work queries the
//! system poller runs across all tenants. Two bindings are provided:
//!
//! - [`PgStore`]: PostgreSQL via `sqlx`
//! - [`InMemoryStore`]: same semantics behind a mutex, for tests and local runs

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use leadflow_shared::{Activity, Deal, DealOutcome, EmailAccount, EntityKind, Note, Notification, Task};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::agents::{AgentSchedule, AgentTaskExecution};
use crate::error::StoreResult;
use crate::workflows::{
    ContinuationStatus, ScheduledContinuation, TriggerType, WorkflowDefinition, WorkflowExecution,
};

/// Workflow definitions, run ledger rows and continuations.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Insert or replace a workflow definition.
    async fn save_workflow(&self, workflow: &WorkflowDefinition) -> StoreResult<()>;

    async fn get_workflow(
        &self,
        tenant_id: Uuid,
        workflow_id: Uuid,
    ) -> StoreResult<Option<WorkflowDefinition>>;

    /// Enabled definitions for one tenant listening on `trigger_type`.
    async fn enabled_workflows_for_trigger(
        &self,
        tenant_id: Uuid,
        trigger_type: TriggerType,
    ) -> StoreResult<Vec<WorkflowDefinition>>;

    async fn insert_execution(&self, execution: &WorkflowExecution) -> StoreResult<()>;

    async fn get_execution(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
    ) -> StoreResult<Option<WorkflowExecution>>;

    /// Full-row, last-write-wins update. Rows already `completed` or `failed`
    /// are never changed; writing to one returns `InvalidTransition`.
    async fn update_execution(&self, execution: &WorkflowExecution) -> StoreResult<()>;

    /// Newest first, optionally narrowed to one workflow.
    async fn list_executions(
        &self,
        tenant_id: Uuid,
        workflow_id: Option<Uuid>,
        limit: i64,
    ) -> StoreResult<Vec<WorkflowExecution>>;

    async fn insert_continuation(&self, continuation: &ScheduledContinuation) -> StoreResult<()>;

    /// `pending` continuations due at or before `now`, earliest due first.
    async fn due_continuations(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<ScheduledContinuation>>;

    /// Atomically move a continuation `pending -> processing`. Returns
    /// `false` when another worker got there first.
    async fn claim_continuation(&self, continuation_id: Uuid, now: DateTime<Utc>) -> StoreResult<bool>;

    /// Settle a claimed continuation as `completed` or `failed`.
    async fn finish_continuation(
        &self,
        continuation_id: Uuid,
        status: ContinuationStatus,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn continuations_for_execution(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
    ) -> StoreResult<Vec<ScheduledContinuation>>;
}

/// Changes an `update_deal` action applies. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DealUpdate {
    pub title: Option<String>,
    pub value: Option<Decimal>,
    pub expected_close_date: Option<NaiveDate>,
}

/// The CRM writes and lookups workflow actions perform.
#[async_trait]
pub trait CrmStore: Send + Sync {
    /// The tenant's default outbound phone number.
    async fn default_phone_number(&self, tenant_id: Uuid) -> StoreResult<Option<String>>;

    /// The tenant's default connected email account.
    async fn default_email_account(&self, tenant_id: Uuid) -> StoreResult<Option<EmailAccount>>;

    async fn update_lead_status(&self, tenant_id: Uuid, lead_id: Uuid, status: &str) -> StoreResult<()>;

    async fn update_lead_stage(&self, tenant_id: Uuid, lead_id: Uuid, stage: &str) -> StoreResult<()>;

    async fn assign_lead(&self, tenant_id: Uuid, lead_id: Uuid, user_id: Uuid) -> StoreResult<()>;

    async fn create_note(&self, note: &Note) -> StoreResult<Uuid>;

    async fn create_task(&self, task: &Task) -> StoreResult<Uuid>;

    async fn create_notification(&self, notification: &Notification) -> StoreResult<Uuid>;

    async fn create_deal(&self, deal: &Deal) -> StoreResult<Uuid>;

    async fn update_deal(&self, tenant_id: Uuid, deal_id: Uuid, update: &DealUpdate) -> StoreResult<()>;

    async fn move_deal_stage(&self, tenant_id: Uuid, deal_id: Uuid, stage: &str) -> StoreResult<()>;

    async fn close_deal(
        &self,
        tenant_id: Uuid,
        deal_id: Uuid,
        outcome: DealOutcome,
        reason: Option<&str>,
    ) -> StoreResult<()>;

    /// Returns `false` if the entity already carried the tag.
    async fn add_tag(
        &self,
        tenant_id: Uuid,
        entity: EntityKind,
        entity_id: Uuid,
        tag: &str,
    ) -> StoreResult<bool>;

    /// Returns `false` if the entity did not carry the tag.
    async fn remove_tag(
        &self,
        tenant_id: Uuid,
        entity: EntityKind,
        entity_id: Uuid,
        tag: &str,
    ) -> StoreResult<bool>;

    async fn log_activity(&self, activity: &Activity) -> StoreResult<Uuid>;
}

/// Agent schedules and their execution rows.
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn save_schedule(&self, schedule: &AgentSchedule) -> StoreResult<()>;

    async fn get_schedule(&self, tenant_id: Uuid, schedule_id: Uuid) -> StoreResult<Option<AgentSchedule>>;

    /// Enabled, `pending` schedules with `next_run_at <= now`, earliest first.
    async fn due_schedules(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<AgentSchedule>>;

    /// Atomically move a schedule `pending -> processing`.
    async fn claim_schedule(&self, schedule_id: Uuid, now: DateTime<Utc>) -> StoreResult<bool>;

    /// Write back status, next run, run count and last run after a sweep.
    async fn update_schedule(&self, schedule: &AgentSchedule) -> StoreResult<()>;

    async fn insert_agent_execution(&self, execution: &AgentTaskExecution) -> StoreResult<()>;

    async fn update_agent_execution(&self, execution: &AgentTaskExecution) -> StoreResult<()>;

    async fn agent_executions_for_schedule(
        &self,
        tenant_id: Uuid,
        schedule_id: Uuid,
    ) -> StoreResult<Vec<AgentTaskExecution>>;
}
