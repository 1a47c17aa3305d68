// PostgreSQL datastore - Runtime sqlx queries over the workflow, CRM and agent tables

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadflow_shared::{Activity, Deal, DealOutcome, EmailAccount, EntityKind, Note, Notification, Task};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use super::{AgentStore, CrmStore, DealUpdate, WorkflowStore};
use crate::agents::{
    AgentExecutionStatus, AgentSchedule, AgentTaskExecution, ScheduleFrequency, ScheduleStatus,
};
use crate::error::{StoreError, StoreResult};
use crate::workflows::{
    parse_actions, ContinuationStatus, ExecutionContext, ExecutionResult, ExecutionStatus,
    ScheduledContinuation, TriggerType, WorkflowDefinition, WorkflowExecution,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn invalid(what: &str, value: &str) -> StoreError {
    StoreError::InvalidData(format!("unknown {} '{}'", what, value))
}

fn workflow_from_row(row: &PgRow) -> StoreResult<WorkflowDefinition> {
    let trigger: String = row.try_get("trigger_type")?;
    let actions: Value = row.try_get("actions")?;
    Ok(WorkflowDefinition {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        trigger_type: TriggerType::parse(&trigger).ok_or_else(|| invalid("trigger type", &trigger))?,
        trigger_config: row.try_get("trigger_config")?,
        actions: parse_actions(actions).map_err(|e| StoreError::InvalidData(e.to_string()))?,
        enabled: row.try_get("enabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn execution_from_row(row: &PgRow) -> StoreResult<WorkflowExecution> {
    let trigger: String = row.try_get("trigger_type")?;
    let status: String = row.try_get("status")?;
    let Json(context): Json<ExecutionContext> = row.try_get("context")?;
    let Json(action_results): Json<Vec<ExecutionResult>> = row.try_get("action_results")?;
    Ok(WorkflowExecution {
        id: row.try_get("id")?,
        workflow_id: row.try_get("workflow_id")?,
        tenant_id: row.try_get("tenant_id")?,
        user_id: row.try_get("user_id")?,
        trigger_type: TriggerType::parse(&trigger).ok_or_else(|| invalid("trigger type", &trigger))?,
        context,
        status: ExecutionStatus::parse(&status).ok_or_else(|| invalid("execution status", &status))?,
        action_results,
        error_message: row.try_get("error_message")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn continuation_from_row(row: &PgRow) -> StoreResult<ScheduledContinuation> {
    let status: String = row.try_get("status")?;
    let remaining: Value = row.try_get("remaining_actions")?;
    let Json(context): Json<ExecutionContext> = row.try_get("context")?;
    Ok(ScheduledContinuation {
        id: row.try_get("id")?,
        execution_id: row.try_get("execution_id")?,
        workflow_id: row.try_get("workflow_id")?,
        tenant_id: row.try_get("tenant_id")?,
        user_id: row.try_get("user_id")?,
        remaining_actions: parse_actions(remaining).map_err(|e| StoreError::InvalidData(e.to_string()))?,
        context,
        due_at: row.try_get("due_at")?,
        status: ContinuationStatus::parse(&status).ok_or_else(|| invalid("continuation status", &status))?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

fn schedule_from_row(row: &PgRow) -> StoreResult<AgentSchedule> {
    let status: String = row.try_get("status")?;
    let Json(frequency): Json<ScheduleFrequency> = row.try_get("frequency")?;
    Ok(AgentSchedule {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        user_id: row.try_get("user_id")?,
        agent_id: row.try_get("agent_id")?,
        name: row.try_get("name")?,
        instructions: row.try_get("instructions")?,
        frequency,
        next_run_at: row.try_get("next_run_at")?,
        status: ScheduleStatus::parse(&status).ok_or_else(|| invalid("schedule status", &status))?,
        enabled: row.try_get("enabled")?,
        run_count: row.try_get("run_count")?,
        last_run_at: row.try_get("last_run_at")?,
        last_error: row.try_get("last_error")?,
        notify_on_completion: row.try_get("notify_on_completion")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn agent_execution_from_row(row: &PgRow) -> StoreResult<AgentTaskExecution> {
    let status: String = row.try_get("status")?;
    Ok(AgentTaskExecution {
        id: row.try_get("id")?,
        schedule_id: row.try_get("schedule_id")?,
        tenant_id: row.try_get("tenant_id")?,
        agent_id: row.try_get("agent_id")?,
        status: AgentExecutionStatus::parse(&status).ok_or_else(|| invalid("agent execution status", &status))?,
        output: row.try_get("output")?,
        error_message: row.try_get("error_message")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

const EXECUTION_COLUMNS: &str = "id, workflow_id, tenant_id, user_id, trigger_type, context, status, \
     action_results, error_message, started_at, completed_at, updated_at";

const CONTINUATION_COLUMNS: &str = "id, execution_id, workflow_id, tenant_id, user_id, remaining_actions, \
     context, due_at, status, error_message, created_at, processed_at";

const SCHEDULE_COLUMNS: &str = "id, tenant_id, user_id, agent_id, name, instructions, frequency, next_run_at, \
     status, enabled, run_count, last_run_at, last_error, notify_on_completion, created_at, updated_at";

#[async_trait]
impl WorkflowStore for PgStore {
    async fn save_workflow(&self, workflow: &WorkflowDefinition) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflows
            (id, tenant_id, user_id, name, description, trigger_type, trigger_config, actions, enabled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                trigger_type = EXCLUDED.trigger_type,
                trigger_config = EXCLUDED.trigger_config,
                actions = EXCLUDED.actions,
                enabled = EXCLUDED.enabled,
                updated_at = NOW()
            WHERE workflows.tenant_id = EXCLUDED.tenant_id
            "#,
        )
        .bind(workflow.id)
        .bind(workflow.tenant_id)
        .bind(workflow.user_id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.trigger_type.as_str())
        .bind(&workflow.trigger_config)
        .bind(Json(&workflow.actions))
        .bind(workflow.enabled)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_workflow(
        &self,
        tenant_id: Uuid,
        workflow_id: Uuid,
    ) -> StoreResult<Option<WorkflowDefinition>> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = $1 AND tenant_id = $2")
            .bind(workflow_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(workflow_from_row).transpose()
    }

    async fn enabled_workflows_for_trigger(
        &self,
        tenant_id: Uuid,
        trigger_type: TriggerType,
    ) -> StoreResult<Vec<WorkflowDefinition>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM workflows
            WHERE tenant_id = $1 AND trigger_type = $2 AND enabled = true
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id)
        .bind(trigger_type.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(workflow_from_row).collect()
    }

    async fn insert_execution(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO workflow_executions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            EXECUTION_COLUMNS
        ))
        .bind(execution.id)
        .bind(execution.workflow_id)
        .bind(execution.tenant_id)
        .bind(execution.user_id)
        .bind(execution.trigger_type.as_str())
        .bind(Json(&execution.context))
        .bind(execution.status.as_str())
        .bind(Json(&execution.action_results))
        .bind(&execution.error_message)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(execution.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_execution(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
    ) -> StoreResult<Option<WorkflowExecution>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM workflow_executions WHERE id = $1 AND tenant_id = $2",
            EXECUTION_COLUMNS
        ))
        .bind(execution_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(execution_from_row).transpose()
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = $3, action_results = $4, error_message = $5,
                completed_at = $6, updated_at = $7
            WHERE id = $1 AND tenant_id = $2
              AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(execution.id)
        .bind(execution.tenant_id)
        .bind(execution.status.as_str())
        .bind(Json(&execution.action_results))
        .bind(&execution.error_message)
        .bind(execution.completed_at)
        .bind(execution.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        // Nothing written: either the row is gone or it is already terminal
        match self.get_execution(execution.tenant_id, execution.id).await? {
            Some(stored) => Err(StoreError::InvalidTransition {
                id: execution.id,
                from: stored.status,
                to: execution.status,
            }),
            None => Err(StoreError::NotFound(format!("Workflow execution {}", execution.id))),
        }
    }

    async fn list_executions(
        &self,
        tenant_id: Uuid,
        workflow_id: Option<Uuid>,
        limit: i64,
    ) -> StoreResult<Vec<WorkflowExecution>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM workflow_executions
            WHERE tenant_id = $1 AND ($2::uuid IS NULL OR workflow_id = $2)
            ORDER BY started_at DESC
            LIMIT $3
            "#,
            EXECUTION_COLUMNS
        ))
        .bind(tenant_id)
        .bind(workflow_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(execution_from_row).collect()
    }

    async fn insert_continuation(&self, continuation: &ScheduledContinuation) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO workflow_scheduled_actions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            CONTINUATION_COLUMNS
        ))
        .bind(continuation.id)
        .bind(continuation.execution_id)
        .bind(continuation.workflow_id)
        .bind(continuation.tenant_id)
        .bind(continuation.user_id)
        .bind(Json(&continuation.remaining_actions))
        .bind(Json(&continuation.context))
        .bind(continuation.due_at)
        .bind(continuation.status.as_str())
        .bind(&continuation.error_message)
        .bind(continuation.created_at)
        .bind(continuation.processed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn due_continuations(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<ScheduledContinuation>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM workflow_scheduled_actions
            WHERE status = 'pending' AND due_at <= $1
            ORDER BY due_at ASC
            LIMIT $2
            "#,
            CONTINUATION_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(continuation_from_row).collect()
    }

    async fn claim_continuation(&self, continuation_id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_scheduled_actions
            SET status = 'processing', processed_at = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(continuation_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let claimed = result.rows_affected() == 1;
        debug!(continuation_id = %continuation_id, claimed, "Continuation claim attempted");
        Ok(claimed)
    }

    async fn finish_continuation(
        &self,
        continuation_id: Uuid,
        status: ContinuationStatus,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_scheduled_actions
            SET status = $2, error_message = $3, processed_at = $4
            WHERE id = $1
            "#,
        )
        .bind(continuation_id)
        .bind(status.as_str())
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("Continuation {}", continuation_id)));
        }
        Ok(())
    }

    async fn continuations_for_execution(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
    ) -> StoreResult<Vec<ScheduledContinuation>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM workflow_scheduled_actions
            WHERE execution_id = $1 AND tenant_id = $2
            ORDER BY created_at ASC
            "#,
            CONTINUATION_COLUMNS
        ))
        .bind(execution_id)
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(continuation_from_row).collect()
    }
}

/// Turns a zero-row UPDATE into `NotFound`.
fn expect_one(rows_affected: u64, what: &str, id: Uuid) -> StoreResult<()> {
    if rows_affected == 0 {
        Err(StoreError::NotFound(format!("{} {}", what, id)))
    } else {
        Ok(())
    }
}

#[async_trait]
impl CrmStore for PgStore {
    async fn default_phone_number(&self, tenant_id: Uuid) -> StoreResult<Option<String>> {
        let number = sqlx::query_scalar::<_, String>(
            r#"
            SELECT number FROM phone_numbers
            WHERE tenant_id = $1
            ORDER BY is_default DESC, created_at ASC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(number)
    }

    async fn default_email_account(&self, tenant_id: Uuid) -> StoreResult<Option<EmailAccount>> {
        let account = sqlx::query_as::<_, EmailAccount>(
            r#"
            SELECT id, tenant_id, email_address, display_name, provider
            FROM email_accounts
            WHERE tenant_id = $1 AND is_active = true
            ORDER BY is_default DESC, created_at ASC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn update_lead_status(&self, tenant_id: Uuid, lead_id: Uuid, status: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE leads SET status = $3, updated_at = NOW() WHERE id = $1 AND tenant_id = $2")
            .bind(lead_id)
            .bind(tenant_id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        expect_one(result.rows_affected(), "Lead", lead_id)
    }

    async fn update_lead_stage(&self, tenant_id: Uuid, lead_id: Uuid, stage: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE leads SET stage = $3, updated_at = NOW() WHERE id = $1 AND tenant_id = $2")
            .bind(lead_id)
            .bind(tenant_id)
            .bind(stage)
            .execute(&self.pool)
            .await?;
        expect_one(result.rows_affected(), "Lead", lead_id)
    }

    async fn assign_lead(&self, tenant_id: Uuid, lead_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("UPDATE leads SET owner_id = $3, updated_at = NOW() WHERE id = $1 AND tenant_id = $2")
            .bind(lead_id)
            .bind(tenant_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        expect_one(result.rows_affected(), "Lead", lead_id)
    }

    async fn create_note(&self, note: &Note) -> StoreResult<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO notes (id, tenant_id, entity_type, entity_id, content, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(note.id)
        .bind(note.tenant_id)
        .bind(&note.entity_type)
        .bind(note.entity_id)
        .bind(&note.content)
        .bind(note.created_by)
        .bind(note.created_at)
        .execute(&self.pool)
        .await?;
        Ok(note.id)
    }

    async fn create_task(&self, task: &Task) -> StoreResult<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO tasks
            (id, tenant_id, title, description, status, priority, due_at, lead_id, assigned_to, created_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(task.id)
        .bind(task.tenant_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.status)
        .bind(&task.priority)
        .bind(task.due_at)
        .bind(task.lead_id)
        .bind(task.assigned_to)
        .bind(task.created_at)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(task.id)
    }

    async fn create_notification(&self, notification: &Notification) -> StoreResult<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO notifications
            (id, tenant_id, user_id, title, message, notification_type, entity_type, entity_id, read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(notification.id)
        .bind(notification.tenant_id)
        .bind(notification.user_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.notification_type)
        .bind(&notification.entity_type)
        .bind(notification.entity_id)
        .bind(notification.read)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;
        Ok(notification.id)
    }

    async fn create_deal(&self, deal: &Deal) -> StoreResult<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO deals
            (id, tenant_id, title, value, currency, stage, status, lead_id, contact_id, owner_id,
             expected_close_date, close_reason, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(deal.id)
        .bind(deal.tenant_id)
        .bind(&deal.title)
        .bind(deal.value)
        .bind(&deal.currency)
        .bind(&deal.stage)
        .bind(&deal.status)
        .bind(deal.lead_id)
        .bind(deal.contact_id)
        .bind(deal.owner_id)
        .bind(deal.expected_close_date)
        .bind(&deal.close_reason)
        .bind(deal.created_at)
        .bind(deal.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(deal.id)
    }

    async fn update_deal(&self, tenant_id: Uuid, deal_id: Uuid, update: &DealUpdate) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE deals SET
                title = COALESCE($3, title),
                value = COALESCE($4, value),
                expected_close_date = COALESCE($5, expected_close_date),
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(deal_id)
        .bind(tenant_id)
        .bind(&update.title)
        .bind(update.value)
        .bind(update.expected_close_date)
        .execute(&self.pool)
        .await?;
        expect_one(result.rows_affected(), "Deal", deal_id)
    }

    async fn move_deal_stage(&self, tenant_id: Uuid, deal_id: Uuid, stage: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE deals SET stage = $3, updated_at = NOW() WHERE id = $1 AND tenant_id = $2")
            .bind(deal_id)
            .bind(tenant_id)
            .bind(stage)
            .execute(&self.pool)
            .await?;
        expect_one(result.rows_affected(), "Deal", deal_id)
    }

    async fn close_deal(
        &self,
        tenant_id: Uuid,
        deal_id: Uuid,
        outcome: DealOutcome,
        reason: Option<&str>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE deals SET status = $3, close_reason = $4, closed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(deal_id)
        .bind(tenant_id)
        .bind(outcome.as_str())
        .bind(reason)
        .execute(&self.pool)
        .await?;
        expect_one(result.rows_affected(), "Deal", deal_id)
    }

    async fn add_tag(
        &self,
        tenant_id: Uuid,
        entity: EntityKind,
        entity_id: Uuid,
        tag: &str,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO entity_tags (tenant_id, entity_type, entity_id, tag, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (tenant_id, entity_type, entity_id, tag) DO NOTHING
            "#,
        )
        .bind(tenant_id)
        .bind(entity.as_str())
        .bind(entity_id)
        .bind(tag)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn remove_tag(
        &self,
        tenant_id: Uuid,
        entity: EntityKind,
        entity_id: Uuid,
        tag: &str,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM entity_tags WHERE tenant_id = $1 AND entity_type = $2 AND entity_id = $3 AND tag = $4",
        )
        .bind(tenant_id)
        .bind(entity.as_str())
        .bind(entity_id)
        .bind(tag)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn log_activity(&self, activity: &Activity) -> StoreResult<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO activities
            (id, tenant_id, activity_type, description, lead_id, contact_id, deal_id, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(activity.id)
        .bind(activity.tenant_id)
        .bind(&activity.activity_type)
        .bind(&activity.description)
        .bind(activity.lead_id)
        .bind(activity.contact_id)
        .bind(activity.deal_id)
        .bind(activity.created_by)
        .bind(activity.created_at)
        .execute(&self.pool)
        .await?;
        Ok(activity.id)
    }
}

#[async_trait]
impl AgentStore for PgStore {
    async fn save_schedule(&self, schedule: &AgentSchedule) -> StoreResult<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO agent_schedules ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                instructions = EXCLUDED.instructions,
                frequency = EXCLUDED.frequency,
                next_run_at = EXCLUDED.next_run_at,
                status = EXCLUDED.status,
                enabled = EXCLUDED.enabled,
                notify_on_completion = EXCLUDED.notify_on_completion,
                updated_at = EXCLUDED.updated_at
            WHERE agent_schedules.tenant_id = EXCLUDED.tenant_id
            "#,
            SCHEDULE_COLUMNS
        ))
        .bind(schedule.id)
        .bind(schedule.tenant_id)
        .bind(schedule.user_id)
        .bind(schedule.agent_id)
        .bind(&schedule.name)
        .bind(&schedule.instructions)
        .bind(Json(&schedule.frequency))
        .bind(schedule.next_run_at)
        .bind(schedule.status.as_str())
        .bind(schedule.enabled)
        .bind(schedule.run_count)
        .bind(schedule.last_run_at)
        .bind(&schedule.last_error)
        .bind(schedule.notify_on_completion)
        .bind(schedule.created_at)
        .bind(schedule.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_schedule(&self, tenant_id: Uuid, schedule_id: Uuid) -> StoreResult<Option<AgentSchedule>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM agent_schedules WHERE id = $1 AND tenant_id = $2",
            SCHEDULE_COLUMNS
        ))
        .bind(schedule_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(schedule_from_row).transpose()
    }

    async fn due_schedules(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<AgentSchedule>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM agent_schedules
            WHERE status = 'pending' AND enabled = true AND next_run_at <= $1
            ORDER BY next_run_at ASC
            LIMIT $2
            "#,
            SCHEDULE_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(schedule_from_row).collect()
    }

    async fn claim_schedule(&self, schedule_id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE agent_schedules SET status = 'processing', updated_at = $2 WHERE id = $1 AND status = 'pending'",
        )
        .bind(schedule_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_schedule(&self, schedule: &AgentSchedule) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE agent_schedules SET
                status = $3, next_run_at = $4, run_count = $5, last_run_at = $6,
                last_error = $7, enabled = $8, updated_at = $9
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(schedule.id)
        .bind(schedule.tenant_id)
        .bind(schedule.status.as_str())
        .bind(schedule.next_run_at)
        .bind(schedule.run_count)
        .bind(schedule.last_run_at)
        .bind(&schedule.last_error)
        .bind(schedule.enabled)
        .bind(schedule.updated_at)
        .execute(&self.pool)
        .await?;
        expect_one(result.rows_affected(), "Agent schedule", schedule.id)
    }

    async fn insert_agent_execution(&self, execution: &AgentTaskExecution) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_task_executions
            (id, schedule_id, tenant_id, agent_id, status, output, error_message, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(execution.id)
        .bind(execution.schedule_id)
        .bind(execution.tenant_id)
        .bind(execution.agent_id)
        .bind(execution.status.as_str())
        .bind(&execution.output)
        .bind(&execution.error_message)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_agent_execution(&self, execution: &AgentTaskExecution) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE agent_task_executions
            SET status = $3, output = $4, error_message = $5, completed_at = $6
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(execution.id)
        .bind(execution.tenant_id)
        .bind(execution.status.as_str())
        .bind(&execution.output)
        .bind(&execution.error_message)
        .bind(execution.completed_at)
        .execute(&self.pool)
        .await?;
        expect_one(result.rows_affected(), "Agent execution", execution.id)
    }

    async fn agent_executions_for_schedule(
        &self,
        tenant_id: Uuid,
        schedule_id: Uuid,
    ) -> StoreResult<Vec<AgentTaskExecution>> {
        let rows = sqlx::query(
            r#"
            SELECT id, schedule_id, tenant_id, agent_id, status, output, error_message, started_at, completed_at
            FROM agent_task_executions
            WHERE schedule_id = $1 AND tenant_id = $2
            ORDER BY started_at ASC
            "#,
        )
        .bind(schedule_id)
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(agent_execution_from_row).collect()
    }
}
