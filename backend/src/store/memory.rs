// In-memory datastore - Same semantics as PgStore, for tests and local runs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadflow_shared::{
    Activity, Deal, DealOutcome, EmailAccount, EntityKind, Lead, Note, Notification, Task,
};
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{AgentStore, CrmStore, DealUpdate, WorkflowStore};
use crate::agents::{AgentSchedule, AgentTaskExecution, ScheduleStatus};
use crate::error::{StoreError, StoreResult};
use crate::workflows::{
    ContinuationStatus, ScheduledContinuation, TriggerType, WorkflowDefinition, WorkflowExecution,
};

type TagKey = (Uuid, EntityKind, Uuid);

#[derive(Default)]
struct State {
    workflows: Vec<WorkflowDefinition>,
    executions: Vec<WorkflowExecution>,
    continuations: Vec<ScheduledContinuation>,
    phone_numbers: HashMap<Uuid, String>,
    email_accounts: HashMap<Uuid, EmailAccount>,
    leads: HashMap<Uuid, Lead>,
    deals: Vec<Deal>,
    notes: Vec<Note>,
    tasks: Vec<Task>,
    notifications: Vec<Notification>,
    activities: Vec<Activity>,
    tags: HashMap<TagKey, BTreeSet<String>>,
    schedules: Vec<AgentSchedule>,
    agent_executions: Vec<AgentTaskExecution>,
}

impl State {
    fn lead_mut(&mut self, tenant_id: Uuid, lead_id: Uuid) -> StoreResult<&mut Lead> {
        self.leads
            .get_mut(&lead_id)
            .filter(|l| l.tenant_id == tenant_id)
            .ok_or_else(|| StoreError::NotFound(format!("Lead {}", lead_id)))
    }

    fn deal_mut(&mut self, tenant_id: Uuid, deal_id: Uuid) -> StoreResult<&mut Deal> {
        self.deals
            .iter_mut()
            .find(|d| d.id == deal_id && d.tenant_id == tenant_id)
            .ok_or_else(|| StoreError::NotFound(format!("Deal {}", deal_id)))
    }
}

/// Everything behind one async mutex, so each port call is atomic.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_phone_number(&self, tenant_id: Uuid, number: &str) {
        self.state
            .lock()
            .await
            .phone_numbers
            .insert(tenant_id, number.to_string());
    }

    pub async fn set_email_account(&self, account: EmailAccount) {
        self.state
            .lock()
            .await
            .email_accounts
            .insert(account.tenant_id, account);
    }

    pub async fn insert_lead(&self, lead: Lead) {
        self.state.lock().await.leads.insert(lead.id, lead);
    }

    pub async fn lead(&self, lead_id: Uuid) -> Option<Lead> {
        self.state.lock().await.leads.get(&lead_id).cloned()
    }

    pub async fn insert_deal(&self, deal: Deal) {
        self.state.lock().await.deals.push(deal);
    }

    pub async fn deal(&self, deal_id: Uuid) -> Option<Deal> {
        self.state
            .lock()
            .await
            .deals
            .iter()
            .find(|d| d.id == deal_id)
            .cloned()
    }

    pub async fn deals(&self) -> Vec<Deal> {
        self.state.lock().await.deals.clone()
    }

    pub async fn notes(&self) -> Vec<Note> {
        self.state.lock().await.notes.clone()
    }

    pub async fn tasks(&self) -> Vec<Task> {
        self.state.lock().await.tasks.clone()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.lock().await.notifications.clone()
    }

    pub async fn activities(&self) -> Vec<Activity> {
        self.state.lock().await.activities.clone()
    }

    /// Tags on one entity, sorted.
    pub async fn tags(&self, entity: EntityKind, entity_id: Uuid) -> Vec<String> {
        self.state
            .lock()
            .await
            .tags
            .iter()
            .filter(|((_, kind, id), _)| *kind == entity && *id == entity_id)
            .flat_map(|(_, tags)| tags.iter().cloned())
            .collect()
    }

    /// Every continuation, in insertion order.
    pub async fn continuations(&self) -> Vec<ScheduledContinuation> {
        self.state.lock().await.continuations.clone()
    }

    pub async fn executions(&self) -> Vec<WorkflowExecution> {
        self.state.lock().await.executions.clone()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStore {
    async fn save_workflow(&self, workflow: &WorkflowDefinition) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        match state.workflows.iter_mut().find(|w| w.id == workflow.id) {
            Some(existing) => *existing = workflow.clone(),
            None => state.workflows.push(workflow.clone()),
        }
        Ok(())
    }

    async fn get_workflow(
        &self,
        tenant_id: Uuid,
        workflow_id: Uuid,
    ) -> StoreResult<Option<WorkflowDefinition>> {
        let state = self.state.lock().await;
        Ok(state
            .workflows
            .iter()
            .find(|w| w.id == workflow_id && w.tenant_id == tenant_id)
            .cloned())
    }

    async fn enabled_workflows_for_trigger(
        &self,
        tenant_id: Uuid,
        trigger_type: TriggerType,
    ) -> StoreResult<Vec<WorkflowDefinition>> {
        let state = self.state.lock().await;
        Ok(state
            .workflows
            .iter()
            .filter(|w| w.tenant_id == tenant_id && w.trigger_type == trigger_type && w.enabled)
            .cloned()
            .collect())
    }

    async fn insert_execution(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        self.state.lock().await.executions.push(execution.clone());
        Ok(())
    }

    async fn get_execution(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
    ) -> StoreResult<Option<WorkflowExecution>> {
        let state = self.state.lock().await;
        Ok(state
            .executions
            .iter()
            .find(|e| e.id == execution_id && e.tenant_id == tenant_id)
            .cloned())
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let stored = state
            .executions
            .iter_mut()
            .find(|e| e.id == execution.id && e.tenant_id == execution.tenant_id)
            .ok_or_else(|| StoreError::NotFound(format!("Workflow execution {}", execution.id)))?;

        if stored.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                id: execution.id,
                from: stored.status,
                to: execution.status,
            });
        }

        *stored = execution.clone();
        Ok(())
    }

    async fn list_executions(
        &self,
        tenant_id: Uuid,
        workflow_id: Option<Uuid>,
        limit: i64,
    ) -> StoreResult<Vec<WorkflowExecution>> {
        let state = self.state.lock().await;
        // latest insert wins ties on started_at
        let mut rows: Vec<WorkflowExecution> = state
            .executions
            .iter()
            .rev()
            .filter(|e| e.tenant_id == tenant_id)
            .filter(|e| workflow_id.is_none_or(|id| e.workflow_id == id))
            .cloned()
            .collect();
        rows.sort_by_key(|e| Reverse(e.started_at));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn insert_continuation(&self, continuation: &ScheduledContinuation) -> StoreResult<()> {
        self.state.lock().await.continuations.push(continuation.clone());
        Ok(())
    }

    async fn due_continuations(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<ScheduledContinuation>> {
        let state = self.state.lock().await;
        let mut due: Vec<ScheduledContinuation> = state
            .continuations
            .iter()
            .filter(|c| c.status == ContinuationStatus::Pending && c.due_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|c| c.due_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn claim_continuation(&self, continuation_id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state
            .continuations
            .iter_mut()
            .find(|c| c.id == continuation_id && c.status == ContinuationStatus::Pending)
        {
            Some(continuation) => {
                continuation.status = ContinuationStatus::Processing;
                continuation.processed_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn finish_continuation(
        &self,
        continuation_id: Uuid,
        status: ContinuationStatus,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let continuation = state
            .continuations
            .iter_mut()
            .find(|c| c.id == continuation_id)
            .ok_or_else(|| StoreError::NotFound(format!("Continuation {}", continuation_id)))?;
        continuation.status = status;
        continuation.error_message = error.map(str::to_string);
        continuation.processed_at = Some(now);
        Ok(())
    }

    async fn continuations_for_execution(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
    ) -> StoreResult<Vec<ScheduledContinuation>> {
        let state = self.state.lock().await;
        Ok(state
            .continuations
            .iter()
            .filter(|c| c.execution_id == execution_id && c.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CrmStore for InMemoryStore {
    async fn default_phone_number(&self, tenant_id: Uuid) -> StoreResult<Option<String>> {
        Ok(self.state.lock().await.phone_numbers.get(&tenant_id).cloned())
    }

    async fn default_email_account(&self, tenant_id: Uuid) -> StoreResult<Option<EmailAccount>> {
        Ok(self.state.lock().await.email_accounts.get(&tenant_id).cloned())
    }

    async fn update_lead_status(&self, tenant_id: Uuid, lead_id: Uuid, status: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let lead = state.lead_mut(tenant_id, lead_id)?;
        lead.status = status.to_string();
        lead.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn update_lead_stage(&self, tenant_id: Uuid, lead_id: Uuid, stage: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let lead = state.lead_mut(tenant_id, lead_id)?;
        lead.stage = Some(stage.to_string());
        lead.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn assign_lead(&self, tenant_id: Uuid, lead_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let lead = state.lead_mut(tenant_id, lead_id)?;
        lead.owner_id = Some(user_id);
        lead.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn create_note(&self, note: &Note) -> StoreResult<Uuid> {
        self.state.lock().await.notes.push(note.clone());
        Ok(note.id)
    }

    async fn create_task(&self, task: &Task) -> StoreResult<Uuid> {
        self.state.lock().await.tasks.push(task.clone());
        Ok(task.id)
    }

    async fn create_notification(&self, notification: &Notification) -> StoreResult<Uuid> {
        self.state.lock().await.notifications.push(notification.clone());
        Ok(notification.id)
    }

    async fn create_deal(&self, deal: &Deal) -> StoreResult<Uuid> {
        self.state.lock().await.deals.push(deal.clone());
        Ok(deal.id)
    }

    async fn update_deal(&self, tenant_id: Uuid, deal_id: Uuid, update: &DealUpdate) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let deal = state.deal_mut(tenant_id, deal_id)?;
        if let Some(title) = &update.title {
            deal.title = title.clone();
        }
        if let Some(value) = update.value {
            deal.value = Some(value);
        }
        if let Some(date) = update.expected_close_date {
            deal.expected_close_date = Some(date);
        }
        deal.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn move_deal_stage(&self, tenant_id: Uuid, deal_id: Uuid, stage: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let deal = state.deal_mut(tenant_id, deal_id)?;
        deal.stage = Some(stage.to_string());
        deal.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn close_deal(
        &self,
        tenant_id: Uuid,
        deal_id: Uuid,
        outcome: DealOutcome,
        reason: Option<&str>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let deal = state.deal_mut(tenant_id, deal_id)?;
        deal.status = outcome.as_str().to_string();
        deal.close_reason = reason.map(str::to_string);
        deal.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn add_tag(
        &self,
        tenant_id: Uuid,
        entity: EntityKind,
        entity_id: Uuid,
        tag: &str,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        Ok(state
            .tags
            .entry((tenant_id, entity, entity_id))
            .or_default()
            .insert(tag.to_string()))
    }

    async fn remove_tag(
        &self,
        tenant_id: Uuid,
        entity: EntityKind,
        entity_id: Uuid,
        tag: &str,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        Ok(state
            .tags
            .get_mut(&(tenant_id, entity, entity_id))
            .is_some_and(|tags| tags.remove(tag)))
    }

    async fn log_activity(&self, activity: &Activity) -> StoreResult<Uuid> {
        self.state.lock().await.activities.push(activity.clone());
        Ok(activity.id)
    }
}

#[async_trait]
impl AgentStore for InMemoryStore {
    async fn save_schedule(&self, schedule: &AgentSchedule) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        match state.schedules.iter_mut().find(|s| s.id == schedule.id) {
            Some(existing) => *existing = schedule.clone(),
            None => state.schedules.push(schedule.clone()),
        }
        Ok(())
    }

    async fn get_schedule(&self, tenant_id: Uuid, schedule_id: Uuid) -> StoreResult<Option<AgentSchedule>> {
        let state = self.state.lock().await;
        Ok(state
            .schedules
            .iter()
            .find(|s| s.id == schedule_id && s.tenant_id == tenant_id)
            .cloned())
    }

    async fn due_schedules(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<AgentSchedule>> {
        let state = self.state.lock().await;
        let mut due: Vec<AgentSchedule> = state.schedules.iter().filter(|s| s.is_due(now)).cloned().collect();
        due.sort_by_key(|s| s.next_run_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn claim_schedule(&self, schedule_id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state
            .schedules
            .iter_mut()
            .find(|s| s.id == schedule_id && s.status == ScheduleStatus::Pending)
        {
            Some(schedule) => {
                schedule.status = ScheduleStatus::Processing;
                schedule.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_schedule(&self, schedule: &AgentSchedule) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let stored = state
            .schedules
            .iter_mut()
            .find(|s| s.id == schedule.id)
            .ok_or_else(|| StoreError::NotFound(format!("Agent schedule {}", schedule.id)))?;
        *stored = schedule.clone();
        Ok(())
    }

    async fn insert_agent_execution(&self, execution: &AgentTaskExecution) -> StoreResult<()> {
        self.state.lock().await.agent_executions.push(execution.clone());
        Ok(())
    }

    async fn update_agent_execution(&self, execution: &AgentTaskExecution) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let stored = state
            .agent_executions
            .iter_mut()
            .find(|e| e.id == execution.id)
            .ok_or_else(|| StoreError::NotFound(format!("Agent execution {}", execution.id)))?;
        *stored = execution.clone();
        Ok(())
    }

    async fn agent_executions_for_schedule(
        &self,
        tenant_id: Uuid,
        schedule_id: Uuid,
    ) -> StoreResult<Vec<AgentTaskExecution>> {
        let state = self.state.lock().await;
        Ok(state
            .agent_executions
            .iter()
            .filter(|e| e.schedule_id == schedule_id && e.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}
