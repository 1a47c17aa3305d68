// Workflow Engine - Dispatches trigger events and wires the run pipeline together

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::actions::Action;
use super::context::ExecutionContext;
use super::executor::ActionExecutor;
use super::ledger::{ExecutionLedger, WorkflowExecution};
use super::normalize::deserialize_actions;
use super::poller::{DueWorkPoller, PollReport};
use super::runner::ActionRunner;
use super::scheduler::{ContinuationStatus, RunSummary, ScheduledContinuation, SuspendResumeScheduler};
use super::triggers::{matches_trigger_config, TriggerEvent, TriggerType};
use crate::agents::{AgentScheduleSweep, AgentTaskRunner};
use crate::error::{EngineError, EngineResult, StoreError, StoreResult};
use crate::services::{Clock, EmailSender, LogOnlyEmailSender, LogOnlySender, MessageSender, SystemClock};
use crate::store::{AgentStore, CrmStore, WorkflowStore};

const DEFAULT_BATCH_SIZE: i64 = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Author; runs without a user in context execute as this user
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub trigger_config: Value,
    #[serde(deserialize_with = "deserialize_actions")]
    pub actions: Vec<Action>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowDefinition {
    pub fn new(
        tenant_id: Uuid,
        user_id: Uuid,
        name: impl Into<String>,
        trigger_type: TriggerType,
        actions: Vec<Action>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            user_id,
            name: name.into(),
            description: None,
            trigger_type,
            trigger_config: Value::Object(Default::default()),
            actions,
            enabled: true,
            created_at: now,
            updated_at: None,
        }
    }

    pub fn with_trigger_config(mut self, trigger_config: Value) -> Self {
        self.trigger_config = trigger_config;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether this definition should run for `event`.
    pub fn accepts(&self, event: &TriggerEvent) -> bool {
        self.enabled
            && self.tenant_id == event.tenant_id
            && self.trigger_type == event.trigger_type
            && matches_trigger_config(&self.trigger_config, &event.payload)
    }
}

/// Entry point for everything outside the engine: fire events, run a
/// workflow by hand, poll for due work, read history.
///
/// Cheap to clone; clones share one pipeline.
#[derive(Clone)]
pub struct WorkflowEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: Arc<dyn WorkflowStore>,
    scheduler: SuspendResumeScheduler,
    poller: DueWorkPoller,
    clock: Arc<dyn Clock>,
}

impl WorkflowEngine {
    pub fn builder(store: Arc<dyn WorkflowStore>, crm: Arc<dyn CrmStore>) -> WorkflowEngineBuilder {
        WorkflowEngineBuilder::new(store, crm)
    }

    pub fn scheduler(&self) -> &SuspendResumeScheduler {
        &self.inner.scheduler
    }

    pub fn ledger(&self) -> &ExecutionLedger {
        self.inner.scheduler.ledger()
    }

    pub async fn save_workflow(&self, workflow: &WorkflowDefinition) -> StoreResult<()> {
        self.inner.store.save_workflow(workflow).await
    }

    /// Start one run per enabled workflow that accepts `event`.
    ///
    /// Runs are spawned and not awaited: the caller gets back the ids of the
    /// workflows that were started, and a failing run is only logged.
    pub async fn fire(&self, event: TriggerEvent) -> EngineResult<Vec<Uuid>> {
        let workflows = self
            .inner
            .store
            .enabled_workflows_for_trigger(event.tenant_id, event.trigger_type)
            .await?;

        let mut started = Vec::new();
        for workflow in workflows.into_iter().filter(|w| w.accepts(&event)) {
            let scheduler = self.inner.scheduler.clone();
            let context = event.context.clone();
            let trigger_type = event.trigger_type;
            started.push(workflow.id);

            tokio::spawn(async move {
                match scheduler.start(&workflow, &context, trigger_type).await {
                    Ok(summary) => info!(
                        execution_id = %summary.execution_id,
                        workflow_id = %workflow.id,
                        "Workflow '{}' run ended {}", workflow.name, summary.status
                    ),
                    Err(e) => error!(
                        workflow_id = %workflow.id,
                        "Workflow '{}' could not run: {}", workflow.name, e
                    ),
                }
            });
        }

        if started.is_empty() {
            info!(event_id = %event.event_id, "No workflows listening for {}", event.trigger_type);
        } else {
            info!(
                event_id = %event.event_id,
                "Dispatched {} workflow(s) for {}", started.len(), event.trigger_type
            );
        }
        Ok(started)
    }

    /// Run one workflow now and wait for it to finish or pause.
    pub async fn start_execution(
        &self,
        tenant_id: Uuid,
        workflow_id: Uuid,
        context: ExecutionContext,
    ) -> EngineResult<RunSummary> {
        let workflow = self
            .inner
            .store
            .get_workflow(tenant_id, workflow_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Workflow {}", workflow_id)))?;

        if !workflow.enabled {
            warn!(workflow_id = %workflow.id, "Running disabled workflow '{}' by hand", workflow.name);
        }

        self.inner
            .scheduler
            .start(&workflow, &context, TriggerType::Manual)
            .await
    }

    /// Resume the pending continuation `continuation_id` right away, ahead of
    /// its due time. Claims it like the poller does.
    pub async fn resume(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
        continuation_id: Uuid,
    ) -> EngineResult<RunSummary> {
        let continuation = self
            .continuations(tenant_id, execution_id)
            .await?
            .into_iter()
            .find(|c| c.id == continuation_id)
            .ok_or_else(|| StoreError::NotFound(format!("Continuation {}", continuation_id)))?;

        let now = self.inner.clock.now();
        if !self.inner.store.claim_continuation(continuation.id, now).await? {
            return Err(StoreError::InvalidData(format!(
                "Continuation {} is not pending",
                continuation.id
            ))
            .into());
        }

        let result = self.inner.scheduler.resume(&continuation).await;
        let (status, message) = match &result {
            Ok(summary) if summary.all_succeeded() => (ContinuationStatus::Completed, None),
            Ok(_) => (
                ContinuationStatus::Failed,
                Some("One or more resumed actions failed".to_string()),
            ),
            Err(e) => (ContinuationStatus::Failed, Some(e.to_string())),
        };
        self.inner
            .store
            .finish_continuation(continuation.id, status, message.as_deref(), self.inner.clock.now())
            .await?;
        result
    }

    /// One sweep over due continuations and agent schedules.
    pub async fn poll_once(&self) -> PollReport {
        self.inner.poller.poll_once().await
    }

    pub async fn execution(&self, tenant_id: Uuid, execution_id: Uuid) -> EngineResult<WorkflowExecution> {
        match self.ledger().load(tenant_id, execution_id).await {
            Ok(execution) => Ok(execution),
            Err(StoreError::NotFound(_)) => Err(EngineError::ExecutionNotFound(execution_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Run history, newest first.
    pub async fn history(
        &self,
        tenant_id: Uuid,
        workflow_id: Option<Uuid>,
        limit: i64,
    ) -> StoreResult<Vec<WorkflowExecution>> {
        self.ledger().history(tenant_id, workflow_id, limit).await
    }

    pub async fn continuations(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
    ) -> StoreResult<Vec<ScheduledContinuation>> {
        self.ledger().continuations(tenant_id, execution_id).await
    }
}

/// Assembles a [`WorkflowEngine`]. Senders default to log-only, the clock to
/// the system clock, and the agent sweep is off unless configured.
pub struct WorkflowEngineBuilder {
    store: Arc<dyn WorkflowStore>,
    crm: Arc<dyn CrmStore>,
    sms: Arc<dyn MessageSender>,
    email: Arc<dyn EmailSender>,
    clock: Arc<dyn Clock>,
    agents: Option<(Arc<dyn AgentStore>, Arc<dyn AgentTaskRunner>)>,
    batch_size: i64,
    agent_batch_size: i64,
}

impl WorkflowEngineBuilder {
    pub fn new(store: Arc<dyn WorkflowStore>, crm: Arc<dyn CrmStore>) -> Self {
        Self {
            store,
            crm,
            sms: Arc::new(LogOnlySender),
            email: Arc::new(LogOnlyEmailSender),
            clock: Arc::new(SystemClock),
            agents: None,
            batch_size: DEFAULT_BATCH_SIZE,
            agent_batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn sms_sender(mut self, sms: Arc<dyn MessageSender>) -> Self {
        self.sms = sms;
        self
    }

    pub fn email_sender(mut self, email: Arc<dyn EmailSender>) -> Self {
        self.email = email;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn agents(mut self, store: Arc<dyn AgentStore>, runner: Arc<dyn AgentTaskRunner>, batch_size: i64) -> Self {
        self.agents = Some((store, runner));
        self.agent_batch_size = batch_size;
        self
    }

    pub fn build(self) -> WorkflowEngine {
        let ledger = ExecutionLedger::new(self.store.clone(), self.clock.clone());
        let executor = ActionExecutor::new(self.crm.clone(), self.sms, self.email, self.clock.clone());
        let runner = ActionRunner::new(executor, ledger.clone(), self.clock.clone());
        let scheduler = SuspendResumeScheduler::new(self.store.clone(), ledger, runner, self.clock.clone());

        let mut poller = DueWorkPoller::new(
            self.store.clone(),
            scheduler.clone(),
            self.clock.clone(),
            self.batch_size,
        );
        if let Some((agent_store, agent_runner)) = self.agents {
            let sweep = AgentScheduleSweep::new(agent_store, self.crm, agent_runner, self.clock.clone());
            poller = poller.with_agent_sweep(sweep, self.agent_batch_size);
        }

        WorkflowEngine {
            inner: Arc::new(EngineInner {
                store: self.store,
                scheduler,
                poller,
                clock: self.clock,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_shared::Lead;
    use serde_json::json;

    fn lead_event(tenant_id: Uuid, to_status: &str) -> TriggerEvent {
        let lead = Lead {
            id: Uuid::new_v4(),
            tenant_id,
            status: to_status.to_string(),
            ..Default::default()
        };
        TriggerEvent::lead_status_changed(lead, "new", Uuid::new_v4())
    }

    #[test]
    fn test_accepts() {
        let tenant_id = Uuid::new_v4();
        let workflow = WorkflowDefinition::new(
            tenant_id,
            Uuid::new_v4(),
            "Qualified follow-up",
            TriggerType::LeadStatusChanged,
            vec![Action::add_note(1, "Qualified")],
            Utc::now(),
        )
        .with_trigger_config(json!({"to_status": "qualified"}));

        assert!(workflow.accepts(&lead_event(tenant_id, "qualified")));
        assert!(!workflow.accepts(&lead_event(tenant_id, "lost")));
        // other tenant
        assert!(!workflow.accepts(&lead_event(Uuid::new_v4(), "qualified")));
        assert!(!workflow.clone().disabled().accepts(&lead_event(tenant_id, "qualified")));
    }

    #[test]
    fn test_definition_normalizes_actions() {
        let raw = json!({
            "id": Uuid::new_v4(),
            "tenant_id": Uuid::new_v4(),
            "user_id": Uuid::new_v4(),
            "name": "Legacy",
            "description": null,
            "trigger_type": "lead_created",
            "actions": [
                {"type": "sms", "config": {"text": "Hi {{first_name}}"}},
                {"type": "delay", "config": {"delay": 2, "delayUnit": "days"}}
            ],
            "enabled": true,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": null
        });

        let workflow: WorkflowDefinition = serde_json::from_value(raw).unwrap();
        assert_eq!(workflow.actions.len(), 2);
        assert_eq!(workflow.actions[0].order, 0);
        assert_eq!(workflow.actions[1].order, 1);
        assert!(workflow.actions[1].is_wait());
        assert!(workflow.trigger_config.is_null());
    }
}
