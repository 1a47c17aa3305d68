// Common test utilities that are shared across integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use leadflow_shared::Lead;
use std::sync::{Arc, Mutex, Once};
use tokio::sync::Barrier;
use uuid::Uuid;

use leadflow_backend::error::StoreResult;
use leadflow_backend::services::{Clock, ManualClock, MessageSender, SendOutcome};
use leadflow_backend::store::{InMemoryStore, WorkflowStore};
use leadflow_backend::workflows::{
    ContinuationStatus, ScheduledContinuation, TriggerType, WorkflowDefinition, WorkflowEngine,
    WorkflowExecution,
};

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init()
            .ok();
    });
}

pub const TENANT_PHONE: &str = "+15550100";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

/// A `new` lead with a fake name and email and a fixed phone number.
pub fn fake_lead(tenant_id: Uuid) -> Lead {
    Lead {
        id: Uuid::new_v4(),
        tenant_id,
        first_name: Some(FirstName().fake()),
        last_name: Some(LastName().fake()),
        email: Some(SafeEmail().fake()),
        phone: Some("+15550199".to_string()),
        status: "new".to_string(),
        created_at: start_time(),
        ..Default::default()
    }
}

/// Records every SMS instead of sending it.
#[derive(Default)]
pub struct RecordingSms {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingSms {
    /// `(to, from, body)` in send order.
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSender for RecordingSms {
    async fn send_message(&self, to: &str, from: &str, body: &str) -> SendOutcome {
        let mut sent = self.sent.lock().unwrap();
        sent.push((to.to_string(), from.to_string(), body.to_string()));
        SendOutcome::sent(format!("SM{}", sent.len()))
    }
}

/// An engine over an in-memory store with a manual clock and recording SMS.
pub struct TestHarness {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub sms: Arc<RecordingSms>,
    pub engine: WorkflowEngine,
}

impl TestHarness {
    pub async fn new() -> Self {
        init_test_logging();

        let tenant_id = Uuid::new_v4();
        let store = Arc::new(InMemoryStore::new());
        store.set_phone_number(tenant_id, TENANT_PHONE).await;
        let clock = Arc::new(ManualClock::new(start_time()));
        let sms = Arc::new(RecordingSms::default());

        let engine = WorkflowEngine::builder(store.clone(), store.clone())
            .sms_sender(sms.clone())
            .clock(clock.clone())
            .build();

        Self {
            tenant_id,
            user_id: Uuid::new_v4(),
            store,
            clock,
            sms,
            engine,
        }
    }

    /// Save an enabled manual workflow with `actions`.
    pub async fn workflow(&self, actions: Vec<leadflow_backend::workflows::Action>) -> WorkflowDefinition {
        let workflow = WorkflowDefinition::new(
            self.tenant_id,
            self.user_id,
            "Test workflow",
            TriggerType::Manual,
            actions,
            self.clock.now(),
        );
        self.engine.save_workflow(&workflow).await.unwrap();
        workflow
    }

    /// Insert a fresh lead for this tenant.
    pub async fn lead(&self) -> Lead {
        let lead = fake_lead(self.tenant_id);
        self.store.insert_lead(lead.clone()).await;
        lead
    }
}

/// Delegates to an [`InMemoryStore`], but holds every `due_continuations`
/// caller at a barrier until `parties` pollers have all loaded the same due
/// rows. Forces the claim race between concurrent pollers.
pub struct RacingStore {
    inner: Arc<InMemoryStore>,
    barrier: Barrier,
}

impl RacingStore {
    pub fn new(inner: Arc<InMemoryStore>, parties: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(parties),
        }
    }
}

#[async_trait]
impl WorkflowStore for RacingStore {
    async fn save_workflow(&self, workflow: &WorkflowDefinition) -> StoreResult<()> {
        self.inner.save_workflow(workflow).await
    }

    async fn get_workflow(&self, tenant_id: Uuid, workflow_id: Uuid) -> StoreResult<Option<WorkflowDefinition>> {
        self.inner.get_workflow(tenant_id, workflow_id).await
    }

    async fn enabled_workflows_for_trigger(
        &self,
        tenant_id: Uuid,
        trigger_type: TriggerType,
    ) -> StoreResult<Vec<WorkflowDefinition>> {
        self.inner.enabled_workflows_for_trigger(tenant_id, trigger_type).await
    }

    async fn insert_execution(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        self.inner.insert_execution(execution).await
    }

    async fn get_execution(&self, tenant_id: Uuid, execution_id: Uuid) -> StoreResult<Option<WorkflowExecution>> {
        self.inner.get_execution(tenant_id, execution_id).await
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        self.inner.update_execution(execution).await
    }

    async fn list_executions(
        &self,
        tenant_id: Uuid,
        workflow_id: Option<Uuid>,
        limit: i64,
    ) -> StoreResult<Vec<WorkflowExecution>> {
        self.inner.list_executions(tenant_id, workflow_id, limit).await
    }

    async fn insert_continuation(&self, continuation: &ScheduledContinuation) -> StoreResult<()> {
        self.inner.insert_continuation(continuation).await
    }

    async fn due_continuations(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<ScheduledContinuation>> {
        let due = self.inner.due_continuations(now, limit).await;
        self.barrier.wait().await;
        due
    }

    async fn claim_continuation(&self, continuation_id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        self.inner.claim_continuation(continuation_id, now).await
    }

    async fn finish_continuation(
        &self,
        continuation_id: Uuid,
        status: ContinuationStatus,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.inner
            .finish_continuation(continuation_id, status, error, now)
            .await
    }

    async fn continuations_for_execution(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
    ) -> StoreResult<Vec<ScheduledContinuation>> {
        self.inner.continuations_for_execution(tenant_id, execution_id).await
    }
}
