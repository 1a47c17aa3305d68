// PgStore against a real database. Skipped unless TEST_DATABASE_URL is set.

mod common;

use chrono::{Duration, Utc};
use sqlx::Row;
use std::sync::Arc;
use uuid::Uuid;

use leadflow_backend::database::{self, PoolConfig};
use leadflow_backend::error::StoreError;
use leadflow_backend::services::{Clock, ManualClock};
use leadflow_backend::store::{PgStore, WorkflowStore};
use leadflow_backend::workflows::{
    Action, ExecutionContext, ExecutionStatus, TriggerType, WaitUnit, WorkflowDefinition, WorkflowEngine,
};

async fn test_store() -> Option<Arc<PgStore>> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return None;
    };
    common::init_test_logging();

    let config = PoolConfig {
        max_connections: 4,
        min_connections: 1,
        ..Default::default()
    };
    let pool = database::create_pool_with_config(&url, config).await.unwrap();
    database::migrate(&pool).await.unwrap();
    assert!(database::health_check(&pool).await);
    Some(Arc::new(PgStore::new(pool)))
}

#[tokio::test]
async fn test_workflow_round_trip() {
    let Some(store) = test_store().await else { return };
    let tenant_id = Uuid::new_v4();

    let workflow = WorkflowDefinition::new(
        tenant_id,
        Uuid::new_v4(),
        "Nurture",
        TriggerType::LeadCreated,
        vec![Action::wait(1, 2, WaitUnit::Days), Action::add_note(2, "Checked in")],
        Utc::now(),
    );
    store.save_workflow(&workflow).await.unwrap();

    let loaded = store.get_workflow(tenant_id, workflow.id).await.unwrap().unwrap();
    assert_eq!(loaded.actions, workflow.actions);
    assert_eq!(loaded.trigger_type, TriggerType::LeadCreated);

    // Tenant scoped
    assert!(store.get_workflow(Uuid::new_v4(), workflow.id).await.unwrap().is_none());

    let listening = store
        .enabled_workflows_for_trigger(tenant_id, TriggerType::LeadCreated)
        .await
        .unwrap();
    assert_eq!(listening.len(), 1);
}

#[tokio::test]
async fn test_paused_run_resumes_through_postgres() {
    let Some(store) = test_store().await else { return };
    let tenant_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let clock = Arc::new(ManualClock::new(Utc::now()));

    let engine = WorkflowEngine::builder(store.clone(), store.clone())
        .clock(clock.clone())
        .build();

    let workflow = WorkflowDefinition::new(
        tenant_id,
        user_id,
        "Tag after a minute",
        TriggerType::Manual,
        vec![
            Action::add_note(1, "Queued"),
            Action::wait(2, 1, WaitUnit::Minutes),
            Action::add_tag(3, "followed-up"),
        ],
        clock.now(),
    );
    engine.save_workflow(&workflow).await.unwrap();

    let lead = common::fake_lead(tenant_id);
    let ctx = ExecutionContext::new(tenant_id, user_id).with_lead(lead.clone());
    let summary = engine.start_execution(tenant_id, workflow.id, ctx).await.unwrap();
    assert_eq!(summary.status, ExecutionStatus::Paused);

    let continuation_id = summary.continuation_id.unwrap();
    assert!(store.claim_continuation(continuation_id, clock.now()).await.unwrap());

    // The claim above took it; hand it back to the poller
    sqlx::query("UPDATE workflow_scheduled_actions SET status = 'pending' WHERE id = $1")
        .bind(continuation_id)
        .execute(store.pool())
        .await
        .unwrap();

    clock.advance(Duration::minutes(1));
    engine.poll_once().await;

    let execution = engine.execution(tenant_id, summary.execution_id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.action_results.len(), 3);

    let tags = sqlx::query("SELECT tag FROM entity_tags WHERE tenant_id = $1 AND entity_id = $2")
        .bind(tenant_id)
        .bind(lead.id)
        .fetch_all(store.pool())
        .await
        .unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].get::<String, _>("tag"), "followed-up");

    // A second claim on a settled continuation is refused
    assert!(!store.claim_continuation(continuation_id, clock.now()).await.unwrap());
}

#[tokio::test]
async fn test_terminal_execution_rejects_updates() {
    let Some(store) = test_store().await else { return };
    let tenant_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    let engine = WorkflowEngine::builder(store.clone(), store.clone()).build();
    let workflow = WorkflowDefinition::new(
        tenant_id,
        user_id,
        "One note",
        TriggerType::Manual,
        vec![Action::add_note(1, "Hello")],
        Utc::now(),
    );
    engine.save_workflow(&workflow).await.unwrap();

    let ctx = ExecutionContext::new(tenant_id, user_id).with_lead(common::fake_lead(tenant_id));
    let summary = engine.start_execution(tenant_id, workflow.id, ctx).await.unwrap();
    assert_eq!(summary.status, ExecutionStatus::Completed);

    let mut execution = engine.execution(tenant_id, summary.execution_id).await.unwrap();
    execution.status = ExecutionStatus::Running;
    execution.action_results.clear();

    assert!(matches!(
        store.update_execution(&execution).await,
        Err(StoreError::InvalidTransition { .. })
    ));
    let stored = engine.execution(tenant_id, summary.execution_id).await.unwrap();
    assert_eq!(stored.action_results.len(), 1);
}
