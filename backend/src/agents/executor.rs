// Agent Task Sweep - Runs due agent schedules, records them and notifies owners

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use leadflow_shared::Notification;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::schedule::{AgentSchedule, ScheduleStatus};
use crate::error::StoreResult;
use crate::services::Clock;
use crate::store::{AgentStore, CrmStore};
use crate::workflows::poller::panic_message;
use crate::workflows::SweepReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl AgentExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentExecutionStatus::Running => "running",
            AgentExecutionStatus::Completed => "completed",
            AgentExecutionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(AgentExecutionStatus::Running),
            "completed" => Some(AgentExecutionStatus::Completed),
            "failed" => Some(AgentExecutionStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for AgentExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One run of one agent schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTaskExecution {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub tenant_id: Uuid,
    pub agent_id: Uuid,
    pub status: AgentExecutionStatus,
    pub output: Option<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// What an agent run produced. Runners report failure here rather than
/// returning an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRunOutcome {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl AgentRunOutcome {
    pub fn completed(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// Carries out a schedule's instructions.
#[async_trait]
pub trait AgentTaskRunner: Send + Sync {
    async fn run(&self, schedule: &AgentSchedule) -> AgentRunOutcome;
}

/// Fallback runner used when no agent backend is wired in.
#[derive(Debug, Clone, Default)]
pub struct LogOnlyAgentRunner;

#[async_trait]
impl AgentTaskRunner for LogOnlyAgentRunner {
    async fn run(&self, schedule: &AgentSchedule) -> AgentRunOutcome {
        info!(
            schedule_id = %schedule.id,
            agent_id = %schedule.agent_id,
            "Agent task '{}' (log only): {}", schedule.name, schedule.instructions
        );
        AgentRunOutcome::completed(format!("Logged instructions for '{}'", schedule.name))
    }
}

const NOTIFICATION_PREVIEW_CHARS: usize = 280;

#[derive(Clone)]
pub struct AgentScheduleSweep {
    store: Arc<dyn AgentStore>,
    crm: Arc<dyn CrmStore>,
    runner: Arc<dyn AgentTaskRunner>,
    clock: Arc<dyn Clock>,
}

impl AgentScheduleSweep {
    pub fn new(
        store: Arc<dyn AgentStore>,
        crm: Arc<dyn CrmStore>,
        runner: Arc<dyn AgentTaskRunner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            crm,
            runner,
            clock,
        }
    }

    /// Run every due schedule (up to `limit`), earliest first, one at a time.
    pub async fn sweep(&self, limit: i64) -> SweepReport {
        let mut report = SweepReport::default();

        let due = match self.store.due_schedules(self.clock.now(), limit).await {
            Ok(due) => due,
            Err(e) => {
                error!("Failed to load due agent schedules: {}", e);
                report.errors.push(format!("Failed to load due agent schedules: {}", e));
                return report;
            }
        };

        for schedule in due {
            match self.store.claim_schedule(schedule.id, self.clock.now()).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(schedule_id = %schedule.id, "Agent schedule already claimed, skipping");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(schedule_id = %schedule.id, "Failed to claim agent schedule: {}", e);
                    report.errors.push(format!("Agent schedule {}: claim failed: {}", schedule.id, e));
                    continue;
                }
            }

            let outcome = self.run_claimed(&schedule).await;
            if outcome.success {
                report.record_success();
            } else {
                report.record_failure(
                    outcome
                        .error
                        .as_ref()
                        .map(|e| format!("Agent schedule {}: {}", schedule.id, e)),
                );
            }

            if let Err(e) = self.reschedule(schedule, &outcome).await {
                report.errors.push(e);
            }
        }

        report
    }

    async fn run_claimed(&self, schedule: &AgentSchedule) -> AgentRunOutcome {
        let mut execution = AgentTaskExecution {
            id: Uuid::new_v4(),
            schedule_id: schedule.id,
            tenant_id: schedule.tenant_id,
            agent_id: schedule.agent_id,
            status: AgentExecutionStatus::Running,
            output: None,
            error_message: None,
            started_at: self.clock.now(),
            completed_at: None,
        };

        if let Err(e) = self.store.insert_agent_execution(&execution).await {
            error!(schedule_id = %schedule.id, "Failed to record agent execution: {}", e);
            return AgentRunOutcome::failed(format!("Failed to record agent execution: {}", e));
        }

        let outcome = match AssertUnwindSafe(self.runner.run(schedule)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = format!("Agent runner panicked: {}", panic_message(payload.as_ref()));
                error!(schedule_id = %schedule.id, "{}", message);
                AgentRunOutcome::failed(message)
            }
        };

        execution.status = if outcome.success {
            AgentExecutionStatus::Completed
        } else {
            AgentExecutionStatus::Failed
        };
        execution.output = outcome.output.clone();
        execution.error_message = outcome.error.clone();
        execution.completed_at = Some(self.clock.now());

        if let Err(e) = self.store.update_agent_execution(&execution).await {
            warn!(execution_id = %execution.id, "Failed to update agent execution: {}", e);
        }

        info!(
            schedule_id = %schedule.id,
            execution_id = %execution.id,
            "Agent task '{}' {}", schedule.name, execution.status
        );

        if schedule.notify_on_completion {
            if let Err(e) = self.notify(schedule, &outcome).await {
                warn!(schedule_id = %schedule.id, "Failed to notify schedule owner: {}", e);
            }
        }

        outcome
    }

    async fn notify(&self, schedule: &AgentSchedule, outcome: &AgentRunOutcome) -> StoreResult<Uuid> {
        let (title, body) = if outcome.success {
            (
                format!("Agent task '{}' completed", schedule.name),
                outcome.output.clone().unwrap_or_default(),
            )
        } else {
            (
                format!("Agent task '{}' failed", schedule.name),
                outcome.error.clone().unwrap_or_default(),
            )
        };

        let notification = Notification {
            id: Uuid::new_v4(),
            tenant_id: schedule.tenant_id,
            user_id: schedule.user_id,
            title,
            message: body.chars().take(NOTIFICATION_PREVIEW_CHARS).collect(),
            notification_type: "agent".to_string(),
            entity_type: Some("agent_schedule".to_string()),
            entity_id: Some(schedule.id),
            read: false,
            created_at: self.clock.now(),
        };
        self.crm.create_notification(&notification).await
    }

    /// Put a run schedule back in the queue, or retire it when it has no
    /// further due time.
    async fn reschedule(&self, mut schedule: AgentSchedule, outcome: &AgentRunOutcome) -> Result<(), String> {
        let now = self.clock.now();
        schedule.run_count += 1;
        schedule.last_run_at = Some(now);
        schedule.last_error = outcome.error.clone();
        schedule.updated_at = now;

        match schedule.frequency.next_run_after(now) {
            Some(next) => {
                schedule.status = ScheduleStatus::Pending;
                schedule.next_run_at = Some(next);
            }
            None => {
                schedule.status = if outcome.success {
                    ScheduleStatus::Completed
                } else {
                    ScheduleStatus::Failed
                };
                schedule.next_run_at = None;
            }
        }

        self.store.update_schedule(&schedule).await.map_err(|e| {
            error!(
                schedule_id = %schedule.id,
                "Failed to mark agent schedule {}: {}", schedule.status, e
            );
            format!("Agent schedule {}: could not be marked {}: {}", schedule.id, schedule.status, e)
        })
    }
}
