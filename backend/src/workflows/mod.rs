// Workflow Automation Engine
//
// Event-driven automation for the CRM: a trigger event starts every matching
// workflow, whose actions run in order, branch on conditions and pause on
// waits until the due-work poller picks them up again.

pub mod actions;
pub mod conditions;
pub mod context;
pub mod engine;
pub mod executor;
pub mod ledger;
pub mod normalize;
pub mod poller;
pub mod runner;
pub mod scheduler;
pub mod template;
pub mod triggers;

pub use actions::{Action, ActionKind, ActionType, ExecutionResult, WaitUnit};
pub use conditions::{ConditionEvaluator, ConditionOperator, ConditionSpec};
pub use context::ExecutionContext;
pub use engine::{WorkflowDefinition, WorkflowEngine, WorkflowEngineBuilder};
pub use executor::ActionExecutor;
pub use ledger::{ExecutionLedger, ExecutionStatus, WorkflowExecution, AGGREGATE_FAILURE_MESSAGE};
pub use normalize::{parse_actions, StoredAction};
pub use poller::{DueWorkPoller, PollReport, SweepReport};
pub use runner::{ActionRunner, RunOutcome};
pub use scheduler::{ContinuationStatus, RunSummary, ScheduledContinuation, SuspendResumeScheduler};
pub use template::render;
pub use triggers::{matches_trigger_config, TriggerEvent, TriggerType};
