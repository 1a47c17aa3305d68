// Action Runner - Walks an action list, recursing into branches and pausing on waits

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::actions::{Action, ActionKind, ConditionalBranch, ExecutionResult, WaitConfig};
use super::conditions::ConditionEvaluator;
use super::context::ExecutionContext;
use super::executor::ActionExecutor;
use super::ledger::{ExecutionLedger, WorkflowExecution};
use crate::services::Clock;

/// Where a call to [`ActionRunner::run`] stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Every result for the run so far, seed included
    pub results: Vec<ExecutionResult>,
    pub paused: bool,
    /// Actions still to run after the wait, in the order they must run
    pub remaining: Vec<Action>,
    pub due_at: Option<DateTime<Utc>>,
}

impl RunOutcome {
    fn finished(results: Vec<ExecutionResult>) -> Self {
        Self {
            results,
            paused: false,
            remaining: Vec::new(),
            due_at: None,
        }
    }
}

#[derive(Clone)]
pub struct ActionRunner {
    executor: ActionExecutor,
    ledger: ExecutionLedger,
    clock: Arc<dyn Clock>,
}

impl ActionRunner {
    pub fn new(executor: ActionExecutor, ledger: ExecutionLedger, clock: Arc<dyn Clock>) -> Self {
        Self {
            executor,
            ledger,
            clock,
        }
    }

    /// Run `actions` in ascending `order` (ties keep list position), starting
    /// from the results in `prior`.
    ///
    /// Progress is written to the ledger after every leaf action and every
    /// condition evaluation. A failed write is logged and the run carries on
    /// from its in-memory results.
    ///
    /// On a `wait`, returns `paused` with every action after it. When the
    /// wait sits inside a branch, `remaining` is the branch's own tail followed
    /// by the actions after the condition at each enclosing level, renumbered
    /// so that sorting on resume keeps that order.
    pub fn run<'a>(
        &'a self,
        execution: &'a mut WorkflowExecution,
        mut actions: Vec<Action>,
        context: &'a ExecutionContext,
        prior: Vec<ExecutionResult>,
    ) -> BoxFuture<'a, RunOutcome> {
        Box::pin(async move {
            actions.sort_by_key(|a| a.order);
            let mut results = prior;
            let mut queue = actions.into_iter();

            while let Some(action) = queue.next() {
                match &action.kind {
                    ActionKind::Wait(wait) => {
                        match self.wait_result(&action, wait) {
                            Ok((result, due_at)) => {
                                results.push(result);
                                let remaining: Vec<Action> = queue.collect();
                                info!(
                                    execution_id = %execution.id,
                                    "Pausing until {} ({} actions remaining)", due_at, remaining.len()
                                );
                                return RunOutcome {
                                    results,
                                    paused: true,
                                    remaining: renumber(remaining),
                                    due_at: Some(due_at),
                                };
                            }
                            Err(result) => {
                                results.push(result);
                                self.persist(execution, &results).await;
                            }
                        }
                    }
                    ActionKind::Condition(branch) => {
                        let Some((field, operator)) = branch.condition.parts() else {
                            warn!(
                                execution_id = %execution.id,
                                action_id = %action.id,
                                "Condition is missing a field or operator, skipping both branches"
                            );
                            results.push(ExecutionResult::failure(
                                &action,
                                "Condition is missing a field or operator",
                                self.clock.now(),
                            ));
                            self.persist(execution, &results).await;
                            continue;
                        };

                        let met = ConditionEvaluator::evaluate(
                            field,
                            operator,
                            &branch.condition.value,
                            context,
                            &results,
                        );
                        debug!(
                            execution_id = %execution.id,
                            action_id = %action.id,
                            "Condition {} {} {} evaluated to {}", field, operator, branch.condition.value, met
                        );
                        results.push(ExecutionResult::success(
                            &action,
                            Some(json!({
                                "condition_met": met,
                                "field": field,
                                "operator": operator.as_str(),
                                "expected": branch.condition.value,
                                "branch": if met { "if" } else { "else" },
                            })),
                            self.clock.now(),
                        ));
                        self.persist(execution, &results).await;

                        let chosen = Self::chosen_branch(branch, met);
                        let outcome = self.run(&mut *execution, chosen, context, results).await;

                        if outcome.paused {
                            // branch tail first, then this level's tail
                            let mut remaining = outcome.remaining;
                            remaining.extend(queue);
                            return RunOutcome {
                                results: outcome.results,
                                paused: true,
                                remaining: renumber(remaining),
                                due_at: outcome.due_at,
                            };
                        }

                        // Seeded with our results, so this already includes them
                        results = outcome.results;
                    }
                    _ => {
                        let result = self
                            .executor
                            .execute(&action, context, execution.workflow_id)
                            .await;
                        results.push(result);
                        self.persist(execution, &results).await;
                    }
                }
            }

            RunOutcome::finished(results)
        })
    }

    fn chosen_branch(branch: &ConditionalBranch, met: bool) -> Vec<Action> {
        if met {
            branch.if_branch.clone()
        } else {
            branch.else_branch.clone()
        }
    }

    /// The marker result for a wait and its due time, or a failure result
    /// for a negative duration.
    fn wait_result(
        &self,
        action: &Action,
        wait: &WaitConfig,
    ) -> Result<(ExecutionResult, DateTime<Utc>), ExecutionResult> {
        let now = self.clock.now();
        if wait.duration < 0 {
            return Err(ExecutionResult::failure(
                action,
                format!("Wait duration must not be negative (got {})", wait.duration),
                now,
            ));
        }

        let Some(due_at) = wait.due_at(now) else {
            return Err(ExecutionResult::failure(
                action,
                format!("Wait duration out of range ({} {})", wait.duration, wait.unit.as_str()),
                now,
            ));
        };
        let result = ExecutionResult::success(
            action,
            Some(json!({
                "duration": wait.duration,
                "unit": wait.unit.as_str(),
                "resume_at": due_at,
            })),
            now,
        );
        Ok((result, due_at))
    }

    async fn persist(&self, execution: &mut WorkflowExecution, results: &[ExecutionResult]) {
        if let Err(e) = self.ledger.record_progress(execution, results).await {
            warn!(
                execution_id = %execution.id,
                "Failed to persist workflow progress: {}", e
            );
        }
    }
}

/// Rewrite `order` to list position.
fn renumber(actions: Vec<Action>) -> Vec<Action> {
    actions
        .into_iter()
        .enumerate()
        .map(|(position, mut action)| {
            action.order = position as i32;
            action
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{LogOnlyEmailSender, LogOnlySender, ManualClock};
    use crate::store::{InMemoryStore, WorkflowStore};
    use crate::workflows::actions::{ActionType, WaitUnit};
    use crate::workflows::conditions::{ConditionOperator, ConditionSpec};
    use crate::workflows::ledger::ExecutionStatus;
    use crate::workflows::triggers::TriggerType;
    use chrono::{Duration, TimeZone};
    use fake::Fake;
    use leadflow_shared::Lead;
    use serde_json::Value;
    use uuid::Uuid;

    struct Harness {
        runner: ActionRunner,
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        context: ExecutionContext,
    }

    async fn harness(status: &str) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap()));
        let tenant_id = Uuid::new_v4();
        let lead = Lead {
            id: Uuid::new_v4(),
            tenant_id,
            status: status.to_string(),
            phone: Some("+15550001111".to_string()),
            ..Default::default()
        };
        store.insert_lead(lead.clone()).await;
        store.set_phone_number(tenant_id, "+15559990000").await;

        let executor = ActionExecutor::new(
            store.clone(),
            Arc::new(LogOnlySender),
            Arc::new(LogOnlyEmailSender),
            clock.clone(),
        );
        let ledger = ExecutionLedger::new(store.clone(), clock.clone());
        let runner = ActionRunner::new(executor, ledger, clock.clone());
        let context = ExecutionContext::new(tenant_id, Uuid::new_v4()).with_lead(lead);

        Harness {
            runner,
            store,
            clock,
            context,
        }
    }

    async fn execution(h: &Harness) -> WorkflowExecution {
        let now = h.clock.now();
        let execution = WorkflowExecution {
            id: Uuid::new_v4(),
            workflow_id: Uuid::new_v4(),
            tenant_id: h.context.tenant_id,
            user_id: h.context.user_id,
            trigger_type: TriggerType::Manual,
            context: h.context.clone(),
            status: ExecutionStatus::Running,
            action_results: vec![],
            error_message: None,
            started_at: now,
            completed_at: None,
            updated_at: now,
        };
        h.store.insert_execution(&execution).await.unwrap();
        execution
    }

    fn ids(results: &[ExecutionResult]) -> Vec<&str> {
        results.iter().map(|r| r.action_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_runs_in_order() {
        let h = harness("new").await;
        let mut exec = execution(&h).await;
        let actions = vec![
            Action::add_tag(30, "c").with_id("c"),
            Action::add_tag(-5, "a").with_id("a"),
            Action::add_tag(10, "b1").with_id("b1"),
            Action::add_tag(10, "b2").with_id("b2"),
        ];

        let outcome = h.runner.run(&mut exec, actions, &h.context, vec![]).await;

        assert!(!outcome.paused);
        assert_eq!(ids(&outcome.results), vec!["a", "b1", "b2", "c"]);
    }

    #[tokio::test]
    async fn test_random_orders_run_as_stable_sort() {
        for round in 0..100 {
            let h = harness("new").await;
            let mut exec = execution(&h).await;

            // Narrow ranges on odd rounds so ties are common
            let (low, high) = if round % 2 == 0 { (-1000, 1000) } else { (-3, 3) };
            let len = (1..16usize).fake::<usize>();
            let orders: Vec<i32> = (0..len).map(|_| (low..high).fake::<i32>()).collect();

            let actions: Vec<Action> = orders
                .iter()
                .enumerate()
                .map(|(i, order)| Action::add_note(*order, "step").with_id(i.to_string()))
                .collect();

            let mut expected: Vec<(usize, i32)> = orders.iter().copied().enumerate().collect();
            expected.sort_by_key(|(_, order)| *order);
            let expected: Vec<String> = expected.into_iter().map(|(i, _)| i.to_string()).collect();

            let outcome = h.runner.run(&mut exec, actions, &h.context, vec![]).await;

            assert!(!outcome.paused);
            assert_eq!(ids(&outcome.results), expected, "orders: {:?}", orders);
        }
    }

    #[tokio::test]
    async fn test_branch_exclusivity() {
        for (status, expected) in [("new", "sms"), ("lost", "task")] {
            let h = harness(status).await;
            let mut exec = execution(&h).await;
            let actions = vec![Action::condition(
                1,
                ConditionSpec::equals("status", Value::from("new")),
                vec![Action::send_sms(1, "Hi").with_id("sms")],
                vec![Action::create_task(1, "Chase", None).with_id("task")],
            )
            .with_id("cond")];

            let outcome = h.runner.run(&mut exec, actions, &h.context, vec![]).await;

            assert_eq!(ids(&outcome.results), vec!["cond", expected]);
            assert!(outcome.results.iter().all(|r| r.success));
            let met = outcome.results[0].data.as_ref().unwrap()["condition_met"].clone();
            assert_eq!(met, Value::Bool(status == "new"));
        }
    }

    #[tokio::test]
    async fn test_misconfigured_condition_runs_neither_branch() {
        let h = harness("new").await;
        let mut exec = execution(&h).await;
        let broken = ConditionSpec {
            field: Some("status".to_string()),
            operator: None,
            value: Value::from("new"),
        };
        let actions = vec![
            Action::condition(
                1,
                broken,
                vec![Action::add_tag(1, "x").with_id("if")],
                vec![Action::add_tag(1, "y").with_id("else")],
            )
            .with_id("cond"),
            Action::add_note(2, "after").with_id("note"),
        ];

        let outcome = h.runner.run(&mut exec, actions, &h.context, vec![]).await;

        assert_eq!(ids(&outcome.results), vec!["cond", "note"]);
        assert!(!outcome.results[0].success);
        assert!(outcome.results[1].success);
    }

    #[tokio::test]
    async fn test_wait_pauses_with_tail() {
        let h = harness("new").await;
        let mut exec = execution(&h).await;
        let actions = vec![
            Action::add_note(1, "before").with_id("note"),
            Action::wait(2, 1, WaitUnit::Hours).with_id("wait"),
            Action::update_status(3, "contacted").with_id("status"),
        ];

        let outcome = h.runner.run(&mut exec, actions, &h.context, vec![]).await;

        assert!(outcome.paused);
        assert_eq!(ids(&outcome.results), vec!["note", "wait"]);
        assert_eq!(outcome.due_at, Some(h.clock.now() + Duration::hours(1)));
        assert_eq!(outcome.remaining.len(), 1);
        assert_eq!(outcome.remaining[0].id, "status");
        assert_eq!(outcome.results[1].action_type, ActionType::Wait);

        // progress reached the ledger before the pause
        let stored = h.store.get_execution(exec.tenant_id, exec.id).await.unwrap().unwrap();
        assert_eq!(ids(&stored.action_results), vec!["note"]);
    }

    #[tokio::test]
    async fn test_nested_condition_then_wait_splices_tails() {
        let h = harness("new").await;
        let mut exec = execution(&h).await;

        // outer: [cond(outer) -> if [cond(inner) -> if [t1, wait, t2], t3], o1, o2]
        let inner = Action::condition(
            1,
            ConditionSpec::equals("lead.status", Value::from("new")),
            vec![
                Action::add_tag(1, "t1").with_id("t1"),
                Action::wait(2, 30, WaitUnit::Minutes).with_id("wait"),
                Action::add_tag(3, "t2").with_id("t2"),
            ],
            vec![],
        )
        .with_id("inner");
        let outer = Action::condition(
            1,
            ConditionSpec::new("lead.phone", ConditionOperator::IsNotEmpty, Value::Null),
            vec![inner, Action::add_tag(5, "t3").with_id("t3")],
            vec![Action::add_tag(1, "never").with_id("never")],
        )
        .with_id("outer");
        let actions = vec![
            Action::add_tag(20, "o2").with_id("o2"),
            outer,
            Action::add_tag(10, "o1").with_id("o1"),
        ];

        let outcome = h.runner.run(&mut exec, actions, &h.context, vec![]).await;

        assert!(outcome.paused);
        assert_eq!(ids(&outcome.results), vec!["outer", "inner", "t1", "wait"]);
        let remaining: Vec<&str> = outcome.remaining.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(remaining, vec!["t2", "t3", "o1", "o2"]);
        let orders: Vec<i32> = outcome.remaining.iter().map(|a| a.order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);

        // resuming the spliced list keeps that order
        let resumed = h
            .runner
            .run(&mut exec, outcome.remaining, &h.context, outcome.results)
            .await;
        assert!(!resumed.paused);
        assert_eq!(
            ids(&resumed.results),
            vec!["outer", "inner", "t1", "wait", "t2", "t3", "o1", "o2"]
        );
    }

    #[tokio::test]
    async fn test_branch_results_not_duplicated() {
        let h = harness("new").await;
        let mut exec = execution(&h).await;
        let actions = vec![
            Action::add_note(1, "first").with_id("note"),
            Action::condition(
                2,
                ConditionSpec::equals("status", Value::from("new")),
                vec![Action::add_tag(1, "x").with_id("tag")],
                vec![],
            )
            .with_id("cond"),
            Action::add_tag(3, "y").with_id("last"),
        ];

        let outcome = h.runner.run(&mut exec, actions, &h.context, vec![]).await;
        assert_eq!(ids(&outcome.results), vec!["note", "cond", "tag", "last"]);
    }

    #[tokio::test]
    async fn test_condition_reads_prior_results() {
        let h = harness("new").await;
        let mut exec = execution(&h).await;
        let actions = vec![
            Action::add_tag(1, "vip").with_id("tag"),
            Action::condition(
                2,
                ConditionSpec::equals("results.tag.added", Value::Bool(true)),
                vec![Action::add_note(1, "tag was new").with_id("note")],
                vec![],
            )
            .with_id("cond"),
        ];

        let outcome = h.runner.run(&mut exec, actions, &h.context, vec![]).await;
        assert_eq!(ids(&outcome.results), vec!["tag", "cond", "note"]);
    }

    #[tokio::test]
    async fn test_negative_wait_is_a_failed_result() {
        let h = harness("new").await;
        let mut exec = execution(&h).await;
        let actions = vec![
            Action::wait(1, -2, WaitUnit::Days).with_id("wait"),
            Action::add_note(2, "still runs").with_id("note"),
        ];

        let outcome = h.runner.run(&mut exec, actions, &h.context, vec![]).await;

        assert!(!outcome.paused);
        assert_eq!(ids(&outcome.results), vec!["wait", "note"]);
        assert!(!outcome.results[0].success);
        assert!(outcome.results[1].success);
    }

    #[tokio::test]
    async fn test_out_of_range_wait_is_a_failed_result() {
        let h = harness("new").await;
        let mut exec = execution(&h).await;
        let actions = vec![
            Action::wait(1, 1_000_000_000, WaitUnit::Days).with_id("wait"),
            Action::add_note(2, "still runs").with_id("note"),
        ];

        let outcome = h.runner.run(&mut exec, actions, &h.context, vec![]).await;

        assert!(!outcome.paused);
        assert!(outcome.due_at.is_none());
        assert_eq!(ids(&outcome.results), vec!["wait", "note"]);
        assert!(outcome.results[0].error.as_deref().unwrap().contains("out of range"));
        assert!(outcome.results[1].success);
    }
}
