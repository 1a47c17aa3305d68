// Workflow Actions - Actions that can be executed by workflows

use chrono::{DateTime, Duration, NaiveDate, Utc};
use leadflow_shared::DealOutcome;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::conditions::ConditionSpec;
use super::normalize::StoredAction;

/// Types of actions that workflows can execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    // Messaging
    SendSms,
    SendEmail,
    SendNotification,

    // Lead actions
    UpdateStatus,
    AddNote,
    CreateTask,
    AssignUser,
    MoveLeadStage,

    // Deal actions
    CreateDeal,
    UpdateDeal,
    MoveDealStage,
    CloseDeal,

    // Tagging and history
    AddTag,
    RemoveTag,
    LogActivity,

    // Control flow
    Wait,
    Condition,
}

impl ActionType {
    pub const ALL: [ActionType; 17] = [
        ActionType::SendSms,
        ActionType::SendEmail,
        ActionType::SendNotification,
        ActionType::UpdateStatus,
        ActionType::AddNote,
        ActionType::CreateTask,
        ActionType::AssignUser,
        ActionType::MoveLeadStage,
        ActionType::CreateDeal,
        ActionType::UpdateDeal,
        ActionType::MoveDealStage,
        ActionType::CloseDeal,
        ActionType::AddTag,
        ActionType::RemoveTag,
        ActionType::LogActivity,
        ActionType::Wait,
        ActionType::Condition,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::SendSms => "send_sms",
            ActionType::SendEmail => "send_email",
            ActionType::SendNotification => "send_notification",
            ActionType::UpdateStatus => "update_status",
            ActionType::AddNote => "add_note",
            ActionType::CreateTask => "create_task",
            ActionType::AssignUser => "assign_user",
            ActionType::MoveLeadStage => "move_lead_stage",
            ActionType::CreateDeal => "create_deal",
            ActionType::UpdateDeal => "update_deal",
            ActionType::MoveDealStage => "move_deal_stage",
            ActionType::CloseDeal => "close_deal",
            ActionType::AddTag => "add_tag",
            ActionType::RemoveTag => "remove_tag",
            ActionType::LogActivity => "log_activity",
            ActionType::Wait => "wait",
            ActionType::Condition => "condition",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a workflow.
///
/// Persisted actions are loosely shaped JSON; (de)serialization goes through
/// [`StoredAction`], which normalizes legacy field names on the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredAction", into = "StoredAction")]
pub struct Action {
    pub id: String,
    pub order: i32,
    pub kind: ActionKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    SendSms(SendSmsConfig),
    SendEmail(SendEmailConfig),
    SendNotification(SendNotificationConfig),
    UpdateStatus(UpdateStatusConfig),
    AddNote(AddNoteConfig),
    CreateTask(CreateTaskConfig),
    AssignUser(AssignUserConfig),
    MoveLeadStage(MoveStageConfig),
    CreateDeal(CreateDealConfig),
    UpdateDeal(UpdateDealConfig),
    MoveDealStage(MoveStageConfig),
    CloseDeal(CloseDealConfig),
    AddTag(TagConfig),
    RemoveTag(TagConfig),
    LogActivity(LogActivityConfig),
    Wait(WaitConfig),
    Condition(ConditionalBranch),
}

impl ActionKind {
    pub fn action_type(&self) -> ActionType {
        match self {
            ActionKind::SendSms(_) => ActionType::SendSms,
            ActionKind::SendEmail(_) => ActionType::SendEmail,
            ActionKind::SendNotification(_) => ActionType::SendNotification,
            ActionKind::UpdateStatus(_) => ActionType::UpdateStatus,
            ActionKind::AddNote(_) => ActionType::AddNote,
            ActionKind::CreateTask(_) => ActionType::CreateTask,
            ActionKind::AssignUser(_) => ActionType::AssignUser,
            ActionKind::MoveLeadStage(_) => ActionType::MoveLeadStage,
            ActionKind::CreateDeal(_) => ActionType::CreateDeal,
            ActionKind::UpdateDeal(_) => ActionType::UpdateDeal,
            ActionKind::MoveDealStage(_) => ActionType::MoveDealStage,
            ActionKind::CloseDeal(_) => ActionType::CloseDeal,
            ActionKind::AddTag(_) => ActionType::AddTag,
            ActionKind::RemoveTag(_) => ActionType::RemoveTag,
            ActionKind::LogActivity(_) => ActionType::LogActivity,
            ActionKind::Wait(_) => ActionType::Wait,
            ActionKind::Condition(_) => ActionType::Condition,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendSmsConfig {
    /// Explicit recipient; falls back to the contact's, then the lead's phone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendEmailConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendNotificationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateStatusConfig {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddNoteConfig {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskConfig {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_in_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignUserConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveStageConfig {
    #[serde(default)]
    pub stage: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateDealConfig {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateDealConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_close_date: Option<NaiveDate>,
}

impl UpdateDealConfig {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.value.is_none() && self.expected_close_date.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseDealConfig {
    pub outcome: DealOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagConfig {
    #[serde(default)]
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogActivityConfig {
    #[serde(default = "default_activity_type")]
    pub activity_type: String,
    #[serde(default)]
    pub description: String,
}

fn default_activity_type() -> String {
    "workflow".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitUnit {
    Minutes,
    Hours,
    Days,
}

impl WaitUnit {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "minute" | "minutes" | "min" | "mins" | "m" => Some(WaitUnit::Minutes),
            "hour" | "hours" | "hr" | "hrs" | "h" => Some(WaitUnit::Hours),
            "day" | "days" | "d" => Some(WaitUnit::Days),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WaitUnit::Minutes => "minutes",
            WaitUnit::Hours => "hours",
            WaitUnit::Days => "days",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitConfig {
    pub duration: i64,
    pub unit: WaitUnit,
}

impl WaitConfig {
    /// `None` when the duration does not fit a `Duration`.
    pub fn as_duration(&self) -> Option<Duration> {
        match self.unit {
            WaitUnit::Minutes => Duration::try_minutes(self.duration),
            WaitUnit::Hours => Duration::try_hours(self.duration),
            WaitUnit::Days => Duration::try_days(self.duration),
        }
    }

    /// Due time for a wait that starts at `now`, or `None` if it is out of
    /// the representable range. All due times are UTC.
    pub fn due_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_add_signed(self.as_duration()?)
    }
}

/// A `condition` action: one predicate and the two branches it selects between.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionalBranch {
    pub condition: ConditionSpec,
    pub if_branch: Vec<Action>,
    pub else_branch: Vec<Action>,
}

/// One immutable record per completed action attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub action_type: ActionType,
    pub action_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn success(
        action: &Action,
        data: Option<serde_json::Value>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            success: true,
            action_type: action.action_type(),
            action_id: action.id.clone(),
            error: None,
            data,
            timestamp,
        }
    }

    pub fn failure(action: &Action, error: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: false,
            action_type: action.action_type(),
            action_id: action.id.clone(),
            error: Some(error.into()),
            data: None,
            timestamp,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl Action {
    pub fn new(order: i32, kind: ActionKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            order,
            kind,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn action_type(&self) -> ActionType {
        self.kind.action_type()
    }

    pub fn is_wait(&self) -> bool {
        matches!(self.kind, ActionKind::Wait(_))
    }

    // ===== Messaging Action Builders =====

    pub fn send_sms(order: i32, message: &str) -> Self {
        Self::new(
            order,
            ActionKind::SendSms(SendSmsConfig {
                to: None,
                message: message.to_string(),
            }),
        )
    }

    pub fn send_email(order: i32, subject: &str, body: &str) -> Self {
        Self::new(
            order,
            ActionKind::SendEmail(SendEmailConfig {
                subject: subject.to_string(),
                body: body.to_string(),
                ..Default::default()
            }),
        )
    }

    pub fn send_notification(order: i32, title: &str, message: &str) -> Self {
        Self::new(
            order,
            ActionKind::SendNotification(SendNotificationConfig {
                user_id: None,
                title: title.to_string(),
                message: message.to_string(),
            }),
        )
    }

    // ===== Lead Action Builders =====

    pub fn update_status(order: i32, status: &str) -> Self {
        Self::new(
            order,
            ActionKind::UpdateStatus(UpdateStatusConfig {
                status: status.to_string(),
            }),
        )
    }

    pub fn add_note(order: i32, content: &str) -> Self {
        Self::new(
            order,
            ActionKind::AddNote(AddNoteConfig {
                content: content.to_string(),
            }),
        )
    }

    pub fn create_task(order: i32, title: &str, due_in_days: Option<i64>) -> Self {
        Self::new(
            order,
            ActionKind::CreateTask(CreateTaskConfig {
                title: title.to_string(),
                due_in_days,
                ..Default::default()
            }),
        )
    }

    pub fn assign_user(order: i32, user_id: Uuid) -> Self {
        Self::new(
            order,
            ActionKind::AssignUser(AssignUserConfig {
                user_id: Some(user_id),
            }),
        )
    }

    pub fn move_lead_stage(order: i32, stage: &str) -> Self {
        Self::new(
            order,
            ActionKind::MoveLeadStage(MoveStageConfig {
                stage: stage.to_string(),
            }),
        )
    }

    // ===== Deal Action Builders =====

    pub fn create_deal(order: i32, title: &str, value: Option<Decimal>) -> Self {
        Self::new(
            order,
            ActionKind::CreateDeal(CreateDealConfig {
                title: title.to_string(),
                value,
                ..Default::default()
            }),
        )
    }

    pub fn move_deal_stage(order: i32, stage: &str) -> Self {
        Self::new(
            order,
            ActionKind::MoveDealStage(MoveStageConfig {
                stage: stage.to_string(),
            }),
        )
    }

    pub fn close_deal(order: i32, outcome: DealOutcome, reason: Option<&str>) -> Self {
        Self::new(
            order,
            ActionKind::CloseDeal(CloseDealConfig {
                outcome,
                reason: reason.map(str::to_string),
            }),
        )
    }

    // ===== Tag / History Builders =====

    pub fn add_tag(order: i32, tag: &str) -> Self {
        Self::new(order, ActionKind::AddTag(TagConfig { tag: tag.to_string() }))
    }

    pub fn remove_tag(order: i32, tag: &str) -> Self {
        Self::new(order, ActionKind::RemoveTag(TagConfig { tag: tag.to_string() }))
    }

    pub fn log_activity(order: i32, description: &str) -> Self {
        Self::new(
            order,
            ActionKind::LogActivity(LogActivityConfig {
                activity_type: default_activity_type(),
                description: description.to_string(),
            }),
        )
    }

    // ===== Control Flow Builders =====

    pub fn wait(order: i32, duration: i64, unit: WaitUnit) -> Self {
        Self::new(order, ActionKind::Wait(WaitConfig { duration, unit }))
    }

    pub fn condition(
        order: i32,
        condition: ConditionSpec,
        if_branch: Vec<Action>,
        else_branch: Vec<Action>,
    ) -> Self {
        Self::new(
            order,
            ActionKind::Condition(ConditionalBranch {
                condition,
                if_branch,
                else_branch,
            }),
        )
    }
}

/// Pre-built action sequences for common CRM follow-ups
pub mod presets {
    use super::*;
    use crate::workflows::conditions::ConditionOperator;

    /// Wait `days`, then text the lead only if nobody has touched its status.
    pub fn new_lead_nurture(days: i64) -> Vec<Action> {
        vec![
            Action::wait(1, days, WaitUnit::Days),
            Action::condition(
                2,
                ConditionSpec::new("lead.status", ConditionOperator::Equals, serde_json::json!("new")),
                vec![
                    Action::send_sms(1, "Hi {{first_name}}, just checking in - any questions?"),
                    Action::create_task(2, "Follow up with {{lead_full_name}}", Some(1)),
                ],
                vec![],
            ),
        ]
    }

    /// Mark a won deal and thank the customer.
    pub fn deal_won_follow_up() -> Vec<Action> {
        vec![
            Action::add_tag(1, "customer"),
            Action::send_email(
                2,
                "Welcome aboard, {{contact_first_name}}!",
                "Thanks for choosing us. Your account manager will be in touch shortly.",
            ),
            Action::log_activity(3, "Deal {{deal_title}} won"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_action_type_strings() {
        for t in ActionType::ALL {
            assert_eq!(ActionType::parse(t.as_str()), Some(t));
            assert_eq!(serde_json::to_value(t).unwrap(), t.as_str());
        }
        assert_eq!(ActionType::parse("fax"), None);
    }

    #[test]
    fn test_wait_due_at() {
        let now = Utc.with_ymd_and_hms(2026, 1, 31, 23, 30, 0).unwrap();
        let wait = WaitConfig {
            duration: 2,
            unit: WaitUnit::Days,
        };
        assert_eq!(wait.due_at(now), Some(Utc.with_ymd_and_hms(2026, 2, 2, 23, 30, 0).unwrap()));

        let wait = WaitConfig {
            duration: 45,
            unit: WaitUnit::Minutes,
        };
        assert_eq!(wait.due_at(now), Some(Utc.with_ymd_and_hms(2026, 2, 1, 0, 15, 0).unwrap()));
    }

    #[test]
    fn test_wait_out_of_range() {
        let now = Utc.with_ymd_and_hms(2026, 1, 31, 23, 30, 0).unwrap();

        let too_long = WaitConfig {
            duration: i64::MAX,
            unit: WaitUnit::Minutes,
        };
        assert_eq!(too_long.as_duration(), None);
        assert_eq!(too_long.due_at(now), None);

        // Fits a Duration but not a DateTime
        let past_calendar = WaitConfig {
            duration: 1_000_000_000,
            unit: WaitUnit::Days,
        };
        assert!(past_calendar.as_duration().is_some());
        assert_eq!(past_calendar.due_at(now), None);
    }

    #[test]
    fn test_wait_unit_parse() {
        assert_eq!(WaitUnit::parse("Hours"), Some(WaitUnit::Hours));
        assert_eq!(WaitUnit::parse("d"), Some(WaitUnit::Days));
        assert_eq!(WaitUnit::parse("weeks"), None);
    }

    #[test]
    fn test_result_builders() {
        let action = Action::add_note(1, "hello").with_id("note-1");
        let now = Utc::now();

        let ok = ExecutionResult::success(&action, None, now).with_data(serde_json::json!({"note_id": "n"}));
        assert!(ok.success);
        assert_eq!(ok.action_type, ActionType::AddNote);
        assert_eq!(ok.action_id, "note-1");

        let failed = ExecutionResult::failure(&action, "No lead in context", now);
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("No lead in context"));
    }

    #[test]
    fn test_presets() {
        let nurture = presets::new_lead_nurture(2);
        assert_eq!(nurture.len(), 2);
        assert!(nurture[0].is_wait());
        match &nurture[1].kind {
            ActionKind::Condition(branch) => {
                assert_eq!(branch.if_branch.len(), 2);
                assert!(branch.else_branch.is_empty());
            }
            other => panic!("expected condition, got {:?}", other),
        }
    }
}
