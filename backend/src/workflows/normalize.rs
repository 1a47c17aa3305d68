// Action Normalization - Parses persisted (loosely shaped) actions into typed ones
//
// Persisted actions have collected several spellings for the same thing over
// time. Every alias is folded into the canonical form here, so nothing past
// this module ever sees a legacy field name.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::actions::{
    Action, ActionKind, ActionType, CloseDealConfig, ConditionalBranch, WaitConfig, WaitUnit,
};
use super::conditions::{ConditionOperator, ConditionSpec};
use crate::error::NormalizeError;

const IF_BRANCH_KEYS: [&str; 4] = ["if_branch", "ifActions", "if_actions", "true_actions"];
const ELSE_BRANCH_KEYS: [&str; 4] = ["else_branch", "elseActions", "else_actions", "false_actions"];

/// The on-disk shape of an action:
/// `{id, type, order, config, condition?, if_branch?, else_branch?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(rename = "type", alias = "action_type", alias = "actionType")]
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Value>,
    #[serde(default)]
    pub config: Value,
    /// Root-level extras: the condition predicate and branch lists
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TryFrom<StoredAction> for Action {
    type Error = NormalizeError;

    fn try_from(stored: StoredAction) -> Result<Self, Self::Error> {
        normalize_action(stored, 0)
    }
}

impl From<Action> for StoredAction {
    fn from(action: Action) -> Self {
        let action_type = action.action_type().as_str().to_string();
        let mut extra = Map::new();

        let config = match action.kind {
            ActionKind::SendSms(c) => to_config(&c),
            ActionKind::SendEmail(c) => to_config(&c),
            ActionKind::SendNotification(c) => to_config(&c),
            ActionKind::UpdateStatus(c) => to_config(&c),
            ActionKind::AddNote(c) => to_config(&c),
            ActionKind::CreateTask(c) => to_config(&c),
            ActionKind::AssignUser(c) => to_config(&c),
            ActionKind::MoveLeadStage(c) | ActionKind::MoveDealStage(c) => to_config(&c),
            ActionKind::CreateDeal(c) => to_config(&c),
            ActionKind::UpdateDeal(c) => to_config(&c),
            ActionKind::CloseDeal(c) => to_config(&c),
            ActionKind::AddTag(c) | ActionKind::RemoveTag(c) => to_config(&c),
            ActionKind::LogActivity(c) => to_config(&c),
            ActionKind::Wait(c) => to_config(&c),
            ActionKind::Condition(branch) => {
                extra.insert("condition".to_string(), to_config(&branch.condition));
                extra.insert("if_branch".to_string(), actions_to_value(branch.if_branch));
                extra.insert("else_branch".to_string(), actions_to_value(branch.else_branch));
                Value::Object(Map::new())
            }
        };

        StoredAction {
            id: Some(Value::String(action.id)),
            action_type,
            order: Some(Value::from(action.order)),
            config,
            extra,
        }
    }
}

fn to_config<T: Serialize>(config: &T) -> Value {
    serde_json::to_value(config).unwrap_or_default()
}

fn actions_to_value(actions: Vec<Action>) -> Value {
    Value::Array(
        actions
            .into_iter()
            .map(|a| to_config(&StoredAction::from(a)))
            .collect(),
    )
}

/// Normalize a persisted action list. A missing `order` defaults to the
/// action's position in the list.
pub fn normalize_actions(stored: Vec<StoredAction>) -> Result<Vec<Action>, NormalizeError> {
    stored
        .into_iter()
        .enumerate()
        .map(|(position, action)| normalize_action(action, position as i32))
        .collect()
}

/// Parse a raw JSON action list (as stored in a `jsonb` column).
pub fn parse_actions(value: Value) -> Result<Vec<Action>, NormalizeError> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    let stored: Vec<StoredAction> =
        serde_json::from_value(value).map_err(|e| NormalizeError::MalformedConfig {
            action_type: "unknown".to_string(),
            action_id: "unknown".to_string(),
            message: e.to_string(),
        })?;
    normalize_actions(stored)
}

/// `deserialize_with` helper for action-list fields.
pub fn deserialize_actions<'de, D>(deserializer: D) -> Result<Vec<Action>, D::Error>
where
    D: Deserializer<'de>,
{
    let stored = Option::<Vec<StoredAction>>::deserialize(deserializer)?.unwrap_or_default();
    normalize_actions(stored).map_err(serde::de::Error::custom)
}

/// Map a stored type name, legacy or canonical, to an [`ActionType`].
pub fn canonical_action_type(raw: &str) -> Option<ActionType> {
    let raw = raw.trim().to_lowercase();
    let canonical = match raw.as_str() {
        "sms" => "send_sms",
        "email" => "send_email",
        "change_status" => "update_status",
        "note" => "add_note",
        "task" => "create_task",
        "notify" => "send_notification",
        "delay" => "wait",
        "if_else" | "branch" => "condition",
        "update_lead_stage" => "move_lead_stage",
        "assign" => "assign_user",
        other => other,
    };
    ActionType::parse(canonical)
}

fn normalize_action(stored: StoredAction, position: i32) -> Result<Action, NormalizeError> {
    let action_type = canonical_action_type(&stored.action_type)
        .ok_or_else(|| NormalizeError::UnknownActionType(stored.action_type.clone()))?;

    let id = match stored.id {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => Uuid::new_v4().to_string(),
    };
    let order = stored.order.as_ref().and_then(order_value).unwrap_or(position);

    let mut config = match stored.config {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    prune_blank(&mut config);

    let malformed = |message: String| NormalizeError::MalformedConfig {
        action_type: action_type.as_str().to_string(),
        action_id: id.clone(),
        message,
    };

    let kind = match action_type {
        ActionType::SendSms => {
            rename(&mut config, "message", &["body", "text"]);
            rename(&mut config, "to", &["phone", "phone_number"]);
            ActionKind::SendSms(typed(config).map_err(malformed)?)
        }
        ActionType::SendEmail => {
            rename(&mut config, "to", &["email"]);
            rename(&mut config, "body", &["message", "content"]);
            split_list(&mut config, "cc");
            split_list(&mut config, "bcc");
            ActionKind::SendEmail(typed(config).map_err(malformed)?)
        }
        ActionType::SendNotification => {
            rename(&mut config, "user_id", &["userId", "recipient_id"]);
            rename(&mut config, "message", &["body", "text"]);
            ActionKind::SendNotification(typed(config).map_err(malformed)?)
        }
        ActionType::UpdateStatus => {
            rename(&mut config, "status", &["new_status"]);
            ActionKind::UpdateStatus(typed(config).map_err(malformed)?)
        }
        ActionType::AddNote => {
            rename(&mut config, "content", &["note", "body"]);
            ActionKind::AddNote(typed(config).map_err(malformed)?)
        }
        ActionType::CreateTask => {
            rename(&mut config, "title", &["task_title"]);
            rename(&mut config, "due_in_days", &["dueInDays"]);
            rename(&mut config, "assigned_to", &["assignee_id", "user_id", "userId"]);
            ActionKind::CreateTask(typed(config).map_err(malformed)?)
        }
        ActionType::AssignUser => {
            rename(&mut config, "user_id", &["assigned_to", "assignee_id", "userId"]);
            ActionKind::AssignUser(typed(config).map_err(malformed)?)
        }
        ActionType::MoveLeadStage => {
            rename(&mut config, "stage", &["stage_id", "stageId"]);
            ActionKind::MoveLeadStage(typed(config).map_err(malformed)?)
        }
        ActionType::MoveDealStage => {
            rename(&mut config, "stage", &["stage_id", "stageId"]);
            ActionKind::MoveDealStage(typed(config).map_err(malformed)?)
        }
        ActionType::CreateDeal => {
            rename(&mut config, "title", &["deal_title", "name"]);
            rename(&mut config, "value", &["amount"]);
            rename(&mut config, "stage", &["stage_id", "stageId"]);
            ActionKind::CreateDeal(typed(config).map_err(malformed)?)
        }
        ActionType::UpdateDeal => {
            rename(&mut config, "value", &["amount"]);
            rename(&mut config, "expected_close_date", &["close_date"]);
            ActionKind::UpdateDeal(typed(config).map_err(malformed)?)
        }
        ActionType::CloseDeal => {
            rename(&mut config, "outcome", &["status", "result"]);
            rename(&mut config, "reason", &["close_reason", "lost_reason"]);
            ActionKind::CloseDeal(close_deal_config(config).map_err(malformed)?)
        }
        ActionType::AddTag => {
            rename(&mut config, "tag", &["tag_name", "name"]);
            ActionKind::AddTag(typed(config).map_err(malformed)?)
        }
        ActionType::RemoveTag => {
            rename(&mut config, "tag", &["tag_name", "name"]);
            ActionKind::RemoveTag(typed(config).map_err(malformed)?)
        }
        ActionType::LogActivity => {
            rename(&mut config, "activity_type", &["activityType", "type"]);
            rename(&mut config, "description", &["message", "content"]);
            ActionKind::LogActivity(typed(config).map_err(malformed)?)
        }
        ActionType::Wait => {
            rename(&mut config, "duration", &["delay", "amount"]);
            rename(&mut config, "unit", &["delay_unit", "delayUnit"]);
            ActionKind::Wait(wait_config(&config).map_err(malformed)?)
        }
        ActionType::Condition => {
            ActionKind::Condition(conditional_branch(config, stored.extra)?)
        }
    };

    Ok(Action { id, order, kind })
}

fn typed<T: for<'de> Deserialize<'de>>(config: Map<String, Value>) -> Result<T, String> {
    serde_json::from_value(Value::Object(config)).map_err(|e| e.to_string())
}

fn order_value(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Move the first present alias to `canonical` unless it is already set.
fn rename(config: &mut Map<String, Value>, canonical: &str, aliases: &[&str]) {
    if config.contains_key(canonical) {
        for alias in aliases {
            config.remove(*alias);
        }
        return;
    }
    for alias in aliases {
        if let Some(value) = config.remove(*alias) {
            config.entry(canonical.to_string()).or_insert(value);
        }
    }
}

/// Drop nulls and blank strings so optional fields read as unset.
fn prune_blank(config: &mut Map<String, Value>) {
    config.retain(|_, v| match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    });
}

/// Accept `"a@x.com, b@x.com"` as well as an array.
fn split_list(config: &mut Map<String, Value>, key: &str) {
    if let Some(Value::String(s)) = config.get(key) {
        let items: Vec<Value> = s
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| Value::String(item.to_string()))
            .collect();
        config.insert(key.to_string(), Value::Array(items));
    }
}

fn close_deal_config(mut config: Map<String, Value>) -> Result<CloseDealConfig, String> {
    if let Some(Value::String(outcome)) = config.get("outcome") {
        let outcome = outcome.trim().to_lowercase();
        let outcome = outcome.trim_start_matches("closed_").to_string();
        config.insert("outcome".to_string(), Value::String(outcome));
    }
    typed(config)
}

fn wait_config(config: &Map<String, Value>) -> Result<WaitConfig, String> {
    let duration = match config.get("duration") {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .ok_or_else(|| format!("invalid wait duration {}", n))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("invalid wait duration '{}'", s))?,
        Some(other) => return Err(format!("invalid wait duration {}", other)),
        None => return Err("missing field `duration`".to_string()),
    };

    let unit = match config.get("unit").and_then(Value::as_str) {
        Some(raw) => WaitUnit::parse(raw).ok_or_else(|| format!("unknown wait unit '{}'", raw))?,
        None => WaitUnit::Minutes,
    };

    Ok(WaitConfig { duration, unit })
}

fn conditional_branch(
    mut config: Map<String, Value>,
    mut extra: Map<String, Value>,
) -> Result<ConditionalBranch, NormalizeError> {
    // The predicate may be a `condition` object at the root or in config, or
    // its fields may sit directly in config.
    let predicate = match extra.remove("condition").or_else(|| config.remove("condition")) {
        Some(Value::Object(map)) => map,
        _ => config.clone(),
    };

    let if_branch = take_branch(&mut extra, &mut config, &IF_BRANCH_KEYS)?;
    let else_branch = take_branch(&mut extra, &mut config, &ELSE_BRANCH_KEYS)?;

    Ok(ConditionalBranch {
        condition: condition_spec(&predicate),
        if_branch,
        else_branch,
    })
}

fn take_branch(
    extra: &mut Map<String, Value>,
    config: &mut Map<String, Value>,
    keys: &[&str],
) -> Result<Vec<Action>, NormalizeError> {
    let raw = keys
        .iter()
        .find_map(|key| extra.remove(*key).or_else(|| config.remove(*key)));
    match raw {
        Some(value) => parse_actions(value),
        None => Ok(Vec::new()),
    }
}

/// Build a predicate. Missing or unknown operators become `None`, which the
/// runner reports as a misconfigured condition.
fn condition_spec(predicate: &Map<String, Value>) -> ConditionSpec {
    let field = ["field", "field_path", "fieldPath"]
        .iter()
        .find_map(|key| predicate.get(*key).and_then(Value::as_str))
        .map(str::to_string);
    let operator = ["operator", "op"]
        .iter()
        .find_map(|key| predicate.get(*key).and_then(Value::as_str))
        .and_then(ConditionOperator::parse);
    let value = predicate.get("value").cloned().unwrap_or(Value::Null);

    ConditionSpec {
        field,
        operator,
        value,
    }
}
