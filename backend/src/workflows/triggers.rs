// Workflow Triggers - Domain events that start workflow runs

use chrono::{DateTime, Utc};
use leadflow_shared::{Activity, Call, Contact, Deal, Lead, Task};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use super::context::ExecutionContext;

/// Types of events that can trigger workflows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    // Lead triggers
    LeadCreated,
    LeadStatusChanged,
    LeadStageChanged,
    LeadAssigned,

    // Contact triggers
    ContactCreated,

    // Deal triggers
    DealCreated,
    DealStageChanged,
    DealWon,
    DealLost,

    // Activity triggers
    TaskCompleted,
    ActivityLogged,
    CallCompleted,
    MessageReceived,
    TagAdded,

    Manual,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::LeadCreated => "lead_created",
            TriggerType::LeadStatusChanged => "lead_status_changed",
            TriggerType::LeadStageChanged => "lead_stage_changed",
            TriggerType::LeadAssigned => "lead_assigned",
            TriggerType::ContactCreated => "contact_created",
            TriggerType::DealCreated => "deal_created",
            TriggerType::DealStageChanged => "deal_stage_changed",
            TriggerType::DealWon => "deal_won",
            TriggerType::DealLost => "deal_lost",
            TriggerType::TaskCompleted => "task_completed",
            TriggerType::ActivityLogged => "activity_logged",
            TriggerType::CallCompleted => "call_completed",
            TriggerType::MessageReceived => "message_received",
            TriggerType::TagAdded => "tag_added",
            TriggerType::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        serde_json::from_value(Value::String(s.trim().to_string())).ok()
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain event that can start workflow runs.
///
/// `context` seeds every run started for the event; `payload` carries the
/// event details (`from_status`, `to_stage`, ...) matched against each
/// workflow's trigger filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event_id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub trigger_type: TriggerType,
    pub context: ExecutionContext,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl TriggerEvent {
    pub fn new(trigger_type: TriggerType, context: ExecutionContext, payload: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            tenant_id: context.tenant_id,
            user_id: context.user_id,
            trigger_type,
            context,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn lead_created(lead: Lead, user_id: Uuid) -> Self {
        let payload = serde_json::json!({ "lead_id": lead.id, "status": lead.status });
        let context = ExecutionContext::new(lead.tenant_id, user_id).with_lead(lead);
        Self::new(TriggerType::LeadCreated, context, payload)
    }

    pub fn lead_status_changed(lead: Lead, from_status: &str, user_id: Uuid) -> Self {
        let payload = serde_json::json!({
            "lead_id": lead.id,
            "from_status": from_status,
            "to_status": lead.status,
        });
        let context = ExecutionContext::new(lead.tenant_id, user_id).with_lead(lead);
        Self::new(TriggerType::LeadStatusChanged, context, payload)
    }

    pub fn lead_stage_changed(lead: Lead, from_stage: Option<&str>, user_id: Uuid) -> Self {
        let payload = serde_json::json!({
            "lead_id": lead.id,
            "from_stage": from_stage,
            "to_stage": lead.stage,
        });
        let context = ExecutionContext::new(lead.tenant_id, user_id).with_lead(lead);
        Self::new(TriggerType::LeadStageChanged, context, payload)
    }

    pub fn contact_created(contact: Contact, user_id: Uuid) -> Self {
        let payload = serde_json::json!({ "contact_id": contact.id });
        let context = ExecutionContext::new(contact.tenant_id, user_id).with_contact(contact);
        Self::new(TriggerType::ContactCreated, context, payload)
    }

    pub fn deal_stage_changed(deal: Deal, from_stage: Option<&str>, user_id: Uuid) -> Self {
        let payload = serde_json::json!({
            "deal_id": deal.id,
            "from_stage": from_stage,
            "to_stage": deal.stage,
        });
        let context = ExecutionContext::new(deal.tenant_id, user_id).with_deal(deal);
        Self::new(TriggerType::DealStageChanged, context, payload)
    }

    /// `deal_won` or `deal_lost`, depending on the deal's status.
    pub fn deal_closed(deal: Deal, user_id: Uuid) -> Self {
        let trigger_type = if deal.status.eq_ignore_ascii_case("won") {
            TriggerType::DealWon
        } else {
            TriggerType::DealLost
        };
        let payload = serde_json::json!({ "deal_id": deal.id, "reason": deal.close_reason });
        let context = ExecutionContext::new(deal.tenant_id, user_id).with_deal(deal);
        Self::new(trigger_type, context, payload)
    }

    pub fn task_completed(task: Task, user_id: Uuid) -> Self {
        let payload = serde_json::json!({ "task_id": task.id, "lead_id": task.lead_id });
        let context = ExecutionContext::new(task.tenant_id, user_id).with_task(task);
        Self::new(TriggerType::TaskCompleted, context, payload)
    }

    pub fn activity_logged(activity: Activity, user_id: Uuid) -> Self {
        let payload = serde_json::json!({
            "activity_id": activity.id,
            "activity_type": activity.activity_type,
        });
        let context = ExecutionContext::new(activity.tenant_id, user_id).with_activity(activity);
        Self::new(TriggerType::ActivityLogged, context, payload)
    }

    /// A finished call, with the lead it was linked to when known.
    pub fn call_completed(call: Call, lead: Option<Lead>, user_id: Uuid) -> Self {
        let payload = serde_json::json!({
            "call_id": call.id,
            "direction": call.direction,
            "call_outcome": call.outcome,
            "duration_seconds": call.duration_seconds,
        });
        let mut context = ExecutionContext::new(call.tenant_id, user_id).with_call(call);
        if let Some(lead) = lead {
            context = context.with_lead(lead);
        }
        Self::new(TriggerType::CallCompleted, context, payload)
    }

    pub fn tag_added(context: ExecutionContext, tag: &str) -> Self {
        Self::new(TriggerType::TagAdded, context, serde_json::json!({ "tag": tag }))
    }

    pub fn manual(context: ExecutionContext) -> Self {
        Self::new(TriggerType::Manual, context, serde_json::json!({}))
    }
}

/// Payload keys a workflow's `trigger_config` may filter on.
pub const FILTER_KEYS: [&str; 7] = [
    "to_status",
    "from_status",
    "to_stage",
    "from_stage",
    "tag",
    "call_outcome",
    "direction",
];

/// Whether an event's payload passes a workflow's trigger filters.
///
/// Each configured filter (a string or a list of strings) must match the
/// payload value case-insensitively. A filter whose key is missing from the
/// payload does not reject the event.
pub fn matches_trigger_config(trigger_config: &Value, payload: &Value) -> bool {
    FILTER_KEYS.iter().all(|key| {
        let Some(expected) = trigger_config.get(*key).filter(|v| !is_blank(v)) else {
            return true;
        };
        let Some(actual) = payload.get(*key).filter(|v| !is_blank(v)) else {
            return true;
        };
        let actual = text(actual);

        match expected {
            Value::Array(options) => options.iter().any(|o| text(o).eq_ignore_ascii_case(&actual)),
            other => text(other).eq_ignore_ascii_case(&actual),
        }
    })
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}
