// Execution Context - Snapshot of the triggering records a workflow run reads from

use leadflow_shared::{Activity, Call, Contact, Deal, Lead, Task};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use super::actions::ExecutionResult;

/// Entity snapshots searched, in order, for an unqualified field path.
const UNQUALIFIED_SEARCH_ORDER: [&str; 6] = ["lead", "deal", "contact", "task", "activity", "call"];

/// Everything a run can read: the tenant/user it runs for, denormalized
/// snapshots of the triggering records and free-form custom field values.
///
/// Actions never mutate the context. It is threaded unchanged through branch
/// recursion and stored verbatim with a continuation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead: Option<Lead>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deal: Option<Deal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<Activity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call: Option<Call>,
    #[serde(default)]
    pub custom_fields: HashMap<String, Value>,
}

impl ExecutionContext {
    pub fn new(tenant_id: Uuid, user_id: Uuid) -> Self {
        Self {
            tenant_id,
            user_id,
            ..Default::default()
        }
    }

    pub fn with_lead(mut self, lead: Lead) -> Self {
        self.lead = Some(lead);
        self
    }

    pub fn with_contact(mut self, contact: Contact) -> Self {
        self.contact = Some(contact);
        self
    }

    pub fn with_deal(mut self, deal: Deal) -> Self {
        self.deal = Some(deal);
        self
    }

    pub fn with_activity(mut self, activity: Activity) -> Self {
        self.activity = Some(activity);
        self
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.task = Some(task);
        self
    }

    pub fn with_call(mut self, call: Call) -> Self {
        self.call = Some(call);
        self
    }

    pub fn with_custom_field(mut self, key: &str, value: Value) -> Self {
        self.custom_fields.insert(key.to_string(), value);
        self
    }

    /// Resolve a field path against the context and the results recorded so
    /// far. `None` means the field is absent.
    ///
    /// Supported forms:
    /// - `lead.status`, `contact.first_name`, `deal.value` (qualified)
    /// - `custom_fields.budget` / `custom.budget`
    /// - `results.<action_id>.<path>` (last result for that action)
    /// - `previous.<path>` (most recent result)
    /// - `status` (unqualified: first snapshot holding it, then custom fields)
    pub fn resolve(&self, path: &str, prior: &[ExecutionResult]) -> Option<Value> {
        let path = path.trim();
        if path.is_empty() {
            return None;
        }

        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        match head {
            "results" => {
                let rest = rest?;
                let (action_id, field) = match rest.split_once('.') {
                    Some((id, field)) => (id, Some(field)),
                    None => (rest, None),
                };
                let result = prior.iter().rev().find(|r| r.action_id == action_id)?;
                resolve_in_result(result, field)
            }
            "previous" => resolve_in_result(prior.last()?, rest),
            "custom_fields" | "custom" => {
                let rest = rest?;
                let (key, field) = match rest.split_once('.') {
                    Some((key, field)) => (key, Some(field)),
                    None => (rest, None),
                };
                let value = self.custom_fields.get(key)?;
                match field {
                    Some(field) => walk(value, field),
                    None => present(value.clone()),
                }
            }
            entity if UNQUALIFIED_SEARCH_ORDER.contains(&entity) => match rest {
                Some(field) => self.entity_field(entity, field),
                None => self.entity_value(entity),
            },
            _ => {
                for entity in UNQUALIFIED_SEARCH_ORDER {
                    if let Some(value) = self.entity_field(entity, path) {
                        return Some(value);
                    }
                }
                let (key, field) = match rest {
                    Some(field) => (head, Some(field)),
                    None => (path, None),
                };
                let value = self.custom_fields.get(key)?;
                match field {
                    Some(field) => walk(value, field),
                    None => present(value.clone()),
                }
            }
        }
    }

    /// Resolve `field` on one entity snapshot. `full_name` is derived for
    /// leads and contacts.
    pub fn entity_field(&self, entity: &str, field: &str) -> Option<Value> {
        if field == "full_name" {
            let name = match entity {
                "lead" => self.lead.as_ref()?.full_name(),
                "contact" => self.contact.as_ref()?.full_name(),
                _ => None,
            };
            if let Some(name) = name {
                return Some(Value::String(name));
            }
        }

        let value = self.entity_value(entity)?;
        walk(&value, field)
    }

    fn entity_value(&self, entity: &str) -> Option<Value> {
        let value = match entity {
            "lead" => self.lead.as_ref().map(serde_json::to_value),
            "contact" => self.contact.as_ref().map(serde_json::to_value),
            "deal" => self.deal.as_ref().map(serde_json::to_value),
            "activity" => self.activity.as_ref().map(serde_json::to_value),
            "task" => self.task.as_ref().map(serde_json::to_value),
            "call" => self.call.as_ref().map(serde_json::to_value),
            _ => None,
        }?;
        value.ok()
    }

    /// Phone number for outbound SMS: contact first, then lead.
    pub fn phone(&self) -> Option<String> {
        non_blank(self.contact.as_ref().and_then(|c| c.phone.as_deref()))
            .or_else(|| non_blank(self.lead.as_ref().and_then(|l| l.phone.as_deref())))
    }

    /// Email address for outbound email: contact first, then lead.
    pub fn email(&self) -> Option<String> {
        non_blank(self.contact.as_ref().and_then(|c| c.email.as_deref()))
            .or_else(|| non_blank(self.lead.as_ref().and_then(|l| l.email.as_deref())))
    }

    pub fn lead_id(&self) -> Option<Uuid> {
        self.lead.as_ref().map(|l| l.id)
    }

    pub fn contact_id(&self) -> Option<Uuid> {
        self.contact
            .as_ref()
            .map(|c| c.id)
            .or_else(|| self.lead.as_ref().and_then(|l| l.contact_id))
    }

    pub fn deal_id(&self) -> Option<Uuid> {
        self.deal.as_ref().map(|d| d.id)
    }
}

fn resolve_in_result(result: &ExecutionResult, field: Option<&str>) -> Option<Value> {
    let value = serde_json::to_value(result).ok()?;
    let Some(field) = field else {
        return Some(value);
    };

    // `results.x.task_id` is shorthand for `results.x.data.task_id`
    walk(&value, field).or_else(|| result.data.as_ref().and_then(|data| walk(data, field)))
}

/// Walk a dotted path through objects (and numeric indices through arrays).
fn walk(value: &Value, path: &str) -> Option<Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    present(current.clone())
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).map(str::to_string)
}

fn present(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        other => Some(other),
    }
}
