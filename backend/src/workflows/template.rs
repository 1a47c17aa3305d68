// Template Resolver - {{placeholder}} substitution for action text

use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::OnceLock;

use super::actions::ExecutionResult;
use super::context::ExecutionContext;

const ENTITY_PREFIXES: [&str; 6] = ["lead", "contact", "deal", "task", "activity", "call"];

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{([^}]+)\}\}").expect("placeholder pattern is valid"))
}

/// Replace every `{{key}}` in `template` with its value from the context.
///
/// Placeholders that resolve to nothing are left exactly as written.
pub fn render(template: &str, context: &ExecutionContext) -> String {
    render_with_results(template, context, &[])
}

/// Like [`render`], but `{{results.<id>.<field>}}` and `{{previous.<field>}}`
/// can also read earlier action output.
pub fn render_with_results(
    template: &str,
    context: &ExecutionContext,
    prior: &[ExecutionResult],
) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }

    placeholder_pattern()
        .replace_all(template, |caps: &Captures| {
            let key = caps[1].trim();
            match lookup(key, context, prior).and_then(display) {
                Some(value) => value,
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn lookup(key: &str, context: &ExecutionContext, prior: &[ExecutionResult]) -> Option<Value> {
    // Person aliases read the contact before the lead
    if matches!(key, "first_name" | "last_name" | "full_name" | "email" | "phone") {
        if let Some(value) = context
            .entity_field("contact", key)
            .or_else(|| context.entity_field("lead", key))
        {
            return Some(value);
        }
    }

    if let Some(value) = context.resolve(key, prior) {
        return Some(value);
    }

    // contact_first_name -> contact.first_name
    let (prefix, field) = key.split_once('_')?;
    if ENTITY_PREFIXES.contains(&prefix) {
        return context.entity_field(prefix, field);
    }
    None
}

fn display(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_shared::{Contact, Deal, Lead};
    use rust_decimal::Decimal;
    use serde_json::json;
    use uuid::Uuid;

    fn context() -> ExecutionContext {
        ExecutionContext::new(Uuid::new_v4(), Uuid::new_v4())
            .with_contact(Contact {
                first_name: Some("Ana".to_string()),
                last_name: Some("Silva".to_string()),
                email: Some("ana@example.com".to_string()),
                ..Default::default()
            })
            .with_lead(Lead {
                first_name: Some("Lead".to_string()),
                phone: Some("+15550001111".to_string()),
                status: "new".to_string(),
                ..Default::default()
            })
    }

    #[test]
    fn test_contact_first_name() {
        assert_eq!(render("Hello {{contact_first_name}}", &context()), "Hello Ana");
    }

    #[test]
    fn test_unresolved_placeholder_is_kept() {
        assert_eq!(
            render("Hi {{contact_nickname}}, re: {{ deal.title }}", &context()),
            "Hi {{contact_nickname}}, re: {{ deal.title }}"
        );
    }

    #[test]
    fn test_aliases_prefer_contact() {
        let ctx = context();
        assert_eq!(render("{{first_name}}", &ctx), "Ana");
        assert_eq!(render("{{full_name}}", &ctx), "Ana Silva");
        // contact has no phone, so the lead's is used
        assert_eq!(render("{{phone}}", &ctx), "+15550001111");
        assert_eq!(render("{{lead_first_name}} / {{ lead.status }}", &ctx), "Lead / new");
    }

    #[test]
    fn test_non_string_values() {
        let ctx = context()
            .with_deal(Deal {
                title: "Solar".to_string(),
                value: Some(Decimal::new(150000, 2)),
                ..Default::default()
            })
            .with_custom_field("seats", json!(12))
            .with_custom_field("vip", json!(true));

        assert_eq!(render("{{deal_value}}", &ctx), "1500.00");
        assert_eq!(render("{{custom.seats}} seats, vip={{vip}}", &ctx), "12 seats, vip=true");
    }

    #[test]
    fn test_no_placeholders() {
        assert_eq!(render("plain text", &context()), "plain text");
        assert_eq!(render("", &context()), "");
    }
}
