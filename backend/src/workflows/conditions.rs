// Workflow Conditions - Predicate evaluation for condition actions

use chrono::{DateTime, NaiveDate, Utc};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use tracing::warn;

use super::actions::ExecutionResult;
use super::context::ExecutionContext;

/// The predicate carried by a `condition` action.
///
/// `field` and `operator` are optional because persisted definitions can be
/// incomplete; the runner records such a condition as a failed result instead
/// of picking a branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<ConditionOperator>,
    #[serde(default)]
    pub value: Value,
}

impl ConditionSpec {
    pub fn new(field: &str, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: Some(field.to_string()),
            operator: Some(operator),
            value,
        }
    }

    /// Field path and operator, if both are present.
    pub fn parts(&self) -> Option<(&str, ConditionOperator)> {
        let field = self.field.as_deref().map(str::trim).filter(|f| !f.is_empty())?;
        Some((field, self.operator?))
    }

    pub fn equals(field: &str, value: Value) -> Self {
        Self::new(field, ConditionOperator::Equals, value)
    }

    pub fn not_equals(field: &str, value: Value) -> Self {
        Self::new(field, ConditionOperator::NotEquals, value)
    }

    pub fn greater_than(field: &str, value: f64) -> Self {
        Self::new(field, ConditionOperator::GreaterThan, serde_json::json!(value))
    }

    pub fn less_than(field: &str, value: f64) -> Self {
        Self::new(field, ConditionOperator::LessThan, serde_json::json!(value))
    }

    pub fn in_list(field: &str, values: Vec<Value>) -> Self {
        Self::new(field, ConditionOperator::In, Value::Array(values))
    }

    pub fn is_empty(field: &str) -> Self {
        Self::new(field, ConditionOperator::IsEmpty, Value::Null)
    }
}

/// Condition operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    // Equality
    #[serde(alias = "eq", alias = "==")]
    Equals,
    #[serde(alias = "ne", alias = "!=")]
    NotEquals,

    // String operations
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    #[serde(alias = "regex")]
    Matches,

    // Ordering (numbers, then dates)
    #[serde(alias = "gt", alias = ">")]
    GreaterThan,
    #[serde(alias = "gte", alias = ">=")]
    GreaterThanOrEquals,
    #[serde(alias = "lt", alias = "<")]
    LessThan,
    #[serde(alias = "lte", alias = "<=")]
    LessThanOrEquals,

    // Membership
    In,
    NotIn,

    // Emptiness
    IsEmpty,
    IsNotEmpty,

    // Boolean
    IsTrue,
    IsFalse,
}

impl ConditionOperator {
    /// Parse an operator, accepting the legacy spellings.
    pub fn parse(s: &str) -> Option<Self> {
        let op = match s.trim().to_lowercase().as_str() {
            "equals" | "eq" | "==" | "=" => Self::Equals,
            "not_equals" | "ne" | "!=" | "<>" => Self::NotEquals,
            "contains" => Self::Contains,
            "not_contains" => Self::NotContains,
            "starts_with" => Self::StartsWith,
            "ends_with" => Self::EndsWith,
            "matches" | "regex" => Self::Matches,
            "greater_than" | "gt" | ">" => Self::GreaterThan,
            "greater_than_or_equals" | "gte" | ">=" => Self::GreaterThanOrEquals,
            "less_than" | "lt" | "<" => Self::LessThan,
            "less_than_or_equals" | "lte" | "<=" => Self::LessThanOrEquals,
            "in" => Self::In,
            "not_in" => Self::NotIn,
            "is_empty" => Self::IsEmpty,
            "is_not_empty" => Self::IsNotEmpty,
            "is_true" => Self::IsTrue,
            "is_false" => Self::IsFalse,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Matches => "matches",
            Self::GreaterThan => "greater_than",
            Self::GreaterThanOrEquals => "greater_than_or_equals",
            Self::LessThan => "less_than",
            Self::LessThanOrEquals => "less_than_or_equals",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
            Self::IsTrue => "is_true",
            Self::IsFalse => "is_false",
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition evaluator
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// Evaluate `field <operator> expected` against the context and the
    /// results recorded so far. Never fails: a missing field is "absent".
    pub fn evaluate(
        field: &str,
        operator: ConditionOperator,
        expected: &Value,
        context: &ExecutionContext,
        prior: &[ExecutionResult],
    ) -> bool {
        let actual = context.resolve(field, prior);
        Self::compare(actual.as_ref(), operator, expected)
    }

    /// Apply one operator. `actual == None` (or JSON null) is the absent value:
    ///
    /// - equals: true only against null or ""
    /// - ordering, contains, starts/ends_with, in, matches, is_true/is_false: false
    /// - not_equals, not_contains, not_in, is_empty: true
    pub fn compare(actual: Option<&Value>, operator: ConditionOperator, expected: &Value) -> bool {
        let actual = actual.filter(|v| !v.is_null());

        match operator {
            ConditionOperator::Equals => Self::equals(actual, expected),
            ConditionOperator::NotEquals => !Self::equals(actual, expected),

            ConditionOperator::Contains => actual.is_some_and(|a| Self::contains(a, expected)),
            ConditionOperator::NotContains => !actual.is_some_and(|a| Self::contains(a, expected)),
            ConditionOperator::StartsWith => actual.is_some_and(|a| {
                text(a).to_lowercase().starts_with(&text(expected).to_lowercase())
            }),
            ConditionOperator::EndsWith => actual.is_some_and(|a| {
                text(a).to_lowercase().ends_with(&text(expected).to_lowercase())
            }),
            ConditionOperator::Matches => actual.is_some_and(|a| Self::matches(a, expected)),

            ConditionOperator::GreaterThan => {
                Self::ordering(actual, expected).is_some_and(|o| o == Ordering::Greater)
            }
            ConditionOperator::GreaterThanOrEquals => {
                Self::ordering(actual, expected).is_some_and(|o| o != Ordering::Less)
            }
            ConditionOperator::LessThan => {
                Self::ordering(actual, expected).is_some_and(|o| o == Ordering::Less)
            }
            ConditionOperator::LessThanOrEquals => {
                Self::ordering(actual, expected).is_some_and(|o| o != Ordering::Greater)
            }

            ConditionOperator::In => actual.is_some_and(|a| Self::is_in(a, expected)),
            ConditionOperator::NotIn => !actual.is_some_and(|a| Self::is_in(a, expected)),

            ConditionOperator::IsEmpty => Self::is_empty(actual),
            ConditionOperator::IsNotEmpty => !Self::is_empty(actual),

            ConditionOperator::IsTrue => actual.and_then(truthiness) == Some(true),
            ConditionOperator::IsFalse => actual.and_then(truthiness) == Some(false),
        }
    }

    /// Loose equality: numeric when both sides read as numbers, otherwise
    /// trimmed and case-insensitive.
    fn equals(actual: Option<&Value>, expected: &Value) -> bool {
        let Some(actual) = actual else {
            return match expected {
                Value::Null => true,
                Value::String(s) => s.trim().is_empty(),
                _ => false,
            };
        };
        loose_eq(actual, expected)
    }

    fn contains(actual: &Value, expected: &Value) -> bool {
        match actual {
            Value::Array(items) => items.iter().any(|item| loose_eq(item, expected)),
            other => text(other).to_lowercase().contains(&text(expected).to_lowercase()),
        }
    }

    fn is_in(actual: &Value, expected: &Value) -> bool {
        match expected {
            Value::Array(options) => options.iter().any(|option| loose_eq(actual, option)),
            Value::String(list) => list
                .split(',')
                .any(|option| loose_eq(actual, &Value::String(option.to_string()))),
            other => loose_eq(actual, other),
        }
    }

    fn matches(actual: &Value, expected: &Value) -> bool {
        let pattern = text(expected);
        match RegexBuilder::new(&pattern).size_limit(1 << 20).build() {
            Ok(re) => re.is_match(&text(actual)),
            Err(e) => {
                warn!("Invalid condition pattern '{}': {}", pattern, e);
                false
            }
        }
    }

    /// Numbers compare numerically, dates chronologically. Anything else
    /// (including an absent side) has no ordering.
    fn ordering(actual: Option<&Value>, expected: &Value) -> Option<Ordering> {
        let actual = actual?;
        if let (Some(a), Some(b)) = (number(actual), number(expected)) {
            return a.partial_cmp(&b);
        }
        if let (Some(a), Some(b)) = (date(actual), date(expected)) {
            return Some(a.cmp(&b));
        }
        None
    }

    fn is_empty(actual: Option<&Value>) -> bool {
        match actual {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(Value::Array(items)) => items.is_empty(),
            Some(Value::Object(map)) => map.is_empty(),
            Some(_) => false,
        }
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (number(a), number(b)) {
        return x == y;
    }
    match (a, b) {
        (Value::Array(_), _) | (Value::Object(_), _) | (_, Value::Array(_)) | (_, Value::Object(_)) => {
            a == b
        }
        (Value::Null, _) | (_, Value::Null) => false,
        _ => text(a).trim().to_lowercase() == text(b).trim().to_lowercase(),
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn date(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn truthiness(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Some(true),
            "false" | "no" | "0" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_shared::Lead;
    use serde_json::json;
    use uuid::Uuid;

    use super::ConditionOperator::*;

    fn check(actual: Value, op: ConditionOperator, expected: Value) -> bool {
        ConditionEvaluator::compare(Some(&actual), op, &expected)
    }

    fn absent(op: ConditionOperator, expected: Value) -> bool {
        ConditionEvaluator::compare(None, op, &expected)
    }

    #[test]
    fn test_equality_is_loose() {
        assert!(check(json!("New"), Equals, json!("new")));
        assert!(check(json!(" new "), Equals, json!("new")));
        assert!(check(json!("42"), Equals, json!(42)));
        assert!(check(json!(1500.0), Equals, json!("1500.00")));
        assert!(check(json!(true), Equals, json!("true")));
        assert!(!check(json!("new"), Equals, json!("contacted")));
        assert!(check(json!("new"), NotEquals, json!("contacted")));
    }

    #[test]
    fn test_ordering() {
        assert!(check(json!(10), GreaterThan, json!(5)));
        assert!(check(json!("10"), GreaterThan, json!(9.5)));
        assert!(check(json!(5), GreaterThanOrEquals, json!(5)));
        assert!(check(json!(4), LessThan, json!(5)));
        assert!(check(json!(5), LessThanOrEquals, json!("5")));
        assert!(check(json!("2026-03-01T10:00:00Z"), GreaterThan, json!("2026-02-28")));
        assert!(check(json!("2026-01-01"), LessThan, json!("2026-01-02T00:00:00+00:00")));
    }

    #[test]
    fn test_ordering_against_absent_is_false() {
        for op in [GreaterThan, GreaterThanOrEquals, LessThan, LessThanOrEquals] {
            assert!(!absent(op, json!(0)), "{} against absent", op);
            assert!(!check(Value::Null, op, json!(0)), "{} against null", op);
            assert!(!check(json!(0), op, Value::Null), "{} with null expected", op);
            assert!(!check(json!("abc"), op, json!(1)), "{} across types", op);
        }
    }

    #[test]
    fn test_absent_values() {
        assert!(absent(Equals, Value::Null));
        assert!(absent(Equals, json!("")));
        assert!(!absent(Equals, json!("new")));
        assert!(absent(NotEquals, json!("new")));
        assert!(!absent(Contains, json!("a")));
        assert!(absent(NotContains, json!("a")));
        assert!(!absent(StartsWith, json!("a")));
        assert!(!absent(In, json!(["a"])));
        assert!(absent(NotIn, json!(["a"])));
        assert!(absent(IsEmpty, Value::Null));
        assert!(!absent(IsNotEmpty, Value::Null));
        assert!(!absent(IsTrue, Value::Null));
        assert!(!absent(IsFalse, Value::Null));
        assert!(!absent(Matches, json!(".*")));
    }

    #[test]
    fn test_strings_and_membership() {
        assert!(check(json!("Acme Solar Ltd"), Contains, json!("solar")));
        assert!(check(json!(["vip", "solar"]), Contains, json!("VIP")));
        assert!(check(json!("Acme"), StartsWith, json!("ac")));
        assert!(check(json!("ana@example.com"), EndsWith, json!("@EXAMPLE.com")));
        assert!(check(json!("qualified"), In, json!(["new", "qualified"])));
        assert!(check(json!("qualified"), In, json!("new, qualified")));
        assert!(check(json!("lost"), NotIn, json!(["new", "qualified"])));
        assert!(check(json!("+15550001111"), Matches, json!(r"^\+1555")));
        assert!(!check(json!("x"), Matches, json!("(")));
    }

    #[test]
    fn test_empty_and_boolean() {
        assert!(check(json!(""), IsEmpty, Value::Null));
        assert!(check(json!([]), IsEmpty, Value::Null));
        assert!(check(json!(["a"]), IsNotEmpty, Value::Null));
        assert!(check(json!(true), IsTrue, Value::Null));
        assert!(check(json!("yes"), IsTrue, Value::Null));
        assert!(check(json!(0), IsFalse, Value::Null));
        assert!(!check(json!("maybe"), IsTrue, Value::Null));
        assert!(!check(json!("maybe"), IsFalse, Value::Null));
    }

    #[test]
    fn test_operator_parse() {
        assert_eq!(ConditionOperator::parse("=="), Some(Equals));
        assert_eq!(ConditionOperator::parse("GTE"), Some(GreaterThanOrEquals));
        assert_eq!(ConditionOperator::parse("regex"), Some(Matches));
        assert_eq!(ConditionOperator::parse("between"), None);

        let op: ConditionOperator = serde_json::from_value(json!("!=")).unwrap();
        assert_eq!(op, NotEquals);
        assert_eq!(serde_json::to_value(LessThanOrEquals).unwrap(), "less_than_or_equals");
    }

    #[test]
    fn test_evaluate_against_context() {
        let ctx = ExecutionContext::new(Uuid::new_v4(), Uuid::new_v4()).with_lead(Lead {
            status: "new".to_string(),
            ..Default::default()
        });

        assert!(ConditionEvaluator::evaluate("lead.status", Equals, &json!("new"), &ctx, &[]));
        assert!(!ConditionEvaluator::evaluate("deal.value", GreaterThan, &json!(0), &ctx, &[]));
        assert!(ConditionEvaluator::evaluate("lead.company", IsEmpty, &Value::Null, &ctx, &[]));
    }

    #[test]
    fn test_condition_parts() {
        assert!(ConditionSpec::equals("lead.status", json!("new")).parts().is_some());

        let missing_op = ConditionSpec {
            field: Some("lead.status".to_string()),
            operator: None,
            value: json!("new"),
        };
        assert!(missing_op.parts().is_none());

        let blank_field = ConditionSpec {
            field: Some("  ".to_string()),
            operator: Some(Equals),
            value: json!("new"),
        };
        assert!(blank_field.parts().is_none());
    }
}
