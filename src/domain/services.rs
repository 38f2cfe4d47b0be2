//! Domain services for rule evaluation
//!
//! Pure functions over records and rules: dotted-path resolution, operator
//! evaluation and rule ordering. Nothing here performs I/O.

use std::borrow::Cow;

use serde_json::{Map, Value};
use tracing::warn;

use super::entities::{AssetRecord, EnrichmentRule};
use super::value_objects::{Condition, ConditionOperator};

/// Resolve a dotted path inside a JSON object.
///
/// Missing keys, out-of-range indices and traversal through scalars all
/// yield `None`. Numeric segments index into arrays.
pub fn resolve_path<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = root.get(first)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Resolve a dotted path against a record, including its `id`
pub fn resolve_record_field<'a>(record: &'a AssetRecord, path: &str) -> Option<Cow<'a, Value>> {
    if path == "id" {
        return Some(Cow::Owned(Value::String(record.id.clone())));
    }
    resolve_path(&record.attributes, path).map(Cow::Borrowed)
}

/// Write `value` at a dotted path, creating intermediate objects as needed.
///
/// A non-object value sitting on the path is replaced by an object.
pub fn assign_path(root: &mut Map<String, Value>, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = root;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = match entry {
            Value::Object(map) => map,
            _ => return,
        };
    }
    current.insert(last.to_string(), value);
}

/// Render a value as text for string operators
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => stringify(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// Strict equality; numbers compare by value so `1` equals `1.0`
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => left == right,
    }
}

/// Evaluate a rule condition against a record.
///
/// An absent field never satisfies `equals`, `in` or any string operator,
/// and always satisfies `not_in` when the condition value is an array.
pub fn evaluate_condition(record: &AssetRecord, condition: &Condition) -> bool {
    let field = resolve_record_field(record, &condition.field);
    let expected = &condition.value;

    match condition.operator {
        ConditionOperator::Equals => field.is_some_and(|v| values_equal(&v, expected)),
        ConditionOperator::Contains => field.is_some_and(|v| {
            stringify(&v)
                .to_lowercase()
                .contains(&stringify(expected).to_lowercase())
        }),
        ConditionOperator::StartsWith => {
            field.is_some_and(|v| stringify(&v).starts_with(&stringify(expected)))
        }
        ConditionOperator::EndsWith => {
            field.is_some_and(|v| stringify(&v).ends_with(&stringify(expected)))
        }
        ConditionOperator::Regex => {
            let Some(value) = field else {
                return false;
            };
            match condition.pattern() {
                Ok(regex) => regex.is_match(&stringify(&value)),
                Err(e) => {
                    warn!(pattern = %stringify(expected), error = %e, "Invalid regex in rule condition");
                    false
                }
            }
        }
        ConditionOperator::In => match expected {
            Value::Array(candidates) => field
                .is_some_and(|v| candidates.iter().any(|candidate| values_equal(candidate, &v))),
            _ => false,
        },
        ConditionOperator::NotIn => match expected {
            Value::Array(candidates) => !field
                .is_some_and(|v| candidates.iter().any(|candidate| values_equal(candidate, &v))),
            _ => false,
        },
    }
}

/// Active rules in application order: ascending priority, ties keep input order
pub fn applicable_rules(rules: &[EnrichmentRule]) -> Vec<&EnrichmentRule> {
    let mut active: Vec<&EnrichmentRule> = rules.iter().filter(|rule| rule.active).collect();
    active.sort_by_key(|rule| rule.priority);
    active
}
