use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::spec::field::Field;

/// Current input values keyed by field id.
pub type FormValues = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
}

/// `(fieldId, operator, value)` predicate over the current form values.
///
/// Every part is optional so half-configured rules coming from the property
/// panel still deserialize.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<ConditionOperator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Condition {
    pub fn new(field_id: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field_id: Some(field_id.into()),
            operator: Some(operator),
            value: Some(value),
        }
    }

    /// Evaluates the rule. An unconfigured rule is always satisfied.
    pub fn evaluate(&self, values: &FormValues) -> bool {
        let (Some(field_id), Some(operator), Some(expected)) =
            (self.field_id.as_deref(), self.operator, self.value.as_ref())
        else {
            return true;
        };
        if field_id.is_empty() || expected.is_null() {
            return true;
        }

        let actual = values.get(field_id).unwrap_or(&Value::Null);
        match operator {
            ConditionOperator::Equals => native_eq(actual, expected),
            ConditionOperator::NotEquals => !native_eq(actual, expected),
            ConditionOperator::Contains => coerce_string(actual).contains(&coerce_string(expected)),
            ConditionOperator::NotContains => {
                !coerce_string(actual).contains(&coerce_string(expected))
            }
            ConditionOperator::GreaterThan => coerce_number(actual) > coerce_number(expected),
            ConditionOperator::LessThan => coerce_number(actual) < coerce_number(expected),
        }
    }
}

pub fn evaluate(condition: &Condition, values: &FormValues) -> bool {
    condition.evaluate(values)
}

/// Runtime visibility of a field.
///
/// `showIf` takes precedence: when both rules are set `hideIf` is never
/// consulted. Whether both should apply together is still undecided.
pub fn should_show_field(field: &Field, values: &FormValues) -> bool {
    let Some(conditional) = &field.conditional else {
        return true;
    };
    if let Some(show_if) = &conditional.show_if {
        show_if.evaluate(values)
    } else if let Some(hide_if) = &conditional.hide_if {
        !hide_if.evaluate(values)
    } else {
        true
    }
}

// Numbers compare by value so `5` matches `5.0`; everything else is strict.
fn native_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(num) => num.to_string(),
        Value::Array(items) => items
            .iter()
            .map(coerce_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}

fn coerce_number(value: &Value) -> f64 {
    match value {
        Value::Number(num) => num.as_f64().unwrap_or(0.0),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|num| num.is_finite())
            .unwrap_or(0.0),
        Value::Bool(true) => 1.0,
        _ => 0.0,
    }
}
