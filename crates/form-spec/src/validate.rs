use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::{FormValues, should_show_field};
use crate::spec::field::{Field, FieldType, ValidationRules};

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));
static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("url regex"));
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9\s().-]{7,20}$").expect("phone regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field_id: String,
    pub message: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub missing_required: Vec<String>,
    pub unknown_fields: Vec<String>,
}

/// Checks preview input values against the fields that are currently visible.
pub fn validate_values(fields: &[Field], values: &FormValues) -> ValidationResult {
    let mut errors = Vec::new();
    let mut missing_required = Vec::new();

    for field in fields {
        if field.kind.is_layout() || !should_show_field(field, values) {
            continue;
        }
        if field.advanced.as_ref().is_some_and(|advanced| advanced.hidden) {
            continue;
        }

        match values.get(&field.id).filter(|value| !is_blank(value)) {
            None => {
                if field.required {
                    missing_required.push(field.id.clone());
                }
            }
            Some(value) => {
                if let Some(error) = validate_value(field, value) {
                    errors.push(error);
                }
            }
        }
    }

    let known: BTreeSet<&str> = fields.iter().map(|field| field.id.as_str()).collect();
    let unknown_fields: Vec<String> = values
        .keys()
        .filter(|key| !known.contains(key.as_str()))
        .cloned()
        .collect();

    ValidationResult {
        valid: errors.is_empty() && missing_required.is_empty() && unknown_fields.is_empty(),
        errors,
        missing_required,
        unknown_fields,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Bool(flag) => !flag,
        _ => false,
    }
}

fn validate_value(field: &Field, value: &Value) -> Option<ValidationError> {
    if let Some(error) = check_format(field, value) {
        return Some(error);
    }

    if field.kind.has_options()
        && let Some(options) = &field.options
    {
        let chosen: Vec<&str> = match value {
            Value::String(text) => vec![text.as_str()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if chosen.iter().any(|choice| !options.iter().any(|option| option == choice)) {
            return Some(base_error(field, "invalid option", "option_mismatch"));
        }
    }

    if let Some(rules) = &field.validation {
        return enforce_rules(field, value, rules);
    }

    None
}

fn check_format(field: &Field, value: &Value) -> Option<ValidationError> {
    let text = value.as_str();
    let malformed = match field.kind {
        FieldType::Email => text.is_some_and(|text| !EMAIL.is_match(text)),
        FieldType::Url => text.is_some_and(|text| !URL.is_match(text)),
        FieldType::Phone => text.is_some_and(|text| !PHONE.is_match(text)),
        FieldType::Number | FieldType::Rating | FieldType::Slider => as_number(value).is_none(),
        _ => false,
    };
    malformed.then(|| base_error(field, "value has the wrong format", "format_mismatch"))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(num) => num.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn enforce_rules(field: &Field, value: &Value, rules: &ValidationRules) -> Option<ValidationError> {
    let message = |fallback: &str| {
        rules
            .custom_message
            .clone()
            .unwrap_or_else(|| fallback.to_string())
    };

    if let Some(text) = value.as_str() {
        let length = text.chars().count();
        if let Some(min_len) = rules.min_length
            && length < min_len
        {
            return Some(error(field, message("text shorter than min length"), "min_length"));
        }
        if let Some(max_len) = rules.max_length
            && length > max_len
        {
            return Some(error(field, message("text longer than max length"), "max_length"));
        }
        if let Some(pattern) = &rules.pattern
            && let Ok(regex) = Regex::new(pattern)
            && !regex.is_match(text)
        {
            return Some(error(
                field,
                message("value does not match pattern"),
                "pattern_mismatch",
            ));
        }
    }

    if let Some(number) = as_number(value) {
        if let Some(min) = rules.min
            && number < min
        {
            return Some(error(field, message("value below minimum"), "min"));
        }
        if let Some(max) = rules.max
            && number > max
        {
            return Some(error(field, message("value above maximum"), "max"));
        }
    }

    None
}

fn base_error(field: &Field, message: &str, code: &str) -> ValidationError {
    error(field, message.to_string(), code)
}

fn error(field: &Field, message: String, code: &str) -> ValidationError {
    ValidationError {
        field_id: field.id.clone(),
        message,
        code: code.into(),
    }
}
