use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::config::EXPORT_VERSION;
use crate::spec::field::Field;
use crate::spec::form::FormExport;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("import is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("import must be a JSON object")]
    NotAnObject,
    #[error("import is missing `fields`")]
    MissingFields,
    #[error("`fields` must be an array")]
    FieldsNotArray,
    #[error("field {index} is missing a non-empty `{key}`")]
    MissingFieldProperty { index: usize, key: &'static str },
    #[error("field {index} is malformed: {source}")]
    MalformedField {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("duplicate field id '{0}'")]
    DuplicateId(String),
    #[error("failed to encode form: {0}")]
    Encode(#[source] serde_json::Error),
}

pub fn export_json(export: &FormExport) -> Result<String, CodecError> {
    serde_json::to_string_pretty(export).map_err(CodecError::Encode)
}

pub fn import_json(json: &str) -> Result<FormExport, CodecError> {
    let value: Value = serde_json::from_str(json).map_err(CodecError::Json)?;
    import_value(&value)
}

/// Checks decoded fields before they replace a document: every id and label
/// is non-blank and ids are unique.
pub fn validate_fields(fields: &[Field]) -> Result<(), CodecError> {
    let mut seen = HashSet::new();
    for (index, field) in fields.iter().enumerate() {
        if field.id.trim().is_empty() {
            return Err(CodecError::MissingFieldProperty { index, key: "id" });
        }
        if field.label.trim().is_empty() {
            return Err(CodecError::MissingFieldProperty { index, key: "label" });
        }
        if !seen.insert(field.id.as_str()) {
            return Err(CodecError::DuplicateId(field.id.clone()));
        }
    }
    Ok(())
}

/// Validates and decodes an import payload. Any violation rejects the whole import.
pub fn import_value(value: &Value) -> Result<FormExport, CodecError> {
    let object = value.as_object().ok_or(CodecError::NotAnObject)?;
    let raw_fields = object
        .get("fields")
        .ok_or(CodecError::MissingFields)?
        .as_array()
        .ok_or(CodecError::FieldsNotArray)?;

    let mut fields = Vec::with_capacity(raw_fields.len());
    for (index, raw) in raw_fields.iter().enumerate() {
        for key in ["id", "type", "label"] {
            let present = raw
                .get(key)
                .and_then(Value::as_str)
                .is_some_and(|text| !text.trim().is_empty());
            if !present {
                return Err(CodecError::MissingFieldProperty { index, key });
            }
        }
        let field: Field = serde_json::from_value(raw.clone())
            .map_err(|source| CodecError::MalformedField { index, source })?;
        fields.push(field);
    }
    validate_fields(&fields)?;

    let text = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let created_at = text("createdAt")
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|stamp| stamp.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Ok(FormExport {
        fields,
        version: text("version").unwrap_or_else(|| EXPORT_VERSION.to_string()),
        name: text("name"),
        description: text("description"),
        created_at,
    })
}
