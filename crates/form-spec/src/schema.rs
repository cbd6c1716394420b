use schemars::schema_for;
use serde_json::Value;

use crate::spec::form::{FormExport, FormTemplate};

/// JSON Schema for the import/export file format.
pub fn export_schema() -> Value {
    serde_json::to_value(schema_for!(FormExport)).unwrap_or(Value::Null)
}

/// JSON Schema for template files under `templates/`.
pub fn template_schema() -> Value {
    serde_json::to_value(schema_for!(FormTemplate)).unwrap_or(Value::Null)
}
