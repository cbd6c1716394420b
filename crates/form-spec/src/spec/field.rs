use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::condition::Condition;

/// Supported field kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    Text,
    Email,
    Password,
    Number,
    Textarea,
    Select,
    Radio,
    Checkbox,
    File,
    Image,
    Date,
    Time,
    Datetime,
    Rating,
    Slider,
    Phone,
    Url,
    Color,
    Toggle,
    Divider,
    MultiSelect,
    Tags,
    Grid,
    Code,
    Submit,
    /// Any kind this build does not know about.
    #[serde(other)]
    Other,
}

impl FieldType {
    pub const ALL: [FieldType; 26] = [
        FieldType::Text,
        FieldType::Email,
        FieldType::Password,
        FieldType::Number,
        FieldType::Textarea,
        FieldType::Select,
        FieldType::Radio,
        FieldType::Checkbox,
        FieldType::File,
        FieldType::Image,
        FieldType::Date,
        FieldType::Time,
        FieldType::Datetime,
        FieldType::Rating,
        FieldType::Slider,
        FieldType::Phone,
        FieldType::Url,
        FieldType::Color,
        FieldType::Toggle,
        FieldType::Divider,
        FieldType::MultiSelect,
        FieldType::Tags,
        FieldType::Grid,
        FieldType::Code,
        FieldType::Submit,
        FieldType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Email => "email",
            FieldType::Password => "password",
            FieldType::Number => "number",
            FieldType::Textarea => "textarea",
            FieldType::Select => "select",
            FieldType::Radio => "radio",
            FieldType::Checkbox => "checkbox",
            FieldType::File => "file",
            FieldType::Image => "image",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::Datetime => "datetime",
            FieldType::Rating => "rating",
            FieldType::Slider => "slider",
            FieldType::Phone => "phone",
            FieldType::Url => "url",
            FieldType::Color => "color",
            FieldType::Toggle => "toggle",
            FieldType::Divider => "divider",
            FieldType::MultiSelect => "multi-select",
            FieldType::Tags => "tags",
            FieldType::Grid => "grid",
            FieldType::Code => "code",
            FieldType::Submit => "submit",
            FieldType::Other => "other",
        }
    }

    pub fn is_submit(&self) -> bool {
        matches!(self, FieldType::Submit)
    }

    /// Kinds whose choices live in `Field::options`.
    pub fn has_options(&self) -> bool {
        matches!(
            self,
            FieldType::Select | FieldType::Radio | FieldType::MultiSelect
        )
    }

    /// Kinds that never collect a value.
    pub fn is_layout(&self) -> bool {
        matches!(self, FieldType::Divider | FieldType::Submit)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FieldType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase().replace('_', "-");
        FieldType::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .or(match normalized.as_str() {
                "multiselect" => Some(FieldType::MultiSelect),
                "tel" => Some(FieldType::Phone),
                _ => None,
            })
            .ok_or_else(|| format!("unknown field type '{}'", value))
    }
}

/// Input constraints checked against preview values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accept: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size_mb: Option<f64>,
    #[serde(default)]
    pub multiple: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RangeConfig {
    pub min: f64,
    pub max: f64,
    #[serde(default = "default_step")]
    pub step: f64,
}

fn default_step() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GridConfig {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CodeConfig {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub line_numbers: bool,
}

/// CSS-like presentation hints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LayoutConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_class: Option<String>,
}

/// Show/hide rules evaluated in preview mode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_if: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_if: Option<Condition>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedConfig {
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
}

/// One element of a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRules>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_config: Option<FileConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_config: Option<DateConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_config: Option<RangeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slider_config: Option<RangeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_config: Option<GridConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_config: Option<CodeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional: Option<ConditionalRules>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advanced: Option<AdvancedConfig>,
}

impl Field {
    /// Bare field with the given id; no type defaults applied.
    pub fn with_id(id: impl Into<String>, kind: FieldType, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            placeholder: None,
            required: false,
            options: None,
            validation: None,
            file_config: None,
            date_config: None,
            rating_config: None,
            slider_config: None,
            grid_config: None,
            code_config: None,
            layout: None,
            conditional: None,
            advanced: None,
        }
    }

    pub fn is_submit(&self) -> bool {
        self.kind.is_submit()
    }

    /// Shallow merge: every key present in `update` replaces the current value.
    pub fn apply(&mut self, update: &FieldUpdate) {
        if let Some(label) = &update.label {
            self.label = label.clone();
        }
        if let Some(placeholder) = &update.placeholder {
            self.placeholder = placeholder.clone();
        }
        if let Some(required) = update.required {
            self.required = required;
        }
        merge(&mut self.options, &update.options);
        merge(&mut self.validation, &update.validation);
        merge(&mut self.file_config, &update.file_config);
        merge(&mut self.date_config, &update.date_config);
        merge(&mut self.rating_config, &update.rating_config);
        merge(&mut self.slider_config, &update.slider_config);
        merge(&mut self.grid_config, &update.grid_config);
        merge(&mut self.code_config, &update.code_config);
        merge(&mut self.layout, &update.layout);
        merge(&mut self.conditional, &update.conditional);
        merge(&mut self.advanced, &update.advanced);
    }
}

fn merge<T: Clone>(target: &mut Option<T>, update: &Option<Option<T>>) {
    if let Some(value) = update {
        *target = value.clone();
    }
}

/// Partial update for [`Field`]. `id` and `type` cannot be changed.
///
/// Outer `None` leaves a key untouched; for optional keys `Some(None)` clears
/// it, which is how JSON `null` deserializes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub placeholder: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub options: Option<Option<Vec<String>>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub validation: Option<Option<ValidationRules>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_config: Option<Option<FileConfig>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_config: Option<Option<DateConfig>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub rating_config: Option<Option<RangeConfig>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub slider_config: Option<Option<RangeConfig>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub grid_config: Option<Option<GridConfig>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub code_config: Option<Option<CodeConfig>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub layout: Option<Option<LayoutConfig>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub conditional: Option<Option<ConditionalRules>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub advanced: Option<Option<AdvancedConfig>>,
}

impl FieldUpdate {
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
