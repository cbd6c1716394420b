use uuid::Uuid;

use crate::spec::field::{
    CodeConfig, DateConfig, Field, FieldType, FileConfig, GridConfig, RangeConfig,
};

/// Label given to a freshly dropped field.
pub fn default_label(kind: FieldType) -> &'static str {
    match kind {
        FieldType::Text => "Text Input",
        FieldType::Email => "Email Address",
        FieldType::Password => "Password",
        FieldType::Number => "Number",
        FieldType::Textarea => "Message",
        FieldType::Select => "Select Option",
        FieldType::Radio => "Choose One",
        FieldType::Checkbox => "Checkbox",
        FieldType::File => "Upload File",
        FieldType::Image => "Upload Image",
        FieldType::Date => "Date",
        FieldType::Time => "Time",
        FieldType::Datetime => "Date & Time",
        FieldType::Rating => "Rating",
        FieldType::Slider => "Slider",
        FieldType::Phone => "Phone Number",
        FieldType::Url => "Website URL",
        FieldType::Color => "Pick a Color",
        FieldType::Toggle => "Toggle",
        FieldType::Divider => "Section Divider",
        FieldType::MultiSelect => "Select Multiple",
        FieldType::Tags => "Tags",
        FieldType::Grid => "Grid",
        FieldType::Code => "Code",
        FieldType::Submit => "Submit",
        FieldType::Other => "New Field",
    }
}

/// Placeholder given to a freshly dropped field. Empty for kinds without a text input.
pub fn default_placeholder(kind: FieldType) -> &'static str {
    match kind {
        FieldType::Text => "Enter text...",
        FieldType::Email => "name@example.com",
        FieldType::Password => "Enter password...",
        FieldType::Number => "0",
        FieldType::Textarea => "Type your message...",
        FieldType::Select | FieldType::MultiSelect => "Select an option",
        FieldType::Phone => "+1 (555) 000-0000",
        FieldType::Url => "https://example.com",
        FieldType::Tags => "Add a tag...",
        FieldType::Code => "// Write code here",
        FieldType::Date => "YYYY-MM-DD",
        FieldType::Time => "HH:MM",
        FieldType::Datetime => "YYYY-MM-DDTHH:MM",
        FieldType::Other => "Enter value...",
        FieldType::Radio
        | FieldType::Checkbox
        | FieldType::File
        | FieldType::Image
        | FieldType::Rating
        | FieldType::Slider
        | FieldType::Color
        | FieldType::Toggle
        | FieldType::Divider
        | FieldType::Grid
        | FieldType::Submit => "",
    }
}

fn default_options() -> Vec<String> {
    vec!["Option 1".into(), "Option 2".into(), "Option 3".into()]
}

impl Field {
    /// New field with a fresh id and the defaults for `kind`.
    pub fn new(kind: FieldType) -> Self {
        let mut field = Field::with_id(Uuid::new_v4().to_string(), kind, default_label(kind));
        let placeholder = default_placeholder(kind);
        if !placeholder.is_empty() {
            field.placeholder = Some(placeholder.to_string());
        }
        if kind.has_options() {
            field.options = Some(default_options());
        }
        match kind {
            FieldType::File => {
                field.file_config = Some(FileConfig {
                    accept: Vec::new(),
                    max_size_mb: Some(10.0),
                    multiple: false,
                });
            }
            FieldType::Image => {
                field.file_config = Some(FileConfig {
                    accept: vec!["image/*".into()],
                    max_size_mb: Some(5.0),
                    multiple: false,
                });
            }
            FieldType::Date | FieldType::Datetime => {
                field.date_config = Some(DateConfig::default());
            }
            FieldType::Rating => {
                field.rating_config = Some(RangeConfig {
                    min: 1.0,
                    max: 5.0,
                    step: 1.0,
                });
            }
            FieldType::Slider => {
                field.slider_config = Some(RangeConfig {
                    min: 0.0,
                    max: 100.0,
                    step: 1.0,
                });
            }
            FieldType::Grid => {
                field.grid_config = Some(GridConfig {
                    columns: vec!["Column 1".into(), "Column 2".into()],
                    rows: vec!["Row 1".into(), "Row 2".into()],
                });
            }
            FieldType::Code => {
                field.code_config = Some(CodeConfig {
                    language: "javascript".into(),
                    line_numbers: true,
                });
            }
            _ => {}
        }
        field
    }

    /// Same as [`Field::new`] with the label replaced.
    pub fn labelled(kind: FieldType, label: impl Into<String>) -> Self {
        let mut field = Field::new(kind);
        field.label = label.into();
        field
    }
}
