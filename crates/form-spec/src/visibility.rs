use crate::condition::{FormValues, should_show_field};
use crate::spec::field::Field;

pub type VisibilityMap = std::collections::BTreeMap<String, bool>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityMode {
    /// Editing canvas: every field stays visible so hidden ones remain editable.
    Builder,
    /// Runtime preview: conditional rules apply.
    Preview,
}

impl VisibilityMode {
    pub fn from_preview(preview: bool) -> Self {
        if preview {
            VisibilityMode::Preview
        } else {
            VisibilityMode::Builder
        }
    }
}

pub fn is_visible(field: &Field, values: &FormValues, mode: VisibilityMode) -> bool {
    match mode {
        VisibilityMode::Builder => true,
        VisibilityMode::Preview => should_show_field(field, values),
    }
}

pub fn resolve_visibility(
    fields: &[Field],
    values: &FormValues,
    mode: VisibilityMode,
) -> VisibilityMap {
    fields
        .iter()
        .map(|field| (field.id.clone(), is_visible(field, values, mode)))
        .collect()
}
