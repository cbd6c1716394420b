pub mod defaults;
pub mod field;
pub mod form;

pub use defaults::{default_label, default_placeholder};
pub use field::{
    AdvancedConfig, CodeConfig, ConditionalRules, DateConfig, Field, FieldType, FieldUpdate,
    FileConfig, GridConfig, LayoutConfig, RangeConfig, ValidationRules,
};
pub use form::{FormExport, FormTemplate};
