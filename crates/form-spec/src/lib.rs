#![allow(missing_docs)]

pub mod autosave;
pub mod codec;
pub mod condition;
pub mod config;
pub mod history;
pub mod persistence;
pub mod schema;
pub mod spec;
pub mod store;
pub mod templates;
pub mod validate;
pub mod visibility;

pub use autosave::AutosaveScheduler;
pub use codec::{CodecError, export_json, import_json, validate_fields};
pub use condition::{Condition, ConditionOperator, FormValues, evaluate, should_show_field};
pub use config::{ConfigError, EngineConfig};
pub use history::{Command, CommandHistory, CommandKind, HistoryEntry, UpdateCommand};
pub use persistence::{
    AutosaveOutcome, Clock, JsonFileStore, KeyValueStore, MemoryStore, PersistenceError,
    SavedForm, SessionPersistence, SessionRecord, SkipReason, StorageError, SystemClock,
    limit_forms_to_max,
};
pub use schema::{export_schema, template_schema};
pub use spec::{
    Field, FieldType, FieldUpdate, FormExport, FormTemplate, default_label, default_placeholder,
};
pub use store::{DocumentState, FormStore, SubscriptionId, pin_submit_last};
pub use templates::{TemplateError, builtin_templates, find_template, template_ids};
pub use validate::{ValidationError, ValidationResult, validate_values};
pub use visibility::{VisibilityMap, VisibilityMode, resolve_visibility};
