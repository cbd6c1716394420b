use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_STORAGE_KEY: &str = "formBuilderSession";
pub const DEFAULT_MAX_SAVED_FORMS: usize = 10;
pub const DEFAULT_TITLE: &str = "Untitled Form";
pub const EXPORT_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse engine config: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("max_saved_forms must be at least 1")]
    ZeroSavedForms,
}

/// Tunables shared by the store and the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub storage_key: String,
    pub max_saved_forms: usize,
    pub autosave_enabled: bool,
    pub autosave_interval_ms: u64,
    pub default_title: String,
    pub export_version: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.into(),
            max_saved_forms: DEFAULT_MAX_SAVED_FORMS,
            autosave_enabled: true,
            autosave_interval_ms: 30_000,
            default_title: DEFAULT_TITLE.into(),
            export_version: EXPORT_VERSION.into(),
        }
    }
}

impl EngineConfig {
    /// Parses a JSON config; blank input yields the defaults.
    pub fn from_json(config_json: &str) -> Result<Self, ConfigError> {
        let config = if config_json.trim().is_empty() {
            EngineConfig::default()
        } else {
            serde_json::from_str(config_json).map_err(ConfigError::Parse)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_saved_forms == 0 {
            return Err(ConfigError::ZeroSavedForms);
        }
        Ok(())
    }
}
