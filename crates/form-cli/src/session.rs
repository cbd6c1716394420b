use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use form_spec::{
    AutosaveOutcome, CodecError, EngineConfig, FormExport, FormStore, JsonFileStore,
    KeyValueStore, SessionPersistence, SkipReason,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DATA_DIR_ENV: &str = "FORM_BUILDER_DATA_DIR";
const DEFAULT_DATA_DIR: &str = ".form-builder";
const CONFIG_FILE: &str = "config.json";
const DRAFT_KEY: &str = "draft";

type SessionResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Working document carried between invocations.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Draft {
    form: FormExport,
    dirty: bool,
    #[serde(default)]
    last_saved_at: Option<i64>,
}

pub fn resolve_data_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| env::var_os(DATA_DIR_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

pub fn load_config(dir: &Path) -> SessionResult<EngineConfig> {
    let path = dir.join(CONFIG_FILE);
    match fs::read_to_string(&path) {
        Ok(contents) => Ok(EngineConfig::from_json(&contents)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(EngineConfig::default()),
        Err(err) => Err(format!("failed to read {}: {err}", path.display()).into()),
    }
}

pub fn write_config(dir: &Path, config: &EngineConfig) -> SessionResult<()> {
    fs::create_dir_all(dir)?;
    let path = dir.join(CONFIG_FILE);
    fs::write(&path, serde_json::to_string_pretty(config)?)?;
    Ok(())
}

/// The document store wired to a directory-backed session.
pub struct Session {
    dir: PathBuf,
    config: EngineConfig,
    pub persistence: SessionPersistence<JsonFileStore>,
    pub store: FormStore,
}

impl Session {
    pub fn open(dir: PathBuf) -> SessionResult<Self> {
        let config = load_config(&dir)?;
        let mut persistence = SessionPersistence::new(JsonFileStore::new(&dir), &config);
        let mut store = FormStore::new(&config);

        match read_draft(persistence.storage())? {
            Some(draft) => {
                debug!(dirty = draft.dirty, "restoring working draft");
                restore_draft(&mut store, draft)?;
            }
            None => {
                if persistence.restore_current(&mut store)? {
                    debug!("restored current saved form");
                }
            }
        }

        Ok(Self {
            dir,
            config,
            persistence,
            store,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_autosave(&mut self, enabled: bool) -> SessionResult<()> {
        self.config.autosave_enabled = enabled;
        self.persistence.set_autosave_enabled(enabled);
        write_config(&self.dir, &self.config)
    }

    /// Drops the document and detaches the session from its current form.
    pub fn start_new(&mut self) -> SessionResult<()> {
        self.store.close_form();
        self.persistence.detach_current()?;
        self.persistence.storage_mut().remove(DRAFT_KEY)?;
        Ok(())
    }

    /// Autosaves if allowed, then writes the draft for the next invocation.
    pub fn finish(mut self) -> SessionResult<Option<AutosaveOutcome>> {
        let outcome = match self.persistence.autosave(&mut self.store)? {
            AutosaveOutcome::Skipped(SkipReason::Clean) => None,
            outcome => Some(outcome),
        };
        if let Some(AutosaveOutcome::Saved(saved)) = &outcome {
            info!(form_id = %saved.id, "autosaved");
        }

        let state = self.store.state();
        if state.is_dirty() || state.last_saved_at().is_some() {
            let draft = Draft {
                form: self.store.export_form(),
                dirty: state.is_dirty(),
                last_saved_at: state.last_saved_at(),
            };
            let encoded = serde_json::to_string(&draft)?;
            self.persistence.storage_mut().set(DRAFT_KEY, &encoded)?;
        } else {
            self.persistence.storage_mut().remove(DRAFT_KEY)?;
        }
        Ok(outcome)
    }
}

// The save stamp survives unsaved edits made after it.
fn restore_draft(store: &mut FormStore, draft: Draft) -> Result<(), CodecError> {
    store.import_form(draft.form)?;
    store.reset_history();
    if let Some(timestamp) = draft.last_saved_at {
        store.mark_saved(timestamp);
    }
    if draft.dirty {
        store.mark_dirty();
    }
    Ok(())
}

fn read_draft(storage: &JsonFileStore) -> SessionResult<Option<Draft>> {
    match storage.get(DRAFT_KEY)? {
        Some(raw) => match serde_json::from_str(&raw) {
            Ok(draft) => Ok(Some(draft)),
            Err(err) => {
                tracing::warn!(error = %err, "draft unreadable; ignoring it");
                Ok(None)
            }
        },
        None => Ok(None),
    }
}
