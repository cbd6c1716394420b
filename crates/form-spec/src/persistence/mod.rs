//! Session persistence: a bounded set of saved form snapshots kept in one
//! slot of a [`KeyValueStore`].
//!
//! Storage failures never reach the in-memory document. Reads fall back to an
//! empty session; writes report the error and leave the document dirty.

mod storage;

pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, StorageError};

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::codec::CodecError;
use crate::config::EngineConfig;
use crate::spec::form::FormExport;
use crate::store::{DocumentState, FormStore};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to encode session record: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("saved form is invalid: {0}")]
    InvalidForm(#[from] CodecError),
}

/// Millisecond wall clock used to stamp saves.
pub trait Clock {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedForm {
    pub id: String,
    pub form_data: FormExport,
    pub timestamp: i64,
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub is_auto_save: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(default)]
    pub current_form_id: Option<String>,
    #[serde(default)]
    pub forms: BTreeMap<String, SavedForm>,
}

/// Keeps the `max` newest forms by timestamp.
pub fn limit_forms_to_max(
    forms: BTreeMap<String, SavedForm>,
    max: usize,
) -> BTreeMap<String, SavedForm> {
    if forms.len() <= max {
        return forms;
    }
    let mut ordered: Vec<SavedForm> = forms.into_values().collect();
    ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    let evicted = ordered.len() - max;
    ordered
        .into_iter()
        .skip(evicted)
        .map(|form| (form.id.clone(), form))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    Loading,
    Clean,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AutosaveOutcome {
    Saved(SavedForm),
    Skipped(SkipReason),
}

pub struct SessionPersistence<S: KeyValueStore> {
    storage: S,
    storage_key: String,
    max_saved_forms: usize,
    export_version: String,
    autosave_enabled: bool,
    clock: Box<dyn Clock>,
}

impl<S: KeyValueStore> SessionPersistence<S> {
    pub fn new(storage: S, config: &EngineConfig) -> Self {
        Self {
            storage,
            storage_key: config.storage_key.clone(),
            max_saved_forms: config.max_saved_forms.max(1),
            export_version: config.export_version.clone(),
            autosave_enabled: config.autosave_enabled,
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn autosave_enabled(&self) -> bool {
        self.autosave_enabled
    }

    pub fn set_autosave_enabled(&mut self, enabled: bool) {
        self.autosave_enabled = enabled;
    }

    /// Reads the session record. Unreadable or corrupted data reads as empty.
    pub fn session(&self) -> SessionRecord {
        let raw = match self.storage.get(&self.storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return SessionRecord::default(),
            Err(err) => {
                warn!(error = %err, "session storage unreadable; starting empty");
                return SessionRecord::default();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!(error = %err, "session record corrupted; starting empty");
            SessionRecord::default()
        })
    }

    pub fn current_form_id(&self) -> Option<String> {
        self.session().current_form_id
    }

    /// Saved forms, newest first.
    pub fn saved_forms(&self) -> Vec<SavedForm> {
        let mut forms: Vec<SavedForm> = self.session().forms.into_values().collect();
        forms.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        forms
    }

    pub fn session_forms(&self) -> BTreeMap<String, SavedForm> {
        self.session().forms
    }

    pub fn saved_form(&self, id: &str) -> Option<SavedForm> {
        self.session().forms.remove(id)
    }

    fn write_session(&mut self, session: &SessionRecord) -> Result<(), PersistenceError> {
        let encoded = serde_json::to_string(session).map_err(PersistenceError::Encode)?;
        self.storage.set(&self.storage_key, &encoded)?;
        Ok(())
    }

    /// Writes a snapshot of `state` without touching the document.
    ///
    /// Without a name this overwrites the current form's entry (minting one on
    /// first save). With a name it always creates a new entry, which becomes
    /// the current form.
    pub fn write_snapshot(
        &mut self,
        state: &DocumentState,
        name: Option<&str>,
    ) -> Result<SavedForm, PersistenceError> {
        let mut session = self.session();
        // Stamps are strictly increasing within a session.
        let newest = session.forms.values().map(|form| form.timestamp).max();
        let timestamp = match newest {
            Some(newest) => self.clock.now_millis().max(newest.saturating_add(1)),
            None => self.clock.now_millis(),
        };
        let form_data = state.to_export(&self.export_version);

        let saved = match name {
            Some(name) => SavedForm {
                id: Uuid::new_v4().to_string(),
                form_data,
                timestamp,
                version: self.export_version.clone(),
                name: name.to_string(),
                is_auto_save: false,
            },
            None => {
                let id = session
                    .current_form_id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                let existing = session.forms.get(&id);
                SavedForm {
                    name: existing
                        .map(|form| form.name.clone())
                        .unwrap_or_else(|| state.title().to_string()),
                    is_auto_save: existing.is_none_or(|form| form.is_auto_save),
                    id,
                    form_data,
                    timestamp,
                    version: self.export_version.clone(),
                }
            }
        };

        session.current_form_id = Some(saved.id.clone());
        session.forms.insert(saved.id.clone(), saved.clone());
        session.forms = limit_forms_to_max(session.forms, self.max_saved_forms);
        self.write_session(&session)?;
        info!(form_id = %saved.id, auto = saved.is_auto_save, "form saved");
        Ok(saved)
    }

    /// Saves the document and marks it clean. On failure it stays dirty.
    pub fn save_form(
        &mut self,
        store: &mut FormStore,
        name: Option<&str>,
    ) -> Result<SavedForm, PersistenceError> {
        match self.write_snapshot(store.state(), name) {
            Ok(saved) => {
                store.mark_saved(saved.timestamp);
                Ok(saved)
            }
            Err(err) => {
                error!(error = %err, "saving form failed");
                Err(err)
            }
        }
    }

    pub fn autosave_blocker(&self, state: &DocumentState) -> Option<SkipReason> {
        if !self.autosave_enabled {
            Some(SkipReason::Disabled)
        } else if state.is_loading() {
            Some(SkipReason::Loading)
        } else if !state.is_dirty() {
            Some(SkipReason::Clean)
        } else {
            None
        }
    }

    /// Silent snapshot of `state` when autosave is allowed. Does not mark the store clean.
    pub fn autosave_state(
        &mut self,
        state: &DocumentState,
    ) -> Result<AutosaveOutcome, PersistenceError> {
        if let Some(reason) = self.autosave_blocker(state) {
            return Ok(AutosaveOutcome::Skipped(reason));
        }
        self.write_snapshot(state, None).map(AutosaveOutcome::Saved)
    }

    pub fn autosave(&mut self, store: &mut FormStore) -> Result<AutosaveOutcome, PersistenceError> {
        if let Some(reason) = self.autosave_blocker(store.state()) {
            return Ok(AutosaveOutcome::Skipped(reason));
        }
        self.save_form(store, None).map(AutosaveOutcome::Saved)
    }

    /// Loads a saved form into `store` and makes it current. Unknown ids are
    /// ignored; a snapshot with invalid fields is rejected and nothing changes.
    pub fn load_saved_form(
        &mut self,
        id: &str,
        store: &mut FormStore,
    ) -> Result<bool, PersistenceError> {
        let mut session = self.session();
        let Some(saved) = session.forms.get(id).cloned() else {
            warn!(form_id = id, "saved form not found");
            return Ok(false);
        };
        store.load_saved_form(&saved)?;
        session.current_form_id = Some(saved.id);
        self.write_session(&session)?;
        Ok(true)
    }

    /// Reloads the current form, if any, e.g. after a restart.
    pub fn restore_current(&mut self, store: &mut FormStore) -> Result<bool, PersistenceError> {
        match self.current_form_id() {
            Some(id) => self.load_saved_form(&id, store),
            None => Ok(false),
        }
    }

    /// Deletes a saved form. Deleting the current form detaches the document
    /// from storage and marks it dirty; its fields stay as they are.
    pub fn delete_saved_form(
        &mut self,
        id: &str,
        store: &mut FormStore,
    ) -> Result<bool, PersistenceError> {
        let mut session = self.session();
        if session.forms.remove(id).is_none() {
            return Ok(false);
        }
        let was_current = session.current_form_id.as_deref() == Some(id);
        if was_current {
            session.current_form_id = None;
        }
        self.write_session(&session)?;
        if was_current {
            store.mark_dirty();
        }
        info!(form_id = id, "saved form deleted");
        Ok(true)
    }

    /// Starts a fresh form: the session keeps its saves but has no current form.
    pub fn detach_current(&mut self) -> Result<(), PersistenceError> {
        let mut session = self.session();
        if session.current_form_id.take().is_some() {
            self.write_session(&session)?;
        }
        Ok(())
    }

    pub fn clear_session(&mut self) -> Result<(), PersistenceError> {
        self.storage.remove(&self.storage_key)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::field::{Field, FieldType};
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Clone)]
    struct StepClock(Rc<Cell<i64>>);

    impl Clock for StepClock {
        fn now_millis(&self) -> i64 {
            let now = self.0.get();
            self.0.set(now + 1_000);
            now
        }
    }

    fn persistence() -> SessionPersistence<MemoryStore> {
        SessionPersistence::new(MemoryStore::new(), &EngineConfig::default())
            .with_clock(StepClock(Rc::new(Cell::new(1_000))))
    }

    fn saved(id: &str, timestamp: i64) -> SavedForm {
        SavedForm {
            id: id.into(),
            form_data: FormExport {
                fields: Vec::new(),
                version: "1.0".into(),
                name: None,
                description: None,
                created_at: Utc::now(),
            },
            timestamp,
            version: "1.0".into(),
            name: id.into(),
            is_auto_save: true,
        }
    }

    #[test]
    fn eviction_keeps_newest_forms() {
        let forms: BTreeMap<_, _> = (0..15)
            .map(|n| (format!("f{n:02}"), saved(&format!("f{n:02}"), n * 10)))
            .collect();
        let kept = limit_forms_to_max(forms, 10);
        assert_eq!(kept.len(), 10);
        let expected: Vec<String> = (5..15).map(|n| format!("f{n:02}")).collect();
        assert_eq!(kept.keys().cloned().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn eviction_ignores_small_sets() {
        let forms = BTreeMap::from([("a".to_string(), saved("a", 1))]);
        assert_eq!(limit_forms_to_max(forms.clone(), 10), forms);
    }

    #[test]
    fn first_autosave_mints_current_form() {
        let mut persistence = persistence();
        let mut store = FormStore::default();
        store.add_field(Field::with_id("a", FieldType::Text, "A"));

        let saved = match persistence.autosave(&mut store).expect("autosave") {
            AutosaveOutcome::Saved(saved) => saved,
            other => panic!("expected a save, got {other:?}"),
        };
        assert!(saved.is_auto_save);
        assert_eq!(persistence.current_form_id(), Some(saved.id.clone()));
        assert!(!store.is_dirty());
        assert_eq!(store.last_saved_at(), Some(saved.timestamp));
    }

    #[test]
    fn autosave_overwrites_current_entry() {
        let mut persistence = persistence();
        let mut store = FormStore::default();
        store.add_field(Field::with_id("a", FieldType::Text, "A"));
        let first = persistence.save_form(&mut store, None).unwrap();
        store.add_field(Field::with_id("b", FieldType::Text, "B"));
        let second = persistence.save_form(&mut store, None).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(persistence.saved_forms().len(), 1);
        assert_eq!(persistence.saved_forms()[0].form_data.fields.len(), 2);
    }

    #[test]
    fn named_save_creates_new_entry() {
        let mut persistence = persistence();
        let mut store = FormStore::default();
        let auto = persistence.save_form(&mut store, None).unwrap();
        let named = persistence.save_form(&mut store, Some("Draft")).unwrap();
        let again = persistence.save_form(&mut store, Some("Draft")).unwrap();

        assert_ne!(auto.id, named.id);
        assert_ne!(named.id, again.id);
        assert!(!named.is_auto_save);
        assert_eq!(persistence.saved_forms().len(), 3);
        assert_eq!(persistence.current_form_id(), Some(again.id.clone()));

        // Autosave now updates the named entry and keeps its name.
        let follow_up = persistence.save_form(&mut store, None).unwrap();
        assert_eq!(follow_up.id, again.id);
        assert_eq!(follow_up.name, "Draft");
        assert!(!follow_up.is_auto_save);
    }

    #[test]
    fn saves_are_capped() {
        let mut persistence = persistence();
        let mut store = FormStore::default();
        for n in 0..12 {
            persistence
                .save_form(&mut store, Some(&format!("save {n}")))
                .unwrap();
        }
        let names: Vec<String> = persistence
            .saved_forms()
            .into_iter()
            .map(|form| form.name)
            .collect();
        assert_eq!(names.len(), 10);
        assert_eq!(names.first().map(String::as_str), Some("save 11"));
        assert_eq!(names.last().map(String::as_str), Some("save 2"));
    }

    #[test]
    fn autosave_respects_toggle_and_dirty_flag() {
        let mut persistence = persistence();
        let mut store = FormStore::default();
        assert_eq!(
            persistence.autosave(&mut store).unwrap(),
            AutosaveOutcome::Skipped(SkipReason::Clean)
        );

        store.add_field(Field::with_id("a", FieldType::Text, "A"));
        persistence.set_autosave_enabled(false);
        assert_eq!(
            persistence.autosave(&mut store).unwrap(),
            AutosaveOutcome::Skipped(SkipReason::Disabled)
        );
        assert!(persistence.storage().is_empty());

        // Manual saves still work with autosave off.
        persistence.save_form(&mut store, Some("Manual")).unwrap();
        assert_eq!(persistence.saved_forms().len(), 1);
    }

    #[test]
    fn write_failure_keeps_document_dirty() {
        let mut persistence =
            SessionPersistence::new(MemoryStore::with_quota(16), &EngineConfig::default());
        let mut store = FormStore::default();
        store.add_field(Field::with_id("a", FieldType::Text, "A"));

        let result = persistence.save_form(&mut store, None);
        assert!(matches!(
            result,
            Err(PersistenceError::Storage(StorageError::QuotaExceeded(_)))
        ));
        assert!(store.is_dirty());
        assert_eq!(store.fields().len(), 1);
    }

    #[test]
    fn corrupted_session_reads_as_empty() {
        let mut storage = MemoryStore::new();
        storage.set("formBuilderSession", "{not json").unwrap();
        let persistence = SessionPersistence::new(storage, &EngineConfig::default());
        assert_eq!(persistence.session(), SessionRecord::default());
        assert!(persistence.saved_forms().is_empty());
    }

    #[test]
    fn load_saved_form_restores_document_clean() {
        let mut persistence = persistence();
        let mut store = FormStore::default();
        store.set_form_title("Survey");
        store.add_field(Field::with_id("a", FieldType::Text, "A"));
        let saved = persistence.save_form(&mut store, Some("Survey v1")).unwrap();

        let mut fresh = FormStore::default();
        assert!(persistence.load_saved_form(&saved.id, &mut fresh).unwrap());
        assert_eq!(fresh.title(), "Survey");
        assert_eq!(fresh.fields().len(), 1);
        assert!(!fresh.is_dirty());
        assert!(fresh.can_undo());
        assert_eq!(fresh.last_saved_at(), Some(saved.timestamp));

        assert!(!persistence.load_saved_form("missing", &mut fresh).unwrap());
    }

    #[test]
    fn deleting_current_form_detaches_document() {
        let mut persistence = persistence();
        let mut store = FormStore::default();
        store.add_field(Field::with_id("a", FieldType::Text, "A"));
        let other = persistence.save_form(&mut store, Some("Other")).unwrap();
        let current = persistence.save_form(&mut store, Some("Current")).unwrap();

        assert!(persistence.delete_saved_form(&other.id, &mut store).unwrap());
        assert!(!store.is_dirty());
        assert_eq!(persistence.current_form_id(), Some(current.id.clone()));

        assert!(persistence.delete_saved_form(&current.id, &mut store).unwrap());
        assert!(store.is_dirty());
        assert_eq!(store.fields().len(), 1);
        assert_eq!(persistence.current_form_id(), None);
        assert!(!persistence.delete_saved_form("missing", &mut store).unwrap());
    }

    fn seed_session(persistence: &mut SessionPersistence<MemoryStore>, forms: Vec<SavedForm>) {
        let record = SessionRecord {
            current_form_id: None,
            forms: forms.into_iter().map(|form| (form.id.clone(), form)).collect(),
        };
        persistence.write_session(&record).expect("seed session");
    }

    #[test]
    fn session_forms_are_keyed_by_id() {
        let mut persistence = persistence();
        let mut store = FormStore::default();
        let first = persistence.save_form(&mut store, Some("One")).unwrap();
        let second = persistence.save_form(&mut store, Some("Two")).unwrap();

        let forms = persistence.session_forms();
        assert_eq!(forms.len(), 2);
        assert_eq!(forms.get(&first.id).map(|form| form.name.as_str()), Some("One"));
        assert_eq!(
            forms.get(&second.id).map(|form| form.timestamp),
            Some(second.timestamp)
        );
    }

    #[test]
    fn clear_session_drops_every_save() {
        let mut persistence = persistence();
        let mut store = FormStore::default();
        store.add_field(Field::with_id("a", FieldType::Text, "A"));
        persistence.save_form(&mut store, Some("Kept")).unwrap();
        assert!(!persistence.storage().is_empty());

        persistence.clear_session().expect("clear");
        assert!(persistence.storage().is_empty());
        assert!(persistence.session_forms().is_empty());
        assert_eq!(persistence.current_form_id(), None);
        assert_eq!(store.fields().len(), 1);

        // Clearing an empty session is fine.
        persistence.clear_session().expect("clear again");
    }

    #[test]
    fn saved_form_with_repeated_ids_is_not_loaded() {
        let mut persistence = persistence();
        let mut broken = saved("broken", 10);
        broken.form_data.fields = vec![
            Field::with_id("x", FieldType::Text, "X"),
            Field::with_id("x", FieldType::Email, "Y"),
        ];
        seed_session(&mut persistence, vec![broken]);

        let mut store = FormStore::default();
        store.add_field(Field::with_id("keep", FieldType::Text, "Keep"));
        let result = persistence.load_saved_form("broken", &mut store);
        assert!(matches!(
            result,
            Err(PersistenceError::InvalidForm(CodecError::DuplicateId(id))) if id == "x"
        ));
        assert_eq!(store.fields().len(), 1);
        assert_eq!(store.fields()[0].id, "keep");
        assert_eq!(store.history().len(), 1);
        assert_eq!(persistence.current_form_id(), None);
    }

    #[test]
    fn save_after_maximal_timestamp_does_not_overflow() {
        let mut persistence = persistence();
        seed_session(&mut persistence, vec![saved("future", i64::MAX)]);

        let mut store = FormStore::default();
        let next = persistence.save_form(&mut store, Some("Next")).unwrap();
        assert_eq!(next.timestamp, i64::MAX);
        assert_eq!(persistence.saved_forms().len(), 2);
    }
}
