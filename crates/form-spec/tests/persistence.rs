use std::cell::{Cell, RefCell};
use std::rc::Rc;

use form_spec::{
    AutosaveOutcome, Clock, EngineConfig, Field, FieldType, FormStore, JsonFileStore,
    KeyValueStore, MemoryStore, SessionPersistence, SkipReason, StorageError, find_template,
};
use tempfile::TempDir;

#[derive(Clone)]
struct FixedStepClock(Rc<Cell<i64>>);

impl FixedStepClock {
    fn starting_at(start: i64) -> Self {
        Self(Rc::new(Cell::new(start)))
    }
}

impl Clock for FixedStepClock {
    fn now_millis(&self) -> i64 {
        let now = self.0.get();
        self.0.set(now + 500);
        now
    }
}

fn memory_session() -> SessionPersistence<MemoryStore> {
    SessionPersistence::new(MemoryStore::new(), &EngineConfig::default())
        .with_clock(FixedStepClock::starting_at(1_700_000_000_000))
}

fn store_with(label: &str) -> FormStore {
    let mut store = FormStore::default();
    store.add_field(Field::labelled(FieldType::Text, label));
    store
}

#[test]
fn eviction_keeps_the_ten_newest_forms() {
    let mut persistence = memory_session();
    let mut names = Vec::new();
    for index in 0..15 {
        let mut store = store_with(&format!("field {index}"));
        let name = format!("form {index}");
        persistence
            .save_form(&mut store, Some(&name))
            .expect("named save");
        names.push(name);
    }

    let forms = persistence.saved_forms();
    assert_eq!(forms.len(), 10);
    let kept: Vec<&str> = forms.iter().map(|form| form.name.as_str()).collect();
    let expected: Vec<&str> = names[5..].iter().rev().map(String::as_str).collect();
    assert_eq!(kept, expected);
}

#[test]
fn eviction_never_drops_the_form_just_saved() {
    // Frozen clock: every save reports the same wall time.
    struct Frozen;
    impl Clock for Frozen {
        fn now_millis(&self) -> i64 {
            42
        }
    }
    let mut persistence =
        SessionPersistence::new(MemoryStore::new(), &EngineConfig::default()).with_clock(Frozen);

    let mut last = None;
    for index in 0..12 {
        let mut store = store_with("x");
        last = Some(
            persistence
                .save_form(&mut store, Some(&format!("n{index}")))
                .expect("save"),
        );
    }
    let last = last.expect("saved");
    assert!(persistence.saved_form(&last.id).is_some());
    assert_eq!(persistence.current_form_id(), Some(last.id));
}

#[test]
fn autosave_is_suppressed_while_a_template_loads() {
    let persistence = Rc::new(RefCell::new(memory_session()));
    let outcomes = Rc::new(RefCell::new(Vec::new()));

    let mut store = FormStore::default();
    {
        let persistence = Rc::clone(&persistence);
        let outcomes = Rc::clone(&outcomes);
        store.subscribe(move |state| {
            let outcome = persistence
                .borrow_mut()
                .autosave_state(state)
                .expect("autosave");
            outcomes.borrow_mut().push(outcome);
        });
    }

    let template = find_template("feedback").expect("feedback template");
    store.load_template(&template).expect("load template");

    let recorded = outcomes.borrow();
    assert_eq!(
        recorded.as_slice(),
        &[AutosaveOutcome::Skipped(SkipReason::Loading)]
    );
    assert!(persistence.borrow().saved_forms().is_empty());
    assert!(!store.is_loading());
    assert!(store.is_dirty());
}

#[test]
fn autosave_after_load_saves_the_next_edit() {
    let mut persistence = memory_session();
    let mut store = FormStore::default();
    let template = find_template("contact").expect("contact template");
    store.load_template(&template).expect("load template");

    let outcome = persistence.autosave(&mut store).expect("autosave");
    let saved = match outcome {
        AutosaveOutcome::Saved(saved) => saved,
        other => panic!("expected a save, got {other:?}"),
    };
    assert!(saved.is_auto_save);
    assert_eq!(saved.name, template.name);
    assert!(!store.is_dirty());

    let again = persistence.autosave(&mut store).expect("autosave");
    assert_eq!(again, AutosaveOutcome::Skipped(SkipReason::Clean));
}

#[test]
fn autosave_keeps_the_name_of_a_named_save() {
    let mut persistence = memory_session();
    let mut store = store_with("Name");
    let named = persistence
        .save_form(&mut store, Some("Quarterly survey"))
        .expect("named save");

    store.set_form_title("Renamed");
    let outcome = persistence.autosave(&mut store).expect("autosave");
    let saved = match outcome {
        AutosaveOutcome::Saved(saved) => saved,
        other => panic!("expected a save, got {other:?}"),
    };
    assert_eq!(saved.id, named.id);
    assert_eq!(saved.name, "Quarterly survey");
    assert!(!saved.is_auto_save);
    assert!(saved.timestamp > named.timestamp);
    assert_eq!(saved.form_data.name.as_deref(), Some("Renamed"));
}

#[test]
fn deleting_the_current_form_detaches_the_document() {
    let mut persistence = memory_session();
    let mut store = store_with("Name");
    let saved = persistence.save_form(&mut store, None).expect("save");
    assert!(!store.is_dirty());

    assert!(
        persistence
            .delete_saved_form(&saved.id, &mut store)
            .expect("delete")
    );
    assert_eq!(persistence.current_form_id(), None);
    assert!(store.is_dirty());
    assert_eq!(store.fields().len(), 1);
    assert!(
        !persistence
            .delete_saved_form(&saved.id, &mut store)
            .expect("second delete")
    );
}

#[test]
fn session_survives_a_restart_on_disk() {
    let dir = TempDir::new().expect("tempdir");
    let config = EngineConfig::default();

    let saved = {
        let mut persistence =
            SessionPersistence::new(JsonFileStore::new(dir.path()), &config);
        let mut store = store_with("Persisted");
        store.set_form_title("On disk");
        persistence.save_form(&mut store, None).expect("save")
    };

    let mut persistence = SessionPersistence::new(JsonFileStore::new(dir.path()), &config);
    let mut store = FormStore::new(&config);
    assert!(persistence.restore_current(&mut store).expect("restore"));
    assert_eq!(store.title(), "On disk");
    assert_eq!(store.fields()[0].label, "Persisted");
    assert!(!store.is_dirty());
    assert_eq!(store.last_saved_at(), Some(saved.timestamp));
}

#[test]
fn corrupted_session_reads_as_empty() {
    let config = EngineConfig::default();
    let mut storage = MemoryStore::new();
    storage
        .set(&config.storage_key, "{not json")
        .expect("seed corrupt");
    let mut persistence = SessionPersistence::new(storage, &config);

    assert!(persistence.saved_forms().is_empty());
    let mut store = FormStore::new(&config);
    assert!(!persistence.restore_current(&mut store).expect("restore"));

    store.add_field(Field::labelled(FieldType::Text, "Fresh"));
    persistence.save_form(&mut store, None).expect("save over corrupt");
    assert_eq!(persistence.saved_forms().len(), 1);
}

#[test]
fn quota_failure_leaves_the_document_dirty() {
    let config = EngineConfig::default();
    let mut persistence = SessionPersistence::new(MemoryStore::with_quota(16), &config);
    let mut store = store_with("Too big");

    let err = persistence
        .save_form(&mut store, None)
        .expect_err("quota exceeded");
    assert!(matches!(
        err,
        form_spec::PersistenceError::Storage(StorageError::QuotaExceeded(_))
    ));
    assert!(store.is_dirty());
    assert_eq!(store.last_saved_at(), None);
}
