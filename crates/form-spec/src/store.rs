//! Form document store.
//!
//! Owns the field list and editing state, routes every structural mutation
//! through [`CommandHistory`], and notifies subscribers after each change.
//! Lookups by id are tolerant: a stale id turns the call into a no-op that
//! returns `false`.

use std::fmt;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::codec::{self, CodecError};
use crate::condition::FormValues;
use crate::config::EngineConfig;
use crate::history::{Command, CommandHistory, UpdateCommand};
use crate::persistence::SavedForm;
use crate::spec::field::{Field, FieldUpdate};
use crate::spec::form::{FormExport, FormTemplate};
use crate::visibility::{VisibilityMap, VisibilityMode, is_visible, resolve_visibility};

pub type SubscriptionId = usize;

type Subscriber = Box<dyn Fn(&DocumentState)>;

/// Read-only view handed to collaborators and subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentState {
    fields: Vec<Field>,
    title: String,
    description: Option<String>,
    form_data: FormValues,
    selected_field_id: Option<String>,
    preview_mode: bool,
    dirty: bool,
    loading: bool,
    last_saved_at: Option<i64>,
}

impl DocumentState {
    fn empty(title: &str) -> Self {
        Self {
            fields: Vec::new(),
            title: title.to_string(),
            description: None,
            form_data: FormValues::new(),
            selected_field_id: None,
            preview_mode: false,
            dirty: false,
            loading: false,
            last_saved_at: None,
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.id == id)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn form_data(&self) -> &FormValues {
        &self.form_data
    }

    pub fn selected_field_id(&self) -> Option<&str> {
        self.selected_field_id.as_deref()
    }

    pub fn is_preview_mode(&self) -> bool {
        self.preview_mode
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Set while a bulk replace is in flight; autosave must not fire.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_saved_at(&self) -> Option<i64> {
        self.last_saved_at
    }

    /// Portable snapshot stamped with the current time.
    pub fn to_export(&self, version: &str) -> FormExport {
        FormExport {
            fields: self.fields.clone(),
            version: version.to_string(),
            name: Some(self.title.clone()),
            description: self.description.clone(),
            created_at: Utc::now(),
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.id == id)
    }

    // Prefers the recorded index, falls back to a scan.
    fn locate(&self, id: &str, hint: usize) -> Option<usize> {
        match self.fields.get(hint) {
            Some(field) if field.id == id => Some(hint),
            _ => self.position(id),
        }
    }

    fn first_submit(&self) -> Option<usize> {
        self.fields.iter().position(Field::is_submit)
    }

    fn insertion_index(&self, field: &Field) -> usize {
        if field.is_submit() {
            self.fields.len()
        } else {
            self.first_submit().unwrap_or(self.fields.len())
        }
    }

    fn insert_at(&mut self, index: usize, field: Field) {
        let index = index.min(self.fields.len());
        self.fields.insert(index, field);
    }

    fn move_field(&mut self, from: usize, to: usize) {
        if from >= self.fields.len() {
            return;
        }
        let field = self.fields.remove(from);
        self.insert_at(to, field);
    }

    fn drop_stale_selection(&mut self) {
        if let Some(selected) = &self.selected_field_id
            && self.position(selected).is_none()
        {
            self.selected_field_id = None;
        }
    }
}

/// Stable partition that moves submit fields to the end.
pub fn pin_submit_last(fields: Vec<Field>) -> Vec<Field> {
    let (mut ordered, submits): (Vec<_>, Vec<_>) =
        fields.into_iter().partition(|field| !field.is_submit());
    ordered.extend(submits);
    ordered
}

pub struct FormStore {
    state: DocumentState,
    history: CommandHistory,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: SubscriptionId,
    default_title: String,
    export_version: String,
}

impl fmt::Debug for FormStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormStore")
            .field("state", &self.state)
            .field("history", &self.history)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl Default for FormStore {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl FormStore {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            state: DocumentState::empty(&config.default_title),
            history: CommandHistory::new(),
            subscribers: Vec::new(),
            next_subscription: 0,
            default_title: config.default_title.clone(),
            export_version: config.export_version.clone(),
        }
    }

    pub fn state(&self) -> &DocumentState {
        &self.state
    }

    pub fn fields(&self) -> &[Field] {
        self.state.fields()
    }

    pub fn field(&self, id: &str) -> Option<&Field> {
        self.state.field(id)
    }

    pub fn title(&self) -> &str {
        self.state.title()
    }

    pub fn selected_field_id(&self) -> Option<&str> {
        self.state.selected_field_id()
    }

    pub fn is_preview_mode(&self) -> bool {
        self.state.is_preview_mode()
    }

    pub fn is_dirty(&self) -> bool {
        self.state.is_dirty()
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    pub fn last_saved_at(&self) -> Option<i64> {
        self.state.last_saved_at()
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn subscribe(&mut self, subscriber: impl Fn(&DocumentState) + 'static) -> SubscriptionId {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    fn notify(&self) {
        for (_, subscriber) in &self.subscribers {
            subscriber(&self.state);
        }
    }

    fn commit(&mut self, command: Command) {
        debug!(kind = command.kind().as_str(), "recording command");
        self.history.record(command);
        self.state.dirty = true;
        self.notify();
    }

    /// Inserts `field`; submit fields go last, everything else before the first submit.
    pub fn add_field(&mut self, field: Field) -> bool {
        if self.state.position(&field.id).is_some() {
            debug!(field_id = %field.id, "ignoring add of duplicate field id");
            return false;
        }
        let index = self.state.insertion_index(&field);
        self.state.insert_at(index, field.clone());
        self.commit(Command::Add { field, index });
        true
    }

    /// Copies a field under a fresh id right after the original. Returns the new id.
    pub fn duplicate_field(&mut self, id: &str) -> Option<String> {
        let Some(position) = self.state.position(id) else {
            debug!(field_id = id, "duplicate of unknown field ignored");
            return None;
        };
        let original = &self.state.fields[position];
        if original.is_submit() {
            return None;
        }
        let mut copy = original.clone();
        copy.id = Uuid::new_v4().to_string();
        copy.label = format!("{} (copy)", original.label);
        let new_id = copy.id.clone();
        let index = position + 1;
        self.state.insert_at(index, copy.clone());
        self.commit(Command::Add { field: copy, index });
        Some(new_id)
    }

    pub fn update_field(&mut self, id: &str, updates: FieldUpdate) -> bool {
        if updates.is_empty() {
            return false;
        }
        let Some(index) = self.state.position(id) else {
            debug!(field_id = id, "update of unknown field ignored");
            return false;
        };
        let previous = self.state.fields[index].clone();
        self.state.fields[index].apply(&updates);
        self.commit(Command::Update(UpdateCommand::Field {
            index,
            previous,
            updates,
        }));
        true
    }

    pub fn remove_field(&mut self, id: &str) -> bool {
        let Some(index) = self.state.position(id) else {
            debug!(field_id = id, "remove of unknown field ignored");
            return false;
        };
        let field = self.state.fields.remove(index);
        if self.state.selected_field_id.as_deref() == Some(id) {
            self.state.selected_field_id = None;
        }
        self.commit(Command::Remove { field, index });
        true
    }

    /// Moves a field. Submit fields cannot move, and nothing moves past the first submit.
    pub fn reorder_fields(&mut self, from_index: usize, to_index: usize) -> bool {
        let Some(field) = self.state.fields.get(from_index) else {
            debug!(from_index, "reorder from out-of-range index ignored");
            return false;
        };
        if field.is_submit() {
            debug!(from_index, "submit fields are pinned; reorder rejected");
            return false;
        }
        let last_slot = match self.state.first_submit() {
            Some(submit) => submit.saturating_sub(1),
            None => self.state.fields.len() - 1,
        };
        let to_index = to_index.min(last_slot);
        if to_index == from_index {
            return false;
        }
        let old_fields = self.state.fields.clone();
        self.state.move_field(from_index, to_index);
        self.commit(Command::Reorder {
            from_index,
            to_index,
            old_fields,
        });
        true
    }

    /// Selects an existing field or clears the selection.
    pub fn set_selected_field(&mut self, id: Option<&str>) -> bool {
        match id {
            Some(id) if self.state.position(id).is_none() => {
                debug!(field_id = id, "selection of unknown field ignored");
                false
            }
            _ => {
                self.state.selected_field_id = id.map(str::to_string);
                self.notify();
                true
            }
        }
    }

    pub fn set_form_title(&mut self, title: impl Into<String>) -> bool {
        let next = title.into();
        if next == self.state.title {
            return false;
        }
        let previous = std::mem::replace(&mut self.state.title, next.clone());
        self.commit(Command::Update(UpdateCommand::Title { previous, next }));
        true
    }

    pub fn toggle_preview_mode(&mut self) {
        self.state.preview_mode = !self.state.preview_mode;
        self.state.selected_field_id = None;
        self.notify();
    }

    /// Records a runtime input value. Not undoable.
    pub fn update_form_data(&mut self, field_id: impl Into<String>, value: Value) {
        self.state.form_data.insert(field_id.into(), value);
        self.notify();
    }

    /// Conditional visibility; outside preview every field is visible.
    pub fn should_show_field(&self, field: &Field) -> bool {
        is_visible(
            field,
            &self.state.form_data,
            VisibilityMode::from_preview(self.state.preview_mode),
        )
    }

    pub fn visibility(&self) -> VisibilityMap {
        resolve_visibility(
            &self.state.fields,
            &self.state.form_data,
            VisibilityMode::from_preview(self.state.preview_mode),
        )
    }

    pub fn export_form(&self) -> FormExport {
        self.state.to_export(&self.export_version)
    }

    /// Replaces the document with a snapshot. Blank or repeated ids and
    /// blank labels reject it and leave the document untouched.
    pub fn import_form(&mut self, snapshot: FormExport) -> Result<(), CodecError> {
        codec::validate_fields(&snapshot.fields)?;
        info!(fields = snapshot.fields.len(), "importing form");
        let title = snapshot
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.default_title.clone());
        self.replace_document(snapshot.fields, title, snapshot.description);
        Ok(())
    }

    /// Decodes and imports a JSON payload. On error the document is untouched.
    pub fn import_json(&mut self, json: &str) -> Result<(), CodecError> {
        let snapshot = codec::import_json(json)?;
        self.import_form(snapshot)
    }

    pub fn load_template(&mut self, template: &FormTemplate) -> Result<(), CodecError> {
        let fields = template.instantiate()?;
        info!(template = %template.id, "loading template");
        self.replace_document(fields, template.name.clone(), template.description.clone());
        Ok(())
    }

    /// Replaces the document with a saved snapshot. The result is clean.
    pub fn load_saved_form(&mut self, saved: &SavedForm) -> Result<(), CodecError> {
        codec::validate_fields(&saved.form_data.fields)?;
        info!(form_id = %saved.id, "loading saved form");
        let title = saved
            .form_data
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| saved.name.clone());
        self.replace_document(
            saved.form_data.fields.clone(),
            title,
            saved.form_data.description.clone(),
        );
        self.state.dirty = false;
        self.state.last_saved_at = Some(saved.timestamp);
        Ok(())
    }

    // Bulk replace shared by import, template and saved-form loads.
    fn replace_document(&mut self, fields: Vec<Field>, title: String, description: Option<String>) {
        self.state.loading = true;
        let new_fields = pin_submit_last(fields);
        let old_fields = std::mem::replace(&mut self.state.fields, new_fields.clone());
        let old_title = std::mem::replace(&mut self.state.title, title.clone());
        let old_description = std::mem::replace(&mut self.state.description, description.clone());
        self.state.selected_field_id = None;
        self.state.form_data.clear();
        self.commit(Command::LoadTemplate {
            old_fields,
            old_title,
            old_description,
            new_fields,
            new_title: title,
            new_description: description,
        });
        self.state.loading = false;
    }

    /// Empties the document as an undoable step.
    pub fn clear_form(&mut self) -> bool {
        if self.state.fields.is_empty()
            && self.state.title == self.default_title
            && self.state.description.is_none()
        {
            return false;
        }
        let old_fields = std::mem::take(&mut self.state.fields);
        let old_title = std::mem::replace(&mut self.state.title, self.default_title.clone());
        let old_description = self.state.description.take();
        self.state.selected_field_id = None;
        self.state.form_data.clear();
        self.commit(Command::Clear {
            old_fields,
            old_title,
            old_description,
        });
        true
    }

    /// Ends the editing session: fresh document, empty history, nothing recorded.
    pub fn close_form(&mut self) {
        self.state = DocumentState::empty(&self.default_title);
        self.history.clear();
        self.notify();
    }

    /// Drops undo/redo history at a session boundary (editor unmount, page unload).
    pub fn reset_history(&mut self) {
        self.history.clear();
        self.notify();
    }

    pub fn mark_saved(&mut self, timestamp: i64) {
        self.state.dirty = false;
        self.state.last_saved_at = Some(timestamp);
        self.notify();
    }

    pub fn mark_dirty(&mut self) {
        self.state.dirty = true;
        self.notify();
    }

    pub fn undo(&mut self) -> bool {
        let Some(command) = self.history.step_back().cloned() else {
            return false;
        };
        debug!(kind = command.kind().as_str(), "undo");
        self.revert(command);
        self.after_history_step();
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(command) = self.history.step_forward().cloned() else {
            return false;
        };
        debug!(kind = command.kind().as_str(), "redo");
        self.replay(command);
        self.after_history_step();
        true
    }

    fn after_history_step(&mut self) {
        self.state.drop_stale_selection();
        self.state.dirty = true;
        self.notify();
    }

    fn revert(&mut self, command: Command) {
        let state = &mut self.state;
        match command {
            Command::Add { field, index } => {
                if let Some(position) = state.locate(&field.id, index) {
                    state.fields.remove(position);
                }
            }
            Command::Remove { field, index } => state.insert_at(index, field),
            Command::Update(UpdateCommand::Field {
                index, previous, ..
            }) => {
                if let Some(position) = state.locate(&previous.id, index) {
                    state.fields[position] = previous;
                }
            }
            Command::Update(UpdateCommand::Title { previous, .. }) => state.title = previous,
            Command::Reorder { old_fields, .. } => state.fields = old_fields,
            Command::Clear {
                old_fields,
                old_title,
                old_description,
            }
            | Command::LoadTemplate {
                old_fields,
                old_title,
                old_description,
                ..
            } => {
                state.fields = old_fields;
                state.title = old_title;
                state.description = old_description;
            }
        }
    }

    fn replay(&mut self, command: Command) {
        let state = &mut self.state;
        match command {
            Command::Add { field, index } => state.insert_at(index, field),
            Command::Remove { field, index } => {
                if let Some(position) = state.locate(&field.id, index) {
                    state.fields.remove(position);
                }
            }
            Command::Update(UpdateCommand::Field {
                index,
                previous,
                updates,
            }) => {
                if let Some(position) = state.locate(&previous.id, index) {
                    state.fields[position].apply(&updates);
                }
            }
            Command::Update(UpdateCommand::Title { next, .. }) => state.title = next,
            Command::Reorder {
                from_index,
                to_index,
                ..
            } => state.move_field(from_index, to_index),
            Command::Clear { .. } => {
                state.fields.clear();
                state.title = self.default_title.clone();
                state.description = None;
            }
            Command::LoadTemplate {
                new_fields,
                new_title,
                new_description,
                ..
            } => {
                state.fields = new_fields;
                state.title = new_title;
                state.description = new_description;
            }
        }
    }
}
