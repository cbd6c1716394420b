//! Linear undo/redo log.
//!
//! The log is a single sequence with a cursor. Recording after an undo drops
//! every command past the cursor; there is no branching.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::spec::field::{Field, FieldUpdate};

/// Discriminant of [`Command`], used for display and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandKind {
    Add,
    Remove,
    Update,
    Reorder,
    Clear,
    LoadTemplate,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Add => "add",
            CommandKind::Remove => "remove",
            CommandKind::Update => "update",
            CommandKind::Reorder => "reorder",
            CommandKind::Clear => "clear",
            CommandKind::LoadTemplate => "load-template",
        }
    }
}

/// Target of an `update` command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum UpdateCommand {
    Field {
        index: usize,
        previous: Field,
        updates: FieldUpdate,
    },
    /// The form title, edited as a pseudo-field.
    Title { previous: String, next: String },
}

/// A reversible mutation with the data needed to replay or revert it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Command {
    Add {
        field: Field,
        index: usize,
    },
    Remove {
        field: Field,
        index: usize,
    },
    Update(UpdateCommand),
    Reorder {
        from_index: usize,
        to_index: usize,
        old_fields: Vec<Field>,
    },
    Clear {
        old_fields: Vec<Field>,
        old_title: String,
        old_description: Option<String>,
    },
    LoadTemplate {
        old_fields: Vec<Field>,
        old_title: String,
        old_description: Option<String>,
        new_fields: Vec<Field>,
        new_title: String,
        new_description: Option<String>,
    },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Add { .. } => CommandKind::Add,
            Command::Remove { .. } => CommandKind::Remove,
            Command::Update(_) => CommandKind::Update,
            Command::Reorder { .. } => CommandKind::Reorder,
            Command::Clear { .. } => CommandKind::Clear,
            Command::LoadTemplate { .. } => CommandKind::LoadTemplate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub command: Command,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct CommandHistory {
    entries: Vec<HistoryEntry>,
    // Number of applied entries; `entries[cursor - 1]` is the next undo.
    cursor: usize,
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, command: Command) {
        self.entries.truncate(self.cursor);
        self.entries.push(HistoryEntry {
            command,
            timestamp: Utc::now(),
        });
        self.cursor = self.entries.len();
    }

    /// Moves the cursor back and returns the command to revert.
    pub fn step_back(&mut self) -> Option<&Command> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(&self.entries[self.cursor].command)
    }

    /// Moves the cursor forward and returns the command to replay.
    pub fn step_forward(&mut self) -> Option<&Command> {
        if self.cursor >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        Some(&self.entries[self.cursor - 1].command)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// Index of the last applied entry, `None` when nothing is applied.
    pub fn index(&self) -> Option<usize> {
        self.cursor.checked_sub(1)
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }
}
