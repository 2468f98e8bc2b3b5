//! Server-side view of a note

use serde::{Deserialize, Serialize};

use super::Note;

/// A note as the server last reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ServerNote {
    pub server_id: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    /// Reminder timestamp (Unix ms)
    pub reminder_at: Option<i64>,
    pub pinned: bool,
    pub favorite: bool,
    pub archived: bool,
    /// Server creation timestamp (Unix ms), when reported
    pub created_at: Option<i64>,
    /// Server modification timestamp (Unix ms), when reported
    pub updated_at: Option<i64>,
}

impl ServerNote {
    /// Overwrite the server-owned fields of `note`, returning whether it changed.
    ///
    /// Identity, sync bookkeeping and the local-only `locked` flag are kept.
    pub fn apply_to(&self, note: &mut Note) -> bool {
        let before = note.clone();
        note.server_id = Some(self.server_id.clone());
        note.title.clone_from(&self.title);
        note.content.clone_from(&self.content);
        note.tags.clone_from(&self.tags);
        note.reminder_at = self.reminder_at;
        note.pinned = self.pinned;
        note.favorite = self.favorite;
        note.archived = self.archived;
        if let Some(created_at) = self.created_at {
            note.created_at = created_at;
        }
        *note != before
    }
}
