//! Data models for SmartNotes

mod filter;
mod note;
mod remote;

pub use filter::{sort_for_display, NoteFilter};
pub use note::{
    normalize_tags, LocalId, Note, NoteDraft, NotePatch, PatchEffect, SyncState, ToggleField,
};
pub use remote::ServerNote;
