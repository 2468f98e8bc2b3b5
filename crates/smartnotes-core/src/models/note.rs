//! Note model

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// A locally generated identifier for a note, using UUID v7 (time-sortable).
///
/// Never reused and never sent to the server as the server's identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocalId(Uuid);

impl LocalId {
    /// Create a new unique local ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LocalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Synchronization state of a note relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Matches the last known server state
    Clean,
    /// Created locally, never acknowledged by the server
    PendingCreate,
    /// Edited locally since the last acknowledged server state
    PendingUpdate,
    /// Deleted locally, waiting for the server to acknowledge
    PendingDelete,
    /// Server definitively rejected the pending operation
    Conflict,
}

impl SyncState {
    /// Whether the reconciler should submit this note on its next pass.
    #[must_use]
    pub const fn is_queued(self) -> bool {
        matches!(
            self,
            Self::PendingCreate | Self::PendingUpdate | Self::PendingDelete
        )
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::PendingCreate => "pending-create",
            Self::PendingUpdate => "pending-update",
            Self::PendingDelete => "pending-delete",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A note in the local store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Note {
    /// Stable local identifier
    pub local_id: LocalId,
    /// Server identifier, once the server accepted the note
    #[serde(default)]
    pub server_id: Option<String>,
    pub title: String,
    pub content: String,
    /// Ordered, de-duplicated tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Reminder timestamp (Unix ms)
    #[serde(default)]
    pub reminder_at: Option<i64>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub archived: bool,
    /// UI gate only; never sent to the server
    #[serde(default)]
    pub locked: bool,
    pub sync_state: SyncState,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last local mutation timestamp (Unix ms)
    pub updated_at: i64,
    /// Local mutation counter
    #[serde(default)]
    pub revision: u64,
}

impl Note {
    /// Build a new, never-synced note from a validated draft.
    #[must_use]
    pub fn from_draft(draft: NoteDraft, now_ms: i64) -> Self {
        Self {
            local_id: LocalId::new(),
            server_id: None,
            title: draft.title,
            content: draft.content,
            tags: draft.tags,
            reminder_at: draft.reminder_at,
            pinned: draft.pinned,
            favorite: draft.favorite,
            archived: draft.archived,
            locked: draft.locked,
            sync_state: SyncState::PendingCreate,
            created_at: now_ms,
            updated_at: now_ms,
            revision: 0,
        }
    }

    /// Canonical key: the server id once assigned, the local id before.
    #[must_use]
    pub fn key(&self) -> String {
        self.server_id
            .clone()
            .unwrap_or_else(|| self.local_id.as_str())
    }

    /// Whether `id` refers to this note by local or server identifier.
    #[must_use]
    pub fn matches_id(&self, id: &str) -> bool {
        self.server_id.as_deref() == Some(id) || self.local_id.as_str() == id
    }

    /// Notes awaiting a server delete are hidden from every read.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.sync_state != SyncState::PendingDelete
    }

    /// Whether the note carries the given tag (case-insensitive).
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim();
        self.tags.iter().any(|own| own.eq_ignore_ascii_case(tag))
    }

    /// Get the title, falling back to the first content line
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        let source = if self.title.trim().is_empty() {
            self.content.lines().next().unwrap_or("")
        } else {
            self.title.as_str()
        };
        source.trim().chars().take(max_len).collect()
    }
}

/// Fields for a note about to be created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub reminder_at: Option<i64>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub locked: bool,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn with_reminder(mut self, reminder_at: i64) -> Self {
        self.reminder_at = Some(reminder_at);
        self
    }

    /// Trim text, normalize tags and reject drafts that would be empty.
    pub fn validate(self) -> Result<Self> {
        let title = self.title.trim().to_string();
        let content = self.content.trim_end().to_string();
        if title.is_empty() && content.trim().is_empty() {
            return Err(Error::Validation(
                "a note needs a title or some content".to_string(),
            ));
        }
        if let Some(reminder_at) = self.reminder_at {
            validate_reminder(reminder_at)?;
        }

        Ok(Self {
            title,
            content,
            tags: normalize_tags(self.tags)?,
            ..self
        })
    }
}

/// Partial update of a note. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// `Some(None)` clears the reminder
    #[serde(default)]
    pub reminder_at: Option<Option<i64>>,
    #[serde(default)]
    pub pinned: Option<bool>,
    #[serde(default)]
    pub favorite: Option<bool>,
    #[serde(default)]
    pub archived: Option<bool>,
    #[serde(default)]
    pub locked: Option<bool>,
}

impl NotePatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.tags.is_none()
            && self.reminder_at.is_none()
            && self.pinned.is_none()
            && self.favorite.is_none()
            && self.archived.is_none()
            && self.locked.is_none()
    }

    /// Trim text and normalize tags.
    pub fn validate(self) -> Result<Self> {
        if self.is_empty() {
            return Err(Error::Validation("patch does not change anything".to_string()));
        }
        if let Some(Some(reminder_at)) = self.reminder_at {
            validate_reminder(reminder_at)?;
        }
        let tags = self.tags.map(normalize_tags).transpose()?;

        Ok(Self {
            title: self.title.map(|title| title.trim().to_string()),
            content: self.content.map(|content| content.trim_end().to_string()),
            tags,
            ..self
        })
    }

    /// Apply to `note`, reporting which kinds of field actually changed.
    pub fn apply_to(&self, note: &mut Note) -> Result<PatchEffect> {
        let title = self.title.as_ref().unwrap_or(&note.title);
        let content = self.content.as_ref().unwrap_or(&note.content);
        if title.is_empty() && content.trim().is_empty() {
            return Err(Error::Validation(
                "a note needs a title or some content".to_string(),
            ));
        }

        let before = note.clone();
        if let Some(title) = &self.title {
            note.title.clone_from(title);
        }
        if let Some(content) = &self.content {
            note.content.clone_from(content);
        }
        if let Some(tags) = &self.tags {
            note.tags.clone_from(tags);
        }
        if let Some(reminder_at) = self.reminder_at {
            note.reminder_at = reminder_at;
        }
        if let Some(pinned) = self.pinned {
            note.pinned = pinned;
        }
        if let Some(favorite) = self.favorite {
            note.favorite = favorite;
        }
        if let Some(archived) = self.archived {
            note.archived = archived;
        }
        if let Some(locked) = self.locked {
            note.locked = locked;
        }
        Ok(PatchEffect {
            remote: note.title != before.title
                || note.content != before.content
                || note.tags != before.tags
                || note.reminder_at != before.reminder_at
                || note.pinned != before.pinned
                || note.favorite != before.favorite
                || note.archived != before.archived,
            local: note.locked != before.locked,
        })
    }
}

/// Fields a patch actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchEffect {
    /// Something the server stores changed
    pub remote: bool,
    /// A local-only flag changed
    pub local: bool,
}

impl PatchEffect {
    #[must_use]
    pub const fn changed(self) -> bool {
        self.remote || self.local
    }
}

/// Boolean flags that can be flipped with a single intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToggleField {
    Pinned,
    Favorite,
    Archived,
    Locked,
}

impl ToggleField {
    /// Patch that flips this flag on `note`.
    #[must_use]
    pub fn patch_for(self, note: &Note) -> NotePatch {
        let mut patch = NotePatch::default();
        match self {
            Self::Pinned => patch.pinned = Some(!note.pinned),
            Self::Favorite => patch.favorite = Some(!note.favorite),
            Self::Archived => patch.archived = Some(!note.archived),
            Self::Locked => patch.locked = Some(!note.locked),
        }
        patch
    }

    /// Current value of this flag on `note`.
    #[must_use]
    pub const fn value(self, note: &Note) -> bool {
        match self {
            Self::Pinned => note.pinned,
            Self::Favorite => note.favorite,
            Self::Archived => note.archived,
            Self::Locked => note.locked,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pinned => "pin",
            Self::Favorite => "favorite",
            Self::Archived => "archive",
            Self::Locked => "lock",
        }
    }
}

impl fmt::Display for ToggleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToggleField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pin" | "pinned" => Ok(Self::Pinned),
            "favorite" | "favourite" | "fav" => Ok(Self::Favorite),
            "archive" | "archived" => Ok(Self::Archived),
            "lock" | "locked" => Ok(Self::Locked),
            other => Err(Error::Validation(format!("unknown toggle field '{other}'"))),
        }
    }
}

/// Normalize a tag list into an ordered set.
///
/// Tags are trimmed, empty entries dropped and duplicates removed
/// case-insensitively, keeping the first spelling seen.
pub fn normalize_tags(tags: Vec<String>) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        if tag.contains(',') {
            return Err(Error::Validation(format!(
                "tag '{tag}' must not contain a comma"
            )));
        }
        if seen.insert(tag.to_lowercase()) {
            normalized.push(tag.to_string());
        }
    }
    Ok(normalized)
}

fn validate_reminder(reminder_at: i64) -> Result<()> {
    if reminder_at <= 0 {
        return Err(Error::Validation(format!(
            "reminder timestamp {reminder_at} is not a valid time"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_id_unique() {
        let id1 = LocalId::new();
        let id2 = LocalId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_local_id_parse() {
        let id = LocalId::new();
        let parsed: LocalId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_note_from_draft_starts_pending_create() {
        let note = Note::from_draft(NoteDraft::new("Groceries", "milk"), 42);
        assert_eq!(note.sync_state, SyncState::PendingCreate);
        assert!(note.server_id.is_none());
        assert_eq!(note.created_at, 42);
        assert_eq!(note.updated_at, 42);
        assert_eq!(note.key(), note.local_id.as_str());
    }

    #[test]
    fn test_key_prefers_server_id() {
        let mut note = Note::from_draft(NoteDraft::new("a", ""), 1);
        note.server_id = Some("s1".to_string());
        assert_eq!(note.key(), "s1");
        assert!(note.matches_id("s1"));
        assert!(note.matches_id(&note.local_id.as_str()));
    }

    #[test]
    fn test_draft_rejects_empty_note() {
        let error = NoteDraft::new("  ", " \n ").validate().unwrap_err();
        assert!(matches!(error, Error::Validation(_)));
    }

    #[test]
    fn test_draft_rejects_invalid_reminder() {
        let error = NoteDraft::new("x", "").with_reminder(0).validate().unwrap_err();
        assert!(matches!(error, Error::Validation(_)));
    }

    #[test]
    fn test_normalize_tags_ordered_set() {
        let tags = normalize_tags(vec![
            " work ".to_string(),
            "Home".to_string(),
            String::new(),
            "WORK".to_string(),
            "home".to_string(),
        ])
        .unwrap();
        assert_eq!(tags, vec!["work", "Home"]);
    }

    #[test]
    fn test_normalize_tags_rejects_commas() {
        assert!(normalize_tags(vec!["a,b".to_string()]).is_err());
    }

    #[test]
    fn test_patch_apply_reports_changes() {
        let mut note = Note::from_draft(NoteDraft::new("a", "b"), 1);
        let patch = NotePatch {
            title: Some("a".to_string()),
            ..NotePatch::default()
        };
        assert!(!patch.apply_to(&mut note).unwrap().changed());

        let patch = NotePatch {
            reminder_at: Some(Some(99)),
            ..NotePatch::default()
        };
        let effect = patch.apply_to(&mut note).unwrap();
        assert!(effect.remote);
        assert!(!effect.local);
        assert_eq!(note.reminder_at, Some(99));
    }

    #[test]
    fn test_patch_cannot_empty_note() {
        let mut note = Note::from_draft(NoteDraft::new("", "body"), 1);
        let patch = NotePatch {
            content: Some(String::new()),
            ..NotePatch::default()
        };
        assert!(patch.apply_to(&mut note).is_err());
        assert_eq!(note.content, "body");
    }

    #[test]
    fn test_toggle_field_parse_and_patch() {
        let note = Note::from_draft(NoteDraft::new("a", ""), 1);
        let field: ToggleField = "Pinned".parse().unwrap();
        assert_eq!(field, ToggleField::Pinned);
        assert_eq!(field.patch_for(&note).pinned, Some(true));
        assert!("colour".parse::<ToggleField>().is_err());
    }

    #[test]
    fn test_lock_with_unchanged_title_is_local() {
        let mut note = Note::from_draft(NoteDraft::new("a", ""), 1);
        let patch = NotePatch {
            title: Some("a".to_string()),
            locked: Some(true),
            ..NotePatch::default()
        };
        assert_eq!(
            patch.apply_to(&mut note).unwrap(),
            PatchEffect {
                remote: false,
                local: true,
            }
        );
    }

    #[test]
    fn test_title_preview_falls_back_to_content() {
        let note = Note::from_draft(NoteDraft::new("", "First line\nSecond"), 1);
        assert_eq!(note.title_preview(5), "First");
    }
}
