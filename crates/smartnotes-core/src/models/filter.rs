//! Local note queries

use chrono::NaiveDate;

use super::Note;

/// Criteria for [`crate::store::NoteStore::list`].
///
/// The default shows every visible, non-archived note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct NoteFilter {
    pub include_archived: bool,
    pub archived_only: bool,
    pub pinned_only: bool,
    pub favorite_only: bool,
    pub tag: Option<String>,
    /// Case-insensitive substring over title, content and tags
    pub search: Option<String>,
    /// Only notes created on this UTC calendar day
    pub created_on: Option<NaiveDate>,
}

impl NoteFilter {
    #[must_use]
    pub fn all() -> Self {
        Self {
            include_archived: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_search(mut self, query: impl Into<String>) -> Self {
        self.search = Some(query.into());
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Whether a visible note passes this filter.
    #[must_use]
    pub fn matches(&self, note: &Note) -> bool {
        if self.archived_only && !note.archived {
            return false;
        }
        if note.archived && !(self.include_archived || self.archived_only) {
            return false;
        }
        if self.pinned_only && !note.pinned {
            return false;
        }
        if self.favorite_only && !note.favorite {
            return false;
        }
        if let Some(tag) = self.tag.as_deref() {
            if !note.has_tag(tag) {
                return false;
            }
        }
        if let Some(date) = self.created_on {
            let created = chrono::DateTime::from_timestamp_millis(note.created_at)
                .map(|created| created.date_naive());
            if created != Some(date) {
                return false;
            }
        }
        if let Some(query) = self.search.as_deref() {
            let query = query.trim().to_lowercase();
            if !query.is_empty() && !matches_text(note, &query) {
                return false;
            }
        }
        true
    }
}

fn matches_text(note: &Note, query: &str) -> bool {
    note.title.to_lowercase().contains(query)
        || note.content.to_lowercase().contains(query)
        || note.tags.join(",").to_lowercase().contains(query)
}

/// Display order: pinned notes first, then most recently updated.
pub fn sort_for_display(notes: &mut [Note]) {
    notes.sort_by(|a, b| {
        b.pinned
            .cmp(&a.pinned)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
            .then_with(|| b.local_id.cmp(&a.local_id))
    });
}
