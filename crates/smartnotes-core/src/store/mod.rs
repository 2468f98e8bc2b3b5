//! Local note store
//!
//! The store is the single owner of the note collection. Every intent is
//! applied optimistically, recorded as at most one pending operation per note
//! and written through to durable storage before the call returns.

mod shared;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tokio::sync::broadcast;

use crate::db::SnapshotStore;
use crate::error::{Error, Result};
use crate::models::{
    sort_for_display, LocalId, Note, NoteDraft, NoteFilter, NotePatch, ServerNote, SyncState,
    ToggleField,
};
use crate::util::unix_millis_now;

pub use shared::SharedStore;

const EVENT_CAPACITY: usize = 256;

/// Change notification emitted after every committed store write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Created(LocalId),
    Updated(LocalId),
    Deleted(LocalId),
    /// A reconciliation result or remote refresh was merged
    Synced,
}

impl StoreEvent {
    /// Whether the event originates from a user intent (and so may need syncing).
    #[must_use]
    pub const fn is_local_mutation(&self) -> bool {
        !matches!(self, Self::Synced)
    }
}

/// Result of a delete intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteAck {
    /// Never reached the server; dropped locally
    Removed,
    /// Hidden and queued for a server delete
    Queued,
}

/// User decision for a note in [`SyncState::Conflict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Submit the local copy again as a brand new server note
    Resubmit,
    /// Drop the local copy
    Discard,
}

/// Remote operation a queued note is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOp {
    Create,
    Update,
    Delete,
}

/// One entry of the derived sync queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub op: PendingOp,
    /// Revision of the note when the queue was snapshotted
    pub revision: u64,
    pub note: Note,
}

impl PendingEntry {
    /// Queue entry for `note`, `None` when it is clean or in conflict.
    pub fn for_note(note: &Note) -> Option<Self> {
        let op = match note.sync_state {
            SyncState::PendingCreate => PendingOp::Create,
            SyncState::PendingUpdate => PendingOp::Update,
            SyncState::PendingDelete => PendingOp::Delete,
            SyncState::Clean | SyncState::Conflict => return None,
        };
        Some(Self {
            op,
            revision: note.revision,
            note: note.clone(),
        })
    }

    pub const fn local_id(&self) -> LocalId {
        self.note.local_id
    }
}

/// How a server acknowledgment landed against the current local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Note is now clean (or removed, for deletes)
    Applied,
    /// The note changed while the request was in flight and stays queued
    Superseded,
    /// The note no longer exists locally
    Missing,
}

/// Counts of changes applied by a remote refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
}

impl MergeSummary {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.removed == 0
    }
}

/// Authoritative local cache of notes and their sync state.
pub struct NoteStore {
    notes: BTreeMap<LocalId, Note>,
    /// What this store last read from or wrote to durable storage
    persisted: BTreeMap<LocalId, Note>,
    persistence: Box<dyn SnapshotStore>,
    events: broadcast::Sender<StoreEvent>,
    creates_in_flight: HashSet<LocalId>,
    last_stamp: i64,
}

impl NoteStore {
    /// Hydrate the store from durable storage.
    pub fn open(persistence: impl SnapshotStore + 'static) -> Result<Self> {
        let notes = persistence.load()?.unwrap_or_default();
        let last_stamp = notes.iter().map(|note| note.updated_at).max().unwrap_or(0);
        let pending = notes
            .iter()
            .filter(|note| note.sync_state.is_queued())
            .count();
        tracing::info!(
            "Hydrated note store: {} notes ({} pending sync)",
            notes.len(),
            pending
        );

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let notes = notes
            .into_iter()
            .map(|note| (note.local_id, note))
            .collect::<BTreeMap<_, _>>();
        Ok(Self {
            persisted: notes.clone(),
            notes,
            persistence: Box::new(persistence),
            events,
            creates_in_flight: HashSet::new(),
            last_stamp,
        })
    }

    /// Subscribe to change events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<StoreEvent> {
        self.events.clone()
    }

    /// Create a note; it starts in [`SyncState::PendingCreate`].
    pub fn create(&mut self, draft: NoteDraft) -> Result<Note> {
        let draft = draft.validate()?;
        let note = Note::from_draft(draft, self.next_stamp());
        let local_id = note.local_id;

        self.write_through(|notes| {
            notes.insert(local_id, note.clone());
            Ok(())
        })?;
        tracing::debug!("Created note {} (pending create)", local_id);
        self.emit(StoreEvent::Created(local_id));
        Ok(note)
    }

    /// Get a visible note by local or server id.
    pub fn get(&self, id: &str) -> Result<Note> {
        self.resolve(id)
            .and_then(|local_id| self.notes.get(&local_id))
            .filter(|note| note.is_visible())
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// List visible notes matching `filter`, pinned first then newest.
    pub fn list(&self, filter: &NoteFilter) -> Vec<Note> {
        let mut notes = self
            .notes
            .values()
            .filter(|note| note.is_visible() && filter.matches(note))
            .cloned()
            .collect::<Vec<_>>();
        sort_for_display(&mut notes);
        notes
    }

    /// Apply a patch, collapsing into the note's existing pending operation.
    pub fn update(&mut self, id: &str, patch: NotePatch) -> Result<Note> {
        let patch = patch.validate()?;
        let local_id = self.visible_id(id)?;
        let stamp = self.next_stamp();

        let updated = self.write_through(|notes| {
            let note = notes
                .get_mut(&local_id)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            let effect = patch.apply_to(note)?;
            if !effect.changed() {
                return Ok(None);
            }
            if effect.remote {
                note.sync_state = match note.sync_state {
                    SyncState::Clean => SyncState::PendingUpdate,
                    other => other,
                };
            }
            note.updated_at = stamp;
            note.revision += 1;
            Ok(Some(note.clone()))
        })?;

        match updated {
            Some(note) => {
                tracing::debug!("Updated note {} ({})", local_id, note.sync_state);
                self.emit(StoreEvent::Updated(local_id));
                Ok(note)
            }
            None => self.get(id),
        }
    }

    /// Flip one boolean flag through the regular update path.
    pub fn toggle(&mut self, id: &str, field: ToggleField) -> Result<Note> {
        let note = self.get(id)?;
        self.update(id, field.patch_for(&note))
    }

    /// Delete a note.
    ///
    /// A note that never reached the server (and has no create in flight) or
    /// that sits in conflict is dropped immediately; anything else is hidden
    /// and queued for deletion.
    pub fn delete(&mut self, id: &str) -> Result<DeleteAck> {
        let local_id = self.visible_id(id)?;
        let in_flight = self.creates_in_flight.contains(&local_id);
        let stamp = self.next_stamp();

        let ack = self.write_through(|notes| {
            let note = notes
                .get_mut(&local_id)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            // The server already rejected a conflicted note, so deleting it discards it.
            let local_only = note.server_id.is_none() && !in_flight;
            if local_only || note.sync_state == SyncState::Conflict {
                notes.remove(&local_id);
                return Ok(DeleteAck::Removed);
            }
            note.sync_state = SyncState::PendingDelete;
            note.updated_at = stamp;
            note.revision += 1;
            Ok(DeleteAck::Queued)
        })?;

        tracing::debug!("Deleted note {} ({:?})", local_id, ack);
        self.emit(StoreEvent::Deleted(local_id));
        Ok(ack)
    }

    /// Visible notes the server definitively rejected.
    pub fn conflicts(&self) -> Vec<Note> {
        let mut notes = self
            .notes
            .values()
            .filter(|note| note.sync_state == SyncState::Conflict)
            .cloned()
            .collect::<Vec<_>>();
        sort_for_display(&mut notes);
        notes
    }

    /// Resolve a conflicted note. Returns the resubmitted note, or `None` when discarded.
    pub fn resolve_conflict(
        &mut self,
        id: &str,
        resolution: ConflictResolution,
    ) -> Result<Option<Note>> {
        let local_id = self.visible_id(id)?;
        if self.notes.get(&local_id).map(|note| note.sync_state) != Some(SyncState::Conflict) {
            return Err(Error::Validation(format!("note {id} is not in conflict")));
        }
        let stamp = self.next_stamp();

        let resolved = self.write_through(|notes| match resolution {
            ConflictResolution::Discard => {
                notes.remove(&local_id);
                Ok(None)
            }
            ConflictResolution::Resubmit => {
                let note = notes
                    .get_mut(&local_id)
                    .ok_or_else(|| Error::NotFound(id.to_string()))?;
                note.server_id = None;
                note.sync_state = SyncState::PendingCreate;
                note.updated_at = stamp;
                note.revision += 1;
                Ok(Some(note.clone()))
            }
        })?;

        tracing::info!("Resolved conflict for note {} ({:?})", local_id, resolution);
        let event = if resolved.is_some() {
            StoreEvent::Updated(local_id)
        } else {
            StoreEvent::Deleted(local_id)
        };
        self.emit(event);
        Ok(resolved)
    }

    /// Snapshot of the sync queue, oldest mutation first.
    pub fn pending_queue(&self) -> Vec<PendingEntry> {
        let mut queue = self
            .notes
            .values()
            .filter_map(PendingEntry::for_note)
            .collect::<Vec<_>>();
        queue.sort_by(|a, b| {
            a.note
                .updated_at
                .cmp(&b.note.updated_at)
                .then_with(|| a.note.local_id.cmp(&b.note.local_id))
        });
        queue
    }

    /// Number of notes waiting for the server.
    pub fn pending_count(&self) -> usize {
        self.notes
            .values()
            .filter(|note| note.sync_state.is_queued())
            .count()
    }

    /// Every stored note, including hidden ones, in local-id order.
    pub fn snapshot(&self) -> Vec<Note> {
        self.notes.values().cloned().collect()
    }

    // ---------------------------------------------------------------------
    // Reconciler side
    // ---------------------------------------------------------------------

    /// Current queue entry for a note about to be sent.
    ///
    /// Returns `None` when the note left the queue after the pass took its
    /// snapshot (removed, resolved, or parked in conflict). A create is
    /// recorded as in flight before the lock is released, so a delete that
    /// races with it is queued rather than dropped.
    pub fn claim_pending(&mut self, local_id: LocalId) -> Option<PendingEntry> {
        let entry = self.notes.get(&local_id).and_then(PendingEntry::for_note)?;
        if entry.op == PendingOp::Create {
            self.creates_in_flight.insert(local_id);
        }
        Some(entry)
    }

    /// Forget an in-flight create that failed without reaching the server.
    pub fn clear_create_in_flight(&mut self, local_id: LocalId) {
        self.creates_in_flight.remove(&local_id);
    }

    /// Attach the server identity returned for a create.
    pub fn acknowledge_create(
        &mut self,
        local_id: LocalId,
        revision: u64,
        server: &ServerNote,
    ) -> Result<AckOutcome> {
        self.creates_in_flight.remove(&local_id);
        let outcome = self.write_through(|notes| {
            let Some(note) = notes.get_mut(&local_id) else {
                return Ok(AckOutcome::Missing);
            };
            note.server_id = Some(server.server_id.clone());
            if note.revision == revision {
                note.sync_state = SyncState::Clean;
                return Ok(AckOutcome::Applied);
            }
            if note.sync_state == SyncState::PendingCreate {
                note.sync_state = SyncState::PendingUpdate;
            }
            Ok(AckOutcome::Superseded)
        })?;
        self.emit(StoreEvent::Synced);
        Ok(outcome)
    }

    /// Mark an acknowledged update clean unless the note changed since.
    pub fn acknowledge_update(&mut self, local_id: LocalId, revision: u64) -> Result<AckOutcome> {
        let outcome = self.write_through(|notes| {
            let Some(note) = notes.get_mut(&local_id) else {
                return Ok(AckOutcome::Missing);
            };
            if note.revision != revision || note.sync_state != SyncState::PendingUpdate {
                return Ok(AckOutcome::Superseded);
            }
            note.sync_state = SyncState::Clean;
            Ok(AckOutcome::Applied)
        })?;
        self.emit(StoreEvent::Synced);
        Ok(outcome)
    }

    /// Remove a note whose delete the server acknowledged (or that never
    /// had a server identity).
    pub fn acknowledge_delete(&mut self, local_id: LocalId) -> Result<AckOutcome> {
        let outcome = self.write_through(|notes| {
            match notes.get(&local_id).map(|note| note.sync_state) {
                None => Ok(AckOutcome::Missing),
                Some(SyncState::PendingDelete) => {
                    notes.remove(&local_id);
                    Ok(AckOutcome::Applied)
                }
                Some(_) => Ok(AckOutcome::Superseded),
            }
        })?;
        self.emit(StoreEvent::Synced);
        Ok(outcome)
    }

    /// Park a note whose pending operation the server definitively rejected.
    pub fn mark_conflict(&mut self, local_id: LocalId) -> Result<AckOutcome> {
        self.creates_in_flight.remove(&local_id);
        let outcome = self.write_through(|notes| {
            let Some(note) = notes.get_mut(&local_id) else {
                return Ok(AckOutcome::Missing);
            };
            note.sync_state = SyncState::Conflict;
            Ok(AckOutcome::Applied)
        })?;
        tracing::warn!("Note {} moved to conflict", local_id);
        self.emit(StoreEvent::Synced);
        Ok(outcome)
    }

    /// Put a clean note back in the queue after a partial server update.
    pub fn requeue_update(&mut self, local_id: LocalId) -> Result<AckOutcome> {
        let outcome = self.write_through(|notes| {
            let Some(note) = notes.get_mut(&local_id) else {
                return Ok(AckOutcome::Missing);
            };
            if note.sync_state != SyncState::Clean {
                return Ok(AckOutcome::Superseded);
            }
            note.sync_state = SyncState::PendingUpdate;
            Ok(AckOutcome::Applied)
        })?;
        self.emit(StoreEvent::Synced);
        Ok(outcome)
    }

    /// Merge the authoritative remote note set into clean notes.
    ///
    /// Remote wins for clean notes, unknown remote notes are inserted clean and
    /// clean notes the server no longer reports are removed. Notes with any
    /// local pending state or conflict are left alone.
    pub fn merge_remote(&mut self, remote: Vec<ServerNote>) -> Result<MergeSummary> {
        let mut remote = remote
            .into_iter()
            .map(|note| (note.server_id.clone(), note))
            .collect::<HashMap<_, _>>();

        let summary = self.write_through(|notes| {
            let mut summary = MergeSummary::default();
            let mut known = HashSet::new();

            notes.retain(|_, note| {
                let Some(server_id) = note.server_id.clone() else {
                    return true;
                };
                known.insert(server_id.clone());
                if note.sync_state != SyncState::Clean {
                    return true;
                }
                match remote.get(&server_id) {
                    Some(server) => {
                        if server.apply_to(note) {
                            summary.updated += 1;
                        }
                        true
                    }
                    None => {
                        summary.removed += 1;
                        false
                    }
                }
            });

            remote.retain(|server_id, _| !known.contains(server_id));
            let mut fresh = remote.into_values().collect::<Vec<_>>();
            fresh.sort_by(|a, b| a.server_id.cmp(&b.server_id));
            for server in fresh {
                let now = server.updated_at.unwrap_or_else(unix_millis_now);
                let mut note = Note::from_draft(NoteDraft::default(), now);
                server.apply_to(&mut note);
                note.sync_state = SyncState::Clean;
                note.updated_at = now;
                notes.insert(note.local_id, note);
                summary.inserted += 1;
            }
            Ok(summary)
        })?;

        if !summary.is_empty() {
            tracing::info!(
                "Merged remote notes: {} inserted, {} updated, {} removed",
                summary.inserted,
                summary.updated,
                summary.removed
            );
            self.emit(StoreEvent::Synced);
        }
        Ok(summary)
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    /// Resolve a local or server id to the local key.
    fn resolve(&self, id: &str) -> Option<LocalId> {
        let id = id.trim();
        if let Ok(local_id) = id.parse::<LocalId>() {
            if self.notes.contains_key(&local_id) {
                return Some(local_id);
            }
        }
        self.notes
            .values()
            .find(|note| note.server_id.as_deref() == Some(id))
            .map(|note| note.local_id)
    }

    /// Resolve an id that must point at a visible note.
    ///
    /// Pending deletes are hidden, so edits on them are rejected as not found.
    fn visible_id(&self, id: &str) -> Result<LocalId> {
        self.resolve(id)
            .filter(|local_id| {
                self.notes
                    .get(local_id)
                    .is_some_and(Note::is_visible)
            })
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Strictly increasing mutation timestamp.
    fn next_stamp(&mut self) -> i64 {
        self.last_stamp = unix_millis_now().max(self.last_stamp + 1);
        self.last_stamp
    }

    /// Apply `change` and persist the full note set, rolling back on failure.
    fn write_through<R>(
        &mut self,
        change: impl FnOnce(&mut BTreeMap<LocalId, Note>) -> Result<R>,
    ) -> Result<R> {
        let backup = self.notes.clone();
        let result = change(&mut self.notes).and_then(|value| {
            self.persist()?;
            Ok(value)
        });
        if let Err(error) = &result {
            tracing::warn!("Store write rolled back: {}", error);
            self.notes = backup;
        }
        result
    }

    /// Save the note set, folding in what other processes stored since this
    /// store last touched durable storage.
    fn persist(&mut self) -> Result<()> {
        let base = &self.persisted;
        let mine = &self.notes;
        let stored = self
            .persistence
            .save_merged(&mut |persisted| merge_snapshots(base, mine, persisted))?
            .into_iter()
            .map(|note| (note.local_id, note))
            .collect::<BTreeMap<_, _>>();

        if stored != self.notes {
            tracing::debug!("Picked up note changes saved by another process");
            self.last_stamp = stored
                .values()
                .map(|note| note.updated_at)
                .fold(self.last_stamp, i64::max);
            self.notes = stored.clone();
            self.emit(StoreEvent::Synced);
        }
        self.persisted = stored;
        Ok(())
    }

    fn emit(&self, event: StoreEvent) {
        // No receivers is fine: nothing is listening yet.
        let _ = self.events.send(event);
    }
}

/// Three-way merge of this store's notes with the persisted set.
///
/// `base` is what the store last read or wrote. Notes changed here since then
/// win; every other note follows the persisted copy, so edits and deletes
/// saved by another process survive. A note another process removed stays
/// removed, unless it gained a server identity here meanwhile: then it is
/// queued for deletion so the server copy does not come back on refresh.
fn merge_snapshots(
    base: &BTreeMap<LocalId, Note>,
    mine: &BTreeMap<LocalId, Note>,
    persisted: Vec<Note>,
) -> Vec<Note> {
    let mut theirs = persisted
        .into_iter()
        .map(|note| (note.local_id, note))
        .collect::<BTreeMap<_, _>>();
    let ids = base
        .keys()
        .chain(mine.keys())
        .chain(theirs.keys())
        .copied()
        .collect::<BTreeSet<_>>();

    let mut merged = Vec::with_capacity(ids.len());
    for id in ids {
        let known = base.get(&id);
        let ours = mine.get(&id);
        let persisted = theirs.remove(&id);
        let note = if ours == known {
            persisted
        } else if known.is_some() && persisted.is_none() {
            ours.filter(|note| {
                note.server_id.is_some() && known.is_some_and(|before| before.server_id.is_none())
            })
            .map(|note| Note {
                sync_state: SyncState::PendingDelete,
                ..note.clone()
            })
        } else {
            ours.cloned()
        };
        merged.extend(note);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, MemorySnapshotStore, SqliteSnapshotStore};
    use pretty_assertions::assert_eq;

    fn open_store() -> (NoteStore, MemorySnapshotStore) {
        let persistence = MemorySnapshotStore::new();
        let store = NoteStore::open(persistence.clone()).unwrap();
        (store, persistence)
    }

    fn server_note(server_id: &str, title: &str) -> ServerNote {
        ServerNote {
            server_id: server_id.to_string(),
            title: title.to_string(),
            content: String::new(),
            tags: Vec::new(),
            reminder_at: None,
            pinned: false,
            favorite: false,
            archived: false,
            created_at: Some(1),
            updated_at: Some(2),
        }
    }

    fn ack_clean(store: &mut NoteStore, note: &Note, server_id: &str) {
        store
            .acknowledge_create(note.local_id, note.revision, &server_note(server_id, &note.title))
            .unwrap();
    }

    #[test]
    fn create_starts_pending_and_persists() {
        let (mut store, persistence) = open_store();
        let note = store.create(NoteDraft::new("Idea", "body")).unwrap();
        assert_eq!(note.sync_state, SyncState::PendingCreate);
        assert_eq!(persistence.write_count(), 1);

        let reopened = NoteStore::open(persistence).unwrap();
        assert_eq!(reopened.get(&note.local_id.as_str()).unwrap(), note);
    }

    #[test]
    fn create_rejects_invalid_draft_without_writing() {
        let (mut store, persistence) = open_store();
        let error = store.create(NoteDraft::new(" ", "")).unwrap_err();
        assert!(matches!(error, Error::Validation(_)));
        assert_eq!(persistence.write_count(), 0);
        assert!(store.list(&NoteFilter::all()).is_empty());
    }

    #[test]
    fn edit_after_create_stays_pending_create() {
        let (mut store, _) = open_store();
        let note = store.create(NoteDraft::new("a", "")).unwrap();
        let updated = store
            .update(
                &note.local_id.as_str(),
                NotePatch {
                    content: Some("more".to_string()),
                    ..NotePatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.sync_state, SyncState::PendingCreate);
        assert_eq!(updated.revision, 1);
        assert!(updated.updated_at > note.updated_at);
        assert_eq!(store.pending_queue().len(), 1);
    }

    #[test]
    fn edit_on_clean_note_becomes_pending_update() {
        let (mut store, _) = open_store();
        let note = store.create(NoteDraft::new("a", "")).unwrap();
        ack_clean(&mut store, &note, "s1");

        let updated = store.toggle("s1", ToggleField::Pinned).unwrap();
        assert!(updated.pinned);
        assert_eq!(updated.sync_state, SyncState::PendingUpdate);

        let again = store.toggle("s1", ToggleField::Favorite).unwrap();
        assert_eq!(again.sync_state, SyncState::PendingUpdate);
        assert_eq!(store.pending_queue().len(), 1);
    }

    #[test]
    fn lock_toggle_is_local_only() {
        let (mut store, _) = open_store();
        let note = store.create(NoteDraft::new("a", "")).unwrap();
        ack_clean(&mut store, &note, "s1");

        let locked = store.toggle("s1", ToggleField::Locked).unwrap();
        assert!(locked.locked);
        assert_eq!(locked.sync_state, SyncState::Clean);
        assert!(store.pending_queue().is_empty());
    }

    #[test]
    fn lock_with_unchanged_remote_fields_stays_clean() {
        let (mut store, _) = open_store();
        let note = store.create(NoteDraft::new("a", "")).unwrap();
        ack_clean(&mut store, &note, "s1");

        let patch = NotePatch {
            title: Some("a".to_string()),
            locked: Some(true),
            ..NotePatch::default()
        };
        let locked = store.update("s1", patch).unwrap();
        assert!(locked.locked);
        assert_eq!(locked.sync_state, SyncState::Clean);
        assert!(store.pending_queue().is_empty());
    }

    #[test]
    fn claim_reflects_changes_since_the_queue_snapshot() {
        let (mut store, _) = open_store();
        let kept = store.create(NoteDraft::new("kept", "")).unwrap();
        let dropped = store.create(NoteDraft::new("dropped", "")).unwrap();
        let queue = store.pending_queue();
        assert_eq!(queue.len(), 2);

        store.delete(&dropped.local_id.as_str()).unwrap();
        let renamed = store
            .update(
                &kept.local_id.as_str(),
                NotePatch {
                    title: Some("renamed".to_string()),
                    ..NotePatch::default()
                },
            )
            .unwrap();

        assert_eq!(store.claim_pending(dropped.local_id), None);
        let claimed = store.claim_pending(kept.local_id).unwrap();
        assert_eq!(claimed.op, PendingOp::Create);
        assert_eq!(claimed.revision, renamed.revision);
        assert_eq!(claimed.note.title, "renamed");

        // The claimed create is in flight, so deleting it now must reach the server.
        assert_eq!(store.delete(&kept.local_id.as_str()).unwrap(), DeleteAck::Queued);
    }

    #[test]
    fn unchanged_patch_does_not_queue() {
        let (mut store, persistence) = open_store();
        let note = store.create(NoteDraft::new("a", "")).unwrap();
        ack_clean(&mut store, &note, "s1");
        let writes = persistence.write_count();

        let same = store
            .update(
                "s1",
                NotePatch {
                    title: Some("a".to_string()),
                    ..NotePatch::default()
                },
            )
            .unwrap();
        assert_eq!(same.sync_state, SyncState::Clean);
        assert_eq!(persistence.write_count(), writes + 1);
    }

    #[test]
    fn delete_of_unsynced_note_is_local_cancel() {
        let (mut store, _) = open_store();
        let note = store.create(NoteDraft::new("a", "")).unwrap();
        store
            .update(
                &note.local_id.as_str(),
                NotePatch {
                    title: Some("b".to_string()),
                    ..NotePatch::default()
                },
            )
            .unwrap();

        let ack = store.delete(&note.local_id.as_str()).unwrap();
        assert_eq!(ack, DeleteAck::Removed);
        assert!(store.snapshot().is_empty());
        assert!(store.pending_queue().is_empty());
    }

    #[test]
    fn delete_of_synced_note_hides_and_queues() {
        let (mut store, _) = open_store();
        let note = store.create(NoteDraft::new("a", "")).unwrap();
        ack_clean(&mut store, &note, "s1");

        assert_eq!(store.delete("s1").unwrap(), DeleteAck::Queued);
        assert!(store.list(&NoteFilter::all()).is_empty());
        assert!(matches!(store.get("s1"), Err(Error::NotFound(_))));

        let queue = store.pending_queue();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].op, PendingOp::Delete);
    }

    #[test]
    fn edits_on_pending_delete_are_rejected() {
        let (mut store, _) = open_store();
        let note = store.create(NoteDraft::new("a", "")).unwrap();
        ack_clean(&mut store, &note, "s1");
        store.delete("s1").unwrap();

        let patch = NotePatch {
            title: Some("revived".to_string()),
            ..NotePatch::default()
        };
        assert!(matches!(store.update("s1", patch), Err(Error::NotFound(_))));
        assert!(matches!(
            store.toggle("s1", ToggleField::Pinned),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(store.delete("s1"), Err(Error::NotFound(_))));
    }

    #[test]
    fn delete_during_in_flight_create_is_queued() {
        let (mut store, _) = open_store();
        let note = store.create(NoteDraft::new("a", "")).unwrap();
        store.claim_pending(note.local_id).unwrap();

        assert_eq!(store.delete(&note.local_id.as_str()).unwrap(), DeleteAck::Queued);

        let outcome = store
            .acknowledge_create(note.local_id, note.revision, &server_note("s9", "a"))
            .unwrap();
        assert_eq!(outcome, AckOutcome::Superseded);
        let queue = store.pending_queue();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].op, PendingOp::Delete);
        assert_eq!(queue[0].note.server_id.as_deref(), Some("s9"));
    }

    #[test]
    fn create_ack_after_local_edit_keeps_edit_pending() {
        let (mut store, _) = open_store();
        let note = store.create(NoteDraft::new("a", "")).unwrap();
        store.claim_pending(note.local_id).unwrap();
        store
            .update(
                &note.local_id.as_str(),
                NotePatch {
                    title: Some("edited".to_string()),
                    ..NotePatch::default()
                },
            )
            .unwrap();

        store
            .acknowledge_create(note.local_id, note.revision, &server_note("s1", "a"))
            .unwrap();
        let current = store.get("s1").unwrap();
        assert_eq!(current.sync_state, SyncState::PendingUpdate);
        assert_eq!(current.title, "edited");
    }

    #[test]
    fn update_ack_is_superseded_by_newer_edit() {
        let (mut store, _) = open_store();
        let note = store.create(NoteDraft::new("a", "")).unwrap();
        ack_clean(&mut store, &note, "s1");
        let edited = store.toggle("s1", ToggleField::Pinned).unwrap();
        store.toggle("s1", ToggleField::Archived).unwrap();

        let outcome = store
            .acknowledge_update(edited.local_id, edited.revision)
            .unwrap();
        assert_eq!(outcome, AckOutcome::Superseded);
        assert_eq!(
            store.get("s1").unwrap().sync_state,
            SyncState::PendingUpdate
        );
    }

    #[test]
    fn conflict_resolution_resubmit_and_discard() {
        let (mut store, _) = open_store();
        let first = store.create(NoteDraft::new("first", "")).unwrap();
        let second = store.create(NoteDraft::new("second", "")).unwrap();
        ack_clean(&mut store, &first, "s1");
        ack_clean(&mut store, &second, "s2");
        store.mark_conflict(first.local_id).unwrap();
        store.mark_conflict(second.local_id).unwrap();
        assert_eq!(store.conflicts().len(), 2);
        assert!(store.pending_queue().is_empty());

        let resubmitted = store
            .resolve_conflict("s1", ConflictResolution::Resubmit)
            .unwrap()
            .unwrap();
        assert_eq!(resubmitted.sync_state, SyncState::PendingCreate);
        assert!(resubmitted.server_id.is_none());

        assert_eq!(
            store
                .resolve_conflict("s2", ConflictResolution::Discard)
                .unwrap(),
            None
        );
        assert!(store.conflicts().is_empty());
        assert_eq!(store.pending_queue().len(), 1);
    }

    #[test]
    fn resolving_a_clean_note_is_rejected() {
        let (mut store, _) = open_store();
        let note = store.create(NoteDraft::new("a", "")).unwrap();
        let error = store
            .resolve_conflict(&note.local_id.as_str(), ConflictResolution::Discard)
            .unwrap_err();
        assert!(matches!(error, Error::Validation(_)));
    }

    #[test]
    fn queue_is_ordered_oldest_first() {
        let (mut store, _) = open_store();
        let a = store.create(NoteDraft::new("a", "")).unwrap();
        let b = store.create(NoteDraft::new("b", "")).unwrap();
        store
            .update(
                &a.local_id.as_str(),
                NotePatch {
                    title: Some("a2".to_string()),
                    ..NotePatch::default()
                },
            )
            .unwrap();

        let order = store
            .pending_queue()
            .iter()
            .map(PendingEntry::local_id)
            .collect::<Vec<_>>();
        assert_eq!(order, vec![b.local_id, a.local_id]);
    }

    #[test]
    fn failed_persist_rolls_back() {
        let (mut store, persistence) = open_store();
        let note = store.create(NoteDraft::new("a", "")).unwrap();
        persistence.fail_writes(true);

        let error = store
            .update(
                &note.local_id.as_str(),
                NotePatch {
                    title: Some("lost".to_string()),
                    ..NotePatch::default()
                },
            )
            .unwrap_err();
        assert!(matches!(error, Error::Database(_)));
        assert_eq!(store.get(&note.local_id.as_str()).unwrap().title, "a");
    }

    #[test]
    fn merge_remote_respects_local_state() {
        let (mut store, _) = open_store();
        let clean = store.create(NoteDraft::new("clean", "")).unwrap();
        let gone = store.create(NoteDraft::new("gone", "")).unwrap();
        let edited = store.create(NoteDraft::new("edited", "")).unwrap();
        let deleted = store.create(NoteDraft::new("deleted", "")).unwrap();
        ack_clean(&mut store, &clean, "s1");
        ack_clean(&mut store, &gone, "s2");
        ack_clean(&mut store, &edited, "s3");
        ack_clean(&mut store, &deleted, "s4");
        store.toggle("s3", ToggleField::Pinned).unwrap();
        store.delete("s4").unwrap();
        let offline = store.create(NoteDraft::new("offline", "")).unwrap();

        let summary = store
            .merge_remote(vec![
                server_note("s1", "clean from server"),
                server_note("s4", "deleted"),
                server_note("s5", "new on server"),
            ])
            .unwrap();
        assert_eq!(
            summary,
            MergeSummary {
                inserted: 1,
                updated: 1,
                removed: 1,
            }
        );

        assert_eq!(store.get("s1").unwrap().title, "clean from server");
        assert!(store.get("s2").is_err());
        assert_eq!(store.get("s3").unwrap().sync_state, SyncState::PendingUpdate);
        assert!(store.get("s4").is_err());
        assert_eq!(store.get("s5").unwrap().sync_state, SyncState::Clean);
        assert_eq!(
            store.get(&offline.local_id.as_str()).unwrap().sync_state,
            SyncState::PendingCreate
        );
    }

    #[test]
    fn merge_preserves_lock_flag() {
        let (mut store, _) = open_store();
        let note = store.create(NoteDraft::new("a", "")).unwrap();
        ack_clean(&mut store, &note, "s1");
        store.toggle("s1", ToggleField::Locked).unwrap();

        store.merge_remote(vec![server_note("s1", "renamed")]).unwrap();
        let merged = store.get("s1").unwrap();
        assert!(merged.locked);
        assert_eq!(merged.title, "renamed");
    }

    #[test]
    fn mutations_emit_events() {
        let (mut store, _) = open_store();
        let mut events = store.subscribe();
        let note = store.create(NoteDraft::new("a", "")).unwrap();
        store.delete(&note.local_id.as_str()).unwrap();

        assert_eq!(events.try_recv().unwrap(), StoreEvent::Created(note.local_id));
        assert_eq!(events.try_recv().unwrap(), StoreEvent::Deleted(note.local_id));
    }

    fn titles(store: &NoteStore) -> Vec<String> {
        let mut titles = store
            .list(&NoteFilter::all())
            .into_iter()
            .map(|note| note.title)
            .collect::<Vec<_>>();
        titles.sort();
        titles
    }

    #[test]
    fn refresh_keeps_note_added_by_another_process() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notes.db");
        let open = || {
            NoteStore::open(SqliteSnapshotStore::new(Database::open(&path).unwrap())).unwrap()
        };
        let mut watcher = open();
        let mut terminal = open();

        let added = terminal
            .create(NoteDraft::new("from another terminal", ""))
            .unwrap();
        watcher.merge_remote(Vec::new()).unwrap();

        assert_eq!(
            watcher.get(&added.local_id.as_str()).unwrap().sync_state,
            SyncState::PendingCreate
        );
        drop((watcher, terminal));
        assert_eq!(titles(&open()), vec!["from another terminal".to_string()]);
    }

    #[test]
    fn stale_copy_does_not_overwrite_newer_edit() {
        let persistence = MemorySnapshotStore::new();
        let mut first = NoteStore::open(persistence.clone()).unwrap();
        let a = first.create(NoteDraft::new("a", "")).unwrap();
        let mut second = NoteStore::open(persistence.clone()).unwrap();

        first
            .update(
                &a.local_id.as_str(),
                NotePatch {
                    title: Some("a2".to_string()),
                    ..NotePatch::default()
                },
            )
            .unwrap();
        second.create(NoteDraft::new("b", "")).unwrap();

        assert_eq!(second.get(&a.local_id.as_str()).unwrap().title, "a2");
        let reopened = NoteStore::open(persistence).unwrap();
        assert_eq!(titles(&reopened), vec!["a2".to_string(), "b".to_string()]);
    }

    #[test]
    fn note_removed_elsewhere_during_create_is_queued_for_delete() {
        let persistence = MemorySnapshotStore::new();
        let mut syncing = NoteStore::open(persistence.clone()).unwrap();
        let note = syncing.create(NoteDraft::new("racing", "")).unwrap();
        let mut other = NoteStore::open(persistence.clone()).unwrap();

        let claimed = syncing.claim_pending(note.local_id).unwrap();
        assert_eq!(other.delete(&note.local_id.as_str()).unwrap(), DeleteAck::Removed);
        syncing
            .acknowledge_create(note.local_id, claimed.revision, &server_note("s1", "racing"))
            .unwrap();

        let queue = syncing.pending_queue();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].op, PendingOp::Delete);
        assert_eq!(queue[0].note.server_id.as_deref(), Some("s1"));
        assert_eq!(NoteStore::open(persistence).unwrap().pending_queue(), queue);
    }
}
