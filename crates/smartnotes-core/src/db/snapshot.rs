//! Durable snapshot of the local note set
//!
//! The whole note collection is serialized as one JSON document stored under a
//! well-known key. Every write reads the current snapshot and replaces it in a
//! single transaction, so readers never observe a partial collection and
//! writers in other processes never overwrite each other blindly.

use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::Note;

use super::Database;

/// Key the note snapshot is stored under
pub const NOTES_SNAPSHOT_KEY: &str = "notes.snapshot";

const SNAPSHOT_VERSION: u32 = 1;

/// Trait for durable note-set storage
pub trait SnapshotStore: Send {
    /// Load the last persisted note set, `None` when nothing was ever saved
    fn load(&self) -> Result<Option<Vec<Note>>>;

    /// Read the persisted note set, hand it to `merge` and store the result,
    /// all in one transaction. Returns the stored set.
    fn save_merged(
        &mut self,
        merge: &mut dyn FnMut(Vec<Note>) -> Vec<Note>,
    ) -> Result<Vec<Note>>;

    /// Atomically replace the persisted note set
    fn save(&mut self, notes: &[Note]) -> Result<()> {
        self.save_merged(&mut |_| notes.to_vec()).map(drop)
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    notes: &'a [Note],
}

#[derive(Deserialize)]
struct SnapshotOwned {
    version: u32,
    notes: Vec<Note>,
}

fn encode(notes: &[Note]) -> Result<String> {
    Ok(serde_json::to_string(&SnapshotRef {
        version: SNAPSHOT_VERSION,
        notes,
    })?)
}

fn decode(raw: &str) -> Result<Vec<Note>> {
    let snapshot: SnapshotOwned = serde_json::from_str(raw)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(Error::Database(format!(
            "unsupported note snapshot version {} (expected {SNAPSHOT_VERSION})",
            snapshot.version
        )));
    }
    Ok(snapshot.notes)
}

fn read_snapshot(conn: &Connection) -> Result<Option<Vec<Note>>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM kv_store WHERE key = ?",
            params![NOTES_SNAPSHOT_KEY],
            |row| row.get(0),
        )
        .optional()?;

    raw.as_deref().map(decode).transpose()
}

/// `SQLite` implementation of `SnapshotStore`
pub struct SqliteSnapshotStore {
    db: Database,
}

impl SqliteSnapshotStore {
    /// Create a snapshot store on top of an opened database
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    pub const fn database(&self) -> &Database {
        &self.db
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn load(&self) -> Result<Option<Vec<Note>>> {
        read_snapshot(self.db.connection())
    }

    fn save_merged(
        &mut self,
        merge: &mut dyn FnMut(Vec<Note>) -> Vec<Note>,
    ) -> Result<Vec<Note>> {
        // IMMEDIATE takes the write lock before reading, so no other process
        // can save between the read and the write.
        let tx = self
            .db
            .connection_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let notes = merge(read_snapshot(&tx)?.unwrap_or_default());
        let raw = encode(&notes)?;
        let now = chrono::Utc::now().timestamp_millis();

        tx.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![NOTES_SNAPSHOT_KEY, raw, now],
        )?;
        tx.commit()?;
        Ok(notes)
    }
}

/// In-memory `SnapshotStore`, shared between clones.
///
/// Used for ephemeral sessions and tests; a failure can be injected to
/// exercise write-through rollback.
#[derive(Clone, Default)]
pub struct MemorySnapshotStore {
    inner: Arc<Mutex<MemorySnapshotState>>,
}

#[derive(Default)]
struct MemorySnapshotState {
    raw: Option<String>,
    fail_writes: bool,
    writes: usize,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent saves fail until called again with `false`
    pub fn fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Number of successful saves so far
    pub fn write_count(&self) -> usize {
        self.state().writes
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemorySnapshotState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<Vec<Note>>> {
        self.state().raw.as_deref().map(decode).transpose()
    }

    fn save_merged(
        &mut self,
        merge: &mut dyn FnMut(Vec<Note>) -> Vec<Note>,
    ) -> Result<Vec<Note>> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(Error::Database("snapshot write rejected".to_string()));
        }
        let persisted = state.raw.as_deref().map(decode).transpose()?;
        let notes = merge(persisted.unwrap_or_default());
        state.raw = Some(encode(&notes)?);
        state.writes += 1;
        Ok(notes)
    }
}
