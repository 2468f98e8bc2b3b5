//! Durable local storage for the note cache

mod connection;
mod migrations;
mod snapshot;

pub use connection::Database;
pub use snapshot::{MemorySnapshotStore, SnapshotStore, SqliteSnapshotStore, NOTES_SNAPSHOT_KEY};
