//! smartnotes-core - Core library for SmartNotes
//!
//! This crate contains the offline-first note engine shared by every SmartNotes
//! front-end: the local note store, the sync reconciler, connectivity
//! tracking, reminder scheduling and the session lifecycle.

pub mod auth;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod models;
pub mod reminders;
pub mod services;
pub mod state;
pub mod store;
pub mod sync;
pub mod util;

pub use auth::{AuthClient, AuthError, ExpiryReason, Session, SessionManager, SessionPersistence};
pub use config::ClientConfig;
pub use connectivity::{ConnectivityMonitor, ConnectivityProbe};
pub use error::{Error, Result};
pub use models::{LocalId, Note, NoteDraft, NoteFilter, NotePatch, SyncState, ToggleField};
pub use reminders::{NotificationSink, ReminderNotice, ReminderScheduler};
pub use services::{BackgroundTasks, NotesService};
pub use state::SyncStatus;
pub use store::{ConflictResolution, DeleteAck, NoteStore, SharedStore, StoreEvent};
pub use sync::{ItemOutcome, NotesApi, ReconcileReport, Reconciler, SkipReason};
