//! Reconciliation of the local store with the remote note API.

mod api;
mod reconciler;
mod worker;

pub use api::{
    format_local_datetime, parse_local_datetime, ApiError, ApiResult, HttpNotesApi, NotesApi,
    RemoteFlag,
};
pub use reconciler::{
    ItemOutcome, ItemReport, ReconcileReport, Reconciler, RefreshStatus, SkipReason,
};
pub use worker::SyncWorker;
