//! Sync reconciler
//!
//! Drains the pending queue against the remote API and merges the server's
//! note set back into clean notes. Only one pass runs at a time; callers that
//! arrive mid-pass share a single follow-up pass.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

use crate::auth::{ExpiryReason, SessionManager};
use crate::connectivity::ConnectivityMonitor;
use crate::models::{LocalId, ServerNote};
use crate::store::{AckOutcome, MergeSummary, PendingEntry, PendingOp, SharedStore};

use super::api::{ApiError, ApiResult, NotesApi, RemoteFlag};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one queued note within a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The server accepted the operation
    Applied,
    /// Not completed this pass; stays queued
    Retrying,
    /// The server definitively rejected it; parked until the user decides
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub local_id: LocalId,
    pub server_id: Option<String>,
    pub op: PendingOp,
    pub outcome: ItemOutcome,
}

/// Result of the post-drain `GET /notes` refresh.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RefreshStatus {
    Merged(MergeSummary),
    Failed(String),
    #[default]
    Skipped,
}

/// Why a pass made no network calls at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    NoSession,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    /// Sequence number of the pass that produced this report
    pub pass: u64,
    pub items: Vec<ItemReport>,
    pub refresh: RefreshStatus,
    pub skipped: Option<SkipReason>,
}

impl ReconcileReport {
    const fn new(pass: u64) -> Self {
        Self {
            pass,
            items: Vec::new(),
            refresh: RefreshStatus::Skipped,
            skipped: None,
        }
    }

    fn skipped(pass: u64, reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::new(pass)
        }
    }

    pub fn count(&self, outcome: ItemOutcome) -> usize {
        self.items
            .iter()
            .filter(|item| item.outcome == outcome)
            .count()
    }

    /// Everything queued was applied and the refresh merged.
    pub fn is_fully_synced(&self) -> bool {
        self.skipped.is_none()
            && self.count(ItemOutcome::Applied) == self.items.len()
            && matches!(self.refresh, RefreshStatus::Merged(_))
    }

    fn push(&mut self, entry: &PendingEntry, server_id: Option<String>, outcome: ItemOutcome) {
        self.items.push(ItemReport {
            local_id: entry.local_id(),
            server_id: server_id.or_else(|| entry.note.server_id.clone()),
            op: entry.op,
            outcome,
        });
    }
}

#[derive(Default)]
struct PassState {
    running: bool,
    follow_up: bool,
    started: u64,
}

/// Stop issuing calls for the rest of the pass.
struct Halt;

type Step = Result<(ItemOutcome, Option<String>), Halt>;

/// Cloneable handle to the reconciler.
#[derive(Clone)]
pub struct Reconciler {
    store: SharedStore,
    api: Arc<dyn NotesApi>,
    session: SessionManager,
    connectivity: ConnectivityMonitor,
    call_timeout: Duration,
    state: Arc<Mutex<PassState>>,
    reports: Arc<watch::Sender<Option<ReconcileReport>>>,
}

impl Reconciler {
    pub fn new(
        store: SharedStore,
        api: Arc<dyn NotesApi>,
        session: SessionManager,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        let (reports, _) = watch::channel(None);
        Self {
            store,
            api,
            session,
            connectivity,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            state: Arc::new(Mutex::new(PassState::default())),
            reports: Arc::new(reports),
        }
    }

    /// Upper bound for a single remote call; expiry counts as a transient failure.
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Latest completed pass, if any.
    pub fn last_report(&self) -> Option<ReconcileReport> {
        self.reports.borrow().clone()
    }

    /// Run a pass, or join the follow-up of the pass already running.
    ///
    /// Passes run on a spawned task, so dropping this future never abandons a
    /// pass halfway.
    pub async fn reconcile(&self) -> ReconcileReport {
        let mut reports = self.reports.subscribe();
        let target = {
            let mut state = self.lock_state();
            if state.running {
                state.follow_up = true;
                state.started + 1
            } else {
                state.running = true;
                state.started += 1;
                let driver = self.clone();
                tokio::spawn(async move { driver.drive().await });
                state.started
            }
        };

        let report = reports
            .wait_for(|report| report.as_ref().is_some_and(|report| report.pass >= target))
            .await
            .ok()
            .and_then(|report| report.clone());
        report.unwrap_or_else(|| ReconcileReport::skipped(target, SkipReason::Offline))
    }

    async fn drive(self) {
        loop {
            let pass = self.lock_state().started;
            let report = self.run_pass(pass).await;
            self.reports.send_replace(Some(report));

            let mut state = self.lock_state();
            if state.follow_up {
                state.follow_up = false;
                state.started += 1;
            } else {
                state.running = false;
                return;
            }
        }
    }

    async fn run_pass(&self, pass: u64) -> ReconcileReport {
        if !self.connectivity.is_online() {
            tracing::debug!("Reconcile pass {} skipped: offline", pass);
            return ReconcileReport::skipped(pass, SkipReason::Offline);
        }
        if !self.session.is_valid() {
            tracing::debug!("Reconcile pass {} skipped: no valid session", pass);
            return ReconcileReport::skipped(pass, SkipReason::NoSession);
        }

        let queue = self.store.with(|store| store.pending_queue());
        if !queue.is_empty() {
            tracing::info!("Reconcile pass {}: {} pending notes", pass, queue.len());
        }

        let mut report = ReconcileReport::new(pass);
        let mut halted = false;
        for queued in &queue {
            if halted || !self.may_call() {
                halted = true;
                report.push(queued, None, ItemOutcome::Retrying);
                continue;
            }
            // Earlier items awaited the network; send what the note is now.
            let Some(entry) = self
                .store
                .with(|store| store.claim_pending(queued.local_id()))
            else {
                tracing::debug!("Note {} left the sync queue before it was sent", queued.local_id());
                continue;
            };
            match self.sync_entry(&entry).await {
                Ok((outcome, server_id)) => report.push(&entry, server_id, outcome),
                Err(Halt) => {
                    halted = true;
                    report.push(&entry, None, ItemOutcome::Retrying);
                }
            }
        }

        if !halted && self.may_call() {
            report.refresh = self.refresh().await;
        }
        tracing::debug!(
            "Reconcile pass {} finished: {} applied, {} retrying, {} conflicts",
            pass,
            report.count(ItemOutcome::Applied),
            report.count(ItemOutcome::Retrying),
            report.count(ItemOutcome::Conflict)
        );
        report
    }

    fn may_call(&self) -> bool {
        self.connectivity.is_online() && self.session.is_valid()
    }

    async fn sync_entry(&self, entry: &PendingEntry) -> Step {
        match entry.op {
            PendingOp::Create => self.push_create(entry).await,
            PendingOp::Update => self.push_update(entry).await,
            PendingOp::Delete => self.push_delete(entry).await,
        }
    }

    async fn push_create(&self, entry: &PendingEntry) -> Step {
        let local_id = entry.local_id();
        let created = match self.call(self.api.create_note(&entry.note)).await {
            Ok(created) => created,
            Err(error) => {
                self.store
                    .with(|store| store.clear_create_in_flight(local_id));
                return self.fail(entry, error);
            }
        };
        let server_id = Some(created.server_id.clone());
        tracing::debug!("Created note {} on server as {}", local_id, created.server_id);

        let ack = self
            .store
            .with(|store| store.acknowledge_create(local_id, entry.revision, &created));
        match ack {
            Ok(AckOutcome::Applied) => {
                let outcome = self.converge_flags(entry, created).await?;
                Ok((outcome, server_id))
            }
            Ok(_) => Ok((ItemOutcome::Applied, server_id)),
            Err(error) => {
                tracing::error!("Failed to record server id for note {}: {}", local_id, error);
                Ok((ItemOutcome::Retrying, server_id))
            }
        }
    }

    async fn push_update(&self, entry: &PendingEntry) -> Step {
        let local_id = entry.local_id();
        let Some(server_id) = entry.note.server_id.clone() else {
            return Ok((ItemOutcome::Retrying, None));
        };

        let updated = match self.call(self.api.update_note(&server_id, &entry.note)).await {
            Ok(updated) => updated,
            Err(error) => return self.fail(entry, error),
        };

        let ack = self
            .store
            .with(|store| store.acknowledge_update(local_id, entry.revision));
        match ack {
            Ok(AckOutcome::Applied) => {
                let outcome = self.converge_flags(entry, updated).await?;
                Ok((outcome, Some(server_id)))
            }
            Ok(_) => Ok((ItemOutcome::Applied, Some(server_id))),
            Err(error) => {
                tracing::error!("Failed to mark note {} clean: {}", local_id, error);
                Ok((ItemOutcome::Retrying, Some(server_id)))
            }
        }
    }

    async fn push_delete(&self, entry: &PendingEntry) -> Step {
        let local_id = entry.local_id();
        if let Some(server_id) = entry.note.server_id.as_deref() {
            if let Err(error) = self.call(self.api.delete_note(server_id)).await {
                return self.fail(entry, error);
            }
        }

        match self.store.with(|store| store.acknowledge_delete(local_id)) {
            Ok(_) => Ok((ItemOutcome::Applied, entry.note.server_id.clone())),
            Err(error) => {
                tracing::error!("Failed to drop deleted note {}: {}", local_id, error);
                Ok((ItemOutcome::Retrying, entry.note.server_id.clone()))
            }
        }
    }

    /// Toggle server flags until they match what was sent.
    ///
    /// The update endpoint ignores `pinned`, `favorite` and `archived`, so the
    /// echo is compared flag by flag and the toggle endpoints close the gap.
    async fn converge_flags(
        &self,
        entry: &PendingEntry,
        mut echo: ServerNote,
    ) -> Result<ItemOutcome, Halt> {
        for flag in RemoteFlag::ALL {
            if flag.remote_value(&echo) == flag.local_value(&entry.note) {
                continue;
            }
            if !self.may_call() {
                self.requeue(entry);
                return Err(Halt);
            }
            match self.call(self.api.toggle_flag(&echo.server_id, flag)).await {
                Ok(toggled) => echo = toggled,
                Err(error) => {
                    self.requeue(entry);
                    return self.fail(entry, error).map(|(outcome, _)| outcome);
                }
            }
        }
        Ok(ItemOutcome::Applied)
    }

    fn requeue(&self, entry: &PendingEntry) {
        let local_id = entry.local_id();
        if let Err(error) = self.store.with(|store| store.requeue_update(local_id)) {
            tracing::error!("Failed to requeue note {}: {}", local_id, error);
        }
    }

    fn fail(&self, entry: &PendingEntry, error: ApiError) -> Step {
        let local_id = entry.local_id();
        match error {
            ApiError::Unauthorized(status) => {
                self.session.invalidate(ExpiryReason::Rejected(status));
                Err(Halt)
            }
            ApiError::NoSession => Err(Halt),
            ApiError::NotFound(message) => {
                tracing::warn!("Server rejected note {}: {}", local_id, message);
                if let Err(error) = self.store.with(|store| store.mark_conflict(local_id)) {
                    tracing::error!("Failed to park note {} in conflict: {}", local_id, error);
                    return Ok((ItemOutcome::Retrying, None));
                }
                Ok((ItemOutcome::Conflict, None))
            }
            ApiError::Transient(message) => {
                tracing::warn!("Sync of note {} will be retried: {}", local_id, message);
                Ok((ItemOutcome::Retrying, None))
            }
        }
    }

    async fn refresh(&self) -> RefreshStatus {
        let remote = match self.call(self.api.list_notes()).await {
            Ok(remote) => remote,
            Err(ApiError::Unauthorized(status)) => {
                self.session.invalidate(ExpiryReason::Rejected(status));
                return RefreshStatus::Failed(format!("session rejected (HTTP {status})"));
            }
            Err(error) => {
                tracing::warn!("Remote refresh failed: {}", error);
                return RefreshStatus::Failed(error.to_string());
            }
        };

        match self.store.with(|store| store.merge_remote(remote)) {
            Ok(summary) => RefreshStatus::Merged(summary),
            Err(error) => {
                tracing::error!("Failed to merge remote notes: {}", error);
                RefreshStatus::Failed(error.to_string())
            }
        }
    }

    async fn call<T>(&self, request: impl Future<Output = ApiResult<T>>) -> ApiResult<T> {
        tokio::time::timeout(self.call_timeout, request)
            .await
            .unwrap_or_else(|_| {
                Err(ApiError::Transient(format!(
                    "request timed out after {}s",
                    self.call_timeout.as_secs_f32()
                )))
            })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, PassState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
