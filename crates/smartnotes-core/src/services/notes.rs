//! Wiring of store, session, sync and reminders for a client process.

use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::auth::SessionManager;
use crate::config::ClientConfig;
use crate::connectivity::{ConnectivityMonitor, ConnectivityProbe, HttpProbe};
use crate::db::{Database, SnapshotStore, SqliteSnapshotStore};
use crate::reminders::{NotificationSink, ReminderScheduler};
use crate::store::{NoteStore, SharedStore};
use crate::sync::{HttpNotesApi, NotesApi, ReconcileReport, Reconciler, SyncWorker};
use crate::Result;

/// One client instance: a hydrated store plus the engine around it.
#[derive(Clone)]
pub struct NotesService {
    config: ClientConfig,
    store: SharedStore,
    session: SessionManager,
    connectivity: ConnectivityMonitor,
    worker: SyncWorker,
}

impl NotesService {
    /// Hydrate the store and build the engine around an arbitrary API.
    pub fn open(
        config: ClientConfig,
        persistence: impl SnapshotStore + 'static,
        session: SessionManager,
        api: Arc<dyn NotesApi>,
        connectivity: ConnectivityMonitor,
    ) -> Result<Self> {
        let config = config.validated()?;
        let store = SharedStore::new(NoteStore::open(persistence)?);
        let reconciler = Reconciler::new(store.clone(), api, session.clone(), connectivity.clone())
            .with_call_timeout(config.request_timeout());
        let worker = SyncWorker::new(reconciler, config.sync_interval());
        Ok(Self {
            config,
            store,
            session,
            connectivity,
            worker,
        })
    }

    /// Open the `SQLite` cache at `db_path` and talk to the configured server.
    ///
    /// The client counts as offline until a probe (`probe_once` or the probe
    /// passed to `spawn_background`) reaches the server.
    pub fn open_http(config: ClientConfig, db_path: &Path, session: SessionManager) -> Result<Self> {
        let config = config.validated()?;
        let persistence = SqliteSnapshotStore::new(Database::open(db_path)?);
        let api = Arc::new(HttpNotesApi::new(&config, session.clone())?);
        Self::open(
            config,
            persistence,
            session,
            api,
            ConnectivityMonitor::new(false),
        )
    }

    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub const fn store(&self) -> &SharedStore {
        &self.store
    }

    pub const fn session(&self) -> &SessionManager {
        &self.session
    }

    pub const fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub const fn worker(&self) -> &SyncWorker {
        &self.worker
    }

    /// Check reachability once and record it.
    pub async fn probe_once(&self, probe: &dyn ConnectivityProbe) -> bool {
        let reachable = probe.is_reachable().await;
        self.connectivity.set_online(reachable);
        reachable
    }

    /// Run one reconciliation pass now.
    pub async fn sync_now(&self) -> ReconcileReport {
        self.worker.sync_once().await
    }

    /// Start the long-running loops: periodic and wake-on-change sync, the
    /// debounced reconnect trigger, optional probing and reminders, and the
    /// session expiry timer.
    pub fn spawn_background(
        &self,
        sink: Option<Arc<dyn NotificationSink>>,
        probe: Option<Arc<dyn ConnectivityProbe>>,
    ) -> Result<BackgroundTasks> {
        let mut handles = Vec::new();

        let worker = self.worker.clone();
        let events = self.store.subscribe();
        let session_changes = self.session.subscribe();
        handles.push(tokio::spawn(worker.run(events, session_changes)));

        let connectivity = self.connectivity.clone();
        let worker = self.worker.clone();
        let debounce = self.config.connectivity_debounce();
        handles.push(tokio::spawn(async move {
            connectivity
                .run_reconnect_trigger(debounce, || {
                    let worker = worker.clone();
                    async move {
                        worker.sync_once().await;
                    }
                })
                .await;
        }));

        if let Some(probe) = probe {
            let connectivity = self.connectivity.clone();
            let interval = self.config.probe_interval();
            handles.push(tokio::spawn(async move {
                connectivity.run_probe(probe, interval).await;
            }));
        }

        if let Some(sink) = sink {
            let scheduler = ReminderScheduler::new(
                self.store.clone(),
                sink,
                self.config.reminder_period(),
                self.config.reminder_window(),
            )?;
            handles.push(tokio::spawn(scheduler.run(self.store.subscribe())));
        }

        let session = self.session.clone();
        handles.push(tokio::spawn(async move {
            session.watch_expiry().await;
        }));

        Ok(BackgroundTasks { handles })
    }

    /// Default probe against the configured server.
    pub fn http_probe(&self) -> Result<Arc<dyn ConnectivityProbe>> {
        Ok(Arc::new(HttpProbe::new(&self.config)?))
    }
}

/// Handles of the background loops; aborted on drop.
pub struct BackgroundTasks {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}
