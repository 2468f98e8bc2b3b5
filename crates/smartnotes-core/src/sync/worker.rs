use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;

use crate::state::SyncStatus;
use crate::store::StoreEvent;

use super::reconciler::{ReconcileReport, Reconciler};

/// Background driver for the reconciler.
///
/// Runs a pass on a fixed interval, after local mutations and when a session
/// becomes valid again, and publishes the resulting [`SyncStatus`].
#[derive(Clone)]
pub struct SyncWorker {
    reconciler: Reconciler,
    interval: Duration,
    status: Arc<watch::Sender<SyncStatus>>,
}

impl SyncWorker {
    pub fn new(reconciler: Reconciler, interval: Duration) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            reconciler,
            interval,
            status: Arc::new(status),
        }
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Run one pass and publish its status.
    pub async fn sync_once(&self) -> ReconcileReport {
        let previous = self.status.send_replace(SyncStatus::Syncing);
        let report = self.reconciler.reconcile().await;
        let status = SyncStatus::from_report(&report);
        self.status.send_replace(status);
        if previous != status {
            tracing::debug!("Sync status: {} -> {}", previous, status);
        }
        report
    }

    /// Loop until the store's event channel closes.
    pub async fn run(
        self,
        mut events: broadcast::Receiver<StoreEvent>,
        mut session: watch::Receiver<bool>,
    ) {
        tracing::info!(
            "Sync worker started: interval={}s",
            self.interval.as_secs()
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                event = events.recv() => match event {
                    Ok(event) if event.is_local_mutation() => {}
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("Sync worker skipped {} store events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
                changed = session.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if !*session.borrow_and_update() {
                        continue;
                    }
                }
            }
            self.sync_once().await;
        }
    }
}
