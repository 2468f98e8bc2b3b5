//! Reminder scheduler
//!
//! Scans the store on a fixed period and hands due reminders to a
//! [`NotificationSink`]. A reminder due at `T` fires on the first tick whose
//! time falls in `(T, T + window]` and never again until it is edited.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::error::{Error, Result};
use crate::models::{LocalId, Note};
use crate::store::{SharedStore, StoreEvent};
use crate::util::unix_millis_now;

const PREVIEW_LEN: usize = 120;

/// A reminder ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderNotice {
    pub local_id: LocalId,
    pub title: String,
    /// Content preview; withheld for locked notes
    pub body: Option<String>,
    /// Reminder timestamp (Unix ms)
    pub due_at: i64,
}

impl ReminderNotice {
    fn for_note(note: &Note, due_at: i64) -> Self {
        let body = if note.locked {
            None
        } else {
            let preview = note.content.trim().chars().take(PREVIEW_LEN).collect::<String>();
            (!preview.is_empty()).then_some(preview)
        };
        Self {
            local_id: note.local_id,
            title: note.title_preview(PREVIEW_LEN),
            body,
            due_at,
        }
    }
}

/// Delivery channel for reminders (desktop notification, terminal, ...).
pub trait NotificationSink: Send + Sync {
    /// Whether notifications can be shown right now.
    fn is_available(&self) -> bool {
        true
    }

    fn deliver(&self, notice: &ReminderNotice) -> std::result::Result<(), String>;
}

/// Decides when reminders fire.
pub struct ReminderScheduler {
    store: SharedStore,
    sink: Arc<dyn NotificationSink>,
    period: Duration,
    window_ms: i64,
    fired: HashSet<(LocalId, i64)>,
}

impl ReminderScheduler {
    /// Create a scheduler; `window` must be at least `period` so no due
    /// reminder can fall between two ticks.
    pub fn new(
        store: SharedStore,
        sink: Arc<dyn NotificationSink>,
        period: Duration,
        window: Duration,
    ) -> Result<Self> {
        if period.is_zero() {
            return Err(Error::Config("reminder period must be greater than zero".to_string()));
        }
        if window < period {
            return Err(Error::Config(format!(
                "reminder window ({}s) must be at least the scan period ({}s)",
                window.as_secs(),
                period.as_secs()
            )));
        }
        let window_ms = i64::try_from(window.as_millis())
            .map_err(|_| Error::Config("reminder window is too large".to_string()))?;

        Ok(Self {
            store,
            sink,
            period,
            window_ms,
            fired: HashSet::new(),
        })
    }

    /// Scan at the current time.
    pub fn tick(&mut self) -> Vec<ReminderNotice> {
        self.tick_at(unix_millis_now())
    }

    /// Scan at `now` (Unix ms) and deliver every reminder that became due.
    pub fn tick_at(&mut self, now: i64) -> Vec<ReminderNotice> {
        if !self.sink.is_available() {
            tracing::debug!("Notification sink unavailable; skipping reminder scan");
            return Vec::new();
        }

        let window_start = now - self.window_ms;
        self.fired.retain(|(_, due_at)| *due_at >= window_start);

        let due = self.store.with(|store| {
            store
                .snapshot()
                .into_iter()
                .filter(|note| note.is_visible() && !note.archived)
                .filter_map(|note| {
                    let due_at = note.reminder_at?;
                    (due_at < now && due_at >= window_start)
                        .then(|| ReminderNotice::for_note(&note, due_at))
                })
                .collect::<Vec<_>>()
        });

        let mut delivered = Vec::new();
        for notice in due {
            if self.fired.contains(&(notice.local_id, notice.due_at)) {
                continue;
            }
            match self.sink.deliver(&notice) {
                Ok(()) => {
                    tracing::info!("Reminder fired for note {}", notice.local_id);
                    self.fired.insert((notice.local_id, notice.due_at));
                    delivered.push(notice);
                }
                Err(error) => {
                    tracing::warn!(
                        "Failed to deliver reminder for note {}: {}",
                        notice.local_id,
                        error
                    );
                }
            }
        }
        delivered
    }

    /// Forget fired entries whose note is gone or whose reminder changed.
    pub fn prune(&mut self) {
        let live = self.store.with(|store| {
            store
                .snapshot()
                .into_iter()
                .filter(|note| note.is_visible())
                .filter_map(|note| note.reminder_at.map(|due_at| (note.local_id, due_at)))
                .collect::<HashSet<_>>()
        });
        self.fired.retain(|entry| live.contains(entry));
    }

    pub fn handle_event(&mut self, event: &StoreEvent) {
        match event {
            StoreEvent::Created(_) => {}
            StoreEvent::Updated(_) | StoreEvent::Deleted(_) | StoreEvent::Synced => self.prune(),
        }
    }

    /// Tick every period and prune on store changes until the store goes away.
    pub async fn run(mut self, mut events: broadcast::Receiver<StoreEvent>) {
        tracing::info!(
            "Reminder scheduler started: period={}s, window={}s",
            self.period.as_secs(),
            self.window_ms / 1000
        );
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                event = events.recv() => match event {
                    Ok(event) => self.handle_event(&event),
                    Err(broadcast::error::RecvError::Lagged(_)) => self.prune(),
                    Err(broadcast::error::RecvError::Closed) => return,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemorySnapshotStore;
    use crate::models::{NoteDraft, NotePatch, ToggleField};
    use crate::store::NoteStore;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    const T: i64 = 1_700_000_000_000;
    const SECOND: i64 = 1_000;

    #[derive(Default)]
    struct RecordingSink {
        unavailable: AtomicBool,
        delivered: Mutex<Vec<ReminderNotice>>,
    }

    impl NotificationSink for RecordingSink {
        fn is_available(&self) -> bool {
            !self.unavailable.load(Ordering::SeqCst)
        }

        fn deliver(&self, notice: &ReminderNotice) -> std::result::Result<(), String> {
            self.delivered.lock().unwrap().push(notice.clone());
            Ok(())
        }
    }

    fn setup() -> (ReminderScheduler, SharedStore, Arc<RecordingSink>) {
        let store = SharedStore::new(NoteStore::open(MemorySnapshotStore::new()).unwrap());
        let sink = Arc::new(RecordingSink::default());
        let scheduler = ReminderScheduler::new(
            store.clone(),
            sink.clone(),
            Duration::from_secs(30),
            Duration::from_secs(90),
        )
        .unwrap();
        (scheduler, store, sink)
    }

    fn add_reminder(store: &SharedStore, title: &str, due_at: i64) -> Note {
        store
            .with(|store| store.create(NoteDraft::new(title, "call back").with_reminder(due_at)))
            .unwrap()
    }

    #[test]
    fn window_must_cover_period() {
        let store = SharedStore::new(NoteStore::open(MemorySnapshotStore::new()).unwrap());
        let result = ReminderScheduler::new(
            store,
            Arc::new(RecordingSink::default()),
            Duration::from_secs(60),
            Duration::from_secs(30),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn fires_once_inside_window_only() {
        let (mut scheduler, store, _) = setup();
        add_reminder(&store, "dentist", T);

        assert!(scheduler.tick_at(T).is_empty());
        assert_eq!(scheduler.tick_at(T + SECOND).len(), 1);
        assert!(scheduler.tick_at(T + 30 * SECOND).is_empty());
        assert!(scheduler.tick_at(T + 90 * SECOND).is_empty());
    }

    #[test]
    fn window_upper_bound_is_inclusive() {
        let (mut scheduler, store, _) = setup();
        add_reminder(&store, "dentist", T);
        assert_eq!(scheduler.tick_at(T + 90 * SECOND).len(), 1);
    }

    #[test]
    fn missed_window_never_fires() {
        let (mut scheduler, store, _) = setup();
        add_reminder(&store, "dentist", T);
        assert!(scheduler.tick_at(T + 91 * SECOND).is_empty());
    }

    #[test]
    fn editing_the_reminder_rearms() {
        let (mut scheduler, store, _) = setup();
        let note = add_reminder(&store, "dentist", T);
        assert_eq!(scheduler.tick_at(T + SECOND).len(), 1);

        let id = note.local_id.as_str();
        store
            .with(|store| {
                store.update(
                    &id,
                    NotePatch {
                        reminder_at: Some(Some(T + 60 * SECOND)),
                        ..NotePatch::default()
                    },
                )
            })
            .unwrap();
        scheduler.handle_event(&StoreEvent::Updated(note.local_id));

        assert!(scheduler.tick_at(T + 30 * SECOND).is_empty());
        assert_eq!(scheduler.tick_at(T + 61 * SECOND).len(), 1);
    }

    #[test]
    fn unavailable_sink_defers_without_marking() {
        let (mut scheduler, store, sink) = setup();
        add_reminder(&store, "dentist", T);

        sink.unavailable.store(true, Ordering::SeqCst);
        assert!(scheduler.tick_at(T + SECOND).is_empty());

        sink.unavailable.store(false, Ordering::SeqCst);
        assert_eq!(scheduler.tick_at(T + 31 * SECOND).len(), 1);
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);
    }

    #[test]
    fn archived_and_deleted_notes_are_skipped() {
        let (mut scheduler, store, _) = setup();
        let archived = add_reminder(&store, "archived", T);
        let deleted = add_reminder(&store, "deleted", T);
        store
            .with(|store| store.toggle(&archived.local_id.as_str(), ToggleField::Archived))
            .unwrap();
        store
            .with(|store| store.delete(&deleted.local_id.as_str()))
            .unwrap();

        assert!(scheduler.tick_at(T + SECOND).is_empty());
    }

    #[test]
    fn locked_notes_hide_content() {
        let (mut scheduler, store, _) = setup();
        let note = add_reminder(&store, "private", T);
        store
            .with(|store| store.toggle(&note.local_id.as_str(), ToggleField::Locked))
            .unwrap();

        let fired = scheduler.tick_at(T + SECOND);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].title, "private");
        assert_eq!(fired[0].body, None);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_delivers_due_reminders() {
        let (scheduler, store, sink) = setup();
        add_reminder(&store, "now", unix_millis_now() - SECOND);
        let handle = tokio::spawn(scheduler.run(store.subscribe()));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);
        handle.abort();
    }
}
