use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;

use super::{NoteStore, StoreEvent};

/// Cloneable handle to the single store instance.
///
/// The lock is only held for the duration of one synchronous store call and
/// never across an `.await`.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<NoteStore>>,
    events: broadcast::Sender<StoreEvent>,
}

impl SharedStore {
    pub fn new(store: NoteStore) -> Self {
        let events = store.event_sender();
        Self {
            inner: Arc::new(Mutex::new(store)),
            events,
        }
    }

    /// Run `f` with exclusive access to the store.
    pub fn with<R>(&self, f: impl FnOnce(&mut NoteStore) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Subscribe to change events without taking the store lock.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

impl std::fmt::Debug for SharedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let notes = self.with(|store| store.snapshot().len());
        f.debug_struct("SharedStore").field("notes", &notes).finish()
    }
}
