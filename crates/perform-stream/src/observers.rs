use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::controller::SessionState;
use crate::event::{EventKind, SessionId};
use crate::router::Sink;

/// Change notifications delivered to registered observers.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    /// An event was appended to `sink`.
    EventRouted {
        session_id: SessionId,
        sink: Sink,
        event_id: String,
        kind: EventKind,
    },
    /// The set of held keys changed.
    ActiveNotesChanged,
    /// A stream session moved to `state`.
    StateChanged {
        session_id: SessionId,
        state: SessionState,
    },
}

/// Token returned by [`Observers::register`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ObserverId(u64);

type Callback = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Observer registry owned by one [`crate::StreamContext`].
///
/// Callbacks run on the notifying task after the store lock is released.
/// They must not block.
#[derive(Default)]
pub struct Observers {
    next_id: AtomicU64,
    entries: RwLock<Vec<(ObserverId, Callback)>>,
}

impl Observers {
    pub fn register(&self, callback: impl Fn(&Notification) + Send + Sync + 'static) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        id
    }

    /// Removes an observer. Returns `false` if it was not registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn notify(&self, notification: &Notification) {
        let callbacks: Vec<Callback> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in callbacks {
            callback(notification);
        }
    }
}
