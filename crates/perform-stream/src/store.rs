use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::event::{Event, SessionId};
use crate::projector::{ActiveNotes, NoteProjector};
use crate::session_log::SessionLog;

#[derive(Default)]
struct StoreInner {
    sessions: HashMap<SessionId, SessionLog>,
    performance_log: Vec<Event>,
    key_positions: Vec<Event>,
    key_seen: HashSet<(SessionId, String)>,
    notes: NoteProjector,
}

/// Shared state written by the router and read by consumers.
///
/// Every write happens under one lock, so a reader sees either all or none
/// of the effects of a routed event. Reads return owned snapshots.
#[derive(Default)]
pub struct EventStore {
    inner: RwLock<StoreInner>,
}

/// Result of appending to the key-position sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct KeyAppend {
    pub appended: bool,
    pub notes_changed: bool,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Writers hold the lock for one event at most and never panic while
    // holding it, so a poisoned lock still guards consistent data.
    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends to the session log of `event.session_id`, creating it on
    /// first sight. Returns `false` for a repeated id.
    pub(crate) fn append_session(&self, event: Event) -> bool {
        let mut inner = self.write();
        inner
            .sessions
            .entry(event.session_id.clone())
            .or_insert_with(|| SessionLog::new(event.session_id.clone()))
            .append(event)
    }

    pub(crate) fn append_performance(&self, event: Event) {
        self.write().performance_log.push(event);
    }

    /// Appends a key-position event and applies it to the active notes.
    pub(crate) fn append_key_position(&self, event: Event) -> KeyAppend {
        let mut inner = self.write();
        if !inner
            .key_seen
            .insert((event.session_id.clone(), event.id.clone()))
        {
            return KeyAppend {
                appended: false,
                notes_changed: false,
            };
        }
        let notes_changed = inner.notes.apply_event(&event);
        inner.key_positions.push(event);
        KeyAppend {
            appended: true,
            notes_changed,
        }
    }

    /// Records a terminal event in both the session log and the key-position
    /// sequence. Returns `false` if the session log already had its id.
    pub(crate) fn append_terminal(&self, event: Event) -> bool {
        let mut inner = self.write();
        let inner = &mut *inner;
        let log = inner
            .sessions
            .entry(event.session_id.clone())
            .or_insert_with(|| SessionLog::new(event.session_id.clone()));
        if log.contains_id(&event.id) {
            return false;
        }
        inner.key_positions.push(event.clone());
        log.append(event)
    }

    /// Snapshot of one session's log; empty if the session is unknown.
    pub fn session_log(&self, session_id: &SessionId) -> SessionLog {
        self.read()
            .sessions
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| SessionLog::new(session_id.clone()))
    }

    /// Events of one session in arrival order; empty if unknown.
    pub fn session_events(&self, session_id: &SessionId) -> Vec<Event> {
        self.read()
            .sessions
            .get(session_id)
            .map(|log| log.events().to_vec())
            .unwrap_or_default()
    }

    /// Ids of every session seen so far, sorted.
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.read().sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Performance-log events in arrival order, across all sessions.
    pub fn performance_log(&self) -> Vec<Event> {
        self.read().performance_log.clone()
    }

    /// Key-position events (and `end` markers) in arrival order.
    pub fn key_positions(&self) -> Vec<Event> {
        self.read().key_positions.clone()
    }

    /// Snapshot of the currently held keys.
    pub fn active_notes(&self) -> ActiveNotes {
        self.read().notes.active().clone()
    }

    pub fn clear_performance_log(&self) {
        self.write().performance_log.clear();
    }

    /// Clears every held key. Key-position history is kept.
    pub fn reset_active_notes(&self) {
        self.write().notes.reset();
    }

    /// Empties one session's log. The session stays known.
    pub fn clear_session(&self, session_id: &SessionId) {
        if let Some(log) = self.write().sessions.get_mut(session_id) {
            log.clear();
        }
    }
}
