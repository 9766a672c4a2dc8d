use std::sync::Arc;

use tracing::debug;

use crate::event::{Event, EventKind, SessionId};
use crate::observers::{Notification, Observers};
use crate::store::EventStore;

/// Destination of a routed event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Sink {
    /// General per-session log.
    SessionLog,
    /// Session-agnostic performance log (`playing_log`).
    PerformanceLog,
    /// Input of the note projector (`key_position`, plus `end` markers).
    KeyPositions,
}

/// What routing one event did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteOutcome {
    pub sink: Sink,
    /// Session the event was filed under, after re-stamping.
    pub session_id: SessionId,
    /// `false` when the event repeated an already applied id.
    pub appended: bool,
    /// The event was a terminal `end`.
    pub terminal: bool,
}

/// An applied event awaiting observer notification.
#[derive(Clone, Debug)]
pub(crate) struct Dispatched {
    pub outcome: RouteOutcome,
    pub event_id: String,
    pub kind: EventKind,
    pub notes_changed: bool,
}

/// Dispatches normalized events into the store by kind.
///
/// `end`, `voice_end` and `key_position` events are filed under the session
/// of the stream that delivered them, whatever their payload claims.
#[derive(Clone)]
pub struct Router {
    store: Arc<EventStore>,
    observers: Arc<Observers>,
}

impl Router {
    pub fn new(store: Arc<EventStore>, observers: Arc<Observers>) -> Self {
        Self { store, observers }
    }

    /// Routes one event that arrived on the stream of `origin` and notifies
    /// observers.
    pub fn route(&self, event: Event, origin: &SessionId) -> RouteOutcome {
        let dispatched = self.dispatch(event, origin);
        self.announce(&dispatched);
        dispatched.outcome
    }

    /// Applies `event` to the store without notifying observers.
    pub(crate) fn dispatch(&self, mut event: Event, origin: &SessionId) -> Dispatched {
        let kind = event.kind();
        if matches!(
            kind,
            EventKind::End | EventKind::VoiceEnd | EventKind::KeyPosition
        ) && event.session_id != *origin
        {
            debug!(claimed = %event.session_id, %origin, %kind, "re-stamping session id");
            event.session_id = origin.clone();
        }

        let event_id = event.id.clone();
        let session_id = event.session_id.clone();
        let terminal = event.is_terminal();
        let mut notes_changed = false;
        let (sink, appended) = match kind {
            EventKind::End => (Sink::SessionLog, self.store.append_terminal(event)),
            EventKind::PlayingLog => {
                self.store.append_performance(event);
                (Sink::PerformanceLog, true)
            }
            EventKind::KeyPosition => {
                let result = self.store.append_key_position(event);
                notes_changed = result.notes_changed;
                (Sink::KeyPositions, result.appended)
            }
            _ => (Sink::SessionLog, self.store.append_session(event)),
        };

        if appended {
            debug!(%session_id, %kind, id = %event_id, ?sink, "event routed");
        } else {
            debug!(%session_id, %kind, id = %event_id, "ignoring repeated event id");
        }

        Dispatched {
            outcome: RouteOutcome {
                sink,
                session_id,
                appended,
                terminal,
            },
            event_id,
            kind,
            notes_changed,
        }
    }

    /// Notifies observers about an applied event.
    pub(crate) fn announce(&self, dispatched: &Dispatched) {
        if !dispatched.outcome.appended {
            return;
        }
        self.observers.notify(&Notification::EventRouted {
            session_id: dispatched.outcome.session_id.clone(),
            sink: dispatched.outcome.sink,
            event_id: dispatched.event_id.clone(),
            kind: dispatched.kind.clone(),
        });
        if dispatched.notes_changed {
            self.observers.notify(&Notification::ActiveNotesChanged);
        }
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventBody, Hand, KeyPosition, NoteAction, Timestamp};
    use std::sync::Mutex;

    fn router() -> Router {
        Router::new(Arc::new(EventStore::new()), Arc::new(Observers::default()))
    }

    fn event(id: &str, session: &str, body: EventBody) -> Event {
        Event {
            id: id.into(),
            session_id: SessionId::new(session),
            timestamp: Timestamp::Text("t".into()),
            status: 0,
            body,
        }
    }

    fn note(action: NoteAction, midi_id: u8) -> EventBody {
        EventBody::KeyPosition(KeyPosition {
            action,
            hand: Hand::Left,
            key_name: "A4".into(),
            midi_id,
            timestamp: 0.0,
        })
    }

    #[test]
    fn end_is_restamped_with_the_origin_session() {
        let router = router();
        let origin = SessionId::new("s7");
        let outcome = router.route(event("e", "stale-id", EventBody::End(String::new())), &origin);
        assert!(outcome.terminal);
        assert_eq!(outcome.session_id, origin);
        let store = router.store();
        assert_eq!(store.session_events(&origin).len(), 1);
        assert!(store.session_events(&SessionId::new("stale-id")).is_empty());
        assert!(store.key_positions().iter().any(|e| e.is_terminal()));
    }

    #[test]
    fn voice_end_is_filed_under_the_origin_session() {
        let router = router();
        let origin = SessionId::new("s1");
        router.route(event("v", "other", EventBody::VoiceEnd("mic closed".into())), &origin);
        assert_eq!(router.store().session_events(&origin).len(), 1);
    }

    #[test]
    fn playing_log_only_reaches_the_performance_log() {
        let router = router();
        let origin = SessionId::new("s1");
        let outcome = router.route(event("l", "s1", EventBody::PlayingLog("bar 3".into())), &origin);
        assert_eq!(outcome.sink, Sink::PerformanceLog);
        assert_eq!(router.store().performance_log().len(), 1);
        assert!(router.store().session_events(&origin).is_empty());
        assert!(router.store().session_ids().is_empty());
    }

    #[test]
    fn key_position_only_reaches_the_projector() {
        let router = router();
        let origin = SessionId::new("s1");
        let outcome = router.route(event("k", "stale", note(NoteAction::NoteOn, 69)), &origin);
        assert_eq!(outcome.sink, Sink::KeyPositions);
        assert_eq!(outcome.session_id, origin);
        assert!(router.store().session_ids().is_empty());
        assert!(router.store().active_notes().contains_key(&69));
    }

    #[test]
    fn text_events_keep_their_own_session_id() {
        let router = router();
        let origin = SessionId::new("s1");
        let outcome = router.route(
            event("a", "s2", EventBody::Assistant("hello".into())),
            &origin,
        );
        assert_eq!(outcome.session_id, SessionId::new("s2"));
        assert_eq!(router.store().session_events(&SessionId::new("s2")).len(), 1);
        assert!(router.store().session_events(&origin).is_empty());
    }

    #[test]
    fn observers_see_routed_events_and_note_changes() {
        let observers = Arc::new(Observers::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        observers.register(move |n| sink.lock().expect("lock").push(n.clone()));
        let router = Router::new(Arc::new(EventStore::new()), observers);
        let origin = SessionId::new("s1");

        router.route(event("k1", "s1", note(NoteAction::NoteOn, 60)), &origin);
        router.route(event("k2", "s1", note(NoteAction::NoteOff, 61)), &origin);
        router.route(event("k1", "s1", note(NoteAction::NoteOn, 60)), &origin);

        let seen = seen.lock().expect("lock");
        let routed = seen
            .iter()
            .filter(|n| matches!(n, Notification::EventRouted { .. }))
            .count();
        let changed = seen
            .iter()
            .filter(|n| matches!(n, Notification::ActiveNotesChanged))
            .count();
        assert_eq!(routed, 2);
        assert_eq!(changed, 1);
    }
}
