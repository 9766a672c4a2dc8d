use std::collections::BTreeMap;

use crate::event::{Event, EventBody, Hand, KeyPosition, NoteAction};

/// A key currently held down.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeldNote {
    pub key_name: String,
    pub hand: Hand,
}

/// Currently held keys, keyed by MIDI note number.
pub type ActiveNotes = BTreeMap<u8, HeldNote>;

/// Left fold over key-position events.
///
/// `note_on` inserts or overwrites (no reference counting), `note_off`
/// removes and is a no-op for keys that are not held. Every other event is
/// ignored.
#[derive(Clone, Debug, Default)]
pub struct NoteProjector {
    active: ActiveNotes,
}

impl NoteProjector {
    /// Rebuilds a projection by replaying `events` in order.
    pub fn replay<'a>(events: impl IntoIterator<Item = &'a Event>) -> Self {
        let mut projector = Self::default();
        for event in events {
            projector.apply_event(event);
        }
        projector
    }

    /// Applies one event. Returns `true` if the active set changed.
    pub fn apply_event(&mut self, event: &Event) -> bool {
        match &event.body {
            EventBody::KeyPosition(key) => self.apply(key),
            _ => false,
        }
    }

    /// Applies one key transition. Returns `true` if the active set changed.
    pub fn apply(&mut self, key: &KeyPosition) -> bool {
        match key.action {
            NoteAction::NoteOn => {
                let held = HeldNote {
                    key_name: key.key_name.clone(),
                    hand: key.hand,
                };
                self.active.insert(key.midi_id, held.clone()) != Some(held)
            }
            NoteAction::NoteOff => self.active.remove(&key.midi_id).is_some(),
        }
    }

    /// Clears every held key.
    pub fn reset(&mut self) {
        self.active.clear();
    }

    pub fn active(&self) -> &ActiveNotes {
        &self.active
    }

    pub fn is_held(&self, midi_id: u8) -> bool {
        self.active.contains_key(&midi_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{SessionId, Timestamp};

    fn key(action: NoteAction, midi_id: u8, key_name: &str, hand: Hand) -> KeyPosition {
        KeyPosition {
            action,
            hand,
            key_name: key_name.into(),
            midi_id,
            timestamp: 0.0,
        }
    }

    fn key_event(id: &str, position: KeyPosition) -> Event {
        Event {
            id: id.into(),
            session_id: SessionId::new("s1"),
            timestamp: Timestamp::Number(0.0),
            status: 0,
            body: EventBody::KeyPosition(position),
        }
    }

    #[test]
    fn note_off_releases_a_held_note() {
        let mut projector = NoteProjector::default();
        assert!(projector.apply(&key(NoteAction::NoteOn, 69, "A4", Hand::Left)));
        assert!(projector.is_held(69));
        assert!(projector.apply(&key(NoteAction::NoteOff, 69, "A4", Hand::Left)));
        assert!(!projector.is_held(69));
    }

    #[test]
    fn lone_note_off_is_a_no_op() {
        let mut projector = NoteProjector::default();
        projector.apply(&key(NoteAction::NoteOn, 60, "C4", Hand::Right));
        let before = projector.active().clone();
        assert!(!projector.apply(&key(NoteAction::NoteOff, 69, "A4", Hand::Left)));
        assert_eq!(projector.active(), &before);
    }

    #[test]
    fn repeated_note_on_is_last_write_wins() {
        let mut projector = NoteProjector::default();
        projector.apply(&key(NoteAction::NoteOn, 60, "C4", Hand::Left));
        projector.apply(&key(NoteAction::NoteOn, 60, "C4", Hand::Right));
        assert_eq!(
            projector.active().get(&60),
            Some(&HeldNote {
                key_name: "C4".into(),
                hand: Hand::Right
            })
        );
        // No reference count: one release clears it.
        projector.apply(&key(NoteAction::NoteOff, 60, "C4", Hand::Right));
        assert!(projector.active().is_empty());
    }

    #[test]
    fn replay_matches_incremental_application_and_ignores_text_events() {
        let events = vec![
            key_event("1", key(NoteAction::NoteOn, 60, "C4", Hand::Left)),
            key_event("2", key(NoteAction::NoteOn, 64, "E4", Hand::Left)),
            Event {
                id: "e".into(),
                session_id: SessionId::new("s1"),
                timestamp: Timestamp::Number(0.0),
                status: 0,
                body: EventBody::End(String::new()),
            },
            key_event("3", key(NoteAction::NoteOff, 60, "C4", Hand::Left)),
        ];
        let replayed = NoteProjector::replay(&events);
        let mut incremental = NoteProjector::default();
        for event in &events {
            incremental.apply_event(event);
        }
        assert_eq!(replayed.active(), incremental.active());
        assert_eq!(replayed.active().keys().copied().collect::<Vec<_>>(), vec![64]);
    }

    #[test]
    fn reset_clears_all_entries() {
        let mut projector = NoteProjector::default();
        projector.apply(&key(NoteAction::NoteOn, 21, "A0", Hand::Left));
        projector.reset();
        assert!(projector.active().is_empty());
    }
}
