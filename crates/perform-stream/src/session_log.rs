use std::collections::HashSet;

use crate::event::{Event, EventBody, SessionId};

/// Append-only, insertion-ordered events of one session.
///
/// An event whose id was already appended is ignored, so transport
/// redelivery does not duplicate entries.
#[derive(Clone, Debug)]
pub struct SessionLog {
    session_id: SessionId,
    events: Vec<Event>,
    seen: HashSet<String>,
}

impl SessionLog {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            events: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Appends `event`. Returns `false` if its id is already present.
    pub(crate) fn append(&mut self, event: Event) -> bool {
        if !self.seen.insert(event.id.clone()) {
            return false;
        }
        self.events.push(event);
        true
    }

    pub(crate) fn clear(&mut self) {
        self.events.clear();
        self.seen.clear();
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Display view with each run of consecutive `planning` events merged
    /// into one entry.
    pub fn grouped(&self) -> Vec<LogEntry<'_>> {
        let mut entries = Vec::new();
        let mut planning: Vec<&Event> = Vec::new();
        for event in &self.events {
            if matches!(event.body, EventBody::Planning(_)) {
                planning.push(event);
                continue;
            }
            if !planning.is_empty() {
                entries.push(LogEntry::planning_group(std::mem::take(&mut planning)));
            }
            entries.push(LogEntry::Event(event));
        }
        if !planning.is_empty() {
            entries.push(LogEntry::planning_group(planning));
        }
        entries
    }
}

/// One entry of [`SessionLog::grouped`].
#[derive(Clone, Debug, PartialEq)]
pub enum LogEntry<'a> {
    Event(&'a Event),
    PlanningGroup {
        id: String,
        content: String,
        events: Vec<&'a Event>,
    },
}

impl<'a> LogEntry<'a> {
    fn planning_group(events: Vec<&'a Event>) -> Self {
        let id = format!(
            "planning-group-{}",
            events.first().map(|e| e.id.as_str()).unwrap_or_default()
        );
        let content = events
            .iter()
            .filter_map(|e| e.body.as_text())
            .collect::<Vec<_>>()
            .join("\n");
        Self::PlanningGroup {
            id,
            content,
            events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, Timestamp};

    fn event(id: &str, kind: &str, text: &str) -> Event {
        Event {
            id: id.into(),
            session_id: SessionId::new("s1"),
            timestamp: Timestamp::Text("t".into()),
            status: 0,
            body: EventBody::text(EventKind::from_tag(kind), text.into()).expect("text kind"),
        }
    }

    #[test]
    fn append_preserves_order_and_ignores_repeated_ids() {
        let mut log = SessionLog::new(SessionId::new("s1"));
        assert!(log.append(event("a", "user", "hi")));
        assert!(log.append(event("b", "assistant", "hello")));
        assert!(!log.append(event("a", "user", "hi again")));
        let ids: Vec<_> = log.events().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn grouped_merges_consecutive_planning_events() {
        let mut log = SessionLog::new(SessionId::new("s1"));
        log.append(event("u", "user", "play"));
        log.append(event("p1", "planning", "read score"));
        log.append(event("p2", "planning", "warm up"));
        log.append(event("a", "assistant", "ready"));
        log.append(event("p3", "planning", "bow"));

        let entries = log.grouped();
        assert_eq!(entries.len(), 4);
        assert!(matches!(entries[0], LogEntry::Event(e) if e.id == "u"));
        match &entries[1] {
            LogEntry::PlanningGroup {
                id,
                content,
                events,
            } => {
                assert_eq!(id, "planning-group-p1");
                assert_eq!(content, "read score\nwarm up");
                assert_eq!(events.len(), 2);
            }
            other => panic!("expected planning group, got {other:?}"),
        }
        assert!(matches!(entries[2], LogEntry::Event(e) if e.id == "a"));
        assert!(matches!(&entries[3], LogEntry::PlanningGroup { id, .. } if id == "planning-group-p3"));
    }

    #[test]
    fn clear_allows_ids_to_be_reused() {
        let mut log = SessionLog::new(SessionId::new("s1"));
        log.append(event("a", "user", "hi"));
        log.clear();
        assert!(log.is_empty());
        assert!(log.append(event("a", "user", "hi")));
    }
}
