use serde_json::{Map, Value};
use tracing::trace;

use crate::errors::DropReason;
use crate::event::{Event, EventBody, EventKind, KeyPosition, SessionId, Timestamp};
use crate::frame::Payload;

/// Turns one parsed payload into a typed event.
///
/// `origin` is the session id of the stream the payload arrived on; it fills
/// in a missing `sessionId`. Missing `id` and `timestamp` are generated,
/// missing `status` is `0`, and a payload without `type` is `assistant`.
pub fn normalize(payload: Payload, origin: &SessionId) -> Result<Event, DropReason> {
    let Payload { framing, mut object } = payload;

    let tag = string_field(&object, &["type", "kind"]);
    let content = object.remove("content").filter(|v| !v.is_null());
    if tag.is_none() && content.is_none() {
        return Err(DropReason::MissingKindAndContent);
    }
    let kind = tag
        .map(|tag| EventKind::from_tag(&tag))
        .unwrap_or(EventKind::Assistant);

    let body = match kind {
        EventKind::KeyPosition => EventBody::KeyPosition(resolve_key_position(content)?),
        kind => EventBody::text(kind, content_text(content)).ok_or_else(|| {
            DropReason::InvalidKeyPosition("structured content required".into())
        })?,
    };

    let id = string_field(&object, &["id"]).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let session_id = string_field(&object, &["sessionId", "session_id"])
        .map(SessionId::new)
        .unwrap_or_else(|| origin.clone());
    let timestamp = match object.get("timestamp") {
        Some(Value::String(text)) => Timestamp::Text(text.clone()),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Timestamp::Number)
            .unwrap_or_else(now_timestamp),
        _ => now_timestamp(),
    };
    let status = object
        .get("status")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or(0);

    trace!(?framing, kind = %body.kind(), %id, "normalized event");
    Ok(Event {
        id,
        session_id,
        timestamp,
        status,
        body,
    })
}

/// Resolves `key_position` content, unwrapping one level of JSON-in-a-string.
fn resolve_key_position(content: Option<Value>) -> Result<KeyPosition, DropReason> {
    let result = match content {
        Some(Value::String(text)) => serde_json::from_str::<KeyPosition>(&text),
        Some(value) => serde_json::from_value::<KeyPosition>(value),
        None => return Err(DropReason::InvalidKeyPosition("missing content".into())),
    };
    result.map_err(|e| DropReason::InvalidKeyPosition(e.to_string()))
}

fn content_text(content: Option<Value>) -> String {
    match content {
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// First non-empty string (or number) among `keys`.
fn string_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match object.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn now_timestamp() -> Timestamp {
    Timestamp::Text(chrono::Utc::now().to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Hand, NoteAction};
    use crate::frame::Framing;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(object) => Payload {
                framing: Framing::Data,
                object,
            },
            other => panic!("not an object: {other}"),
        }
    }

    fn origin() -> SessionId {
        SessionId::new("s1")
    }

    #[test]
    fn text_event_keeps_wire_fields() {
        let event = normalize(
            payload(serde_json::json!({
                "type": "planning",
                "id": "p1",
                "sessionId": "s9",
                "timestamp": "2025-01-01T00:00:00Z",
                "content": "step one",
                "status": 2
            })),
            &origin(),
        )
        .expect("event");
        assert_eq!(event.kind(), EventKind::Planning);
        assert_eq!(event.id, "p1");
        assert_eq!(event.session_id, SessionId::new("s9"));
        assert_eq!(event.timestamp, Timestamp::Text("2025-01-01T00:00:00Z".into()));
        assert_eq!(event.status, 2);
        assert_eq!(event.body.as_text(), Some("step one"));
    }

    #[test]
    fn key_position_content_is_unwrapped_from_string() {
        let content = r#"{"action":"note_off","hand":"right","key_name":"C4","midi_id":60,"timestamp":12}"#;
        let event = normalize(
            payload(serde_json::json!({"type": "key_position", "id": "k1", "content": content})),
            &origin(),
        )
        .expect("event");
        let key = event.body.as_key_position().expect("key position");
        assert_eq!(key.action, NoteAction::NoteOff);
        assert_eq!(key.hand, Hand::Right);
        assert_eq!(key.midi_id, 60);
    }

    #[test]
    fn key_position_content_may_be_an_object() {
        let event = normalize(
            payload(serde_json::json!({
                "type": "key_position",
                "content": {"action":"note_on","hand":"left","key_name":"A4","midi_id":69,"timestamp":1}
            })),
            &origin(),
        )
        .expect("event");
        assert_eq!(event.body.as_key_position().map(|k| k.midi_id), Some(69));
    }

    #[test]
    fn malformed_key_position_is_dropped() {
        let result = normalize(
            payload(serde_json::json!({"type": "key_position", "content": "{\"action\":\"wave\"}"})),
            &origin(),
        );
        assert!(matches!(result, Err(DropReason::InvalidKeyPosition(_))));
        let missing = normalize(payload(serde_json::json!({"type": "key_position"})), &origin());
        assert!(matches!(missing, Err(DropReason::InvalidKeyPosition(_))));
    }

    #[test]
    fn object_without_type_or_content_is_dropped() {
        let result = normalize(payload(serde_json::json!({"id": "x"})), &origin());
        assert_eq!(result, Err(DropReason::MissingKindAndContent));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let event = normalize(payload(serde_json::json!({"content": "hello"})), &origin())
            .expect("event");
        assert_eq!(event.kind(), EventKind::Assistant);
        assert_eq!(event.session_id, origin());
        assert_eq!(event.status, 0);
        assert!(!event.id.is_empty());
        assert!(matches!(event.timestamp, Timestamp::Text(_)));
    }

    #[test]
    fn non_string_text_content_is_stringified() {
        let event = normalize(
            payload(serde_json::json!({"type": "playing_summary", "content": {"score": 9}})),
            &origin(),
        )
        .expect("event");
        assert_eq!(event.body.as_text(), Some(r#"{"score":9}"#));
    }

    #[test]
    fn numeric_timestamp_and_id_are_accepted() {
        let event = normalize(
            payload(serde_json::json!({"type": "user", "id": 42, "timestamp": 1700000000, "content": "hi"})),
            &origin(),
        )
        .expect("event");
        assert_eq!(event.id, "42");
        assert_eq!(event.timestamp, Timestamp::Number(1_700_000_000.0));
    }
}
