use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one logical run (a session).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Creates a session id from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Creates a fresh random session id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the session id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Closed set of event kinds carried by the `type` field.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum EventKind {
    User,
    Assistant,
    Planning,
    PlayingLog,
    PlayingSummary,
    KeyPosition,
    VoiceEnd,
    End,
    /// Any tag outside the known set; routed like a text event.
    Other(String),
}

impl EventKind {
    /// Parses a wire tag. Unknown tags are preserved in `Other`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "planning" => Self::Planning,
            "playing_log" => Self::PlayingLog,
            "playing_summary" => Self::PlayingSummary,
            "key_position" => Self::KeyPosition,
            "voice_end" => Self::VoiceEnd,
            "end" => Self::End,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the wire tag for this kind.
    pub fn as_tag(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Planning => "planning",
            Self::PlayingLog => "playing_log",
            Self::PlayingSummary => "playing_summary",
            Self::KeyPosition => "key_position",
            Self::VoiceEnd => "voice_end",
            Self::End => "end",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Provider-supplied time. Display only; never used for ordering.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Text(String),
    Number(f64),
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteAction {
    NoteOn,
    NoteOff,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hand {
    Left,
    Right,
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Right => "right",
        })
    }
}

/// Structured content of a `key_position` event: one press or release.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyPosition {
    pub action: NoteAction,
    pub hand: Hand,
    pub key_name: String,
    pub midi_id: u8,
    pub timestamp: f64,
}

/// Kind-discriminated event content.
#[derive(Clone, Debug, PartialEq)]
pub enum EventBody {
    User(String),
    Assistant(String),
    Planning(String),
    PlayingLog(String),
    PlayingSummary(String),
    KeyPosition(KeyPosition),
    VoiceEnd(String),
    End(String),
    Other { tag: String, text: String },
}

impl EventBody {
    /// Builds a text body for `kind`. Returns `None` for `KeyPosition`, whose
    /// content is structured.
    pub fn text(kind: EventKind, text: String) -> Option<Self> {
        Some(match kind {
            EventKind::User => Self::User(text),
            EventKind::Assistant => Self::Assistant(text),
            EventKind::Planning => Self::Planning(text),
            EventKind::PlayingLog => Self::PlayingLog(text),
            EventKind::PlayingSummary => Self::PlayingSummary(text),
            EventKind::VoiceEnd => Self::VoiceEnd(text),
            EventKind::End => Self::End(text),
            EventKind::Other(tag) => Self::Other { tag, text },
            EventKind::KeyPosition => return None,
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::User(_) => EventKind::User,
            Self::Assistant(_) => EventKind::Assistant,
            Self::Planning(_) => EventKind::Planning,
            Self::PlayingLog(_) => EventKind::PlayingLog,
            Self::PlayingSummary(_) => EventKind::PlayingSummary,
            Self::KeyPosition(_) => EventKind::KeyPosition,
            Self::VoiceEnd(_) => EventKind::VoiceEnd,
            Self::End(_) => EventKind::End,
            Self::Other { tag, .. } => EventKind::Other(tag.clone()),
        }
    }

    /// Text content, if this is a text event.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::User(text)
            | Self::Assistant(text)
            | Self::Planning(text)
            | Self::PlayingLog(text)
            | Self::PlayingSummary(text)
            | Self::VoiceEnd(text)
            | Self::End(text)
            | Self::Other { text, .. } => Some(text),
            Self::KeyPosition(_) => None,
        }
    }

    pub fn as_key_position(&self) -> Option<&KeyPosition> {
        match self {
            Self::KeyPosition(key) => Some(key),
            _ => None,
        }
    }
}

/// One normalized event from the stream.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub id: String,
    pub session_id: SessionId,
    pub timestamp: Timestamp,
    pub status: i64,
    pub body: EventBody,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        self.body.kind()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.body, EventBody::End(_))
    }
}
