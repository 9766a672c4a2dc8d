//! Common imports for typical usage.
//!
//! Covers building a context, starting and cancelling sessions and reading
//! the store.
pub use crate::{
    ActiveNotes, Event, EventBody, EventKind, EventStore, Hand, HeldNote, HttpTransport,
    HttpTransportConfig, KeyPosition, NoteAction, Notification, SessionId, SessionState,
    StartOutcome, StreamContext, StreamError, StreamSessionController, Transport,
};
