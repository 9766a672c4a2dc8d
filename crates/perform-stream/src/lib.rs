//! Session-scoped ingestion of an HTTP event stream.
//!
//! A [`StreamSessionController`] opens one streaming request per session,
//! decodes the chunked body into frames, normalizes each frame into a typed
//! [`Event`] and routes it into the [`EventStore`]: the per-session log, the
//! performance log, or the key-position sink that drives the live set of held
//! notes.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use perform_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), StreamError> {
//! let context = StreamContext::builder()
//!     .transport(Arc::new(HttpTransport::from_env()?))
//!     .build()?;
//!
//! context.observers().register(|notification| {
//!     if let Notification::ActiveNotesChanged = notification {
//!         println!("held notes changed");
//!     }
//! });
//!
//! let session = SessionId::generate();
//! context.start(session.clone(), Some(serde_json::json!({"message": "play"})))?;
//! let state = context.controller(session.clone()).wait_terminal().await;
//!
//! println!("{state:?}: {} events", context.store().session_log(&session).len());
//! # Ok(())
//! # }
//! ```

/// Incremental UTF-8 decoding of raw chunks.
pub mod decoder;
/// Frame splitting and JSON payload extraction.
pub mod frame;
/// Typed event model.
pub mod event;
/// Payload to [`Event`] normalization.
pub mod normalize;
/// Per-session ordered event log.
pub mod session_log;
/// Held-note projection from key-position events.
pub mod projector;
/// Shared store for every sink.
pub mod store;
/// Kind-based dispatch into the store.
pub mod router;
/// Byte transport seam and the HTTP implementation.
pub mod transport;
/// Transport configuration.
pub mod config;
/// Stream session controller: lifecycle, pump and cancellation.
pub mod controller;
/// Caller-owned context holding controllers, store and observers.
pub mod context;
/// Scoped observer registry.
pub mod observers;
/// Public error types.
pub mod errors;
/// Process-wide tracing setup for binaries.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;

pub use config::HttpTransportConfig;
pub use context::{StreamContext, StreamContextBuilder};
pub use controller::{RunStats, SessionState, StartOutcome, StreamSessionController};
pub use decoder::ChunkDecoder;
pub use errors::{DropReason, StreamError, TransportError};
pub use event::{
    Event, EventBody, EventKind, Hand, KeyPosition, NoteAction, SessionId, Timestamp,
};
pub use frame::{Frame, FrameSplitter, Framing, Payload};
pub use normalize::normalize;
pub use observability::init_observability;
pub use observers::{Notification, ObserverId, Observers};
pub use projector::{ActiveNotes, HeldNote, NoteProjector};
pub use router::{RouteOutcome, Router, Sink};
pub use session_log::{LogEntry, SessionLog};
pub use store::EventStore;
pub use transport::{ByteStream, HttpTransport, StreamRequest, Transport};
