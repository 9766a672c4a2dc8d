use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt as _;
use tokio::sync::watch;
use tracing::{Instrument as _, debug, info, info_span, warn};

use crate::decoder::ChunkDecoder;
use crate::errors::{StreamError, TransportError};
use crate::event::SessionId;
use crate::frame::{Frame, FrameSplitter, classify};
use crate::normalize::normalize;
use crate::observers::{Notification, Observers};
use crate::router::{Dispatched, Router};
use crate::transport::{StreamRequest, Transport};

/// Lifecycle of the controller's current stream session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing started yet.
    Idle,
    /// Request sent; no body bytes yet.
    Requesting,
    /// At least one body byte received.
    Streaming,
    /// The stream ended. `end_received` is `true` when an `end` event was
    /// routed (the transport is released right away) and `false` when the
    /// transport closed without one; its absence is not an error.
    Completed { end_received: bool },
    /// Opening or reading the stream failed. Not retried.
    Failed(TransportError),
    /// Cancelled by the caller.
    Cancelled,
}

impl SessionState {
    /// `Requesting` or `Streaming`.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Requesting | Self::Streaming)
    }

    /// `Completed`, `Failed` or `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed(_) | Self::Cancelled
        )
    }
}

/// Result of [`StreamSessionController::start`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A stream was already in flight; nothing changed.
    AlreadyActive,
}

/// Counters for the current (or last) run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub bytes: u64,
    pub frames: u64,
    pub events_routed: u64,
    pub duplicates: u64,
    pub dropped: u64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle used to stop one run.
///
/// Aborting closes the routing gate first, so once `abort` returns no further
/// event of the run reaches the store, then wakes the pump so it drops the
/// transport even if a read is pending.
#[derive(Clone)]
pub(crate) struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
    gate: Arc<Mutex<bool>>,
}

impl AbortHandle {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            gate: Arc::new(Mutex::new(false)),
        }
    }

    fn abort(&self) {
        *lock(&self.gate) = true;
        self.tx.send_replace(true);
    }

    fn is_aborted(&self) -> bool {
        *lock(&self.gate)
    }

    async fn aborted(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so `changed` cannot fail here.
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

struct ActiveRun {
    session_id: SessionId,
    abort: AbortHandle,
}

struct RunSlot {
    generation: u64,
    current: Option<ActiveRun>,
}

struct ControllerInner {
    transport: Arc<dyn Transport>,
    router: Router,
    observers: Arc<Observers>,
    state: watch::Sender<SessionState>,
    run: Mutex<RunSlot>,
    stats: Mutex<RunStats>,
}

/// Drives one HTTP-streamed session at a time through
/// decoder, classifier, normalizer and router.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct StreamSessionController {
    inner: Arc<ControllerInner>,
}

impl StreamSessionController {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        router: Router,
        observers: Arc<Observers>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            inner: Arc::new(ControllerInner {
                transport,
                router,
                observers,
                state,
                run: Mutex::new(RunSlot {
                    generation: 0,
                    current: None,
                }),
                stats: Mutex::new(RunStats::default()),
            }),
        }
    }

    /// Opens a stream for `session_id` and pumps it on a background task.
    ///
    /// Must be called from within a Tokio runtime. While a stream is
    /// `Requesting` or `Streaming` this returns `AlreadyActive` and does
    /// nothing.
    pub fn start(
        &self,
        session_id: impl Into<SessionId>,
        payload: Option<serde_json::Value>,
    ) -> Result<StartOutcome, StreamError> {
        let session_id = session_id.into();
        if session_id.as_str().trim().is_empty() {
            return Err(StreamError::Validation("session id must not be empty".into()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| StreamError::Config("start requires a Tokio runtime".into()))?;

        let (abort, generation) = {
            let mut slot = lock(&self.inner.run);
            if self.inner.state.borrow().is_active() {
                debug!(%session_id, "start ignored: stream already in flight");
                return Ok(StartOutcome::AlreadyActive);
            }
            slot.generation += 1;
            let abort = AbortHandle::new();
            slot.current = Some(ActiveRun {
                session_id: session_id.clone(),
                abort: abort.clone(),
            });
            *lock(&self.inner.stats) = RunStats::default();
            self.inner.state.send_replace(SessionState::Requesting);
            (abort, slot.generation)
        };
        info!(%session_id, generation, "stream session requested");
        self.inner.announce_state(&session_id, SessionState::Requesting);

        let span = info_span!("stream_session", session_id = %session_id, generation);
        runtime.spawn(
            pump(self.inner.clone(), session_id, payload, abort, generation).instrument(span),
        );
        Ok(StartOutcome::Started)
    }

    /// Stops the current stream and releases its transport.
    ///
    /// Safe from any state and idempotent. `Completed` and `Failed` are kept;
    /// any other state becomes `Cancelled`.
    pub fn cancel(&self) {
        let (changed, session_id) = {
            let slot = lock(&self.inner.run);
            if let Some(run) = slot.current.as_ref() {
                run.abort.abort();
            }
            let changed = self.inner.state.send_if_modified(|state| {
                if state.is_terminal() {
                    return false;
                }
                *state = SessionState::Cancelled;
                true
            });
            (changed, slot.current.as_ref().map(|run| run.session_id.clone()))
        };
        if !changed {
            return;
        }
        match session_id {
            Some(session_id) => {
                info!(%session_id, "stream session cancelled");
                self.inner.announce_state(&session_id, SessionState::Cancelled);
            }
            None => debug!("cancelled before any stream was started"),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Waits until the controller is no longer `Requesting`/`Streaming` and
    /// returns that state. Returns immediately when idle.
    pub async fn wait_terminal(&self) -> SessionState {
        let mut rx = self.subscribe();
        loop {
            let state = rx.borrow_and_update().clone();
            if !state.is_active() {
                return state;
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    /// Session id of the current or last run.
    pub fn session_id(&self) -> Option<SessionId> {
        lock(&self.inner.run)
            .current
            .as_ref()
            .map(|run| run.session_id.clone())
    }

    pub fn stats(&self) -> RunStats {
        *lock(&self.inner.stats)
    }
}

impl ControllerInner {
    /// Publishes `state` if `generation` is still the current run and the
    /// run has not settled yet.
    fn publish(&self, generation: u64, session_id: &SessionId, state: SessionState) {
        let changed = {
            let slot = lock(&self.run);
            slot.generation == generation
                && self.state.send_if_modified(|current| {
                    if !current.is_active() || *current == state {
                        return false;
                    }
                    *current = state.clone();
                    true
                })
        };
        if changed {
            self.announce_state(session_id, state);
        }
    }

    fn complete(
        &self,
        generation: u64,
        session_id: &SessionId,
        end_received: bool,
        reason: &'static str,
    ) {
        let stats = *lock(&self.stats);
        info!(
            end_received,
            bytes = stats.bytes,
            frames = stats.frames,
            events = stats.events_routed,
            duplicates = stats.duplicates,
            dropped = stats.dropped,
            "{reason}"
        );
        self.publish(generation, session_id, SessionState::Completed { end_received });
    }

    fn announce_state(&self, session_id: &SessionId, state: SessionState) {
        self.observers.notify(&Notification::StateChanged {
            session_id: session_id.clone(),
            state,
        });
    }

    /// Classifies, normalizes and routes `frames` behind the abort gate.
    /// Returns `false` if the run was aborted.
    fn route_frames(
        &self,
        abort: &AbortHandle,
        frames: Vec<Frame>,
        origin: &SessionId,
        end_received: &mut bool,
    ) -> bool {
        if frames.is_empty() {
            return !abort.is_aborted();
        }
        let mut stats = RunStats {
            frames: frames.len() as u64,
            ..RunStats::default()
        };
        let mut dispatched: Vec<Dispatched> = Vec::new();
        {
            let gate = lock(&abort.gate);
            if *gate {
                return false;
            }
            for frame in frames {
                let event = match classify(frame) {
                    Ok(Some(payload)) => normalize(payload, origin),
                    Ok(None) => continue,
                    Err(reason) => Err(reason),
                };
                match event {
                    Ok(event) => {
                        let applied = self.router.dispatch(event, origin);
                        if applied.outcome.terminal {
                            *end_received = true;
                        }
                        if applied.outcome.appended {
                            stats.events_routed += 1;
                        } else {
                            stats.duplicates += 1;
                        }
                        dispatched.push(applied);
                    }
                    Err(reason) => {
                        stats.dropped += 1;
                        debug!(%reason, "frame dropped");
                    }
                }
            }
        }
        {
            let mut total = lock(&self.stats);
            total.frames += stats.frames;
            total.events_routed += stats.events_routed;
            total.duplicates += stats.duplicates;
            total.dropped += stats.dropped;
        }
        for applied in &dispatched {
            self.router.announce(applied);
        }
        true
    }
}

async fn pump(
    inner: Arc<ControllerInner>,
    session_id: SessionId,
    payload: Option<serde_json::Value>,
    abort: AbortHandle,
    generation: u64,
) {
    let request = StreamRequest {
        session_id: session_id.clone(),
        payload,
    };
    let opened = tokio::select! {
        biased;
        _ = abort.aborted() => {
            debug!("cancelled before the stream opened");
            return;
        }
        opened = inner.transport.open(request) => opened,
    };
    let mut stream = match opened {
        Ok(stream) => stream,
        Err(err) => {
            warn!(error = %err, "failed to open stream");
            inner.publish(generation, &session_id, SessionState::Failed(err));
            return;
        }
    };

    let mut decoder = ChunkDecoder::default();
    let mut splitter = FrameSplitter::default();
    let mut streaming = false;
    let mut end_received = false;
    loop {
        let next = tokio::select! {
            biased;
            _ = abort.aborted() => None,
            next = stream.next() => Some(next),
        };
        let Some(next) = next else {
            drop(stream);
            debug!("transport released after cancellation");
            return;
        };
        match next {
            Some(Ok(chunk)) => {
                if chunk.is_empty() {
                    continue;
                }
                lock(&inner.stats).bytes += chunk.len() as u64;
                if !streaming {
                    streaming = true;
                    inner.publish(generation, &session_id, SessionState::Streaming);
                }
                let text = decoder.push_chunk(&chunk);
                let frames = splitter.push_text(&text);
                if !inner.route_frames(&abort, frames, &session_id, &mut end_received) {
                    debug!("transport released after cancellation");
                    return;
                }
                if end_received {
                    // `end` closes the session even if the server keeps the
                    // connection open.
                    drop(stream);
                    inner.complete(generation, &session_id, true, "end event routed");
                    return;
                }
            }
            Some(Err(err)) => {
                warn!(error = %err, "stream read failed");
                drop(stream);
                inner.publish(generation, &session_id, SessionState::Failed(err));
                return;
            }
            None => {
                drop(stream);
                decoder.finish();
                let frames = splitter.finish();
                if !inner.route_frames(&abort, frames, &session_id, &mut end_received) {
                    return;
                }
                inner.complete(generation, &session_id, end_received, "stream closed");
                return;
            }
        }
    }
}
