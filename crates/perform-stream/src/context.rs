use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::controller::{StartOutcome, StreamSessionController};
use crate::errors::StreamError;
use crate::event::SessionId;
use crate::observers::Observers;
use crate::router::Router;
use crate::store::EventStore;
use crate::transport::Transport;

struct ContextInner {
    transport: Arc<dyn Transport>,
    router: Router,
    observers: Arc<Observers>,
    controllers: DashMap<SessionId, StreamSessionController>,
}

/// Caller-owned scope for stream sessions.
///
/// Holds the transport, the shared [`EventStore`], the observer registry and
/// one [`StreamSessionController`] per session id. Nothing here is
/// process-wide: two contexts never see each other's events or observers.
#[derive(Clone)]
pub struct StreamContext {
    inner: Arc<ContextInner>,
}

impl StreamContext {
    /// Starts a builder for wiring a transport (and optionally a store).
    pub fn builder() -> StreamContextBuilder {
        StreamContextBuilder::default()
    }

    /// Controller for `session_id`, created on first use.
    pub fn controller(&self, session_id: impl Into<SessionId>) -> StreamSessionController {
        self.inner
            .controllers
            .entry(session_id.into())
            .or_insert_with(|| self.new_controller())
            .clone()
    }

    /// Shorthand for `controller(session_id).start(session_id, payload)`.
    pub fn start(
        &self,
        session_id: impl Into<SessionId>,
        payload: Option<serde_json::Value>,
    ) -> Result<StartOutcome, StreamError> {
        let session_id = session_id.into();
        if session_id.as_str().trim().is_empty() {
            return Err(StreamError::Validation("session id must not be empty".into()));
        }
        self.controller(session_id.clone()).start(session_id, payload)
    }

    /// Cancels the controller of `session_id`, if there is one.
    pub fn cancel(&self, session_id: &SessionId) {
        if let Some(controller) = self.inner.controllers.get(session_id).map(|c| c.clone()) {
            controller.cancel();
        }
    }

    pub fn store(&self) -> &Arc<EventStore> {
        self.inner.router.store()
    }

    pub fn observers(&self) -> &Arc<Observers> {
        &self.inner.observers
    }

    /// Session ids that have a controller.
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .inner
            .controllers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn clear_performance_log(&self) {
        self.store().clear_performance_log();
    }

    pub fn reset_active_notes(&self) {
        self.store().reset_active_notes();
    }

    /// Cancels every controller of this context.
    pub fn cancel_all(&self) {
        let controllers: Vec<StreamSessionController> = self
            .inner
            .controllers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for controller in controllers {
            controller.cancel();
        }
    }

    /// Cancels every session and drops all observers and controllers.
    ///
    /// The store keeps its contents for readers that still hold it.
    pub fn shutdown(&self) {
        self.cancel_all();
        self.inner.observers.clear();
        self.inner.controllers.clear();
        info!("stream context shut down");
    }

    fn new_controller(&self) -> StreamSessionController {
        StreamSessionController::new(
            self.inner.transport.clone(),
            self.inner.router.clone(),
            self.inner.observers.clone(),
        )
    }
}

/// Builder used to wire a transport before creating a [`StreamContext`].
#[derive(Default)]
pub struct StreamContextBuilder {
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<EventStore>>,
}

impl StreamContextBuilder {
    /// Sets the transport every controller of the context uses.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Shares an existing store instead of creating an empty one.
    pub fn store(mut self, store: Arc<EventStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<StreamContext, StreamError> {
        let transport = self.transport.ok_or_else(|| {
            StreamError::Config("a stream context needs a transport".into())
        })?;
        let store = self.store.unwrap_or_else(|| Arc::new(EventStore::new()));
        let observers = Arc::new(Observers::default());
        Ok(StreamContext {
            inner: Arc::new(ContextInner {
                transport,
                router: Router::new(store, observers.clone()),
                observers,
                controllers: DashMap::new(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::SessionState;
    use crate::errors::TransportError;
    use crate::observers::Notification;
    use crate::transport::{ByteStream, StreamRequest};
    use futures::stream;
    use std::sync::Mutex;

    /// Answers each session with one assistant event carrying the session id
    /// from the request.
    struct EchoTransport;

    #[async_trait::async_trait]
    impl Transport for EchoTransport {
        async fn open(&self, request: StreamRequest) -> Result<ByteStream, TransportError> {
            let body = format!(
                "data: {}\n\ndata: {}\n\n",
                serde_json::json!({
                    "type": "assistant",
                    "id": format!("a-{}", request.session_id),
                    "sessionId": request.session_id.as_str(),
                    "content": "ok"
                }),
                serde_json::json!({"type": "end", "id": format!("e-{}", request.session_id), "content": ""})
            );
            Ok(Box::pin(stream::iter(vec![Ok(bytes::Bytes::from(body))])))
        }
    }

    struct PendingTransport;

    #[async_trait::async_trait]
    impl Transport for PendingTransport {
        async fn open(&self, _request: StreamRequest) -> Result<ByteStream, TransportError> {
            Ok(Box::pin(stream::pending::<Result<bytes::Bytes, TransportError>>()))
        }
    }

    #[test]
    fn build_requires_a_transport() {
        let result = StreamContext::builder().build();
        assert!(
            matches!(result, Err(StreamError::Config(message)) if message.contains("transport"))
        );
    }

    #[tokio::test]
    async fn controller_is_reused_per_session_id() {
        let context = StreamContext::builder()
            .transport(Arc::new(EchoTransport))
            .build()
            .expect("context");
        context.start("s1", None).expect("start");
        let first = context.controller("s1");
        first.wait_terminal().await;
        assert_eq!(first.state(), context.controller("s1").state());
        assert_eq!(context.controller("s2").state(), SessionState::Idle);
        assert_eq!(
            context.session_ids(),
            vec![SessionId::new("s1"), SessionId::new("s2")]
        );
    }

    #[tokio::test]
    async fn concurrent_sessions_share_one_store() {
        let context = StreamContext::builder()
            .transport(Arc::new(EchoTransport))
            .build()
            .expect("context");
        context.start("s1", None).expect("start s1");
        context.start("s2", None).expect("start s2");
        context.controller("s1").wait_terminal().await;
        context.controller("s2").wait_terminal().await;

        let store = context.store();
        let s1: Vec<String> = store
            .session_events(&SessionId::new("s1"))
            .into_iter()
            .map(|e| e.id)
            .collect();
        let s2: Vec<String> = store
            .session_events(&SessionId::new("s2"))
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(s1, vec!["a-s1", "e-s1"]);
        assert_eq!(s2, vec!["a-s2", "e-s2"]);
    }

    #[tokio::test]
    async fn observers_are_scoped_to_their_context() {
        let seen = Arc::new(Mutex::new(0_usize));
        let build = || {
            StreamContext::builder()
                .transport(Arc::new(EchoTransport))
                .build()
                .expect("context")
        };
        let watched = build();
        let other = build();
        let counter = seen.clone();
        watched.observers().register(move |n| {
            if matches!(n, Notification::EventRouted { .. }) {
                *counter.lock().expect("lock") += 1;
            }
        });

        other.start("s1", None).expect("start other");
        other.controller("s1").wait_terminal().await;
        assert_eq!(*seen.lock().expect("lock"), 0);

        watched.start("s1", None).expect("start watched");
        watched.controller("s1").wait_terminal().await;
        assert_eq!(*seen.lock().expect("lock"), 2);
    }

    #[tokio::test]
    async fn shutdown_cancels_sessions_and_drops_observers() {
        let context = StreamContext::builder()
            .transport(Arc::new(PendingTransport))
            .build()
            .expect("context");
        context.observers().register(|_| {});
        let controller = context.controller("s1");
        context.start("s1", None).expect("start");
        assert!(controller.state().is_active());

        context.shutdown();
        assert_eq!(controller.state(), SessionState::Cancelled);
        assert!(context.observers().is_empty());
        assert!(context.session_ids().is_empty());
    }

    #[test]
    fn start_rejects_empty_session_id_without_creating_a_controller() {
        let context = StreamContext::builder()
            .transport(Arc::new(PendingTransport))
            .build()
            .expect("context");
        assert!(matches!(context.start("", None), Err(StreamError::Validation(_))));
        assert!(context.session_ids().is_empty());
    }
}
