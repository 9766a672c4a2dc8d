use std::pin::Pin;

use futures::StreamExt as _;
use tracing::debug;

use crate::config::HttpTransportConfig;
use crate::errors::{StreamError, TransportError};
use crate::event::SessionId;

/// Raw response body of one stream session.
///
/// Dropping the stream releases the underlying connection.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Send + 'static>>;

/// What a controller asks the transport to open.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamRequest {
    pub session_id: SessionId,
    pub payload: Option<serde_json::Value>,
}

/// Opens one byte stream per stream session.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: StreamRequest) -> Result<ByteStream, TransportError>;
}

/// HTTP transport: one streaming POST per session.
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    /// Creates a transport from explicit configuration.
    pub fn new(config: HttpTransportConfig) -> Result<Self, StreamError> {
        config.validate()?;
        let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout);
        if !config.system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| StreamError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a transport from `PERFORM_STREAM_URL`.
    pub fn from_env() -> Result<Self, StreamError> {
        Self::new(HttpTransportConfig::from_env()?)
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: StreamRequest) -> Result<ByteStream, TransportError> {
        debug!(session_id = %request.session_id, url = %self.config.url, "opening event stream");
        let body = request_body(&request);
        let mut http_req = self
            .client
            .post(&self.config.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body);
        for (name, value) in &self.config.headers {
            http_req = http_req.header(name.as_str(), value.as_str());
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| TransportError::request(format!("request failed: {e}"), None))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::request(
                format!("endpoint answered with status {status}: {body}"),
                Some(status.as_u16()),
            ));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::read(e.to_string())));
        Ok(Box::pin(stream))
    }
}

/// JSON body sent with the request: the caller payload with `sessionId`
/// filled in when absent.
pub(crate) fn request_body(request: &StreamRequest) -> serde_json::Value {
    let session = serde_json::Value::String(request.session_id.to_string());
    match &request.payload {
        Some(serde_json::Value::Object(map)) => {
            let mut map = map.clone();
            map.entry("sessionId").or_insert(session);
            serde_json::Value::Object(map)
        }
        Some(other) => serde_json::json!({ "sessionId": session, "payload": other }),
        None => serde_json::json!({ "sessionId": session }),
    }
}
