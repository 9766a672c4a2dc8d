use std::time::Duration;

use crate::errors::StreamError;

/// Configuration for [`crate::transport::HttpTransport`].
#[derive(Clone, Debug)]
pub struct HttpTransportConfig {
    /// Endpoint that answers with the event stream.
    pub url: String,
    /// Time allowed to establish the connection.
    ///
    /// No overall request timeout applies; a stream stays open for as long
    /// as the remote operation runs.
    pub connect_timeout: Duration,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Honor proxy settings from the environment (`HTTP_PROXY` and friends).
    pub system_proxy: bool,
}

impl HttpTransportConfig {
    /// Creates a config for `url` with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
            headers: Vec::new(),
            system_proxy: true,
        }
    }

    /// Builds a config from `PERFORM_STREAM_URL` and the optional
    /// `PERFORM_CONNECT_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, StreamError> {
        let url = std::env::var("PERFORM_STREAM_URL").unwrap_or_default();
        if url.trim().is_empty() {
            return Err(StreamError::Config(
                "missing PERFORM_STREAM_URL for the stream transport".into(),
            ));
        }
        let mut config = Self::new(url.trim());
        if let Ok(raw) = std::env::var("PERFORM_CONNECT_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                StreamError::Config(format!("invalid PERFORM_CONNECT_TIMEOUT_SECS: {raw}"))
            })?;
            config.connect_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Overrides the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Adds a request header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Enables or disables environment proxy settings.
    pub fn system_proxy(mut self, enabled: bool) -> Self {
        self.system_proxy = enabled;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), StreamError> {
        if self.url.trim().is_empty() {
            return Err(StreamError::Config("stream url must not be empty".into()));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(StreamError::Config(format!(
                "stream url must be http(s): {}",
                self.url
            )));
        }
        Ok(())
    }
}
