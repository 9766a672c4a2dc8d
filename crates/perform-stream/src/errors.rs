/// Failure of the underlying byte transport for one stream session.
///
/// Fatal to the session that observed it and to nothing else.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent or the endpoint answered with a
    /// non-success status.
    #[error("stream request failed: {message}")]
    Request {
        message: String,
        status_code: Option<u16>,
    },
    /// Reading the response body failed after the stream was established.
    #[error("stream read failed: {message}")]
    Read { message: String },
}

impl TransportError {
    /// Creates a request-level error.
    pub fn request(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self::Request {
            message: message.into(),
            status_code,
        }
    }

    /// Creates a body read error.
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read {
            message: message.into(),
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Request { message, .. } | Self::Read { message } => message,
        }
    }
}

/// Why a frame or payload was discarded instead of becoming an event.
///
/// Drops are part of normal operation: they are logged and counted, never
/// returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DropReason {
    /// Frame text did not parse as JSON.
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(String),
    /// Frame parsed as JSON but is not an object.
    #[error("frame payload is not a JSON object")]
    NotAnObject,
    /// Object carries neither a `type` nor any `content`.
    #[error("payload has neither type nor content")]
    MissingKindAndContent,
    /// `key_position` content did not resolve to a key-position record.
    #[error("invalid key_position content: {0}")]
    InvalidKeyPosition(String),
}

/// Top-level error type for the public API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Invalid context or transport configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input (for example an empty session id).
    #[error("validation error: {0}")]
    Validation(String),
    /// Transport failure surfaced outside a running session.
    #[error(transparent)]
    Transport(TransportError),
}

impl From<TransportError> for StreamError {
    fn from(value: TransportError) -> Self {
        StreamError::Transport(value)
    }
}
