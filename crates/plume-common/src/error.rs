//! Error types for HTTP and XRPC client operations

use bytes::Bytes;
use smol_str::SmolStr;

/// Client error type wrapping all possible error conditions of a plain XRPC call
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ClientError {
    /// HTTP transport error
    #[error("HTTP transport error: {0}")]
    Transport(
        #[from]
        #[diagnostic_source]
        TransportError,
    ),

    /// Request serialization failed
    #[error("failed to encode request: {0}")]
    #[diagnostic(code(plume::client::encode))]
    Encode(String),

    /// Response deserialization failed
    #[error("failed to decode response: {0}")]
    #[diagnostic(code(plume::client::decode))]
    Decode(#[from] serde_json::Error),

    /// HTTP error response
    #[error("{0}")]
    Http(
        #[from]
        #[diagnostic_source]
        HttpError,
    ),
}

impl From<serde_html_form::ser::Error> for ClientError {
    fn from(e: serde_html_form::ser::Error) -> Self {
        Self::Encode(e.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(e: url::ParseError) -> Self {
        Self::Transport(TransportError::InvalidRequest(e.to_string()))
    }
}

impl From<http::Error> for ClientError {
    fn from(e: http::Error) -> Self {
        Self::Transport(TransportError::InvalidRequest(e.to_string()))
    }
}

/// Transport-level errors that occur during HTTP communication
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum TransportError {
    /// Failed to establish connection to server
    #[error("Connection error: {0}")]
    Connect(String),

    /// Request timed out
    #[error("Request timeout")]
    Timeout,

    /// Request construction failed (malformed URI, headers, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Other transport error
    #[error("Transport error: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(feature = "reqwest-client")]
impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_builder() || e.is_request() {
            Self::InvalidRequest(e.to_string())
        } else {
            Self::Other(Box::new(e))
        }
    }
}

/// Non-success HTTP response
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[diagnostic(code(plume::client::http_status))]
pub struct HttpError {
    /// HTTP status code
    pub status: http::StatusCode,
    /// Response body if available
    pub body: Option<Bytes>,
}

impl HttpError {
    /// Body as lossy UTF-8 text, empty when there was no body.
    pub fn body_text(&self) -> String {
        self.body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP {}", self.status)?;
        if let Some(body) = &self.body {
            if let Ok(s) = std::str::from_utf8(body) {
                write!(f, ":\n{}", s)?;
            }
        }
        Ok(())
    }
}

/// A string failed validation as one of the atproto identifier formats.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
#[error("invalid {kind} `{value}`: {reason}")]
#[diagnostic(code(plume::types::invalid))]
pub struct AtStrError {
    /// Which format was expected (`did`, `handle`, `at-uri`)
    pub kind: &'static str,
    /// The offending input
    pub value: SmolStr,
    /// Short description of the failed rule
    pub reason: &'static str,
}

impl AtStrError {
    pub(crate) fn new(kind: &'static str, value: &str, reason: &'static str) -> Self {
        Self {
            kind,
            value: SmolStr::new(value),
            reason,
        }
    }
}

/// Result type for client operations
pub type XrpcResult<T> = std::result::Result<T, ClientError>;
