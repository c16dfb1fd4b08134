//! Event-stream transport contract.
//!
//! The connection manager consumes a transport through this trait: open a
//! long-lived stream for a request, observe the response status and content
//! type, then iterate decoded `{event-name, data}` records until the stream
//! ends or fails. The manager owns classification and retry; a transport
//! must not run its own retry loop.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use murmur_replica::ResumeCursor;

/// One decoded event record: the stream-level event name plus the JSON
/// payload text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventFrame {
    /// Stream-level event name (`"message"` when the server sends none).
    pub event: String,
    /// JSON-encoded event payload.
    pub data: String,
}

/// Errors surfaced by a transport.
///
/// The two variants carry the one distinction the connection manager needs:
/// whether the failure is a lower-level connectivity loss (reconnection is
/// driven by the external online/offline gate) or anything else (retried on
/// the fixed-delay path).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Lower-level network connectivity is gone (no route, DNS failure,
    /// connection refused).
    #[error("network lost: {0}")]
    NetworkLost(String),

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether this failure signals lower-level connectivity loss.
    #[must_use]
    pub fn is_network_loss(&self) -> bool {
        matches!(self, Self::NetworkLost(_))
    }
}

/// Boxed stream of decoded event records.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<EventFrame, TransportError>> + Send>>;

/// A successfully opened (but not yet classified) stream.
///
/// Non-2xx responses are returned here too: the status and content type are
/// the manager's inputs for deciding `Ready` vs `Fatal` vs `Retrying`.
pub struct OpenedStream {
    /// HTTP response status.
    pub status: u16,
    /// Response `Content-Type` header, if present.
    pub content_type: Option<String>,
    /// The decoded record stream.
    pub frames: FrameStream,
}

impl std::fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStream")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("frames", &"<stream>")
            .finish()
    }
}

/// Parameters for opening one stream session.
#[derive(Clone, Debug)]
pub struct StreamRequest {
    /// Server base URL, e.g. `https://chat.example.com/api`.
    pub base_url: String,
    /// Opaque credential passed as the `api-key` parameter.
    pub api_key: String,
    /// Resume position; zero components are omitted from the URL.
    pub cursor: ResumeCursor,
}

impl StreamRequest {
    /// Render the full stream URL with query parameters.
    #[must_use]
    pub fn url(&self) -> String {
        let key = utf8_percent_encode(&self.api_key, NON_ALPHANUMERIC);
        let mut url = format!("{}/user/events?api-key={key}", self.base_url);
        for (name, value) in self.cursor.query_params() {
            url.push('&');
            url.push_str(name);
            url.push('=');
            url.push_str(&value);
        }
        url
    }
}

/// The transport collaborator contract.
///
/// `open` resolves once response headers are available; record iteration
/// happens on the returned [`OpenedStream`]. Cancellation is driven by the
/// caller dropping the stream (and the future, for in-flight opens).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a long-lived event stream for the given request.
    async fn open(&self, request: &StreamRequest) -> Result<OpenedStream, TransportError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
