//! Failure classification.
//!
//! Open results and stream failures classify into plain enums consumed by the
//! connection manager's state-transition code. Classification is a value, not
//! an exception: there is exactly one place that decides fatal vs retriable,
//! and it is trivially unit-testable.

use crate::transport::TransportError;

/// The event-stream media type the server must answer with.
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// What to do with an open result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenDisposition {
    /// Headers confirm a live event stream; start consuming records.
    Ready,
    /// Client-side error; do not reconnect without external intervention.
    Fatal,
    /// Transient; reconnect on the fixed-delay path.
    Retry,
}

/// Classify an open response by status and content type.
///
/// 2xx with an event-stream content type is the only success. 4xx other than
/// 429 is fatal (client-side errors do not heal by retrying). Everything
/// else — 5xx, 429, or a 2xx with the wrong content type — is retriable.
#[must_use]
pub fn classify_open(status: u16, content_type: Option<&str>) -> OpenDisposition {
    let is_event_stream = content_type
        .is_some_and(|value| value.split(';').next().map(str::trim) == Some(EVENT_STREAM_CONTENT_TYPE));
    if (200..300).contains(&status) && is_event_stream {
        OpenDisposition::Ready
    } else if (400..500).contains(&status) && status != 429 {
        OpenDisposition::Fatal
    } else {
        OpenDisposition::Retry
    }
}

/// What to do when an established stream fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamFailure {
    /// Lower-level connectivity loss: stop the session immediately and let
    /// the external online/offline gate drive reconnection. No timer is
    /// self-scheduled.
    NetworkLost,
    /// Anything else: reconnect on the fixed-delay path.
    Retriable,
}

/// Classify a mid-stream transport error.
#[must_use]
pub fn classify_stream_error(error: &TransportError) -> StreamFailure {
    if error.is_network_loss() {
        StreamFailure::NetworkLost
    } else {
        StreamFailure::Retriable
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
