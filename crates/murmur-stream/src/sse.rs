//! Default transport over HTTP Server-Sent Events.
//!
//! Opens the long-lived `GET` with `reqwest` and decodes the
//! `text/event-stream` body into [`EventFrame`]s with `eventsource-stream`.
//! No retry loop lives here: the connection manager layers its own retry
//! policy above, so this transport surfaces every failure exactly once.

use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::transport::{EventFrame, OpenedStream, StreamRequest, Transport, TransportError};

/// SSE transport backed by a shared `reqwest` client.
pub struct SseTransport {
    client: reqwest::Client,
}

impl SseTransport {
    /// Create a transport with a fresh HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a transport sharing an existing HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for SseTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn map_open_error(error: &reqwest::Error) -> TransportError {
    if error.is_connect() {
        TransportError::NetworkLost(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}

fn map_stream_error(error: &EventStreamError<reqwest::Error>) -> TransportError {
    match error {
        EventStreamError::Transport(inner) if inner.is_connect() => {
            TransportError::NetworkLost(inner.to_string())
        }
        other => TransportError::Other(other.to_string()),
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn open(&self, request: &StreamRequest) -> Result<OpenedStream, TransportError> {
        let url = request.url();
        debug!(base_url = %request.base_url, "opening SSE request");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|error| map_open_error(&error))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let frames = response.bytes_stream().eventsource().map(|item| match item {
            Ok(event) => Ok(EventFrame {
                event: event.event,
                data: event.data,
            }),
            Err(error) => Err(map_stream_error(&error)),
        });

        Ok(OpenedStream {
            status,
            content_type,
            frames: Box::pin(frames),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use murmur_replica::ResumeCursor;

    use super::*;

    fn request(base_url: String, cursor: ResumeCursor) -> StreamRequest {
        StreamRequest {
            base_url,
            api_key: "tok".into(),
            cursor,
        }
    }

    #[tokio::test]
    async fn open_surfaces_status_and_decodes_frames() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"type\":\"heartbeat\"}\n\n",
            "event: FatalError\ndata: boom\n\n",
        );
        Mock::given(method("GET"))
            .and(path("/user/events"))
            .and(query_param("api-key", "tok"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let transport = SseTransport::new();
        let opened = transport
            .open(&request(server.uri(), ResumeCursor::default()))
            .await
            .unwrap();

        assert_eq!(opened.status, 200);
        assert_eq!(opened.content_type.as_deref(), Some("text/event-stream"));

        let frames: Vec<_> = opened.frames.collect().await;
        assert_eq!(frames.len(), 2);

        let first = frames[0].as_ref().unwrap();
        assert_eq!(first.event, "message");
        assert_eq!(first.data, r#"{"type":"heartbeat"}"#);

        let second = frames[1].as_ref().unwrap();
        assert_eq!(second.event, "FatalError");
        assert_eq!(second.data, "boom");
    }

    #[tokio::test]
    async fn cursor_params_are_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/events"))
            .and(query_param("after_mid", "55"))
            .and(query_param("users_version", "7"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("", "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = SseTransport::new();
        let cursor = ResumeCursor {
            after_mid: 55,
            users_version: 7,
        };
        let opened = transport.open(&request(server.uri(), cursor)).await.unwrap();
        assert_eq!(opened.status, 200);
    }

    #[tokio::test]
    async fn non_success_status_passes_through_unclassified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/events"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let transport = SseTransport::new();
        let opened = transport
            .open(&request(server.uri(), ResumeCursor::default()))
            .await
            .unwrap();
        assert_eq!(opened.status, 404);
    }

    #[tokio::test]
    async fn connection_refused_maps_to_network_loss() {
        let transport = SseTransport::new();
        let error = transport
            .open(&request("http://127.0.0.1:1".into(), ResumeCursor::default()))
            .await
            .unwrap_err();
        assert!(error.is_network_loss());
    }
}
