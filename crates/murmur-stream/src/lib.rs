//! # murmur-stream
//!
//! The streaming side of the murmur sync client:
//!
//! - **[`transport`]**: the contract the core requires of an event-stream
//!   transport, plus the frame and error types it traffics in
//! - **[`sse`]**: the default transport over `reqwest` + `eventsource-stream`
//! - **[`classify`]**: typed fatal/retriable classification of open results
//!   and stream failures (no exceptions-as-control-flow)
//! - **[`connection`]**: the connection life-cycle state machine — exactly one
//!   logical session at a time, cursor resume, fixed-delay reconnect
//! - **[`dispatcher`]**: one decoded event in, exactly one idempotent replica
//!   mutation out
//! - **[`signals`]**: upward signals to the embedding application and the
//!   chat-ingestion collaborator contract

#![deny(unsafe_code)]

pub mod classify;
pub mod connection;
pub mod dispatcher;
pub mod signals;
pub mod sse;
pub mod transport;

pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState, Credential};
pub use dispatcher::Dispatcher;
pub use signals::{AuthInvalidation, IngestContext, MessageSink, Signal};
pub use sse::SseTransport;
pub use transport::{EventFrame, OpenedStream, StreamRequest, Transport, TransportError};
