//! Upward signals and the chat-ingestion collaborator contract.
//!
//! The stream core raises two side-channel signals to the embedding
//! application: the replica is safe to render, and the session's credentials
//! are no longer valid. Chat messages are not applied to the replica at all;
//! they are handed to a [`MessageSink`] collaborator together with the
//! readiness and read-marker context it needs.

use std::collections::HashMap;

use murmur_core::events::ChatMessage;
use murmur_core::{ChannelId, MessageId, UserId};

/// Why the server invalidated the authenticated session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthInvalidation {
    /// The account logged in from another device.
    ElsewhereLogin,
    /// The account was deleted.
    AccountDeleted,
}

impl std::fmt::Display for AuthInvalidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ElsewhereLogin => f.write_str("logged in elsewhere"),
            Self::AccountDeleted => f.write_str("account deleted"),
        }
    }
}

/// A side-channel signal raised to the embedding application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    /// The replica has caught up; live data may be rendered.
    ReplicaReady,
    /// Credentials must be cleared and the user signed out.
    AuthInvalidated(AuthInvalidation),
}

/// Read-marker and readiness context passed along with each chat message.
#[derive(Clone, Debug)]
pub struct IngestContext {
    /// Whether the replica has caught up with the server.
    pub caught_up: bool,
    /// The locally signed-in user.
    pub local_uid: UserId,
    /// Per-channel read markers at time of delivery.
    pub read_channels: HashMap<ChannelId, MessageId>,
    /// Per-peer read markers at time of delivery.
    pub read_users: HashMap<UserId, MessageId>,
}

/// External collaborator that ingests chat messages.
///
/// Called on the session task, outside the replica lock. Implementations
/// must not block.
pub trait MessageSink: Send + Sync {
    /// Ingest one chat message.
    fn ingest(&self, message: ChatMessage, context: IngestContext);
}
