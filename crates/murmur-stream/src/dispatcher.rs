//! Event dispatcher.
//!
//! Turns one decoded [`ServerEvent`] into exactly one state transition on the
//! replica, a signal to the embedding application, or a hand-off to the chat
//! collaborator. Pure dispatch: no blocking, no I/O, no retry decisions.
//!
//! The one piece of control flow the dispatcher owns is the typed
//! [`Flow`] result: a server-pushed session invalidation tells the connection
//! manager to shut the session down instead of continuing to consume records.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use murmur_core::events::{ChangeOperation, KickReason};
use murmur_core::{ServerEvent, UserId};
use murmur_replica::channels::ChannelUpdate;
use murmur_replica::SharedReplica;

use crate::signals::{AuthInvalidation, IngestContext, MessageSink, Signal};

/// What the connection manager should do after applying one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Keep consuming records.
    Continue,
    /// The session is no longer valid; stop the stream (fatal, no retry).
    Shutdown,
}

/// Applies decoded server events to the replica.
pub struct Dispatcher {
    replica: SharedReplica,
    signals: broadcast::Sender<Signal>,
    sink: Option<Arc<dyn MessageSink>>,
}

impl Dispatcher {
    /// Create a dispatcher writing to `replica` and signalling on `signals`.
    #[must_use]
    pub fn new(replica: SharedReplica, signals: broadcast::Sender<Signal>) -> Self {
        Self {
            replica,
            signals,
            sink: None,
        }
    }

    /// Attach the chat-ingestion collaborator.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Apply one event. `local_uid` is the signed-in user, needed to tell a
    /// peer's departure from our own.
    pub fn apply(&self, event: ServerEvent, local_uid: UserId) -> Flow {
        match event {
            ServerEvent::Heartbeat => {
                debug!("heartbeat");
                Flow::Continue
            }
            ServerEvent::Ready => {
                info!("replica caught up");
                self.replica.lock().mark_caught_up();
                self.send(Signal::ReplicaReady);
                Flow::Continue
            }
            ServerEvent::UsersSnapshot { version } => {
                debug!(version, "directory snapshot");
                let mut replica = self.replica.lock();
                replica.users.set_version(version);
                replica.replay.advance_users_version(version);
                Flow::Continue
            }
            ServerEvent::UsersLog { logs } => {
                debug!(entries = logs.len(), "directory change log");
                let mut replica = self.replica.lock();
                replica.users.apply_log(&logs);
                let version = replica.users.version();
                replica.replay.advance_users_version(version);
                Flow::Continue
            }
            ServerEvent::UserSettings(settings)
            | ServerEvent::UserSettingsChanged(settings) => {
                self.replica.lock().replay.apply_settings(&settings);
                Flow::Continue
            }
            ServerEvent::UsersState { users } => {
                self.replica.lock().users.apply_presence(&users);
                Flow::Continue
            }
            ServerEvent::UsersStateChanged(update) => {
                self.replica.lock().users.apply_presence(&[update]);
                Flow::Continue
            }
            ServerEvent::Kick { reason } => self.apply_kick(reason),
            ServerEvent::RelatedGroups { groups } => {
                debug!(channels = groups.len(), "channel snapshot");
                self.replica.lock().channels.replace_all(groups);
                Flow::Continue
            }
            ServerEvent::JoinedGroup { group } => {
                debug!(gid = %group.gid, "joined channel");
                self.replica.lock().channels.upsert(group);
                Flow::Continue
            }
            ServerEvent::GroupChanged(change) => {
                let update = match change.operation {
                    Some(ChangeOperation::AddMember) => {
                        ChannelUpdate::AddMembers(change.members.unwrap_or_default())
                    }
                    Some(ChangeOperation::RemoveMember) => {
                        ChannelUpdate::RemoveMembers(change.members.unwrap_or_default())
                    }
                    Some(ChangeOperation::Unrecognized) | None => {
                        ChannelUpdate::Merge(change.fields)
                    }
                };
                self.replica.lock().channels.apply_update(change.gid, update);
                Flow::Continue
            }
            ServerEvent::UserJoinedGroup { gid, uid } => {
                self.replica
                    .lock()
                    .channels
                    .apply_update(gid, ChannelUpdate::AddMembers(uid));
                Flow::Continue
            }
            ServerEvent::UserLeavedGroup { gid, uid } => {
                let mut replica = self.replica.lock();
                if uid.contains(&local_uid) {
                    // We left: the whole channel goes away.
                    replica.channels.remove(gid);
                } else {
                    replica
                        .channels
                        .apply_update(gid, ChannelUpdate::RemoveMembers(uid));
                }
                Flow::Continue
            }
            ServerEvent::KickFromGroup { gid } => {
                info!(%gid, "removed from channel");
                self.replica.lock().channels.remove(gid);
                Flow::Continue
            }
            ServerEvent::PinnedMessageUpdated(pin) => {
                self.replica
                    .lock()
                    .channels
                    .apply_update(pin.gid, ChannelUpdate::SetPin(pin));
                Flow::Continue
            }
            ServerEvent::Chat(message) => {
                let context = {
                    let mut replica = self.replica.lock();
                    replica.replay.advance_after_mid(message.mid);
                    IngestContext {
                        caught_up: replica.is_caught_up(),
                        local_uid,
                        read_channels: replica.replay.read_channels().clone(),
                        read_users: replica.replay.read_users().clone(),
                    }
                };
                // Outside the lock: the sink may want to read the replica.
                if let Some(sink) = &self.sink {
                    sink.ingest(message, context);
                }
                Flow::Continue
            }
            ServerEvent::Unrecognized => {
                debug!("unrecognized event kind ignored");
                Flow::Continue
            }
        }
    }

    fn apply_kick(&self, reason: KickReason) -> Flow {
        let invalidation = match reason {
            KickReason::ElsewhereLogin => AuthInvalidation::ElsewhereLogin,
            KickReason::AccountDeleted => AuthInvalidation::AccountDeleted,
            KickReason::Unrecognized => {
                debug!("kick with unrecognized reason ignored");
                return Flow::Continue;
            }
        };
        warn!(reason = %invalidation, "session invalidated by server");
        self.send(Signal::AuthInvalidated(invalidation));
        Flow::Shutdown
    }

    fn send(&self, signal: Signal) {
        // No receivers is fine; signals are fire-and-forget.
        let _ = self.signals.send(signal);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
