//! The public client facade.
//!
//! Wires the replica, dispatcher, transport, and connection manager together
//! and exposes the surface the embedding application uses: credential
//! management, the streaming gate, read access to replicated state, and the
//! upward signal channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use murmur_core::{MessageId, UserId};
use murmur_replica::replica::shared;
use murmur_replica::{Channel, ResumeCursor, SharedReplica, User};
use murmur_stream::{
    ConnectionConfig, ConnectionManager, ConnectionState, Credential, Dispatcher, MessageSink,
    Signal, SseTransport, Transport,
};

use crate::config::ClientConfig;

/// Capacity of the upward signal channel. Signals are rare; a slow receiver
/// only loses superseded ones.
const SIGNAL_CHANNEL_CAPACITY: usize = 32;

/// The murmur sync client.
///
/// One instance owns one logical stream session and one replica. All methods
/// are cheap and non-blocking; the streaming work happens on background
/// tasks owned by the connection manager.
pub struct MurmurClient {
    replica: SharedReplica,
    manager: ConnectionManager,
    signals: broadcast::Sender<Signal>,
}

impl MurmurClient {
    /// Create a client with the default SSE transport.
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_parts(config, Arc::new(SseTransport::new()), None)
    }

    /// Create a client with an explicit transport and optional chat sink.
    #[must_use]
    pub fn with_parts(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        sink: Option<Arc<dyn MessageSink>>,
    ) -> Self {
        let replica = shared(&config.base_url);
        let (signals, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);

        let mut dispatcher = Dispatcher::new(replica.clone(), signals.clone());
        if let Some(sink) = sink {
            dispatcher = dispatcher.with_sink(sink);
        }

        let connection_config = ConnectionConfig {
            base_url: config.base_url.clone(),
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
        };
        let manager = ConnectionManager::new(
            transport,
            Arc::new(dispatcher),
            replica.clone(),
            connection_config,
        );

        Self {
            replica,
            manager,
            signals,
        }
    }

    // ── Credentials ─────────────────────────────────────────────────────

    /// Install the signed-in user's credential. Streaming still waits for
    /// [`set_streaming_ready`](Self::set_streaming_ready) or
    /// [`start_streaming`](Self::start_streaming).
    pub fn sign_in(&self, token: impl Into<String>, uid: UserId) {
        self.manager.set_credential(Some(Credential {
            token: token.into(),
            uid,
        }));
    }

    /// Drop credentials, stop streaming, and clear the replica and cursor.
    pub fn sign_out(&self) {
        self.manager.stop();
        self.manager.set_credential(None);
        self.replica.lock().reset();
    }

    /// Seed the resume cursor from externally persisted values before the
    /// first `start`.
    pub fn seed_cursor(&self, after_mid: u64, users_version: u64) {
        let mut replica = self.replica.lock();
        replica.replay.advance_after_mid(MessageId::new(after_mid));
        replica.replay.advance_users_version(users_version);
    }

    // ── Streaming control ───────────────────────────────────────────────

    /// External gate: when `false`, stop streaming; when newly `true`,
    /// start it. This is how the application reacts to online/offline
    /// transitions.
    pub fn set_streaming_ready(&self, ready: bool) {
        self.manager.set_ready(ready);
    }

    /// Open a stream session now. Idempotent; silent without a credential.
    pub fn start_streaming(&self) {
        self.manager.start();
    }

    /// Stop streaming. Terminal for the current session; also the external
    /// reset out of the `Fatal` state.
    pub fn stop_streaming(&self) {
        self.manager.stop();
    }

    /// Current connection life-cycle state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    // ── Read access ─────────────────────────────────────────────────────

    /// Shared handle to the replica for callers that need more than the
    /// snapshot accessors below.
    #[must_use]
    pub fn replica(&self) -> &SharedReplica {
        &self.replica
    }

    /// Snapshot of all channels in display order.
    #[must_use]
    pub fn channels(&self) -> Vec<Channel> {
        self.replica.lock().channels.iter().cloned().collect()
    }

    /// Snapshot of all known users.
    #[must_use]
    pub fn users(&self) -> Vec<User> {
        self.replica.lock().users.iter().cloned().collect()
    }

    /// Whether the replica has caught up since the last reset.
    #[must_use]
    pub fn is_caught_up(&self) -> bool {
        self.replica.lock().is_caught_up()
    }

    /// The current resume cursor, for the application's state layer to
    /// persist.
    #[must_use]
    pub fn resume_cursor(&self) -> ResumeCursor {
        self.replica.lock().cursor()
    }

    /// Subscribe to upward signals (replica ready, auth invalidated).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.signals.subscribe()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
