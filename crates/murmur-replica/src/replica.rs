//! The replica aggregate.
//!
//! Bundles the channel store, user directory, and replay state behind one
//! mutex. The event dispatcher is the only writer; the embedding application
//! reads through the same lock. Event application happens on the single
//! session task, so the stores themselves carry no locking.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::channels::ChannelStore;
use crate::replay::{ReplayState, ResumeCursor};
use crate::users::UserDirectory;

/// The local in-memory copy of server-side state.
#[derive(Debug)]
pub struct Replica {
    /// Conversation channels.
    pub channels: ChannelStore,
    /// User directory.
    pub users: UserDirectory,
    /// Resume cursor, read markers, mute sets.
    pub replay: ReplayState,
    caught_up: bool,
}

impl Replica {
    /// Create an empty replica. `resource_base` is the server base URL used
    /// for derived avatar/icon references.
    #[must_use]
    pub fn new(resource_base: &str) -> Self {
        Self {
            channels: ChannelStore::new(resource_base),
            users: UserDirectory::new(resource_base),
            replay: ReplayState::new(),
            caught_up: false,
        }
    }

    /// Mark the replica caught-up with the server (safe to render live
    /// data).
    pub fn mark_caught_up(&mut self) {
        self.caught_up = true;
    }

    /// Whether the replica has caught up with the server since the last
    /// reset.
    #[must_use]
    pub fn is_caught_up(&self) -> bool {
        self.caught_up
    }

    /// The resume cursor for re-opening the stream.
    #[must_use]
    pub fn cursor(&self) -> ResumeCursor {
        self.replay.cursor()
    }

    /// Full reset: drop all replicated state and the cursor. Used on
    /// logout/auth invalidation.
    pub fn reset(&mut self) {
        self.channels.reset();
        self.users.reset();
        self.replay.reset();
        self.caught_up = false;
    }
}

/// Shared handle to the replica: written by the dispatcher, read by the
/// embedding application.
pub type SharedReplica = Arc<Mutex<Replica>>;

/// Create a new shared replica handle.
#[must_use]
pub fn shared(resource_base: &str) -> SharedReplica {
    Arc::new(Mutex::new(Replica::new(resource_base)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
