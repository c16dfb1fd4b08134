//! # murmur-replica
//!
//! The local, in-memory replica of server-side state, kept consistent with
//! the server by the event stream:
//!
//! - **[`ChannelStore`]**: per-channel records keyed by id, an ordered id list
//!   for display, and idempotent membership merges
//! - **[`UserDirectory`]**: per-user profile/presence records with
//!   snapshot/log reconciliation and a monotonic directory version
//! - **[`ReplayState`]**: the resume cursor (message marker + directory
//!   version), read markers, and mute sets
//! - **[`Replica`]**: the aggregate handed to the event dispatcher and read
//!   by the embedding application
//!
//! Every mutation is safe to apply more than once: delivery is at-least-once
//! across reconnects, so membership changes are set operations and directory
//! changes are keyed, version-gated upserts.
//!
//! The stores are plain structs with no internal locking. They are mutated
//! only from the single session task; concurrent readers go through the
//! [`SharedReplica`] mutex.

#![deny(unsafe_code)]

pub mod channels;
pub mod membership;
pub mod replay;
pub mod replica;
pub mod users;

pub use channels::{Channel, ChannelStore, ChannelUpdate};
pub use replay::{ReplayState, ResumeCursor};
pub use replica::{shared, Replica, SharedReplica};
pub use users::{User, UserDirectory};
