//! # murmur-core
//!
//! Foundation types for the murmur sync client.
//!
//! This crate provides the shared vocabulary the other murmur crates depend on:
//!
//! - **Branded IDs**: [`UserId`], [`ChannelId`], [`MessageId`] as `u64` newtypes
//!   normalized at the decode boundary (the wire may send either numbers or
//!   numeric strings)
//! - **Server events**: [`ServerEvent`], the closed tagged-variant decode of one
//!   event record, with an explicit [`ServerEvent::Unrecognized`] fallback
//! - **Wire payloads**: channel records, user change-log entries, presence
//!   updates, read markers, and mute entries
//!
//! [`UserId`]: ids::UserId
//! [`ChannelId`]: ids::ChannelId
//! [`MessageId`]: ids::MessageId
//! [`ServerEvent`]: events::ServerEvent

#![deny(unsafe_code)]

pub mod events;
pub mod ids;

pub use events::ServerEvent;
pub use ids::{ChannelId, MessageId, UserId};
