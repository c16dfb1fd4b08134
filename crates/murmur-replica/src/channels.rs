//! Channel store.
//!
//! Holds one record per conversation channel, keyed by id, plus an ordered id
//! list that determines display order. The two structures always track the
//! same id set: no id without a record, no record without an id entry.
//!
//! Membership updates are set merges (see [`crate::membership`]) so that
//! duplicate delivery across reconnects leaves the member list unchanged.
//! Membership operations on public channels are ignored: public channels do
//! not surface membership churn.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::debug;

use murmur_core::events::{ChannelRecord, PinUpdate};
use murmur_core::{ChannelId, MessageId, UserId};

use crate::membership;

/// A pinned-message reference on a channel.
#[derive(Clone, Debug)]
pub struct PinnedMessage {
    /// The pinned message id.
    pub mid: MessageId,
    /// Optional message body for display.
    pub msg: Option<Value>,
}

/// One replicated channel.
#[derive(Clone, Debug)]
pub struct Channel {
    /// Channel identifier.
    pub gid: ChannelId,
    /// Display name.
    pub name: String,
    /// Description text.
    pub description: String,
    /// Owning user, if any.
    pub owner: Option<UserId>,
    /// Whether the channel is public.
    pub is_public: bool,
    /// Member ids, unique, insertion-ordered.
    pub members: Vec<UserId>,
    /// Avatar freshness marker; zero means no avatar has been set.
    pub avatar_updated_at: u64,
    /// Derived display icon reference. Empty when no avatar is set,
    /// otherwise embeds the id and freshness marker so the presentation
    /// layer can bust stale caches without a separate invalidation signal.
    pub icon: String,
    /// Last pinned message, if any.
    pub pinned: Option<PinnedMessage>,
    /// Additional server-supplied attributes, kept opaque.
    pub extra: Map<String, Value>,
}

impl Channel {
    fn from_record(record: ChannelRecord, resource_base: &str) -> Self {
        let icon = group_icon(resource_base, record.gid, record.avatar_updated_at);
        Self {
            gid: record.gid,
            name: record.name,
            description: record.description,
            owner: record.owner,
            is_public: record.is_public,
            members: membership::union(&[], &record.members),
            avatar_updated_at: record.avatar_updated_at,
            icon,
            pinned: None,
            extra: record.extra,
        }
    }

    /// Shallow-merge an attribute bag into this record.
    ///
    /// Known fields are updated in place; everything else lands in the
    /// opaque attribute bag. Envelope keys (`type`, `gid`, `operation`)
    /// never belong to the record.
    fn merge(&mut self, fields: Map<String, Value>, resource_base: &str) {
        for (key, value) in fields {
            match key.as_str() {
                "type" | "gid" | "operation" => {}
                "name" => {
                    if let Some(name) = value.as_str() {
                        self.name = name.to_owned();
                    }
                }
                "description" => {
                    if let Some(description) = value.as_str() {
                        self.description = description.to_owned();
                    }
                }
                "owner" => {
                    self.owner = serde_json::from_value(value).ok();
                }
                "is_public" => {
                    if let Some(is_public) = value.as_bool() {
                        self.is_public = is_public;
                    }
                }
                "avatar_updated_at" => {
                    if let Some(marker) = value.as_u64() {
                        self.avatar_updated_at = marker;
                        self.icon = group_icon(resource_base, self.gid, marker);
                    }
                }
                _ => {
                    let _ = self.extra.insert(key, value);
                }
            }
        }
    }
}

/// Derive a channel's display icon reference from its id and avatar
/// freshness marker. A zero marker means no avatar: the reference is empty.
#[must_use]
pub fn group_icon(resource_base: &str, gid: ChannelId, avatar_updated_at: u64) -> String {
    if avatar_updated_at == 0 {
        String::new()
    } else {
        format!("{resource_base}/resource/group_avatar?gid={gid}&t={avatar_updated_at}")
    }
}

/// A structured update operation against one channel.
#[derive(Clone, Debug)]
pub enum ChannelUpdate {
    /// Union the ids into the channel's member set.
    AddMembers(Vec<UserId>),
    /// Difference the ids out of the channel's member set.
    RemoveMembers(Vec<UserId>),
    /// Shallow-merge an attribute bag into the record.
    Merge(Map<String, Value>),
    /// Update the pinned-message reference.
    SetPin(PinUpdate),
}

/// The replicated channel collection.
#[derive(Debug)]
pub struct ChannelStore {
    resource_base: String,
    ids: Vec<ChannelId>,
    by_id: HashMap<ChannelId, Channel>,
}

impl ChannelStore {
    /// Create an empty store. `resource_base` is the server base URL used
    /// for derived icon references.
    #[must_use]
    pub fn new(resource_base: impl Into<String>) -> Self {
        Self {
            resource_base: resource_base.into(),
            ids: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    /// Replace the entire store contents from a snapshot, rebuilding both
    /// the id-order list and the keyed map from scratch.
    pub fn replace_all(&mut self, records: Vec<ChannelRecord>) {
        self.ids = records.iter().map(|record| record.gid).collect();
        self.by_id = records
            .into_iter()
            .map(|record| (record.gid, Channel::from_record(record, &self.resource_base)))
            .collect();
        // A snapshot with repeated gids collapses to the last record.
        self.ids.retain({
            let mut seen = std::collections::HashSet::new();
            move |gid| seen.insert(*gid)
        });
    }

    /// Insert a channel, or refresh it in place if already present.
    ///
    /// The id is appended to the order list only when absent: repeated
    /// upserts never reorder the display list. A refresh keeps the existing
    /// pinned-message reference, which only pin events own.
    pub fn upsert(&mut self, record: ChannelRecord) {
        let gid = record.gid;
        let channel = Channel::from_record(record, &self.resource_base);
        if let Some(existing) = self.by_id.get_mut(&gid) {
            let pinned = existing.pinned.take();
            *existing = Channel { pinned, ..channel };
        } else {
            self.ids.push(gid);
            let _ = self.by_id.insert(gid, channel);
        }
    }

    /// Remove a channel, deleting the id-list entry and the keyed record
    /// together. Unknown ids are a no-op.
    pub fn remove(&mut self, gid: ChannelId) {
        if self.by_id.remove(&gid).is_some() {
            self.ids.retain(|id| *id != gid);
        }
    }

    /// Apply a structured update to one channel.
    ///
    /// No-ops, silently: updates to an unknown id, and membership operations
    /// targeted at a public channel. At-least-once delivery makes both
    /// expected rather than exceptional.
    pub fn apply_update(&mut self, gid: ChannelId, update: ChannelUpdate) {
        let Some(channel) = self.by_id.get_mut(&gid) else {
            debug!(%gid, "update for unknown channel ignored");
            return;
        };
        if channel.is_public
            && matches!(
                update,
                ChannelUpdate::AddMembers(_) | ChannelUpdate::RemoveMembers(_)
            )
        {
            debug!(%gid, "membership op on public channel ignored");
            return;
        }
        match update {
            ChannelUpdate::AddMembers(uids) => {
                channel.members = membership::union(&channel.members, &uids);
            }
            ChannelUpdate::RemoveMembers(uids) => {
                channel.members = membership::difference(&channel.members, &uids);
            }
            ChannelUpdate::Merge(fields) => {
                channel.merge(fields, &self.resource_base);
            }
            ChannelUpdate::SetPin(pin) => {
                channel.pinned = if pin.mid.value() == 0 {
                    None
                } else {
                    Some(PinnedMessage {
                        mid: pin.mid,
                        msg: pin.msg,
                    })
                };
            }
        }
    }

    /// Drop every channel.
    pub fn reset(&mut self) {
        self.ids.clear();
        self.by_id.clear();
    }

    /// Look up one channel.
    #[must_use]
    pub fn get(&self, gid: ChannelId) -> Option<&Channel> {
        self.by_id.get(&gid)
    }

    /// Channel ids in display order.
    #[must_use]
    pub fn ids(&self) -> &[ChannelId] {
        &self.ids
    }

    /// Channels in display order.
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.ids.iter().filter_map(|gid| self.by_id.get(gid))
    }

    /// Number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
