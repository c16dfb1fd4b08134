//! Server event decode.
//!
//! One [`ServerEvent`] is the typed form of one record delivered by the event
//! stream. The enum is closed: every kind the server currently emits has a
//! variant, and anything else decodes to [`ServerEvent::Unrecognized`] so new
//! server-side kinds never break an older client.
//!
//! Decoding is the normalization boundary. Identifiers arrive as numbers or
//! numeric strings and become branded `u64` IDs here; mute entries arrive as
//! bare ids or objects and are reduced to ids; enumerated strings (kick
//! reasons, log actions) map unknown values to an explicit `Unrecognized`
//! alternative instead of failing the whole record.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::ids::{ChannelId, MessageId, UserId};

/// One decoded server event record.
///
/// Variant names mirror the wire kinds (including the server's own spelling
/// of `user_leaved_group`).
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Liveness signal. No state change.
    Heartbeat,

    /// The replica is caught up; live data may be rendered.
    Ready,

    /// Full user-directory baseline declaring a global version.
    UsersSnapshot {
        /// Directory version this snapshot represents.
        version: u64,
    },

    /// Incremental user-directory change log.
    UsersLog {
        /// Independently applicable log entries.
        logs: Vec<UserLogEntry>,
    },

    /// Read-marker and mute-list changes (initial form).
    UserSettings(SettingsUpdate),

    /// Read-marker and mute-list changes (incremental form, same payload).
    UserSettingsChanged(SettingsUpdate),

    /// Presence snapshot for a batch of users.
    UsersState {
        /// Per-user presence entries.
        users: Vec<PresenceUpdate>,
    },

    /// Presence delta for a single user (fields flattened on the wire).
    UsersStateChanged(PresenceUpdate),

    /// The session has been invalidated server-side.
    Kick {
        /// Why the session was invalidated.
        reason: KickReason,
    },

    /// Full channel-list snapshot; replaces the channel store.
    RelatedGroups {
        /// Every channel the user belongs to.
        groups: Vec<ChannelRecord>,
    },

    /// The user joined (or was added to) one channel.
    JoinedGroup {
        /// The joined channel.
        group: ChannelRecord,
    },

    /// Attribute changes for one channel.
    GroupChanged(ChannelChange),

    /// Users were added to a channel's membership.
    UserJoinedGroup {
        /// Target channel.
        gid: ChannelId,
        /// Added member ids.
        uid: Vec<UserId>,
    },

    /// Users left a channel's membership.
    UserLeavedGroup {
        /// Target channel.
        gid: ChannelId,
        /// Departed member ids.
        uid: Vec<UserId>,
    },

    /// The local user was removed from a channel.
    KickFromGroup {
        /// The channel the user was removed from.
        gid: ChannelId,
    },

    /// A channel's pinned-message reference changed.
    PinnedMessageUpdated(PinUpdate),

    /// A chat message; ingestion is delegated to an external collaborator.
    Chat(ChatMessage),

    /// Any kind this client does not know. Logged and ignored.
    #[serde(other)]
    Unrecognized,
}

impl ServerEvent {
    /// Decode one event record from its JSON payload.
    pub fn decode(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}

/// Why the server invalidated the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum KickReason {
    /// The account logged in from another device.
    ElsewhereLogin,
    /// The account was deleted.
    AccountDeleted,
    /// A reason this client does not know; ignored.
    Unrecognized,
}

impl From<String> for KickReason {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "login_from_other_device" => Self::ElsewhereLogin,
            "delete_user" => Self::AccountDeleted,
            _ => Self::Unrecognized,
        }
    }
}

/// Wire form of one channel.
#[derive(Clone, Debug, Deserialize)]
pub struct ChannelRecord {
    /// Channel identifier.
    pub gid: ChannelId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Description text.
    #[serde(default)]
    pub description: String,
    /// Owning user, if any.
    #[serde(default)]
    pub owner: Option<UserId>,
    /// Whether the channel is public. Public channels do not surface
    /// membership churn.
    #[serde(default)]
    pub is_public: bool,
    /// Member ids.
    #[serde(default)]
    pub members: Vec<UserId>,
    /// Avatar freshness marker; zero means no avatar has been set.
    #[serde(default)]
    pub avatar_updated_at: u64,
    /// Additional server-supplied attributes, kept opaque.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Sub-operation carried by a channel-change event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ChangeOperation {
    /// Union the listed members into the channel.
    AddMember,
    /// Difference the listed members out of the channel.
    RemoveMember,
    /// An operation this client does not know; the remaining fields are
    /// merged as plain attributes.
    Unrecognized,
}

impl From<String> for ChangeOperation {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "add_member" => Self::AddMember,
            "remove_member" => Self::RemoveMember,
            _ => Self::Unrecognized,
        }
    }
}

/// Attribute changes for one channel (`group_changed`).
///
/// The membership sub-operations are special-cased: `operation` and
/// `members` are pulled out of the bag so the store can apply them as set
/// merges rather than attribute writes.
#[derive(Clone, Debug, Deserialize)]
pub struct ChannelChange {
    /// Target channel.
    pub gid: ChannelId,
    /// Membership sub-operation, when present.
    #[serde(default)]
    pub operation: Option<ChangeOperation>,
    /// Members the sub-operation applies to.
    #[serde(default)]
    pub members: Option<Vec<UserId>>,
    /// Changed fields as an opaque attribute bag.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// One user-directory change-log entry.
///
/// Entries are independently applicable: each is a keyed upsert carrying its
/// own `log_id`, not a positional diff.
#[derive(Clone, Debug, Deserialize)]
pub struct UserLogEntry {
    /// Subject user.
    pub uid: UserId,
    /// What happened to the record.
    pub action: LogAction,
    /// Position of this entry in the directory log.
    pub log_id: u64,
    /// Display name, when changed.
    #[serde(default)]
    pub name: Option<String>,
    /// Email, when changed.
    #[serde(default)]
    pub email: Option<String>,
    /// Admin flag, when changed.
    #[serde(default)]
    pub is_admin: Option<bool>,
    /// Avatar freshness marker, when changed.
    #[serde(default)]
    pub avatar_updated_at: Option<u64>,
    /// Additional profile attributes, kept opaque.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Directory log entry action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum LogAction {
    /// Insert a new user record.
    Create,
    /// Update an existing record (upsert on miss).
    Update,
    /// Remove the record.
    Delete,
    /// An action this client does not know; the entry is skipped.
    Unrecognized,
}

impl From<String> for LogAction {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "create" => Self::Create,
            "update" => Self::Update,
            "delete" => Self::Delete,
            _ => Self::Unrecognized,
        }
    }
}

/// Presence for one user, independent of the profile log.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct PresenceUpdate {
    /// Subject user.
    pub uid: UserId,
    /// Whether the user is currently online.
    #[serde(default)]
    pub online: bool,
}

/// Read marker for a channel.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct ReadIndexGroup {
    /// Channel the marker applies to.
    pub gid: ChannelId,
    /// Last read message.
    pub mid: MessageId,
}

/// Read marker for a direct-message peer.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct ReadIndexUser {
    /// Peer the marker applies to.
    pub uid: UserId,
    /// Last read message.
    pub mid: MessageId,
}

/// A muted user, as sent on the wire: either a bare id or an object that may
/// carry an expiry. Only the id is retained.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(untagged)]
pub enum MuteUser {
    /// Bare id form.
    Bare(UserId),
    /// Object form (extra fields such as an expiry are ignored).
    Entry {
        /// The muted user.
        uid: UserId,
    },
}

impl MuteUser {
    /// The muted user's id.
    #[must_use]
    pub fn uid(self) -> UserId {
        match self {
            Self::Bare(uid) | Self::Entry { uid } => uid,
        }
    }
}

/// A muted channel, in the same two wire shapes as [`MuteUser`].
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(untagged)]
pub enum MuteGroup {
    /// Bare id form.
    Bare(ChannelId),
    /// Object form (extra fields are ignored).
    Entry {
        /// The muted channel.
        gid: ChannelId,
    },
}

impl MuteGroup {
    /// The muted channel's id.
    #[must_use]
    pub fn gid(self) -> ChannelId {
        match self {
            Self::Bare(gid) | Self::Entry { gid } => gid,
        }
    }
}

/// Read-marker and mute-list changes.
///
/// Every field group is optional; the server sends only what changed. The
/// `mute_users`/`mute_groups` aliases cover the initial-settings form, which
/// lists the full mute set under the unprefixed keys.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SettingsUpdate {
    /// Per-channel read markers.
    #[serde(default)]
    pub read_index_groups: Option<Vec<ReadIndexGroup>>,
    /// Per-peer read markers.
    #[serde(default)]
    pub read_index_users: Option<Vec<ReadIndexUser>>,
    /// Users to add to the mute set.
    #[serde(default, alias = "mute_users")]
    pub add_mute_users: Option<Vec<MuteUser>>,
    /// Channels to add to the mute set.
    #[serde(default, alias = "mute_groups")]
    pub add_mute_groups: Option<Vec<MuteGroup>>,
    /// Users to remove from the mute set.
    #[serde(default)]
    pub remove_mute_users: Option<Vec<UserId>>,
    /// Channels to remove from the mute set.
    #[serde(default)]
    pub remove_mute_groups: Option<Vec<ChannelId>>,
}

/// A channel's pinned-message reference changed.
#[derive(Clone, Debug, Deserialize)]
pub struct PinUpdate {
    /// Target channel.
    pub gid: ChannelId,
    /// The pinned message, or zero when the pin was cleared.
    #[serde(default)]
    pub mid: MessageId,
    /// Optional pinned-message body for display.
    #[serde(default)]
    pub msg: Option<Value>,
}

/// A chat message. The body stays opaque to this core; ingestion belongs to
/// an external collaborator.
#[derive(Clone, Debug, Deserialize)]
pub struct ChatMessage {
    /// Server-assigned message sequence id; advances the resume cursor.
    pub mid: MessageId,
    /// The rest of the message payload, passed through untouched.
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
