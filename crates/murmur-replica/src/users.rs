//! User directory store.
//!
//! Per-user presence/profile records synchronized by two independent streams:
//! a snapshot/change-log pair for profile data, and an online/offline stream
//! for presence. Presence updates never touch profile fields and profile log
//! application never clobbers presence.
//!
//! The directory version is monotonically non-decreasing. Each record carries
//! the `log_id` of the last entry applied to it; a log entry at or below that
//! marker is a no-op, which makes replayed logs after a reconnect harmless.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::debug;

use murmur_core::events::{LogAction, PresenceUpdate, UserLogEntry};
use murmur_core::UserId;

/// One replicated user.
#[derive(Clone, Debug)]
pub struct User {
    /// User identifier.
    pub uid: UserId,
    /// Display name.
    pub name: String,
    /// Email, if known.
    pub email: Option<String>,
    /// Admin flag.
    pub is_admin: bool,
    /// Whether the user is currently online.
    pub online: bool,
    /// Avatar freshness marker; zero means no avatar has been set.
    pub avatar_updated_at: u64,
    /// Derived avatar reference; empty when no avatar is set.
    pub avatar: String,
    /// Log position of the last entry applied to this record.
    pub log_id: u64,
    /// Additional profile attributes, kept opaque.
    pub extra: Map<String, Value>,
}

/// Derive a user's avatar reference from the id and freshness marker.
#[must_use]
pub fn user_avatar(resource_base: &str, uid: UserId, avatar_updated_at: u64) -> String {
    if avatar_updated_at == 0 {
        String::new()
    } else {
        format!("{resource_base}/resource/avatar?uid={uid}&t={avatar_updated_at}")
    }
}

/// The replicated user collection.
#[derive(Debug)]
pub struct UserDirectory {
    resource_base: String,
    version: u64,
    by_uid: HashMap<UserId, User>,
}

impl UserDirectory {
    /// Create an empty directory. `resource_base` is the server base URL
    /// used for derived avatar references.
    #[must_use]
    pub fn new(resource_base: impl Into<String>) -> Self {
        Self {
            resource_base: resource_base.into(),
            version: 0,
            by_uid: HashMap::new(),
        }
    }

    /// Record the directory baseline version from a snapshot.
    ///
    /// The version never moves backward; an older snapshot version is
    /// ignored.
    pub fn set_version(&mut self, version: u64) {
        if version < self.version {
            debug!(
                version,
                current = self.version,
                "stale directory snapshot version ignored"
            );
            return;
        }
        self.version = version;
    }

    /// Apply a batch of change-log entries.
    ///
    /// Entries carry no ordering dependency on each other: each is a keyed
    /// upsert gated by its own `log_id`, so the batch may be applied in any
    /// order and more than once. The directory version advances to the
    /// highest applied `log_id`.
    pub fn apply_log(&mut self, entries: &[UserLogEntry]) {
        for entry in entries {
            self.apply_entry(entry);
        }
    }

    fn apply_entry(&mut self, entry: &UserLogEntry) {
        match entry.action {
            LogAction::Delete => {
                let _ = self.by_uid.remove(&entry.uid);
            }
            LogAction::Create | LogAction::Update => {
                let user = self.by_uid.entry(entry.uid).or_insert_with(|| User {
                    uid: entry.uid,
                    name: String::new(),
                    email: None,
                    is_admin: false,
                    online: false,
                    avatar_updated_at: 0,
                    avatar: String::new(),
                    log_id: 0,
                    extra: Map::new(),
                });
                if entry.log_id <= user.log_id {
                    debug!(uid = %entry.uid, log_id = entry.log_id, "stale log entry ignored");
                    return;
                }
                if let Some(name) = &entry.name {
                    user.name.clone_from(name);
                }
                if let Some(email) = &entry.email {
                    user.email = Some(email.clone());
                }
                if let Some(is_admin) = entry.is_admin {
                    user.is_admin = is_admin;
                }
                if let Some(marker) = entry.avatar_updated_at {
                    user.avatar_updated_at = marker;
                    user.avatar = user_avatar(&self.resource_base, entry.uid, marker);
                }
                for (key, value) in &entry.extra {
                    let _ = user.extra.insert(key.clone(), value.clone());
                }
                user.log_id = entry.log_id;
            }
            LogAction::Unrecognized => {
                debug!(uid = %entry.uid, "unrecognized log action ignored");
                return;
            }
        }
        self.version = self.version.max(entry.log_id);
    }

    /// Apply presence updates. Only the presence field is touched; profile
    /// fields and version markers are left alone. Unknown users are a no-op.
    pub fn apply_presence(&mut self, updates: &[PresenceUpdate]) {
        for update in updates {
            if let Some(user) = self.by_uid.get_mut(&update.uid) {
                user.online = update.online;
            } else {
                debug!(uid = %update.uid, "presence for unknown user ignored");
            }
        }
    }

    /// Drop every record and reset the version.
    pub fn reset(&mut self) {
        self.version = 0;
        self.by_uid.clear();
    }

    /// Current directory version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Look up one user.
    #[must_use]
    pub fn get(&self, uid: UserId) -> Option<&User> {
        self.by_uid.get(&uid)
    }

    /// All users, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.by_uid.values()
    }

    /// Number of users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_uid.len()
    }

    /// Whether the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_uid.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
