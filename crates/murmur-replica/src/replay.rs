//! Replay state: the resume cursor, read markers, and mute sets.
//!
//! Process-wide bookkeeping that lets a new stream session resume from the
//! last server-acknowledged position instead of replaying the full history.
//! Every component advances strictly forward; the only way back is an
//! explicit [`ReplayState::reset`] on logout.

use std::collections::{HashMap, HashSet};

use murmur_core::events::SettingsUpdate;
use murmur_core::{ChannelId, MessageId, UserId};

/// The resume position sent when re-opening the stream.
///
/// A zero component means "from the beginning" and is omitted from the
/// request entirely: omission signals full history to the server, while an
/// explicit zero is a different request semantic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResumeCursor {
    /// Last-seen message sequence marker.
    pub after_mid: u64,
    /// Last-seen user-directory version.
    pub users_version: u64,
}

impl ResumeCursor {
    /// Render the cursor as stream query parameters, omitting zero
    /// components.
    #[must_use]
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(2);
        if self.after_mid != 0 {
            params.push(("after_mid", self.after_mid.to_string()));
        }
        if self.users_version != 0 {
            params.push(("users_version", self.users_version.to_string()));
        }
        params
    }
}

/// Cursor, read-marker, and mute-list state for one client.
#[derive(Debug, Default)]
pub struct ReplayState {
    after_mid: u64,
    users_version: u64,
    read_channels: HashMap<ChannelId, MessageId>,
    read_users: HashMap<UserId, MessageId>,
    mute_users: HashSet<UserId>,
    mute_groups: HashSet<ChannelId>,
}

impl ReplayState {
    /// Create empty replay state (full-history cursor).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cursor from externally persisted values (the surrounding
    /// application's state layer owns persistence).
    #[must_use]
    pub fn with_cursor(after_mid: u64, users_version: u64) -> Self {
        Self {
            after_mid,
            users_version,
            ..Self::default()
        }
    }

    /// The current resume cursor.
    #[must_use]
    pub fn cursor(&self) -> ResumeCursor {
        ResumeCursor {
            after_mid: self.after_mid,
            users_version: self.users_version,
        }
    }

    /// Advance the message marker. Never moves backward.
    pub fn advance_after_mid(&mut self, mid: MessageId) {
        self.after_mid = self.after_mid.max(mid.value());
    }

    /// Advance the directory version marker. Never moves backward.
    pub fn advance_users_version(&mut self, version: u64) {
        self.users_version = self.users_version.max(version);
    }

    /// Apply the read-marker and mute-list portions of a settings change.
    pub fn apply_settings(&mut self, settings: &SettingsUpdate) {
        if let Some(entries) = &settings.read_index_groups {
            for entry in entries {
                let marker = self.read_channels.entry(entry.gid).or_default();
                *marker = (*marker).max(entry.mid);
            }
        }
        if let Some(entries) = &settings.read_index_users {
            for entry in entries {
                let marker = self.read_users.entry(entry.uid).or_default();
                *marker = (*marker).max(entry.mid);
            }
        }
        if let Some(added) = &settings.add_mute_users {
            self.mute_users.extend(added.iter().map(|entry| entry.uid()));
        }
        if let Some(added) = &settings.add_mute_groups {
            self.mute_groups.extend(added.iter().map(|entry| entry.gid()));
        }
        if let Some(removed) = &settings.remove_mute_users {
            for uid in removed {
                let _ = self.mute_users.remove(uid);
            }
        }
        if let Some(removed) = &settings.remove_mute_groups {
            for gid in removed {
                let _ = self.mute_groups.remove(gid);
            }
        }
    }

    /// Read marker for a channel, if any.
    #[must_use]
    pub fn read_channel(&self, gid: ChannelId) -> Option<MessageId> {
        self.read_channels.get(&gid).copied()
    }

    /// Read marker for a direct-message peer, if any.
    #[must_use]
    pub fn read_user(&self, uid: UserId) -> Option<MessageId> {
        self.read_users.get(&uid).copied()
    }

    /// Per-channel read markers.
    #[must_use]
    pub fn read_channels(&self) -> &HashMap<ChannelId, MessageId> {
        &self.read_channels
    }

    /// Per-peer read markers.
    #[must_use]
    pub fn read_users(&self) -> &HashMap<UserId, MessageId> {
        &self.read_users
    }

    /// Whether a user is muted.
    #[must_use]
    pub fn is_user_muted(&self, uid: UserId) -> bool {
        self.mute_users.contains(&uid)
    }

    /// Whether a channel is muted.
    #[must_use]
    pub fn is_group_muted(&self, gid: ChannelId) -> bool {
        self.mute_groups.contains(&gid)
    }

    /// Roll everything back to the zero cursor. Only an explicit
    /// logout/reset may do this.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(json: serde_json::Value) -> SettingsUpdate {
        serde_json::from_value(json).unwrap()
    }

    // ── Cursor ───────────────────────────────────────────────────────────

    #[test]
    fn zero_components_are_omitted_from_params() {
        assert!(ResumeCursor::default().query_params().is_empty());

        let partial = ResumeCursor {
            after_mid: 9,
            users_version: 0,
        };
        assert_eq!(partial.query_params(), vec![("after_mid", "9".to_string())]);

        let full = ResumeCursor {
            after_mid: 9,
            users_version: 3,
        };
        assert_eq!(
            full.query_params(),
            vec![
                ("after_mid", "9".to_string()),
                ("users_version", "3".to_string()),
            ]
        );
    }

    #[test]
    fn markers_only_move_forward() {
        let mut state = ReplayState::new();
        state.advance_after_mid(MessageId::new(10));
        state.advance_after_mid(MessageId::new(4));
        assert_eq!(state.cursor().after_mid, 10);

        state.advance_users_version(7);
        state.advance_users_version(2);
        assert_eq!(state.cursor().users_version, 7);
    }

    #[test]
    fn seeded_cursor_round_trips() {
        let state = ReplayState::with_cursor(100, 5);
        assert_eq!(
            state.cursor(),
            ResumeCursor {
                after_mid: 100,
                users_version: 5,
            }
        );
    }

    // ── Read markers ─────────────────────────────────────────────────────

    #[test]
    fn read_markers_update_per_key_forward_only() {
        let mut state = ReplayState::new();
        state.apply_settings(&settings(serde_json::json!({
            "read_index_groups": [{"gid": 1, "mid": 10}],
            "read_index_users": [{"uid": 2, "mid": 20}],
        })));
        state.apply_settings(&settings(serde_json::json!({
            "read_index_groups": [{"gid": 1, "mid": 5}],
        })));
        assert_eq!(state.read_channel(ChannelId::new(1)), Some(MessageId::new(10)));
        assert_eq!(state.read_user(UserId::new(2)), Some(MessageId::new(20)));
    }

    // ── Mute sets ────────────────────────────────────────────────────────

    #[test]
    fn mute_add_and_remove_split_by_kind() {
        let mut state = ReplayState::new();
        state.apply_settings(&settings(serde_json::json!({
            "add_mute_users": [3, 4],
            "add_mute_groups": [{"gid": 7}],
        })));
        assert!(state.is_user_muted(UserId::new(3)));
        assert!(state.is_group_muted(ChannelId::new(7)));
        assert!(!state.is_group_muted(ChannelId::new(3)));

        state.apply_settings(&settings(serde_json::json!({
            "remove_mute_users": [3],
            "remove_mute_groups": [7],
        })));
        assert!(!state.is_user_muted(UserId::new(3)));
        assert!(state.is_user_muted(UserId::new(4)));
        assert!(!state.is_group_muted(ChannelId::new(7)));
    }

    #[test]
    fn mute_add_twice_is_idempotent() {
        let mut state = ReplayState::new();
        let update = settings(serde_json::json!({"add_mute_users": [3]}));
        state.apply_settings(&update);
        state.apply_settings(&update);
        assert!(state.is_user_muted(UserId::new(3)));
        state.apply_settings(&settings(serde_json::json!({"remove_mute_users": [3]})));
        assert!(!state.is_user_muted(UserId::new(3)));
    }

    // ── Reset ────────────────────────────────────────────────────────────

    #[test]
    fn reset_returns_to_zero_cursor() {
        let mut state = ReplayState::with_cursor(50, 2);
        state.apply_settings(&settings(serde_json::json!({"add_mute_users": [1]})));
        state.reset();
        assert_eq!(state.cursor(), ResumeCursor::default());
        assert!(!state.is_user_muted(UserId::new(1)));
    }
}
