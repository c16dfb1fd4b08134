//! Membership set algebra.
//!
//! Channel membership updates are delivered at-least-once, so they are
//! applied as set operations: union for additions, difference for removals.
//! The net effect is all that matters; uniqueness is the invariant.
//!
//! Lists keep insertion order so repeated applications of the same event
//! leave the list byte-for-byte identical.

use std::collections::HashSet;

use murmur_core::UserId;

/// Union `incoming` into `existing`, preserving existing order and appending
/// unseen ids in their incoming order. The result has no duplicates.
#[must_use]
pub fn union(existing: &[UserId], incoming: &[UserId]) -> Vec<UserId> {
    let mut seen: HashSet<UserId> = HashSet::with_capacity(existing.len() + incoming.len());
    let mut merged = Vec::with_capacity(existing.len() + incoming.len());
    for &uid in existing.iter().chain(incoming) {
        if seen.insert(uid) {
            merged.push(uid);
        }
    }
    merged
}

/// Remove every id in `removed` from `existing`, preserving the order of the
/// survivors.
#[must_use]
pub fn difference(existing: &[UserId], removed: &[UserId]) -> Vec<UserId> {
    let gone: HashSet<UserId> = removed.iter().copied().collect();
    existing
        .iter()
        .copied()
        .filter(|uid| !gone.contains(uid))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
