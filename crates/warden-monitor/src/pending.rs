//! # Pending Terminations
//!
//! Membership ids flagged for mitigation. The detector only adds to
//! this set; the actuator and the reconciler only remove from it.
//!
//! Each entry is either *queued* (waiting for a termination command) or
//! *in flight* (a command has been issued and its outcome is unknown).
//! Only queued entries are handed to the actuator, so a membership that
//! is re-flagged while its termination is outstanding is not terminated
//! twice.
//!
//! ```text
//!   flag ──► queued ──claim──► in flight ──success──► removed
//!              ▲                    │
//!              └──────release───────┘ (failure)
//!
//!   call end: queued | in flight ──► discarded
//! ```

use std::collections::{BTreeMap, BTreeSet};

use warden_events::MembershipId;

/// Dispatch state of a pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Waiting for a termination command.
    Queued,
    /// A termination command is outstanding.
    InFlight,
}

/// Membership ids awaiting termination.
#[derive(Debug, Clone, Default)]
pub struct PendingTerminations {
    entries: BTreeMap<MembershipId, DispatchState>,
}

impl PendingTerminations {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Unions `ids` into the set. Existing entries keep their state.
    ///
    /// Returns the ids that were not already pending.
    pub fn flag(&mut self, ids: impl IntoIterator<Item = MembershipId>) -> Vec<MembershipId> {
        let mut added = Vec::new();
        for id in ids {
            if !self.entries.contains_key(&id) {
                self.entries.insert(id.clone(), DispatchState::Queued);
                added.push(id);
            }
        }
        added
    }

    /// Removes one entry, whatever its state. Returns true if it was present.
    pub fn remove(&mut self, id: &MembershipId) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Marks every queued entry in flight and returns those ids.
    pub fn claim_queued(&mut self) -> Vec<MembershipId> {
        self.entries
            .iter_mut()
            .filter(|(_, state)| **state == DispatchState::Queued)
            .map(|(id, state)| {
                *state = DispatchState::InFlight;
                id.clone()
            })
            .collect()
    }

    /// Returns an in-flight entry to the queue after a failed command.
    ///
    /// Returns false if the entry is gone (for example, its call ended).
    pub fn release(&mut self, id: &MembershipId) -> bool {
        match self.entries.get_mut(id) {
            Some(state) => {
                *state = DispatchState::Queued;
                true
            }
            None => false,
        }
    }

    /// Returns true if `id` is pending.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &MembershipId) -> bool {
        self.entries.contains_key(id)
    }

    /// Returns the dispatch state of `id`, if pending.
    #[must_use]
    pub fn state(&self, id: &MembershipId) -> Option<DispatchState> {
        self.entries.get(id).copied()
    }

    /// Number of pending entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries with an outstanding command.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.entries
            .values()
            .filter(|state| **state == DispatchState::InFlight)
            .count()
    }

    /// Sorted copy of every pending id.
    #[must_use]
    pub fn snapshot(&self) -> BTreeSet<MembershipId> {
        self.entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<MembershipId> {
        raw.iter().map(|s| MembershipId::from(*s)).collect()
    }

    #[test]
    fn test_flag_is_a_union() {
        let mut pending = PendingTerminations::new();
        assert_eq!(pending.flag(ids(&["m1", "m2"])).len(), 2);
        assert_eq!(pending.flag(ids(&["m2", "m3"])), ids(&["m3"]));
        assert_eq!(pending.len(), 3);
    }

    #[test]
    fn test_claim_only_returns_queued() {
        let mut pending = PendingTerminations::new();
        pending.flag(ids(&["m1", "m2"]));

        assert_eq!(pending.claim_queued(), ids(&["m1", "m2"]));
        assert!(pending.claim_queued().is_empty());
        assert_eq!(pending.in_flight(), 2);

        // Re-flagging in-flight entries does not requeue them.
        pending.flag(ids(&["m1"]));
        assert!(pending.claim_queued().is_empty());
    }

    #[test]
    fn test_release_requeues() {
        let mut pending = PendingTerminations::new();
        pending.flag(ids(&["m1"]));
        pending.claim_queued();

        assert!(pending.release(&MembershipId::new("m1")));
        assert_eq!(pending.state(&MembershipId::new("m1")), Some(DispatchState::Queued));
        assert_eq!(pending.claim_queued(), ids(&["m1"]));
    }

    #[test]
    fn test_release_of_removed_entry_is_noop() {
        let mut pending = PendingTerminations::new();
        pending.flag(ids(&["m1"]));
        pending.claim_queued();
        assert!(pending.remove(&MembershipId::new("m1")));

        assert!(!pending.release(&MembershipId::new("m1")));
        assert!(pending.is_empty());
    }
}
