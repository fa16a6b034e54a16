//! # Call State Store
//!
//! In-memory model of monitored call participation. The event
//! processor owns the only instance and is its only writer.
//!
//! ## Tables
//!
//! | Table | Key | Value |
//! |-------|-----|-------|
//! | calls | `CallId` | memberships of monitored people currently in the call |
//! | latest | `PersonId` | the person's most recent membership |
//! | sessions | `MembershipId` | owning person and call |
//! | pending | `MembershipId` | flagged for termination |
//!
//! A call entry exists only while at least one monitored membership is
//! active in it. `latest` holds one membership per person, so a person
//! in two calls at once is tracked by their newest session only.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;
use warden_events::{CallId, MembershipId, PersonId};

use crate::error::{MonitorError, Result};
use crate::monitored::MonitoredSet;
use crate::pending::PendingTerminations;

/// Result of [`CallState::apply_join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The membership was added to its call.
    Inserted {
        /// Monitored memberships now in the call.
        call_size: usize,
    },
    /// The membership was already known; nothing changed.
    Duplicate,
}

/// A membership removed from its call after a successful termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retired {
    /// Whether the membership was still pending when retired.
    pub was_pending: bool,
    /// The person the membership belonged to, if still resolvable.
    pub person: Option<PersonId>,
    /// The call the membership was removed from, if still active.
    pub call: Option<CallId>,
}

#[derive(Debug, Clone)]
struct Session {
    person: PersonId,
    call: CallId,
    retired: bool,
}

/// Point-in-time counters for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    /// Calls with at least one monitored membership.
    pub active_calls: usize,
    /// Monitored memberships across all active calls.
    pub active_memberships: usize,
    /// Entries awaiting termination.
    pub pending: usize,
    /// Pending entries with an outstanding command.
    pub in_flight: usize,
}

/// Calls, memberships and pending terminations.
///
/// # Example
///
/// ```rust
/// use warden_events::{CallId, MembershipId, PersonId};
/// use warden_monitor::{CallState, JoinOutcome, MonitoredSet};
///
/// let monitored = MonitoredSet::new([PersonId::new("a"), PersonId::new("b")]);
/// let mut state = CallState::new(monitored);
///
/// let outcome = state.apply_join(&"a".into(), &"c1".into(), &"m1".into())?;
/// assert_eq!(outcome, JoinOutcome::Inserted { call_size: 1 });
/// assert_eq!(state.call_size(&CallId::new("c1")), 1);
/// # Ok::<(), warden_monitor::MonitorError>(())
/// ```
#[derive(Debug)]
pub struct CallState {
    monitored: MonitoredSet,
    calls: HashMap<CallId, HashSet<MembershipId>>,
    latest: HashMap<PersonId, MembershipId>,
    sessions: HashMap<MembershipId, Session>,
    pending: PendingTerminations,
}

impl CallState {
    /// Creates an empty store for the given monitored identities.
    #[must_use]
    pub fn new(monitored: MonitoredSet) -> Self {
        Self {
            monitored,
            calls: HashMap::new(),
            latest: HashMap::new(),
            sessions: HashMap::new(),
            pending: PendingTerminations::new(),
        }
    }

    /// The monitored identities this store was built for.
    #[inline]
    #[must_use]
    pub fn monitored(&self) -> &MonitoredSet {
        &self.monitored
    }

    /// Returns true if `person` is monitored.
    #[inline]
    #[must_use]
    pub fn is_monitored(&self, person: &PersonId) -> bool {
        self.monitored.contains(person)
    }

    /// Records that `person` joined `call` as `membership`.
    ///
    /// Sets the person's latest membership and adds the membership to
    /// the call, creating the call entry if needed. Re-applying a known
    /// membership is a no-op, so duplicate or replayed join
    /// notifications never change state.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::UnmonitoredPerson`] if `person` is not in
    /// the monitored set.
    pub fn apply_join(
        &mut self,
        person: &PersonId,
        call: &CallId,
        membership: &MembershipId,
    ) -> Result<JoinOutcome> {
        if !self.monitored.contains(person) {
            return Err(MonitorError::UnmonitoredPerson {
                person: person.clone(),
            });
        }

        if let Some(session) = self.sessions.get(membership) {
            if session.call != *call || session.person != *person {
                debug!(
                    membership_id = %membership,
                    known_call = %session.call,
                    call_id = %call,
                    "join repeats a known membership with different attributes"
                );
            }
            return Ok(JoinOutcome::Duplicate);
        }

        self.latest.insert(person.clone(), membership.clone());
        self.sessions.insert(
            membership.clone(),
            Session {
                person: person.clone(),
                call: call.clone(),
                retired: false,
            },
        );
        let members = self.calls.entry(call.clone()).or_default();
        members.insert(membership.clone());

        Ok(JoinOutcome::Inserted {
            call_size: members.len(),
        })
    }

    /// Removes a terminated membership from pending and from its call.
    ///
    /// The session stays known until its call ends, so replayed joins
    /// for it remain duplicates. The call entry is deleted once its last
    /// membership is retired.
    pub fn retire(&mut self, membership: &MembershipId) -> Retired {
        let was_pending = self.pending.remove(membership);

        let mut person = None;
        let mut call = None;
        if let Some(session) = self.sessions.get_mut(membership) {
            person = Some(session.person.clone());
            if !session.retired {
                session.retired = true;
                if let Some(members) = self.calls.get_mut(&session.call) {
                    members.remove(membership);
                    if members.is_empty() {
                        self.calls.remove(&session.call);
                    }
                    call = Some(session.call.clone());
                }
            }
        }

        Retired {
            was_pending,
            person: person.or_else(|| self.person_for_membership(membership).cloned()),
            call,
        }
    }

    /// Deletes a call and forgets its sessions.
    ///
    /// Returns the memberships that were still active in the call, or
    /// `None` if the call had no entry. Removing those ids from the
    /// pending set is the reconciler's job.
    pub(crate) fn remove_call(&mut self, call: &CallId) -> Option<HashSet<MembershipId>> {
        self.sessions.retain(|_, session| session.call != *call);
        self.calls.remove(call)
    }

    /// Memberships of monitored people currently in `call`.
    #[must_use]
    pub fn call_members(&self, call: &CallId) -> Option<&HashSet<MembershipId>> {
        self.calls.get(call)
    }

    /// Number of monitored memberships in `call` (0 if absent).
    #[must_use]
    pub fn call_size(&self, call: &CallId) -> usize {
        self.calls.get(call).map_or(0, HashSet::len)
    }

    /// Returns true if `call` has an entry.
    #[inline]
    #[must_use]
    pub fn has_call(&self, call: &CallId) -> bool {
        self.calls.contains_key(call)
    }

    /// Iterates over active calls and their memberships.
    pub fn calls(&self) -> impl Iterator<Item = (&CallId, &HashSet<MembershipId>)> {
        self.calls.iter()
    }

    /// The most recent membership of `person`.
    #[must_use]
    pub fn latest_membership(&self, person: &PersonId) -> Option<&MembershipId> {
        self.latest.get(person)
    }

    /// Reverse lookup: the person whose latest membership is `membership`.
    #[must_use]
    pub fn person_for_membership(&self, membership: &MembershipId) -> Option<&PersonId> {
        self.latest
            .iter()
            .find(|(_, m)| *m == membership)
            .map(|(person, _)| person)
    }

    /// Pending terminations.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> &PendingTerminations {
        &self.pending
    }

    /// Mutable access to pending terminations.
    #[inline]
    pub fn pending_mut(&mut self) -> &mut PendingTerminations {
        &mut self.pending
    }

    /// Counters for status logging.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            active_calls: self.calls.len(),
            active_memberships: self.calls.values().map(HashSet::len).sum(),
            pending: self.pending.len(),
            in_flight: self.pending.in_flight(),
        }
    }
}
