//! Call-end reconciliation.
//!
//! A call that has ended can no longer be mitigated. Its memberships
//! are dropped from the pending set before the actuator sees them again,
//! and its entry is deleted outright. A later event for the same call id
//! starts a fresh entry.

use tracing::debug;
use warden_events::{CallId, MembershipId};

use crate::state::CallState;

/// What reconciling one call removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// The call that ended.
    pub call: CallId,
    /// Memberships that were active in it.
    pub members: Vec<MembershipId>,
    /// Of those, the ones discarded from the pending set.
    pub discarded: Vec<MembershipId>,
}

/// Purges `call` and its pending terminations.
///
/// Returns `None` if the call had no entry, in which case nothing in
/// the pending set is touched.
pub fn reconcile(state: &mut CallState, call: &CallId) -> Option<Reconciliation> {
    let Some(members) = state.remove_call(call) else {
        debug!(call_id = %call, "call ended without monitored members");
        return None;
    };

    let mut members: Vec<MembershipId> = members.into_iter().collect();
    members.sort();

    let pending = state.pending_mut();
    let discarded: Vec<MembershipId> = members
        .iter()
        .filter(|id| pending.remove(id))
        .cloned()
        .collect();

    debug!(
        call_id = %call,
        members = members.len(),
        discarded = discarded.len(),
        "call reconciled"
    );

    Some(Reconciliation {
        call: call.clone(),
        members,
        discarded,
    })
}
