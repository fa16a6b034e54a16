//! # Violation Detector
//!
//! Co-presence rule: a call holding `threshold` or more monitored
//! memberships (default 2) is a violation, and every membership in it
//! is flagged for termination.
//!
//! Membership sets only ever contain monitored people (filtering
//! happens before state is touched), so the rule is a pure count. The
//! detector is stateless: each run recomputes violations from the
//! current call table and unions them into the pending set. It never
//! removes anything.

use std::collections::BTreeSet;

use tracing::{debug, info};
use warden_events::{CallId, MembershipId};

use crate::error::{MonitorError, Result};
use crate::state::CallState;

/// Smallest meaningful co-presence threshold.
pub const MIN_THRESHOLD: usize = 2;

/// Outcome of one detector run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detection {
    /// Every pending id after the run.
    pub pending: BTreeSet<MembershipId>,
    /// Ids this run added to the pending set.
    pub newly_flagged: Vec<MembershipId>,
    /// Calls currently in violation.
    pub violating_calls: Vec<CallId>,
}

impl Detection {
    /// Returns true if anything is pending.
    #[inline]
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Flags memberships of calls that breach the co-presence threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViolationDetector {
    threshold: usize,
}

impl ViolationDetector {
    /// Creates a detector for the given co-presence threshold.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidThreshold`] if `threshold < 2`.
    pub fn new(threshold: usize) -> Result<Self> {
        if threshold < MIN_THRESHOLD {
            return Err(MonitorError::InvalidThreshold { threshold });
        }
        Ok(Self { threshold })
    }

    /// The configured threshold.
    #[inline]
    #[must_use]
    pub const fn threshold(&self) -> usize {
        self.threshold
    }

    /// Unions every violating call's memberships into the pending set.
    pub fn detect(&self, state: &mut CallState) -> Detection {
        let mut violating_calls = Vec::new();
        let mut flagged = Vec::new();

        for (call, members) in state.calls() {
            if members.len() >= self.threshold {
                violating_calls.push(call.clone());
                flagged.extend(members.iter().cloned());
            }
        }
        violating_calls.sort();

        let newly_flagged = state.pending_mut().flag(flagged);
        if !newly_flagged.is_empty() {
            info!(
                calls = ?violating_calls,
                flagged = ?newly_flagged,
                "co-presence violation detected"
            );
        } else if !violating_calls.is_empty() {
            debug!(calls = ?violating_calls, "violation already pending");
        }

        Detection {
            pending: state.pending().snapshot(),
            newly_flagged,
            violating_calls,
        }
    }
}

impl Default for ViolationDetector {
    fn default() -> Self {
        Self {
            threshold: MIN_THRESHOLD,
        }
    }
}
