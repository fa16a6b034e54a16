//! # Call State Monitor
//!
//! Membership tracking and co-presence enforcement state for callwarden.
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`MonitoredSet`] | identities that must never share a call |
//! | [`CallState`] | calls, latest memberships, pending terminations |
//! | [`PendingTerminations`] | flagged memberships with dispatch state |
//! | [`ViolationDetector`] | flags every membership of a violating call |
//! | [`reconcile`] | purges a call and its pending entries on call end |
//!
//! ## Quick Start
//!
//! ```rust
//! use warden_events::{CallId, MembershipId, PersonId};
//! use warden_monitor::{reconcile, CallState, MonitoredSet, ViolationDetector};
//!
//! let monitored = MonitoredSet::new([PersonId::new("a"), PersonId::new("b")]);
//! let mut state = CallState::new(monitored);
//! let detector = ViolationDetector::default();
//!
//! state.apply_join(&"a".into(), &"c1".into(), &"m1".into())?;
//! state.apply_join(&"b".into(), &"c1".into(), &"m2".into())?;
//! assert_eq!(detector.detect(&mut state).pending.len(), 2);
//!
//! reconcile(&mut state, &CallId::new("c1"));
//! assert!(state.pending().is_empty());
//! # Ok::<(), warden_monitor::MonitorError>(())
//! ```
//!
//! ## Invariants
//!
//! - Call entries only hold memberships of monitored people.
//! - A call entry exists only while it has an active monitored membership.
//! - The detector only adds to the pending set.
//! - Reconciliation removes every pending id of the ended call.

mod detector;
mod error;
mod monitored;
mod pending;
mod reconcile;
mod state;

pub use detector::{Detection, ViolationDetector, MIN_THRESHOLD};
pub use error::{MonitorError, Result};
pub use monitored::MonitoredSet;
pub use pending::{DispatchState, PendingTerminations};
pub use reconcile::{reconcile, Reconciliation};
pub use state::{CallState, JoinOutcome, Retired, StateSnapshot};
