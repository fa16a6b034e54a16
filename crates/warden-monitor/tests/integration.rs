//! # Integration Tests
//!
//! End-to-end checks of state, detection and reconciliation working
//! together, driven the same way the event processor drives them.

use warden_events::{CallId, MembershipId, PersonId};
use warden_monitor::{reconcile, CallState, MonitoredSet, ViolationDetector};

fn p(id: &str) -> PersonId {
    PersonId::new(id)
}

fn c(id: &str) -> CallId {
    CallId::new(id)
}

fn m(id: &str) -> MembershipId {
    MembershipId::new(id)
}

fn monitored_ab() -> CallState {
    CallState::new(MonitoredSet::new([p("A"), p("B")]))
}

// ============================================================================
// Violation Detection
// ============================================================================

#[test]
fn test_every_member_flagged_once_call_reaches_two() {
    let mut state = monitored_ab();
    let detector = ViolationDetector::default();

    state.apply_join(&p("A"), &c("C1"), &m("m1")).unwrap();
    assert!(detector.detect(&mut state).pending.is_empty());

    state.apply_join(&p("B"), &c("C1"), &m("m2")).unwrap();
    let detection = detector.detect(&mut state);

    for id in state.call_members(&c("C1")).unwrap() {
        assert!(detection.pending.contains(id), "{id} should be pending");
    }
}

#[test]
fn test_identical_join_leaves_state_unchanged() {
    let mut state = monitored_ab();
    state.apply_join(&p("A"), &c("C1"), &m("m1")).unwrap();

    let members_before = state.call_members(&c("C1")).cloned();
    let latest_before = state.latest_membership(&p("A")).cloned();

    state.apply_join(&p("A"), &c("C1"), &m("m1")).unwrap();

    assert_eq!(state.call_members(&c("C1")).cloned(), members_before);
    assert_eq!(state.latest_membership(&p("A")).cloned(), latest_before);
}

// ============================================================================
// Reconciliation
// ============================================================================

#[test]
fn test_call_end_purges_everything_for_that_call() {
    let mut state = monitored_ab();
    let detector = ViolationDetector::default();

    state.apply_join(&p("A"), &c("X"), &m("m1")).unwrap();
    state.apply_join(&p("B"), &c("X"), &m("m2")).unwrap();
    detector.detect(&mut state);

    reconcile(&mut state, &c("X"));
    detector.detect(&mut state);

    assert!(!state.has_call(&c("X")));
    assert!(!state.pending().contains(&m("m1")));
    assert!(!state.pending().contains(&m("m2")));
}

// ============================================================================
// Actuation Settlement
// ============================================================================

#[test]
fn test_success_removes_exactly_one_failure_changes_nothing() {
    let mut state = monitored_ab();
    state.apply_join(&p("A"), &c("C1"), &m("m1")).unwrap();
    state.apply_join(&p("B"), &c("C1"), &m("m2")).unwrap();
    ViolationDetector::default().detect(&mut state);
    state.pending_mut().claim_queued();

    // Failure for m1: set unchanged.
    state.pending_mut().release(&m("m1"));
    assert_eq!(state.pending().snapshot(), [m("m1"), m("m2")].into_iter().collect());

    // Success for m2: only m2 leaves.
    state.retire(&m("m2"));
    assert_eq!(state.pending().snapshot(), [m("m1")].into_iter().collect());
}

#[test]
fn test_rejoin_under_new_membership_refires() {
    let mut state = monitored_ab();
    let detector = ViolationDetector::default();

    state.apply_join(&p("A"), &c("C1"), &m("m1")).unwrap();
    state.apply_join(&p("B"), &c("C1"), &m("m2")).unwrap();
    detector.detect(&mut state);
    state.pending_mut().claim_queued();

    // B is hung up, A's termination failed and is still pending.
    state.retire(&m("m2"));
    state.pending_mut().release(&m("m1"));

    // B comes back with a new session while A is still there.
    state.apply_join(&p("B"), &c("C1"), &m("m4")).unwrap();
    let detection = detector.detect(&mut state);

    assert!(detection.newly_flagged.contains(&m("m4")));
    assert!(!detection.pending.contains(&m("m2")));
}

// ============================================================================
// Worked Scenario
// ============================================================================

#[test]
fn test_two_call_scenario() {
    let mut state = monitored_ab();
    let detector = ViolationDetector::default();

    // A joins C1 as m1: no flag.
    state.apply_join(&p("A"), &c("C1"), &m("m1")).unwrap();
    assert!(detector.detect(&mut state).pending.is_empty());

    // B joins C1 as m2: both flagged.
    state.apply_join(&p("B"), &c("C1"), &m("m2")).unwrap();
    let detection = detector.detect(&mut state);
    assert_eq!(detection.pending, [m("m1"), m("m2")].into_iter().collect());
    state.pending_mut().claim_queued();

    // m2 terminated successfully.
    state.retire(&m("m2"));
    assert_eq!(state.pending().snapshot(), [m("m1")].into_iter().collect());

    // C1 ends.
    reconcile(&mut state, &c("C1"));
    assert!(state.pending().is_empty());
    assert!(!state.has_call(&c("C1")));

    // A alone in C2 is never flagged.
    state.apply_join(&p("A"), &c("C2"), &m("m3")).unwrap();
    assert!(detector.detect(&mut state).pending.is_empty());
}
