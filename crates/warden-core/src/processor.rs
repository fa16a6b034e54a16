//! # Event Processor
//!
//! The single writer of [`CallState`]. Consumes decoded events in
//! stream order, applies them, runs detection and hands claimed
//! memberships to the [`Actuator`].
//!
//! ## Per-event steps
//!
//! | Event | State change |
//! |-------|--------------|
//! | `CallEnded` | reconcile: drop the call and discard its pending ids |
//! | membership `joined`, monitored person | apply join |
//! | membership, unmonitored person | none |
//! | membership, any other status | none |
//!
//! Detection runs after every event. Queued pending ids are claimed and
//! dispatched; in-flight ids are never sent twice. A failed termination
//! goes back to the queue and is retried the next time an event arrives.
//!
//! ## Outcomes
//!
//! Termination outcomes come back over a channel and are applied between
//! events, never concurrently with them. Outcomes have priority over new
//! events so state reflects completed commands as early as possible.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use warden_events::{CallEvent, MembershipChange};
use warden_monitor::{
    reconcile, CallState, JoinOutcome, MonitoredSet, StateSnapshot, ViolationDetector,
    MIN_THRESHOLD,
};

use crate::actuator::{settle, ActuationOutcome, Actuator, Settlement};
use crate::collaborators::{Notifier, TerminationCommand};
use crate::Result;

/// Processor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    threshold: usize,
    notice: Option<String>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            threshold: MIN_THRESHOLD,
            notice: None,
        }
    }
}

impl ProcessorConfig {
    /// Default settings: threshold 2, no notifications.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the co-presence threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the notice sent after a successful termination.
    #[must_use]
    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }

    /// The co-presence threshold.
    #[inline]
    #[must_use]
    pub const fn threshold(&self) -> usize {
        self.threshold
    }

    /// The notice text, if notifications are enabled.
    #[must_use]
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }
}

/// Running counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessorStats {
    /// Events consumed.
    pub events: u64,
    /// Joins that added a membership.
    pub joins: u64,
    /// Joins for memberships already known.
    pub duplicates: u64,
    /// Membership events for people outside the monitored set.
    pub unmonitored: u64,
    /// Membership events with a status other than `joined`.
    pub status_ignored: u64,
    /// Calls reconciled after they ended.
    pub calls_ended: u64,
    /// Pending ids discarded because their call ended.
    pub discarded: u64,
    /// Ids newly flagged by detection.
    pub flagged: u64,
    /// Termination commands issued.
    pub dispatched: u64,
    /// Commands that succeeded.
    pub terminated: u64,
    /// Commands that failed.
    pub failed: u64,
    /// Notices delivered.
    pub notified: u64,
    /// Notices that could not be delivered.
    pub notify_failed: u64,
}

/// Final state of a processor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessorReport {
    /// Counters at shutdown.
    pub stats: ProcessorStats,
    /// State sizes at shutdown.
    pub state: StateSnapshot,
}

enum Step {
    Outcome(ActuationOutcome),
    Event(CallEvent),
    StreamClosed,
}

/// Applies events to state and drives enforcement.
#[derive(Debug)]
pub struct EventProcessor {
    state: CallState,
    detector: ViolationDetector,
    actuator: Actuator,
    outcomes: mpsc::UnboundedReceiver<ActuationOutcome>,
    outstanding: usize,
    stats: ProcessorStats,
}

impl EventProcessor {
    /// Creates a processor for `monitored`.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Monitor`](crate::WardenError::Monitor) if
    /// the threshold is below 2.
    pub fn new(
        monitored: MonitoredSet,
        config: ProcessorConfig,
        terminator: Arc<dyn TerminationCommand>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let detector = ViolationDetector::new(config.threshold)?;
        let (actuator, outcomes) = Actuator::new(terminator, notifier, config.notice);
        Ok(Self {
            state: CallState::new(monitored),
            detector,
            actuator,
            outcomes,
            outstanding: 0,
            stats: ProcessorStats::default(),
        })
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &CallState {
        &self.state
    }

    /// Current counters.
    #[must_use]
    pub const fn stats(&self) -> ProcessorStats {
        self.stats
    }

    /// Termination commands issued but not yet settled.
    #[must_use]
    pub const fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Applies one event, then detects and dispatches.
    ///
    /// Must be called from within a tokio runtime.
    pub fn handle_event(&mut self, event: CallEvent) {
        self.stats.events += 1;
        match event {
            CallEvent::CallEnded { call_id } => {
                if let Some(reconciled) = reconcile(&mut self.state, &call_id) {
                    self.stats.calls_ended += 1;
                    self.stats.discarded += reconciled.discarded.len() as u64;
                    if !reconciled.discarded.is_empty() {
                        info!(
                            call_id = %call_id,
                            discarded = ?reconciled.discarded,
                            "call ended before pending terminations completed"
                        );
                    }
                }
            }
            CallEvent::MembershipChanged(change) => self.apply_membership(&change),
            CallEvent::Unrecognized { reason } => {
                debug!(reason = %reason, "unrecognized event");
            }
        }
        self.dispatch();
    }

    /// Applies one termination outcome.
    pub fn handle_outcome(&mut self, outcome: &ActuationOutcome) {
        self.outstanding = self.outstanding.saturating_sub(1);
        match settle(&mut self.state, outcome) {
            Settlement::Terminated { membership, person } => {
                self.stats.terminated += 1;
                match person {
                    Some(person) => self.actuator.notify(person),
                    None => debug!(membership_id = %membership, "no owner to notify"),
                }
            }
            Settlement::Requeued { membership } => {
                self.stats.failed += 1;
                debug!(membership_id = %membership, "termination requeued");
            }
            Settlement::Discarded { membership } => {
                self.stats.failed += 1;
                debug!(membership_id = %membership, "failed termination for ended call dropped");
            }
        }
    }

    /// Waits for and applies the next outcome. Returns false if none is
    /// outstanding.
    pub async fn settle_next(&mut self) -> bool {
        if self.outstanding == 0 {
            return false;
        }
        match self.outcomes.recv().await {
            Some(outcome) => {
                self.handle_outcome(&outcome);
                true
            }
            None => false,
        }
    }

    /// Runs until `events` closes and every issued command has settled.
    pub async fn run(mut self, mut events: mpsc::Receiver<CallEvent>) -> ProcessorReport {
        let mut stream_open = true;
        loop {
            let step = tokio::select! {
                biased;
                Some(outcome) = self.outcomes.recv(), if self.outstanding > 0 => Step::Outcome(outcome),
                event = events.recv(), if stream_open => match event {
                    Some(event) => Step::Event(event),
                    None => Step::StreamClosed,
                },
                else => break,
            };

            match step {
                Step::Outcome(outcome) => self.handle_outcome(&outcome),
                Step::Event(event) => self.handle_event(event),
                Step::StreamClosed => {
                    stream_open = false;
                    info!(outstanding = self.outstanding, "event stream closed");
                }
            }

            if !stream_open && self.outstanding == 0 {
                break;
            }
        }

        self.actuator.drain_notifications().await;
        let (notified, notify_failed) = self.actuator.notification_counts();
        self.stats.notified = notified;
        self.stats.notify_failed = notify_failed;

        let report = ProcessorReport {
            stats: self.stats,
            state: self.state.snapshot(),
        };
        info!(stats = ?report.stats, state = ?report.state, "processor stopped");
        report
    }

    fn apply_membership(&mut self, change: &MembershipChange) {
        if !self.state.is_monitored(&change.person_id) {
            self.stats.unmonitored += 1;
            debug!(person_id = %change.person_id, "membership for unmonitored person ignored");
            return;
        }
        if !change.status.is_joined() {
            self.stats.status_ignored += 1;
            debug!(
                membership_id = %change.membership_id,
                status = ?change.status,
                "membership status ignored"
            );
            return;
        }

        match self
            .state
            .apply_join(&change.person_id, &change.call_id, &change.membership_id)
        {
            Ok(JoinOutcome::Inserted { call_size }) => {
                self.stats.joins += 1;
                debug!(
                    person_id = %change.person_id,
                    call_id = %change.call_id,
                    membership_id = %change.membership_id,
                    call_size,
                    "monitored join"
                );
            }
            Ok(JoinOutcome::Duplicate) => {
                self.stats.duplicates += 1;
                debug!(membership_id = %change.membership_id, "duplicate join");
            }
            Err(error) => warn!(error = %error, "join rejected"),
        }
    }

    fn dispatch(&mut self) {
        let detection = self.detector.detect(&mut self.state);
        self.stats.flagged += detection.newly_flagged.len() as u64;

        let claimed = self.state.pending_mut().claim_queued();
        if claimed.is_empty() {
            return;
        }
        debug!(memberships = ?claimed, "dispatching terminations");
        let issued = self.actuator.terminate_all(claimed);
        self.outstanding += issued;
        self.stats.dispatched += issued as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::CollaboratorResult;
    use crate::error::CollaboratorError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use warden_events::{MembershipId, MembershipStatus, PersonId};

    #[derive(Default)]
    struct Platform {
        calls: Mutex<Vec<MembershipId>>,
        failures_left: AtomicUsize,
        messages: Mutex<Vec<PersonId>>,
    }

    #[async_trait]
    impl TerminationCommand for Platform {
        async fn terminate(&self, membership: &MembershipId) -> CollaboratorResult<()> {
            self.calls.lock().unwrap().push(membership.clone());
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(CollaboratorError::Transport("unreachable".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Notifier for Platform {
        async fn send_direct_message(&self, person: &PersonId, _text: &str) -> CollaboratorResult<()> {
            self.messages.lock().unwrap().push(person.clone());
            Ok(())
        }
    }

    fn processor(platform: &Arc<Platform>, config: ProcessorConfig) -> EventProcessor {
        EventProcessor::new(
            MonitoredSet::new([PersonId::new("a"), PersonId::new("b"), PersonId::new("c")]),
            config,
            platform.clone(),
            platform.clone(),
        )
        .unwrap()
    }

    fn m(id: &str) -> MembershipId {
        MembershipId::new(id)
    }

    #[test]
    fn test_threshold_below_two_rejected() {
        let platform = Arc::new(Platform::default());
        let result = EventProcessor::new(
            MonitoredSet::new([PersonId::new("a")]),
            ProcessorConfig::new().with_threshold(1),
            platform.clone(),
            platform,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_single_member_not_flagged() {
        let platform = Arc::new(Platform::default());
        let mut processor = processor(&platform, ProcessorConfig::new());

        processor.handle_event(CallEvent::joined("a", "c1", "m1"));

        assert!(processor.state().pending().is_empty());
        assert_eq!(processor.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_violation_dispatched_once() {
        let platform = Arc::new(Platform::default());
        let mut processor = processor(&platform, ProcessorConfig::new());

        processor.handle_event(CallEvent::joined("a", "c1", "m1"));
        processor.handle_event(CallEvent::joined("b", "c1", "m2"));
        // Replay while the commands are in flight.
        processor.handle_event(CallEvent::joined("b", "c1", "m2"));

        assert_eq!(processor.outstanding(), 2);
        assert_eq!(processor.stats().dispatched, 2);
        assert_eq!(processor.stats().duplicates, 1);

        while processor.settle_next().await {}

        let mut calls = platform.calls.lock().unwrap().clone();
        calls.sort();
        assert_eq!(calls, vec![m("m1"), m("m2")]);
        assert!(processor.state().pending().is_empty());
        assert!(!processor.state().has_call(&"c1".into()));
    }

    #[tokio::test]
    async fn test_failed_termination_retried_on_next_event() {
        let platform = Arc::new(Platform {
            failures_left: AtomicUsize::new(2),
            ..Platform::default()
        });
        let mut processor = processor(&platform, ProcessorConfig::new());

        processor.handle_event(CallEvent::joined("a", "c1", "m1"));
        processor.handle_event(CallEvent::joined("b", "c1", "m2"));
        while processor.settle_next().await {}

        assert_eq!(processor.stats().failed, 2);
        assert_eq!(processor.state().pending().len(), 2);

        processor.handle_event(CallEvent::membership(
            "a",
            "c1",
            "m1",
            MembershipStatus::Left,
        ));
        assert_eq!(processor.stats().dispatched, 4);
        while processor.settle_next().await {}

        assert_eq!(processor.stats().terminated, 2);
        assert!(processor.state().pending().is_empty());
    }

    #[tokio::test]
    async fn test_unmonitored_and_non_join_ignored() {
        let platform = Arc::new(Platform::default());
        let mut processor = processor(&platform, ProcessorConfig::new());

        processor.handle_event(CallEvent::joined("stranger", "c1", "m9"));
        processor.handle_event(CallEvent::membership(
            "a",
            "c1",
            "m1",
            MembershipStatus::Other("declined".to_string()),
        ));

        let stats = processor.stats();
        assert_eq!(stats.unmonitored, 1);
        assert_eq!(stats.status_ignored, 1);
        assert_eq!(stats.joins, 0);
        assert!(!processor.state().has_call(&"c1".into()));
    }

    struct Crashing;

    #[async_trait]
    impl TerminationCommand for Crashing {
        async fn terminate(&self, _membership: &MembershipId) -> CollaboratorResult<()> {
            panic!("platform client crashed");
        }
    }

    #[tokio::test]
    async fn test_panicking_terminator_requeues_and_run_returns() {
        let platform = Arc::new(Platform::default());
        let processor = EventProcessor::new(
            MonitoredSet::new([PersonId::new("a"), PersonId::new("b")]),
            ProcessorConfig::new(),
            Arc::new(Crashing),
            platform,
        )
        .unwrap();
        let (tx, rx) = mpsc::channel(8);

        tx.send(CallEvent::joined("a", "c1", "m1")).await.unwrap();
        tx.send(CallEvent::joined("b", "c1", "m2")).await.unwrap();
        drop(tx);

        let report = tokio::time::timeout(std::time::Duration::from_secs(5), processor.run(rx))
            .await
            .expect("processor did not stop after the stream closed");

        assert_eq!(report.stats.dispatched, 2);
        assert_eq!(report.stats.failed, 2);
        assert_eq!(report.stats.terminated, 0);
        assert_eq!(report.state.pending, 2);
        assert_eq!(report.state.in_flight, 0);
    }

    #[tokio::test]
    async fn test_run_drains_and_notifies() {
        let platform = Arc::new(Platform::default());
        let processor = processor(&platform, ProcessorConfig::new().with_notice("ended"));
        let (tx, rx) = mpsc::channel(8);

        tx.send(CallEvent::joined("a", "c1", "m1")).await.unwrap();
        tx.send(CallEvent::joined("b", "c1", "m2")).await.unwrap();
        drop(tx);

        let report = processor.run(rx).await;

        assert_eq!(report.stats.terminated, 2);
        assert_eq!(report.stats.notified, 2);
        assert_eq!(report.state.pending, 0);
        let mut messages = platform.messages.lock().unwrap().clone();
        messages.sort();
        assert_eq!(messages, vec![PersonId::new("a"), PersonId::new("b")]);
    }
}
