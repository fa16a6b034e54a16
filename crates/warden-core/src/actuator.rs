//! # Actuator
//!
//! Issues termination commands for flagged memberships and sends the
//! follow-up notifications.
//!
//! ## Concurrency
//!
//! Each command runs as its own task and completes independently of the
//! event stream and of the other commands. A supervising task awaits it,
//! so a command that panics still reports a failure and its entry goes
//! back to the queue. Tasks never touch state:
//! they report an [`ActuationOutcome`] over a channel, and the processor
//! applies it with [`settle`]. The processor stays the single writer of
//! the pending set.
//!
//! ```text
//!   processor ──terminate_all──► task(m1) ─┐
//!       ▲                        task(m2) ─┼─► outcome channel
//!       └────────── settle ◄───────────────┘
//! ```
//!
//! Notifications are fire-and-forget. Their tasks are kept in a
//! `JoinSet` only so shutdown can wait for them.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use warden_events::{MembershipId, PersonId};
use warden_monitor::CallState;

use crate::collaborators::{Notifier, TerminationCommand};
use crate::error::CollaboratorError;

/// Completion report from a termination task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuationOutcome {
    /// The membership was hung up.
    Terminated(MembershipId),
    /// The command failed.
    Failed {
        /// The membership that could not be hung up.
        membership: MembershipId,
        /// Why.
        error: CollaboratorError,
    },
}

impl ActuationOutcome {
    /// The membership this outcome is about.
    #[must_use]
    pub fn membership(&self) -> &MembershipId {
        match self {
            Self::Terminated(membership) | Self::Failed { membership, .. } => membership,
        }
    }
}

/// Effect of applying an outcome to state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Removed from pending; `person` should be notified.
    Terminated {
        /// The terminated membership.
        membership: MembershipId,
        /// Its owner, if resolvable.
        person: Option<PersonId>,
    },
    /// Failed and back in the queue for the next detection pass.
    Requeued {
        /// The membership.
        membership: MembershipId,
    },
    /// Failed, but the call already ended; nothing left to retry.
    Discarded {
        /// The membership.
        membership: MembershipId,
    },
}

/// Applies a completion to state.
///
/// Success retires the membership: it leaves the pending set and its
/// call. Failure puts an in-flight entry back in the queue, untouched
/// otherwise; if the entry was discarded in the meantime it stays gone.
pub fn settle(state: &mut CallState, outcome: &ActuationOutcome) -> Settlement {
    match outcome {
        ActuationOutcome::Terminated(membership) => {
            let retired = state.retire(membership);
            Settlement::Terminated {
                membership: membership.clone(),
                person: retired.person,
            }
        }
        ActuationOutcome::Failed { membership, .. } => {
            if state.pending_mut().release(membership) {
                Settlement::Requeued {
                    membership: membership.clone(),
                }
            } else {
                Settlement::Discarded {
                    membership: membership.clone(),
                }
            }
        }
    }
}

/// Result of one notification task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyResult {
    /// Message delivered.
    Sent,
    /// Message could not be delivered.
    Failed,
}

/// Dispatches termination and notification tasks.
pub struct Actuator {
    terminator: Arc<dyn TerminationCommand>,
    notifier: Arc<dyn Notifier>,
    notice: Option<Arc<str>>,
    outcomes: mpsc::UnboundedSender<ActuationOutcome>,
    notifications: JoinSet<NotifyResult>,
    notified: u64,
    notify_failed: u64,
}

impl Actuator {
    /// Creates an actuator and the receiver its outcomes arrive on.
    ///
    /// `notice` is the direct-message text; `None` disables notifications.
    pub fn new(
        terminator: Arc<dyn TerminationCommand>,
        notifier: Arc<dyn Notifier>,
        notice: Option<String>,
    ) -> (Self, mpsc::UnboundedReceiver<ActuationOutcome>) {
        let (outcomes, rx) = mpsc::unbounded_channel();
        let actuator = Self {
            terminator,
            notifier,
            notice: notice.map(Arc::from),
            outcomes,
            notifications: JoinSet::new(),
            notified: 0,
            notify_failed: 0,
        };
        (actuator, rx)
    }

    /// Spawns one termination task per id. Returns how many were spawned.
    ///
    /// Every spawned task reports exactly one outcome. A command that
    /// panics or is cancelled is reported as failed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn terminate_all(&self, ids: Vec<MembershipId>) -> usize {
        let count = ids.len();
        for membership in ids {
            let terminator = Arc::clone(&self.terminator);
            let outcomes = self.outcomes.clone();
            tokio::spawn(async move {
                let command = {
                    let membership = membership.clone();
                    tokio::spawn(async move { terminator.terminate(&membership).await })
                };
                let result = command
                    .await
                    .unwrap_or_else(|e| Err(CollaboratorError::Aborted(e.to_string())));
                let outcome = match result {
                    Ok(()) => {
                        info!(membership_id = %membership, "membership terminated");
                        ActuationOutcome::Terminated(membership)
                    }
                    Err(error) => {
                        warn!(membership_id = %membership, error = %error, "termination failed");
                        ActuationOutcome::Failed { membership, error }
                    }
                };
                // The receiver only goes away at shutdown.
                let _ = outcomes.send(outcome);
            });
        }
        count
    }

    /// Sends the notice to `person` in the background.
    pub fn notify(&mut self, person: PersonId) {
        self.reap();
        let Some(notice) = self.notice.clone() else {
            debug!(person_id = %person, "notifications disabled");
            return;
        };
        let notifier = Arc::clone(&self.notifier);
        self.notifications.spawn(async move {
            match notifier.send_direct_message(&person, &notice).await {
                Ok(()) => {
                    debug!(person_id = %person, "notification sent");
                    NotifyResult::Sent
                }
                Err(error) => {
                    warn!(person_id = %person, error = %error, "notification failed");
                    NotifyResult::Failed
                }
            }
        });
    }

    /// Waits for every outstanding notification.
    pub async fn drain_notifications(&mut self) {
        while let Some(joined) = self.notifications.join_next().await {
            self.record(joined);
        }
    }

    /// Notifications delivered and failed so far.
    #[must_use]
    pub const fn notification_counts(&self) -> (u64, u64) {
        (self.notified, self.notify_failed)
    }

    fn reap(&mut self) {
        while let Some(joined) = self.notifications.try_join_next() {
            self.record(joined);
        }
    }

    fn record(&mut self, joined: Result<NotifyResult, tokio::task::JoinError>) {
        match joined {
            Ok(NotifyResult::Sent) => self.notified += 1,
            Ok(NotifyResult::Failed) => self.notify_failed += 1,
            Err(error) => {
                self.notify_failed += 1;
                warn!(error = %error, "notification task panicked");
            }
        }
    }
}

impl std::fmt::Debug for Actuator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actuator")
            .field("notify", &self.notice.is_some())
            .field("pending_notifications", &self.notifications.len())
            .finish_non_exhaustive()
    }
}
