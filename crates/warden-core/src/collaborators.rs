//! Narrow interfaces to the systems callwarden talks to.
//!
//! Everything behind these traits is stateless I/O. The processor never
//! waits on them inline: terminations and notifications run as spawned
//! tasks, and the stream is drained by a separate pump task.

use async_trait::async_trait;
use warden_events::{ChunkSource, MembershipId, PersonId};

use crate::error::CollaboratorError;
use crate::subscriptions::SubscriptionSpec;

/// Result type for collaborator calls.
pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// Resolves human-readable identities to platform person ids.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Looks up the person registered under `email`.
    async fn resolve(&self, email: &str) -> CollaboratorResult<PersonId>;
}

/// Registers and removes upstream event feeds.
#[async_trait]
pub trait SubscriptionManager: Send + Sync {
    /// Registers one feed delivering to `target_url`. Returns its id.
    async fn create_subscription(
        &self,
        spec: &SubscriptionSpec,
        target_url: &str,
    ) -> CollaboratorResult<String>;

    /// Removes every registered feed. Returns how many were removed.
    async fn delete_all(&self) -> CollaboratorResult<usize>;
}

/// The relay channel that carries the event stream.
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// URL the upstream feeds should deliver to.
    fn target_url(&self) -> String;

    /// Opens the long-lived stream. May start with an `[opened]` preamble.
    async fn open_stream(&self) -> CollaboratorResult<Box<dyn ChunkSource>>;

    /// Refreshes the channel so it is not torn down for inactivity.
    async fn keep_alive(&self) -> CollaboratorResult<()>;
}

/// Ends a membership's participation in its call.
///
/// At-most-once: there is no idempotency key, so callers must not issue
/// a second command while one is outstanding.
#[async_trait]
pub trait TerminationCommand: Send + Sync {
    /// Hangs up `membership`.
    async fn terminate(&self, membership: &MembershipId) -> CollaboratorResult<()>;
}

/// Best-effort direct messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends `text` to `person`.
    async fn send_direct_message(&self, person: &PersonId, text: &str) -> CollaboratorResult<()>;
}
