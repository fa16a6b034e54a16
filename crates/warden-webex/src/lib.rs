//! # callwarden Webex Collaborators
//!
//! HTTP implementations of the collaborator traits in `warden-core`.
//!
//! | Type | Implements |
//! |------|------------|
//! | [`WebexClient`] | `IdentityResolver`, `SubscriptionManager`, `TerminationCommand`, `Notifier` |
//! | [`RelayInbox`] | `EventChannel` |
//!
//! These are thin I/O wrappers with no state of their own. Every
//! failure is reported as a `CollaboratorError`; what to do about it is
//! decided by the core.
//!
//! ## Security Notes
//!
//! - The access token is only sent to the platform API, never to the relay
//! - Error bodies are truncated before they are logged

mod client;
mod error;
mod relay;
#[cfg(test)]
mod test_server;

pub use client::{Webhook, WebexClient, WEBHOOK_PAGE_SIZE};
pub use error::{Result, WebexError};
pub use relay::RelayInbox;
