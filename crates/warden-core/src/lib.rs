//! # callwarden Core
//!
//! Enforcement service for the co-presence policy: two or more monitored
//! people must never be active in the same call. When they are, every
//! monitored membership in that call is hung up and each person gets a
//! direct message.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          WARDEN                                  │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  EventChannel ──► pump task ──► mpsc ──► EventProcessor          │
//! │  (relay inbox)    (decoder,              (CallState, detector,   │
//! │                    reconnect)             reconciler)            │
//! │       ▲                                       │      ▲           │
//! │       │                                       ▼      │outcomes   │
//! │  keep-alive task                          Actuator ──┘           │
//! │                                     (terminate, notify tasks)    │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tokio_util::sync::CancellationToken;
//! use warden_core::{Collaborators, Warden, WardenConfig};
//!
//! let config = WardenConfig::load("callwarden.toml")?;
//! let warden = Warden::new(config, collaborators)?;
//! let report = warden.run(CancellationToken::new()).await?;
//! println!("terminated {}", report.processor.stats.terminated);
//! ```
//!
//! ## Guarantees
//!
//! - The processor is the only writer of state; command completions are
//!   applied between events
//! - A membership never has two termination commands outstanding
//! - A call that ends drops its pending terminations
//! - Unresolvable monitored identities abort startup

mod actuator;
mod collaborators;
mod config;
mod error;
mod keepalive;
mod processor;
mod subscriptions;
mod warden;

pub use actuator::{settle, ActuationOutcome, Actuator, NotifyResult, Settlement};
pub use collaborators::{
    CollaboratorResult, EventChannel, IdentityResolver, Notifier, SubscriptionManager,
    TerminationCommand,
};
pub use config::{
    PlatformConfig, PolicyConfig, ReconnectPolicy, RelayConfig, RuntimeConfig, WardenConfig,
    TOKEN_ENV,
};
pub use error::{CollaboratorError, WardenError};
pub use keepalive::{spawn_keepalive, KeepAliveStats};
pub use processor::{EventProcessor, ProcessorConfig, ProcessorReport, ProcessorStats};
pub use subscriptions::{subscription_plan, SubscriptionSpec, ORG_OWNED};
pub use warden::{Collaborators, RunReport, Warden};

// Re-export component types for convenience
pub use warden_events::{
    CallEvent, CallId, ChunkSource, DecodeError, DecodeStats, EventDecoder, MembershipId,
    PersonId,
};
pub use warden_monitor::{CallState, MonitoredSet, StateSnapshot};

/// Result type for callwarden operations.
pub type Result<T> = std::result::Result<T, WardenError>;
