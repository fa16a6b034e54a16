//! Error types for the state monitor.

use thiserror::Error;
use warden_events::PersonId;

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors raised by state updates and detector setup.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A join was applied for a person outside the monitored set.
    ///
    /// The processor filters these before touching state, so this
    /// indicates a caller bug rather than a stream problem.
    #[error("person {person} is not monitored")]
    UnmonitoredPerson {
        /// The offending person.
        person: PersonId,
    },

    /// Co-presence threshold below two would flag single participants.
    #[error("co-presence threshold must be at least 2, got {threshold}")]
    InvalidThreshold {
        /// The rejected threshold.
        threshold: usize,
    },
}
