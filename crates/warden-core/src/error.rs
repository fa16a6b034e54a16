//! Error types for callwarden core.

use thiserror::Error;

/// Failure reported by an external collaborator.
///
/// Collaborators are thin I/O wrappers; this is all the processor needs
/// to know to log a failure and decide whether to keep going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The request never completed (connect, timeout, reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote side answered with an error status.
    #[error("unexpected status {code}: {body}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The response could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The task running the call died before reporting back.
    #[error("aborted: {0}")]
    Aborted(String),
}

/// Core error type for callwarden.
#[derive(Debug, Error)]
pub enum WardenError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file is not valid TOML.
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Reading a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A monitored identity could not be resolved. Fatal at startup.
    #[error("Cannot resolve monitored identity {email}: {source}")]
    IdentityResolution {
        /// The configured email address.
        email: String,
        /// Underlying failure.
        source: CollaboratorError,
    },

    /// An event feed could not be registered.
    #[error("Cannot register subscription {name}: {source}")]
    Subscription {
        /// Name of the feed.
        name: String,
        /// Underlying failure.
        source: CollaboratorError,
    },

    /// The event stream could not be opened.
    #[error("Cannot open event stream: {0}")]
    StreamOpen(CollaboratorError),

    /// Monitor error passthrough.
    #[error("Monitor error: {0}")]
    Monitor(#[from] warden_monitor::MonitorError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_resolution_display() {
        let err = WardenError::IdentityResolution {
            email: "a@example.com".to_string(),
            source: CollaboratorError::NotFound("no such person".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("a@example.com"));
        assert!(msg.contains("no such person"));
    }

    #[test]
    fn test_status_display() {
        let err = CollaboratorError::Status {
            code: 429,
            body: "slow down".to_string(),
        };
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn test_monitor_passthrough() {
        let err: WardenError = warden_monitor::MonitorError::InvalidThreshold { threshold: 1 }.into();
        assert!(err.to_string().starts_with("Monitor error"));
    }
}
