//! Error types for the HTTP collaborators.

use thiserror::Error;
use warden_core::CollaboratorError;

/// Longest response body kept in an error.
pub(crate) const MAX_ERROR_BODY: usize = 512;

/// Failure talking to the platform or the relay.
#[derive(Debug, Error)]
pub enum WebexError {
    /// The request could not be sent or the response not read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("status {code}: {body}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Response body, truncated.
        body: String,
    },

    /// A lookup returned no items.
    #[error("no result for {0}")]
    NotFound(String),

    /// The response body did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Client settings are unusable.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for HTTP collaborator operations.
pub type Result<T> = std::result::Result<T, WebexError>;

impl WebexError {
    /// Builds a status error, truncating the body.
    pub(crate) fn status(code: u16, mut body: String) -> Self {
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Self::Status { code, body }
    }
}

impl From<WebexError> for CollaboratorError {
    fn from(err: WebexError) -> Self {
        match err {
            WebexError::Http(e) if e.is_decode() => Self::Protocol(e.to_string()),
            WebexError::Http(e) => Self::Transport(e.to_string()),
            WebexError::Status { code: 404, body } => Self::NotFound(body),
            WebexError::Status { code, body } => Self::Status { code, body },
            WebexError::NotFound(what) => Self::NotFound(what),
            WebexError::InvalidResponse(msg) | WebexError::Config(msg) => Self::Protocol(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_body_truncated() {
        let err = WebexError::status(500, "x".repeat(2000));
        match err {
            WebexError::Status { body, .. } => assert_eq!(body.len(), MAX_ERROR_BODY),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let err = WebexError::status(500, "é".repeat(MAX_ERROR_BODY));
        match err {
            WebexError::Status { body, .. } => {
                assert!(body.len() <= MAX_ERROR_BODY);
                assert!(body.chars().all(|c| c == 'é'));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_collaborator_mapping() {
        assert_eq!(
            CollaboratorError::from(WebexError::status(404, "gone".to_string())),
            CollaboratorError::NotFound("gone".to_string())
        );
        assert_eq!(
            CollaboratorError::from(WebexError::status(429, "slow".to_string())),
            CollaboratorError::Status {
                code: 429,
                body: "slow".to_string()
            }
        );
        assert!(matches!(
            CollaboratorError::from(WebexError::InvalidResponse("no id".to_string())),
            CollaboratorError::Protocol(_)
        ));
    }
}
