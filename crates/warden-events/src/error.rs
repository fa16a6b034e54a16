//! Error types for event decoding.

use thiserror::Error;

/// Result type alias for decode operations.
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Errors raised while turning stream records into events.
///
/// None of these stop the stream. The decoder logs them, counts them
/// and moves on to the next record.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The record is not a JSON object.
    #[error("envelope is not a JSON object")]
    NotAnObject,

    /// The envelope has no payload field.
    #[error("envelope has no payload")]
    MissingPayload,

    /// The escaped payload is not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    /// The payload has a shape the decoder does not understand.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A record grew past the configured limit without completing.
    #[error("record exceeded {max} bytes without completing ({size} buffered)")]
    RecordTooLarge {
        /// Bytes buffered when the record was dropped.
        size: usize,
        /// Configured maximum record size.
        max: usize,
    },

    /// Bytes that cannot start or continue a JSON record.
    #[error("syntax error in stream: {0}")]
    Syntax(String),

    /// The underlying byte source failed.
    #[error("transport error: {0}")]
    Transport(String),
}
