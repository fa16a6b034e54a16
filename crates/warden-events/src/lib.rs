//! # Event Decoder
//!
//! Turns the relay's raw byte stream into typed call lifecycle events.
//!
//! ## Wire Format
//!
//! The relay stream opens with a literal `[opened]` preamble, followed by
//! one JSON envelope per delivered webhook. Each envelope's `body` holds
//! the original notification as an escaped JSON string, whose `data`
//! object carries `id`, `callId`, `personId` and `status`.
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`RecordReassembler`] | buffers chunks into complete JSON records |
//! | [`decode_envelope`] | unwraps the escaped payload and classifies it |
//! | [`EventDecoder`] | both of the above, with logging and counters |
//! | [`pump`] | drives a [`ChunkSource`] into the processor's channel |
//!
//! ## Guarantees
//!
//! - Records are never reordered.
//! - A structurally valid, recognized record is never dropped.
//! - Malformed records are logged and skipped; decoding continues.
//! - Records may arrive split across any number of reads.

mod decoder;
mod envelope;
mod error;
mod event;
mod framing;
mod ids;
mod source;

pub use decoder::{DecodeStats, EventDecoder};
pub use envelope::{
    decode_envelope, CALLS_RESOURCE, CALL_ENDED_STATUS, MEMBERSHIPS_RESOURCE, PAYLOAD_FIELD,
};
pub use error::{DecodeError, Result};
pub use event::{CallEvent, MembershipChange, MembershipStatus};
pub use framing::{Frame, RecordReassembler, DEFAULT_MAX_RECORD_BYTES, PREAMBLE};
pub use ids::{CallId, MembershipId, PersonId};
pub use source::{pump, ChunkSource, PumpEnd};
