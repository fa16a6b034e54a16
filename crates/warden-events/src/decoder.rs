//! Stream decoder: reassembled records in, typed events out.

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::envelope::decode_envelope;
use crate::event::CallEvent;
use crate::framing::{Frame, RecordReassembler, DEFAULT_MAX_RECORD_BYTES};

/// Counters kept by an [`EventDecoder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecodeStats {
    /// Complete JSON records seen.
    pub records: u64,
    /// Events forwarded downstream.
    pub events: u64,
    /// Connection preambles skipped.
    pub preambles: u64,
    /// Records or byte runs dropped as malformed.
    pub malformed: u64,
    /// Well-formed records that were neither membership nor call end.
    pub unrecognized: u64,
}

/// Turns raw stream chunks into [`CallEvent`]s.
///
/// Malformed and unrecognized records are logged, counted and dropped.
/// Only `MembershipChanged` and `CallEnded` events are returned.
///
/// # Example
///
/// ```rust
/// use warden_events::{CallEvent, EventDecoder};
///
/// let mut decoder = EventDecoder::new();
/// let line = br#"{"body":"{\"resource\":\"calls\",\"data\":{\"id\":\"c1\",\"status\":\"disconnected\"}}"}"#;
///
/// assert!(decoder.feed(b"[opened]\n").is_empty());
/// let events = decoder.feed(line);
/// assert_eq!(events, vec![CallEvent::ended("c1")]);
/// ```
#[derive(Debug)]
pub struct EventDecoder {
    reassembler: RecordReassembler,
    stats: DecodeStats,
}

impl EventDecoder {
    /// Creates a decoder with the default record size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_record_bytes(DEFAULT_MAX_RECORD_BYTES)
    }

    /// Creates a decoder that drops records larger than `max`.
    #[must_use]
    pub fn with_max_record_bytes(max: usize) -> Self {
        Self {
            reassembler: RecordReassembler::new(max),
            stats: DecodeStats::default(),
        }
    }

    /// Returns the counters accumulated so far.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Feeds one chunk and returns the events it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<CallEvent> {
        let frames = self.reassembler.push(chunk);
        frames
            .into_iter()
            .filter_map(|frame| self.handle(frame))
            .collect()
    }

    /// Flushes the decoder at end of stream and returns any events the
    /// flush completed.
    ///
    /// Any truncated trailing record is logged and dropped.
    pub fn finish(&mut self) -> Vec<CallEvent> {
        self.reassembler
            .finish()
            .into_iter()
            .filter_map(|frame| self.handle(frame))
            .collect()
    }

    /// Clears buffered bytes so a fresh connection can be decoded.
    ///
    /// Counters are kept.
    pub fn reset(&mut self) {
        let flushed = self.finish();
        if !flushed.is_empty() {
            warn!(events = flushed.len(), "events left over from the previous connection discarded");
        }
    }

    fn handle(&mut self, frame: Frame) -> Option<CallEvent> {
        match frame {
            Frame::Preamble => {
                self.stats.preambles += 1;
                debug!("event stream opened");
                None
            }
            Frame::Malformed { error, dropped } => {
                self.stats.malformed += 1;
                warn!(dropped, error = %error, "dropping malformed stream bytes");
                None
            }
            Frame::Record(value) => {
                self.stats.records += 1;
                match decode_envelope(&value) {
                    Ok(CallEvent::Unrecognized { reason }) => {
                        self.stats.unrecognized += 1;
                        debug!(%reason, "dropping unrecognized record");
                        None
                    }
                    Ok(event) => {
                        self.stats.events += 1;
                        trace!(?event, "decoded event");
                        Some(event)
                    }
                    Err(error) => {
                        self.stats.malformed += 1;
                        warn!(error = %error, "dropping undecodable record");
                        None
                    }
                }
            }
        }
    }
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}
