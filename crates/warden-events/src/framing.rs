//! # Record Reassembly
//!
//! The relay stream is a byte sequence of JSON records, normally one per
//! line, preceded by a literal `[opened]` preamble. The transport hands
//! us arbitrary chunks: a record may be split across any number of
//! reads, and one read may carry several records.
//!
//! [`RecordReassembler`] buffers bytes until a complete JSON value is
//! available and yields it as a [`Frame`]. It never reorders records.
//!
//! ## Recovery
//!
//! | Condition | Action |
//! |-----------|--------|
//! | `[opened]` preamble (possibly split) | yield [`Frame::Preamble`] |
//! | incomplete value | keep buffering |
//! | syntax error | drop to the next newline, yield [`Frame::Malformed`] |
//! | value larger than the limit | drop buffer, yield [`Frame::Malformed`] |
//!
//! ## Example
//!
//! ```rust
//! use warden_events::{Frame, RecordReassembler};
//!
//! let mut reassembler = RecordReassembler::new(1024);
//! assert!(reassembler.push(b"[opened]\n{\"bo").len() == 1);
//!
//! let frames = reassembler.push(b"dy\": \"x\"}\n");
//! assert!(matches!(frames.as_slice(), [Frame::Record(_)]));
//! ```

use bytes::{Buf, BytesMut};
use serde_json::Value;

use crate::error::DecodeError;

/// Literal the relay writes when the stream opens.
pub const PREAMBLE: &[u8] = b"[opened]";

/// Default upper bound for a single record (1 MiB).
pub const DEFAULT_MAX_RECORD_BYTES: usize = 1024 * 1024;

/// One unit produced by the reassembler.
#[derive(Debug)]
pub enum Frame {
    /// The connection-opened preamble.
    Preamble,
    /// A complete JSON record.
    Record(Value),
    /// Bytes that were discarded.
    Malformed {
        /// What was wrong with them.
        error: DecodeError,
        /// How many bytes were dropped.
        dropped: usize,
    },
}

/// Buffers stream chunks and splits them into complete records.
#[derive(Debug)]
pub struct RecordReassembler {
    buf: BytesMut,
    max_record_bytes: usize,
}

impl RecordReassembler {
    /// Creates a reassembler that drops records larger than `max_record_bytes`.
    #[must_use]
    pub fn new(max_record_bytes: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(8 * 1024),
            max_record_bytes: max_record_bytes.max(PREAMBLE.len()),
        }
    }

    /// Returns the number of bytes waiting for the rest of a record.
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Appends a chunk and returns every frame that is now complete.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            self.skip_whitespace();
            if self.buf.is_empty() {
                break;
            }

            if self.buf.starts_with(PREAMBLE) {
                self.buf.advance(PREAMBLE.len());
                frames.push(Frame::Preamble);
                continue;
            }
            if PREAMBLE.starts_with(&self.buf) {
                // Partial preamble; wait for the rest.
                break;
            }

            let mut values = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Value>();
            match values.next() {
                Some(Ok(value)) => {
                    let consumed = values.byte_offset();
                    self.buf.advance(consumed);
                    frames.push(Frame::Record(value));
                }
                Some(Err(e)) if e.is_eof() => {
                    if self.buf.len() > self.max_record_bytes {
                        let dropped = self.buf.len();
                        self.buf.clear();
                        frames.push(Frame::Malformed {
                            error: DecodeError::RecordTooLarge {
                                size: dropped,
                                max: self.max_record_bytes,
                            },
                            dropped,
                        });
                    }
                    break;
                }
                Some(Err(e)) => {
                    let dropped = self.resync_point();
                    self.buf.advance(dropped);
                    frames.push(Frame::Malformed {
                        error: DecodeError::Syntax(e.to_string()),
                        dropped,
                    });
                }
                None => break,
            }
        }

        frames
    }

    /// Discards whatever is still buffered at end of stream.
    ///
    /// Returns a [`Frame::Malformed`] if a truncated record was pending.
    pub fn finish(&mut self) -> Option<Frame> {
        self.skip_whitespace();
        if self.buf.is_empty() {
            return None;
        }
        let dropped = self.buf.len();
        self.buf.clear();
        Some(Frame::Malformed {
            error: DecodeError::Syntax("stream ended inside a record".to_string()),
            dropped,
        })
    }

    fn skip_whitespace(&mut self) {
        let ws = self
            .buf
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        self.buf.advance(ws);
    }

    /// Bytes to drop after a syntax error: through the next newline,
    /// else up to the next `{`, else everything.
    fn resync_point(&self) -> usize {
        if let Some(nl) = self.buf.iter().position(|&b| b == b'\n') {
            return nl + 1;
        }
        self.buf
            .iter()
            .skip(1)
            .position(|&b| b == b'{')
            .map_or(self.buf.len(), |p| p + 1)
    }
}

impl Default for RecordReassembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORD_BYTES)
    }
}
