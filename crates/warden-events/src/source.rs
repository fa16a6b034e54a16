//! Byte sources and the decode pump.
//!
//! A [`ChunkSource`] yields the raw chunks of one long-lived stream
//! connection. [`pump`] drains a source through an [`EventDecoder`] and
//! forwards events, in order, into the processor's channel.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::decoder::EventDecoder;
use crate::error::Result;
use crate::event::CallEvent;

/// A stream of raw chunks from the event channel.
#[async_trait]
pub trait ChunkSource: Send {
    /// Returns the next chunk, or `None` once the stream has ended.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Transport`](crate::DecodeError::Transport)
    /// when the connection fails.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

#[async_trait]
impl ChunkSource for mpsc::Receiver<Bytes> {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        Ok(self.recv().await)
    }
}

#[async_trait]
impl<S: ChunkSource + ?Sized> ChunkSource for Box<S> {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        (**self).next_chunk().await
    }
}

/// Why a pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEnd {
    /// The source reported end of stream.
    StreamEnded,
    /// The source failed.
    TransportFailed,
    /// The receiving side hung up.
    ReceiverClosed,
}

/// Drains `source` through `decoder` into `events`.
///
/// Returns when the stream ends, fails, or the receiver is dropped.
/// Events are sent in exactly the order they were decoded.
pub async fn pump<S>(
    source: &mut S,
    decoder: &mut EventDecoder,
    events: &mpsc::Sender<CallEvent>,
) -> PumpEnd
where
    S: ChunkSource + ?Sized,
{
    loop {
        let chunk = match source.next_chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                if !forward(decoder.finish(), events).await {
                    return PumpEnd::ReceiverClosed;
                }
                info!(stats = ?decoder.stats(), "event stream ended");
                return PumpEnd::StreamEnded;
            }
            Err(error) => {
                warn!(error = %error, "event stream failed");
                if !forward(decoder.finish(), events).await {
                    return PumpEnd::ReceiverClosed;
                }
                return PumpEnd::TransportFailed;
            }
        };

        if !forward(decoder.feed(&chunk), events).await {
            return PumpEnd::ReceiverClosed;
        }
    }
}

/// Sends `batch` in order. Returns false once the receiver is gone.
async fn forward(batch: Vec<CallEvent>, events: &mpsc::Sender<CallEvent>) -> bool {
    for event in batch {
        if events.send(event).await.is_err() {
            debug!("event receiver closed, stopping pump");
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    struct FailingSource {
        chunks: Vec<Bytes>,
    }

    #[async_trait]
    impl ChunkSource for FailingSource {
        async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
            if self.chunks.is_empty() {
                return Err(DecodeError::Transport("reset by peer".to_string()));
            }
            Ok(Some(self.chunks.remove(0)))
        }
    }

    const CALL_END: &[u8] =
        br#"{"body":"{\"resource\":\"calls\",\"data\":{\"id\":\"c1\",\"status\":\"disconnected\"}}"}"#;

    #[tokio::test]
    async fn test_pump_forwards_until_stream_end() {
        let (chunk_tx, mut chunk_rx) = mpsc::channel(8);
        let (event_tx, mut event_rx) = mpsc::channel(8);

        chunk_tx.send(Bytes::from_static(b"[opened]\n")).await.unwrap();
        chunk_tx.send(Bytes::from_static(&CALL_END[..20])).await.unwrap();
        chunk_tx.send(Bytes::from_static(&CALL_END[20..])).await.unwrap();
        drop(chunk_tx);

        let mut decoder = EventDecoder::new();
        let end = pump(&mut chunk_rx, &mut decoder, &event_tx).await;

        assert_eq!(end, PumpEnd::StreamEnded);
        assert_eq!(event_rx.recv().await, Some(CallEvent::ended("c1")));
    }

    #[tokio::test]
    async fn test_pump_reports_transport_failure() {
        let mut source = FailingSource {
            chunks: vec![Bytes::from_static(CALL_END)],
        };
        let (event_tx, mut event_rx) = mpsc::channel(8);

        let mut decoder = EventDecoder::new();
        let end = pump(&mut source, &mut decoder, &event_tx).await;

        assert_eq!(end, PumpEnd::TransportFailed);
        assert_eq!(event_rx.recv().await, Some(CallEvent::ended("c1")));
    }

    #[tokio::test]
    async fn test_pump_stops_when_receiver_dropped() {
        let mut source = FailingSource {
            chunks: vec![Bytes::from_static(CALL_END)],
        };
        let (event_tx, event_rx) = mpsc::channel(1);
        drop(event_rx);

        let mut decoder = EventDecoder::new();
        assert_eq!(
            pump(&mut source, &mut decoder, &event_tx).await,
            PumpEnd::ReceiverClosed
        );
    }
}
