//! Platform-controlled streaming sink.

use std::fmt::Display;

use edge_core::TimingContext;
use futures::{Sink, SinkExt, Stream, StreamExt};

/// Error type for streaming operations.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The client side of the body rejected a write (disconnect).
    #[error("client gone: {0}")]
    ClientGone(String),

    /// The upstream stream failed mid-body.
    #[error("upstream body failed: {0}")]
    Upstream(String),

    /// The sink was already completed.
    #[error("sink already completed")]
    Completed,
}

/// State of the streaming sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    /// Nothing written yet.
    Initial,
    /// At least one chunk has been written.
    Streaming,
    /// Response has been completed.
    Completed,
}

/// Streaming sink for response bodies.
///
/// Generic over the underlying sink type to work with any `Sink<Vec<u8>>`
/// implementation, including Spin's `OutgoingBody`.
pub struct StreamingSink<S, E>
where
    S: Sink<Vec<u8>, Error = E> + Unpin,
    E: Display,
{
    inner: S,
    state: SinkState,
    timing: TimingContext,
    bytes_sent: u64,
    chunks_sent: u64,
}

impl<S, E> StreamingSink<S, E>
where
    S: Sink<Vec<u8>, Error = E> + Unpin,
    E: Display,
{
    /// Create a new streaming sink.
    pub fn new(sink: S, timing: TimingContext) -> Self {
        Self {
            inner: sink,
            state: SinkState::Initial,
            timing,
            bytes_sent: 0,
            chunks_sent: 0,
        }
    }

    /// Send one chunk. Empty chunks are skipped.
    pub async fn send_chunk(&mut self, chunk: Vec<u8>) -> Result<(), StreamError> {
        if self.state == SinkState::Completed {
            return Err(StreamError::Completed);
        }
        if chunk.is_empty() {
            return Ok(());
        }

        let len = chunk.len() as u64;
        self.inner
            .send(chunk)
            .await
            .map_err(|e| StreamError::ClientGone(e.to_string()))?;

        if self.state == SinkState::Initial {
            self.timing.mark("first_byte");
            self.state = SinkState::Streaming;
        }
        self.bytes_sent += len;
        self.chunks_sent += 1;
        Ok(())
    }

    /// Forward a whole upstream stream.
    ///
    /// The stream is consumed by value: on any error it is dropped before
    /// returning, so no further upstream data is pulled.
    pub async fn forward<B, BE>(&mut self, body: B) -> Result<u64, StreamError>
    where
        B: Stream<Item = Result<Vec<u8>, BE>> + Unpin,
        BE: Display,
    {
        let mut body = body;
        let start = self.bytes_sent;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| StreamError::Upstream(e.to_string()))?;
            self.send_chunk(chunk).await?;
        }

        Ok(self.bytes_sent - start)
    }

    /// Complete the response, flushing and closing the underlying sink.
    pub async fn complete(&mut self) -> Result<(), StreamError> {
        if self.state == SinkState::Completed {
            return Ok(());
        }
        self.state = SinkState::Completed;
        self.timing.mark("complete");
        self.inner
            .close()
            .await
            .map_err(|e| StreamError::ClientGone(e.to_string()))
    }

    /// Total bytes written.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Total chunks written.
    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent
    }

    /// Get timing context reference.
    pub fn timing(&self) -> &TimingContext {
        &self.timing
    }
}
