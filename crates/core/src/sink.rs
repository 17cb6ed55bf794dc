//! Synthesis output sinks.
//!
//! Providers produce ordered audio chunks; where they land is the
//! orchestrator's choice. A [`ByteSink`] is the streaming seam (in
//! production, the playback manager's decoder writer); a file sink means
//! the provider must leave a complete container at the path.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;

use crate::error::Result;

/// An opaque, ordered audio chunk with a provider-declared encoding.
pub type AudioChunk = Bytes;

/// Ordered byte consumer for streaming synthesis.
///
/// Implementations must apply back-pressure: `write_chunk` completes only
/// once the chunk has been handed to the downstream consumer, so a slow
/// decoder throttles the network reader instead of buffering unboundedly.
#[async_trait]
pub trait ByteSink: Send {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()>;
}

/// Where a synthesis call routes its audio.
pub enum AudioSink<'a> {
    /// Stream chunks in production order into a byte sink.
    Stream(&'a mut dyn ByteSink),
    /// Write a complete, valid audio container to this path; succeed only
    /// once the file is closed.
    File(PathBuf),
}

impl std::fmt::Debug for AudioSink<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioSink::Stream(_) => f.write_str("AudioSink::Stream"),
            AudioSink::File(path) => write!(f, "AudioSink::File({})", path.display()),
        }
    }
}

/// A sink that collects chunks into memory. Used by tests and by the
/// non-streaming collection paths of streaming providers.
#[derive(Debug, Default)]
pub struct BufferSink {
    data: Vec<u8>,
    chunks: usize,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }
}

#[async_trait]
impl ByteSink for BufferSink {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.data.extend_from_slice(chunk);
        self.chunks += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_buffer_sink_preserves_order() {
        let mut sink = BufferSink::new();
        sink.write_chunk(b"abc").await.unwrap();
        sink.write_chunk(b"def").await.unwrap();
        sink.write_chunk(b"ghi").await.unwrap();
        assert_eq!(sink.chunk_count(), 3);
        assert_eq!(sink.into_bytes(), b"abcdefghi");
    }
}
