//! Recorded chunk storage
//!
//! The encoder emits opaque byte fragments while a session runs. They are
//! kept in emission order and concatenated into one file on download.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Ordered, append-only sequence of non-empty chunks
#[derive(Debug, Default)]
pub struct RecordedChunks {
    chunks: Vec<Vec<u8>>,
    total_bytes: u64,
}

impl RecordedChunks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty chunks are ignored and return false.
    pub fn push(&mut self, chunk: Vec<u8>) -> bool {
        if chunk.is_empty() {
            return false;
        }
        self.total_bytes += chunk.len() as u64;
        self.chunks.push(chunk);
        true
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// All chunks joined in emission order
    pub fn concat(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_bytes as usize);
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total_bytes = 0;
    }
}

/// Chunk handler handed to an encoder.
///
/// Clones share the same storage. Once `close` is called, later chunks are
/// dropped, so nothing is appended after a session stops.
#[derive(Debug, Clone)]
pub struct ChunkCollector {
    chunks: Arc<Mutex<RecordedChunks>>,
    accepting: Arc<AtomicBool>,
}

impl ChunkCollector {
    pub(crate) fn new(chunks: Arc<Mutex<RecordedChunks>>) -> Self {
        Self {
            chunks,
            accepting: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Called by the encoder for every emitted chunk
    pub fn on_data_available(&self, chunk: Vec<u8>) {
        if !self.accepting.load(Ordering::Acquire) {
            tracing::warn!("Dropping {} byte chunk emitted after stop", chunk.len());
            return;
        }
        let len = chunk.len();
        if self.chunks.lock().push(chunk) {
            tracing::trace!("Recorded chunk of {} bytes", len);
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        self.accepting.store(false, Ordering::Release);
    }
}
