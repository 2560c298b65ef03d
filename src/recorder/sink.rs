//! Recording sink
//!
//! Owns the encoder of the running session and the chunks it produced.
//! Chunks survive `stop` and are cleared by a successful `download`. A
//! session started before downloading appends to the chunks already held,
//! so the saved file holds every undownloaded session back to back.

use super::chunks::{ChunkCollector, RecordedChunks};
use super::encoder::{CaptureSpec, EncoderFactory, MediaEncoder};
use super::saver::FileSaver;
use super::state::{RecordingSession, RecordingState};
use crate::capture::{AudioSamples, Frame};
use crate::utils::error::{AppError, AppResult};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

pub struct RecordingSink {
    factory: Arc<dyn EncoderFactory>,
    saver: Arc<dyn FileSaver>,
    filename: String,
    mime_type: String,
    chunks: Arc<Mutex<RecordedChunks>>,
    encoder: Option<Box<dyn MediaEncoder>>,
    collector: Option<ChunkCollector>,
    state: RecordingState,
    session: Option<RecordingSession>,
    /// Chunk count and bytes present when the current session started
    chunks_before: (usize, u64),
}

impl RecordingSink {
    pub fn new(
        factory: Arc<dyn EncoderFactory>,
        saver: Arc<dyn FileSaver>,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            factory,
            saver,
            filename: filename.into(),
            mime_type: mime_type.into(),
            chunks: Arc::new(Mutex::new(RecordedChunks::new())),
            encoder: None,
            collector: None,
            state: RecordingState::Idle,
            session: None,
            chunks_before: (0, 0),
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }

    /// Begin a session. On error nothing changes and no session is active.
    pub fn start(&mut self, spec: &CaptureSpec) -> AppResult<&RecordingSession> {
        if self.is_recording() {
            return Err(AppError::AlreadyRecording);
        }

        let collector = ChunkCollector::new(self.chunks.clone());
        let encoder = self.factory.create(spec, collector.clone())?;

        // Undownloaded chunks stay; the new session appends after them
        self.chunks_before = {
            let chunks = self.chunks.lock();
            if !chunks.is_empty() {
                tracing::info!(
                    "Appending to {} chunks ({} bytes) that were not downloaded yet",
                    chunks.len(),
                    chunks.total_bytes()
                );
            }
            (chunks.len(), chunks.total_bytes())
        };

        self.encoder = Some(encoder);
        self.collector = Some(collector);
        self.state = RecordingState::Recording;
        let session = self.session.insert(RecordingSession::new(spec.audio.is_some()));

        tracing::info!(
            "Recording session {} started: {}x{} @ {}fps, audio: {}",
            session.id,
            spec.width,
            spec.height,
            spec.fps,
            spec.audio.is_some()
        );
        Ok(session)
    }

    /// Forward a composited frame; ignored while not recording
    pub fn push_video(&mut self, frame: &Frame) -> AppResult<()> {
        match self.encoder.as_mut() {
            Some(encoder) => encoder.encode_video(frame),
            None => Ok(()),
        }
    }

    /// Forward source audio; ignored while not recording
    pub fn push_audio(&mut self, samples: &AudioSamples) -> AppResult<()> {
        match self.encoder.as_mut() {
            Some(encoder) => encoder.encode_audio(samples),
            None => Ok(()),
        }
    }

    /// End the session.
    ///
    /// The encoder is finished first so its trailing chunks are kept; the
    /// chunk handler is closed afterwards.
    pub fn stop(&mut self) -> AppResult<RecordingSession> {
        if !self.is_recording() {
            return Err(AppError::NotRecording);
        }

        let finished = match self.encoder.take() {
            Some(encoder) => encoder.finish(),
            None => Ok(()),
        };
        if let Some(collector) = self.collector.take() {
            collector.close();
        }
        self.state = RecordingState::Complete;

        let (count, bytes) = {
            let chunks = self.chunks.lock();
            (
                chunks.len() - self.chunks_before.0,
                chunks.total_bytes() - self.chunks_before.1,
            )
        };
        let session = self
            .session
            .get_or_insert_with(|| RecordingSession::new(false));
        session.end(count, bytes);
        let session = session.clone();

        tracing::info!(
            "Recording session {} stopped after {}ms: {} chunks, {} bytes",
            session.id,
            session.duration_ms(),
            count,
            bytes
        );

        finished.map(|_| session)
    }

    /// Whether there is anything to download
    pub fn can_download(&self) -> bool {
        !self.chunks.lock().is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.lock().len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.chunks.lock().total_bytes()
    }

    /// Save all chunks as one file and clear them.
    ///
    /// Returns `None` without saving when there are no chunks. Refused while
    /// recording, since the file would be cut mid-stream.
    pub fn download(&mut self) -> AppResult<Option<PathBuf>> {
        if self.is_recording() {
            return Err(AppError::AlreadyRecording);
        }

        let mut chunks = self.chunks.lock();
        if chunks.is_empty() {
            tracing::debug!("Nothing to download");
            return Ok(None);
        }

        let bytes = chunks.concat();
        let path = self.saver.save(&self.filename, &self.mime_type, &bytes)?;
        chunks.clear();
        drop(chunks);

        self.state = RecordingState::Idle;
        Ok(Some(path))
    }
}

impl Drop for RecordingSink {
    fn drop(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            tracing::debug!("Finishing encoder of an unstopped session");
            if let Err(e) = encoder.finish() {
                tracing::warn!("Encoder did not finish cleanly: {}", e);
            }
        }
    }
}
