//! Recording state management
//!
//! Defines the recording state machine and session tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current state of the recording sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No session has run, or the last one was downloaded
    #[default]
    Idle,
    /// Currently recording
    Recording,
    /// Session stopped; its chunks wait for download
    Complete,
}

/// Information about one recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    pub id: Uuid,

    /// Wall-clock time when the session started
    pub started_at: DateTime<Utc>,

    /// Wall-clock time when the session stopped
    pub ended_at: Option<DateTime<Utc>>,

    /// Chunks captured by the session
    pub chunk_count: usize,

    /// Bytes captured by the session
    pub byte_count: u64,

    /// Whether audio was recorded alongside the video
    pub has_audio: bool,
}

impl RecordingSession {
    /// Create a new session starting now
    pub fn new(has_audio: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            chunk_count: 0,
            byte_count: 0,
            has_audio,
        }
    }

    /// End the session with its final chunk totals
    pub fn end(&mut self, chunk_count: usize, byte_count: u64) {
        self.ended_at = Some(Utc::now());
        self.chunk_count = chunk_count;
        self.byte_count = byte_count;
    }

    /// Duration in milliseconds, up to now for a running session
    pub fn duration_ms(&self) -> i64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_end_records_totals() {
        let mut session = RecordingSession::new(true);
        assert!(session.ended_at.is_none());

        session.end(3, 1024);
        assert!(session.ended_at.is_some());
        assert_eq!(session.chunk_count, 3);
        assert_eq!(session.byte_count, 1024);
        assert!(session.duration_ms() >= 0);
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&RecordingState::Complete).unwrap();
        assert_eq!(json, "\"complete\"");
        assert_eq!(RecordingState::default(), RecordingState::Idle);
    }
}
