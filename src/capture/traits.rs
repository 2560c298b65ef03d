//! Capture trait definitions
//!
//! Device-agnostic traits for stream sources and their tracks.

use super::frame::{AudioFormat, AudioSamples, Frame};
use crate::utils::error::AppResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Information about an audio device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDeviceInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,

    /// Whether this is an input device
    pub is_input: bool,

    /// Whether this is the default device
    pub is_default: bool,
}

/// Information about a camera/webcam
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// What to request from a stream source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaConstraints {
    /// Camera index (None = default camera)
    pub camera_index: Option<u32>,

    /// Preferred capture resolution; the device may deliver another one
    pub ideal_resolution: Resolution,

    /// Whether to open the microphone alongside the camera
    pub audio: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            camera_index: None,
            ideal_resolution: Resolution {
                width: 1280,
                height: 720,
            },
            audio: true,
        }
    }
}

/// A live video track
pub trait VideoTrack: Send + Sync {
    /// Human readable track label
    fn label(&self) -> &str;

    /// The most recent decoded frame, if any arrived yet
    fn latest_frame(&self) -> Option<Frame>;

    /// Whether the track is still producing frames
    fn is_live(&self) -> bool;

    /// Stop the track and release the device
    fn stop(&mut self);
}

/// A live audio track
pub trait AudioTrack: Send + Sync {
    /// Human readable track label
    fn label(&self) -> &str;

    /// Sample layout of the samples returned by `drain`
    fn format(&self) -> AudioFormat;

    /// Take every sample buffered since the last call
    fn drain(&self) -> AudioSamples;

    /// Whether the track is still producing samples
    fn is_live(&self) -> bool;

    /// Stop the track and release the device
    fn stop(&mut self);
}

/// A live audio/video signal made of zero or more tracks of each kind
#[derive(Default)]
pub struct MediaStream {
    video_tracks: Vec<Box<dyn VideoTrack>>,
    audio_tracks: Vec<Box<dyn AudioTrack>>,
}

impl MediaStream {
    pub fn new(
        video_tracks: Vec<Box<dyn VideoTrack>>,
        audio_tracks: Vec<Box<dyn AudioTrack>>,
    ) -> Self {
        Self {
            video_tracks,
            audio_tracks,
        }
    }

    pub fn video_tracks(&self) -> &[Box<dyn VideoTrack>] {
        &self.video_tracks
    }

    pub fn audio_tracks(&self) -> &[Box<dyn AudioTrack>] {
        &self.audio_tracks
    }

    /// Current frame of the first video track
    pub fn current_frame(&self) -> Option<Frame> {
        self.video_tracks.first().and_then(|t| t.latest_frame())
    }

    /// Stop every track in the stream
    pub fn stop(&mut self) {
        for track in &mut self.video_tracks {
            if track.is_live() {
                tracing::debug!("Stopping video track: {}", track.label());
                track.stop();
            }
        }
        for track in &mut self.audio_tracks {
            if track.is_live() {
                tracing::debug!("Stopping audio track: {}", track.label());
                track.stop();
            }
        }
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Something that can hand out a combined audio/video stream
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Request a stream. Fails with `AppError::Acquisition` when the device is
    /// missing or access is denied.
    async fn acquire(&self, constraints: &MediaConstraints) -> AppResult<MediaStream>;
}
