//! Stream source backed by physical devices
//!
//! Opens the camera (and the default microphone when audio is requested)
//! and bundles them into a `MediaStream`.

use super::audio::MicrophoneTrack;
use super::traits::{AudioTrack, MediaConstraints, MediaStream, StreamSource, VideoTrack};
use super::webcam::WebcamVideoTrack;
use crate::utils::error::{AppError, AppResult};
use async_trait::async_trait;

/// Camera + microphone source
#[derive(Debug, Default, Clone)]
pub struct DeviceStreamSource;

impl DeviceStreamSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StreamSource for DeviceStreamSource {
    async fn acquire(&self, constraints: &MediaConstraints) -> AppResult<MediaStream> {
        let constraints = constraints.clone();

        // Device opening blocks until the hardware answers
        tokio::task::spawn_blocking(move || {
            let camera = WebcamVideoTrack::open(constraints.camera_index, constraints.ideal_resolution)?;
            let video_tracks: Vec<Box<dyn VideoTrack>> = vec![Box::new(camera)];

            let audio_tracks: Vec<Box<dyn AudioTrack>> = if constraints.audio {
                vec![Box::new(MicrophoneTrack::open()?)]
            } else {
                Vec::new()
            };

            tracing::info!(
                "Acquired stream: {} video track(s), {} audio track(s)",
                video_tracks.len(),
                audio_tracks.len()
            );
            Ok(MediaStream::new(video_tracks, audio_tracks))
        })
        .await
        .map_err(|e| AppError::Acquisition(format!("Device task failed: {}", e)))?
    }
}
