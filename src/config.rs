//! Recorder settings
//!
//! Settings are plain serde types with a default for every field, loaded
//! from an optional JSON file and then overridden from the command line.

use crate::capture::{MediaConstraints, Resolution};
use crate::compositor::BlurQuality;
use crate::segmentation::ModelSelection;
use crate::utils::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fixed name of the downloaded recording
pub const DOWNLOAD_FILENAME: &str = "webcam-stream-capture.webm";

/// Container type of the downloaded recording
pub const RECORDING_MIME_TYPE: &str = "video/webm";

/// Which compositor produces the recorded picture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum CompositorVariant {
    /// Blur the whole frame except a circle in the middle; records video only
    #[default]
    FaceWindow,
    /// Blur the background using a segmentation mask; records video and audio
    Segmentation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderSettings {
    /// Camera to open (None = default camera)
    pub camera_index: Option<u32>,

    /// Requested capture width
    pub width: u32,

    /// Requested capture height
    pub height: u32,

    /// Preview refresh rate and recording frame rate
    pub fps: u32,

    /// Whether to open the microphone
    pub capture_audio: bool,

    /// Blur strength in pixels
    pub blur_radius: f32,

    pub blur_quality: BlurQuality,

    /// Face window radius as a fraction of the shorter frame side
    pub face_window_ratio: f32,

    pub variant: CompositorVariant,

    pub model_selection: ModelSelection,

    /// Directory holding the selfie segmentation models (None = search)
    pub model_dir: Option<PathBuf>,

    /// Where downloads are saved
    pub download_dir: PathBuf,

    pub filename: String,

    pub mime_type: String,

    /// FFmpeg executable used for encoding
    pub ffmpeg_path: String,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            camera_index: None,
            width: 1280,
            height: 720,
            fps: 30,
            capture_audio: true,
            blur_radius: 12.0,
            blur_quality: BlurQuality::Fast,
            face_window_ratio: 0.25,
            variant: CompositorVariant::FaceWindow,
            model_selection: ModelSelection::Accurate,
            model_dir: None,
            download_dir: PathBuf::from("."),
            filename: DOWNLOAD_FILENAME.to_string(),
            mime_type: RECORDING_MIME_TYPE.to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

impl RecorderSettings {
    /// Load settings from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: RecorderSettings = serde_json::from_str(&content)?;
        settings.validate()?;
        tracing::debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(AppError::Config(format!(
                "resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(AppError::Config("fps must be non-zero".to_string()));
        }
        if !(self.blur_radius >= 0.0) {
            return Err(AppError::Config(format!(
                "blur radius must be >= 0, got {}",
                self.blur_radius
            )));
        }
        if !(self.face_window_ratio > 0.0 && self.face_window_ratio <= 0.5) {
            return Err(AppError::Config(format!(
                "face window ratio must be in (0, 0.5], got {}",
                self.face_window_ratio
            )));
        }
        if self.filename.trim().is_empty() {
            return Err(AppError::Config("filename must not be empty".to_string()));
        }
        Ok(())
    }

    /// Device request derived from these settings.
    ///
    /// Audio is only requested when it will be recorded, which is the
    /// segmentation variant.
    pub fn constraints(&self) -> MediaConstraints {
        MediaConstraints {
            camera_index: self.camera_index,
            ideal_resolution: Resolution {
                width: self.width,
                height: self.height,
            },
            audio: self.capture_audio && self.variant == CompositorVariant::Segmentation,
        }
    }

    /// Time between two preview passes
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_validate() {
        let settings = RecorderSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.filename, "webcam-stream-capture.webm");
        assert_eq!(settings.mime_type, "video/webm");
        assert_eq!(settings.blur_radius, 12.0);
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut settings = RecorderSettings::default();
        settings.fps = 0;
        assert!(settings.validate().is_err());

        let mut settings = RecorderSettings::default();
        settings.face_window_ratio = 0.75;
        assert!(settings.validate().is_err());

        let mut settings = RecorderSettings::default();
        settings.blur_radius = f32::NAN;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_partial_json_uses_camel_case() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{ "fps": 24, "blurRadius": 8.0, "variant": "segmentation", "modelSelection": 0 }"#,
        )
        .unwrap();

        let settings = RecorderSettings::load(&path).unwrap();
        assert_eq!(settings.fps, 24);
        assert_eq!(settings.blur_radius, 8.0);
        assert_eq!(settings.variant, CompositorVariant::Segmentation);
        assert_eq!(settings.model_selection, ModelSelection::Lightweight);
        assert_eq!(settings.width, 1280);
    }

    #[test]
    fn test_audio_only_requested_for_segmentation() {
        let mut settings = RecorderSettings::default();
        assert!(!settings.constraints().audio);

        settings.variant = CompositorVariant::Segmentation;
        assert!(settings.constraints().audio);

        settings.capture_audio = false;
        assert!(!settings.constraints().audio);
    }

    #[test]
    fn test_frame_interval() {
        let settings = RecorderSettings {
            fps: 25,
            ..Default::default()
        };
        assert_eq!(settings.frame_interval(), Duration::from_millis(40));
    }
}
