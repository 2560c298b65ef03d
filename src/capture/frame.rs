//! Video frame and audio sample types
//!
//! A `Frame` is a single decoded RGBA image sample. The pixels live behind an
//! `Arc` so the latest frame can be handed to the compositor and to the
//! segmentation worker without copying.

use crate::utils::error::{AppError, AppResult};
use image::RgbaImage;
use std::sync::Arc;
use std::time::Instant;

/// One decoded video image sample
#[derive(Clone, Debug)]
pub struct Frame {
    /// RGBA pixels at the source's native resolution
    image: Arc<RgbaImage>,
    /// Monotonic frame number assigned by the producing track
    pub sequence: u64,
    /// When the frame was captured
    pub captured_at: Instant,
}

impl Frame {
    /// Wrap an already decoded image
    pub fn new(image: RgbaImage, sequence: u64) -> Self {
        Self {
            image: Arc::new(image),
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Build a frame from raw RGBA bytes
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>, sequence: u64) -> AppResult<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(AppError::InvalidFrame(format!(
                "got {} bytes, expected {} ({}x{}x4 RGBA)",
                data.len(),
                expected,
                width,
                height
            )));
        }
        let image = RgbaImage::from_raw(width, height, data)
            .ok_or_else(|| AppError::InvalidFrame("buffer does not fit dimensions".to_string()))?;
        Ok(Self::new(image, sequence))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Raw RGBA bytes, row-major
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Create a downscaled copy for model inference (nearest neighbour)
    pub fn downscale(&self, factor: u32) -> RgbaImage {
        let factor = factor.max(1);
        if factor == 1 || self.width() == 0 || self.height() == 0 {
            return (*self.image).clone();
        }

        let target_width = (self.width() / factor).max(1);
        let target_height = (self.height() / factor).max(1);
        let x_ratio = self.width() as f32 / target_width as f32;
        let y_ratio = self.height() as f32 / target_height as f32;

        RgbaImage::from_fn(target_width, target_height, |x, y| {
            let src_x = ((x as f32 * x_ratio) as u32).min(self.width() - 1);
            let src_y = ((y as f32 * y_ratio) as u32).min(self.height() - 1);
            *self.image.get_pixel(src_x, src_y)
        })
    }
}

/// Sample layout of an audio track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// A block of interleaved f32 samples drained from an audio track
#[derive(Debug, Clone)]
pub struct AudioSamples {
    pub format: AudioFormat,
    pub data: Vec<f32>,
}

impl AudioSamples {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Little-endian f32 bytes, the layout ffmpeg's `f32le` demuxer expects
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.data.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}
