//! Built-in segmentation by background subtraction
//!
//! Learns the empty scene over a short warm-up window, then treats pixels
//! whose colour moved far enough from the learned background as foreground.
//! Works for a fixed webcam; it is the fallback when no learned model is
//! plugged in.

use super::{MaskPredictor, ModelSelection, SegmentationMask};
use crate::capture::Frame;
use crate::utils::error::AppResult;

/// Frames averaged into the background before masks are produced
const WARMUP_FRAMES: u32 = 15;
/// Normalized colour distance below which a pixel is background
const LOW_THRESHOLD: f32 = 0.08;
/// Normalized colour distance above which a pixel is foreground
const HIGH_THRESHOLD: f32 = 0.20;
/// How fast background pixels follow slow lighting changes
const LEARNING_RATE: f32 = 0.02;

pub struct BackgroundModel {
    downscale: u32,
    /// Learned RGB background at working resolution, 0..1
    background: Vec<[f32; 3]>,
    width: u32,
    height: u32,
    frames_seen: u32,
}

impl BackgroundModel {
    pub fn new() -> Self {
        Self {
            downscale: 2,
            background: Vec::new(),
            width: 0,
            height: 0,
            frames_seen: 0,
        }
    }

    /// Whether the background is learned and masks are meaningful
    pub fn is_warmed_up(&self) -> bool {
        self.frames_seen >= WARMUP_FRAMES
    }

    fn reset(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.background = vec![[0.0; 3]; width as usize * height as usize];
        self.frames_seen = 0;
    }
}

impl Default for BackgroundModel {
    fn default() -> Self {
        Self::new()
    }
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

impl MaskPredictor for BackgroundModel {
    fn name(&self) -> &str {
        "background-subtraction"
    }

    fn configure(&mut self, selection: ModelSelection) {
        self.downscale = match selection {
            ModelSelection::Lightweight => 4,
            ModelSelection::Accurate => 2,
        };
        self.width = 0;
        self.height = 0;
    }

    fn predict(&mut self, frame: &Frame) -> AppResult<SegmentationMask> {
        let small = frame.downscale(self.downscale);
        let (width, height) = small.dimensions();
        if (width, height) != (self.width, self.height) {
            self.reset(width, height);
        }

        let warming_up = !self.is_warmed_up();
        self.frames_seen = self.frames_seen.saturating_add(1);
        let weight = 1.0 / self.frames_seen.min(WARMUP_FRAMES) as f32;

        let mut confidence = Vec::with_capacity(self.background.len());
        for (pixel, bg) in small.pixels().zip(self.background.iter_mut()) {
            let rgb = [
                pixel[0] as f32 / 255.0,
                pixel[1] as f32 / 255.0,
                pixel[2] as f32 / 255.0,
            ];

            if warming_up {
                // Running mean of the empty scene; everything counts as foreground meanwhile
                for c in 0..3 {
                    bg[c] += (rgb[c] - bg[c]) * weight;
                }
                confidence.push(1.0);
                continue;
            }

            let distance = ((rgb[0] - bg[0]).powi(2) + (rgb[1] - bg[1]).powi(2) + (rgb[2] - bg[2]).powi(2))
                .sqrt()
                / 3f32.sqrt();
            let value = smoothstep(LOW_THRESHOLD, HIGH_THRESHOLD, distance);
            if value < 0.5 {
                for c in 0..3 {
                    bg[c] += (rgb[c] - bg[c]) * LEARNING_RATE;
                }
            }
            confidence.push(value);
        }

        SegmentationMask::new(width, height, confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn scene(with_person: bool) -> Frame {
        let image = RgbaImage::from_fn(32, 32, |x, y| {
            if with_person && (8..24).contains(&x) && (8..24).contains(&y) {
                Rgba([230, 40, 40, 255])
            } else {
                Rgba([40, 90, 160, 255])
            }
        });
        Frame::new(image, 0)
    }

    #[test]
    fn test_warmup_reports_everything_foreground() {
        let mut model = BackgroundModel::new();
        model.configure(ModelSelection::Accurate);
        let mask = model.predict(&scene(false)).unwrap();
        assert!(!model.is_warmed_up());
        assert_eq!((mask.width(), mask.height()), (16, 16));
        assert!(mask.values().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_detects_changed_region_after_warmup() {
        let mut model = BackgroundModel::new();
        model.configure(ModelSelection::Accurate);
        for _ in 0..WARMUP_FRAMES {
            model.predict(&scene(false)).unwrap();
        }
        assert!(model.is_warmed_up());

        let empty = model.predict(&scene(false)).unwrap();
        assert!(empty.values().iter().all(|&v| v < 0.01));

        let mask = model.predict(&scene(true)).unwrap();
        assert!(mask.sample(0.5, 0.5) > 0.99);
        assert!(mask.sample(0.05, 0.05) < 0.01);
    }

    #[test]
    fn test_lightweight_uses_coarser_mask() {
        let mut model = BackgroundModel::new();
        model.configure(ModelSelection::Lightweight);
        let mask = model.predict(&scene(false)).unwrap();
        assert_eq!((mask.width(), mask.height()), (8, 8));
    }
}
