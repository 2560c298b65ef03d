//! Foreground/background segmentation
//!
//! The model itself is a collaborator behind the `MaskPredictor` trait. The
//! selfie model on ONNX Runtime is used when its file is available, with
//! background subtraction as the fallback.
//! `SelfieSegmenter` runs a predictor on a worker thread: frames are sent
//! fire-and-forget and every finished prediction is handed to a results
//! callback together with the frame it was computed for.

pub mod background;
pub mod onnx;

pub use background::BackgroundModel;
pub use onnx::{default_predictor, OnnxSegmenter};

use crate::capture::Frame;
use crate::utils::error::{AppError, AppResult};
use crossbeam_channel::{Sender, TrySendError};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Per-pixel foreground confidence (0.0 = background, 1.0 = person)
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMask {
    width: u32,
    height: u32,
    confidence: Vec<f32>,
}

impl SegmentationMask {
    pub fn new(width: u32, height: u32, confidence: Vec<f32>) -> AppResult<Self> {
        if confidence.len() != width as usize * height as usize || width == 0 || height == 0 {
            return Err(AppError::InvalidFrame(format!(
                "mask has {} values for {}x{}",
                confidence.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            confidence,
        })
    }

    /// A mask with the same confidence everywhere
    pub fn uniform(width: u32, height: u32, value: f32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            confidence: vec![value.clamp(0.0, 1.0); width.max(1) as usize * height.max(1) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn values(&self) -> &[f32] {
        &self.confidence
    }

    /// Get mask value at normalized coordinates
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let px = (x * self.width as f32) as u32;
        let py = (y * self.height as f32) as u32;
        let idx = (py.min(self.height - 1) * self.width + px.min(self.width - 1)) as usize;
        self.confidence.get(idx).copied().unwrap_or(0.0)
    }

    /// Render as an alpha layer covering `width`x`height` (alpha = confidence)
    pub fn to_alpha_image(&self, width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            let value = self.sample(
                (x as f32 + 0.5) / width as f32,
                (y as f32 + 0.5) / height as f32,
            );
            let alpha = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
            Rgba([255, 255, 255, alpha])
        })
    }
}

/// Model quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ModelSelection {
    /// Cheaper, coarser masks
    Lightweight = 0,
    /// Finer masks at a higher cost
    #[default]
    Accurate = 1,
}

impl TryFrom<u8> for ModelSelection {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ModelSelection::Lightweight),
            1 => Ok(ModelSelection::Accurate),
            other => Err(format!("model selection must be 0 or 1, got {}", other)),
        }
    }
}

impl From<ModelSelection> for u8 {
    fn from(value: ModelSelection) -> Self {
        value as u8
    }
}

/// A segmentation model
pub trait MaskPredictor: Send {
    /// Model name for logging
    fn name(&self) -> &str;

    /// Apply the quality tier
    fn configure(&mut self, selection: ModelSelection);

    /// Compute a foreground mask for `frame`
    fn predict(&mut self, frame: &Frame) -> AppResult<SegmentationMask>;
}

impl<P: MaskPredictor + ?Sized> MaskPredictor for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn configure(&mut self, selection: ModelSelection) {
        (**self).configure(selection)
    }

    fn predict(&mut self, frame: &Frame) -> AppResult<SegmentationMask> {
        (**self).predict(frame)
    }
}

/// One model callback: the input frame and its mask, if prediction succeeded
#[derive(Debug, Clone)]
pub struct SegmentationResults {
    pub image: Frame,
    pub mask: Option<SegmentationMask>,
}

/// Runs a `MaskPredictor` on a background thread
pub struct SelfieSegmenter {
    frame_sender: Option<Sender<Frame>>,
    running: Arc<AtomicBool>,
    dropped_frames: Arc<AtomicU64>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl SelfieSegmenter {
    /// Start the worker thread.
    ///
    /// `on_results` runs on the worker thread once per processed frame.
    pub fn spawn<P, F>(mut predictor: P, selection: ModelSelection, mut on_results: F) -> AppResult<Self>
    where
        P: MaskPredictor + 'static,
        F: FnMut(SegmentationResults) + Send + 'static,
    {
        predictor.configure(selection);

        // Capacity 1: while the model is busy at most one frame waits
        let (frame_sender, frame_receiver) = crossbeam_channel::bounded::<Frame>(1);
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let thread_handle = std::thread::Builder::new()
            .name("segmentation".to_string())
            .spawn(move || {
                tracing::info!("Segmentation thread started ({}, {:?})", predictor.name(), selection);

                while let Ok(frame) = frame_receiver.recv() {
                    let mask = match predictor.predict(&frame) {
                        Ok(mask) => Some(mask),
                        Err(e) => {
                            tracing::warn!("Segmentation failed for frame {}: {}", frame.sequence, e);
                            None
                        }
                    };
                    on_results(SegmentationResults { image: frame, mask });
                }

                running_clone.store(false, Ordering::Release);
                tracing::info!("Segmentation thread stopped");
            })
            .map_err(|e| AppError::Capture(format!("Failed to spawn segmentation thread: {}", e)))?;

        Ok(Self {
            frame_sender: Some(frame_sender),
            running,
            dropped_frames: Arc::new(AtomicU64::new(0)),
            thread_handle: Some(thread_handle),
        })
    }

    /// Queue a frame for segmentation.
    ///
    /// Returns false when the worker is still busy and the frame was dropped.
    pub fn send(&self, frame: Frame) -> bool {
        let Some(sender) = &self.frame_sender else {
            return false;
        };
        match sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Frames skipped because the model was busy
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Close the frame channel and wait for the worker to finish
    pub fn stop(&mut self) {
        self.frame_sender.take();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SelfieSegmenter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    struct HalfMask {
        selection: Option<ModelSelection>,
    }

    impl MaskPredictor for HalfMask {
        fn name(&self) -> &str {
            "half"
        }

        fn configure(&mut self, selection: ModelSelection) {
            self.selection = Some(selection);
        }

        fn predict(&mut self, frame: &Frame) -> AppResult<SegmentationMask> {
            if self.selection.is_none() {
                return Err(AppError::Config("not configured".to_string()));
            }
            if frame.sequence == 99 {
                return Err(AppError::InvalidFrame("unlucky frame".to_string()));
            }
            SegmentationMask::new(2, 1, vec![1.0, 0.0])
        }
    }

    fn frame(sequence: u64) -> Frame {
        Frame::new(RgbaImage::new(4, 4), sequence)
    }

    #[test]
    fn test_sample_maps_normalized_coordinates() {
        let mask = SegmentationMask::new(2, 2, vec![0.0, 0.25, 0.5, 1.0]).unwrap();
        assert_eq!(mask.sample(0.1, 0.1), 0.0);
        assert_eq!(mask.sample(0.9, 0.1), 0.25);
        assert_eq!(mask.sample(0.1, 0.9), 0.5);
        assert_eq!(mask.sample(1.0, 1.0), 1.0);
    }

    #[test]
    fn test_mask_rejects_wrong_length() {
        assert!(SegmentationMask::new(2, 2, vec![0.0; 3]).is_err());
    }

    #[test]
    fn test_alpha_image_scales_mask() {
        let mask = SegmentationMask::new(2, 1, vec![1.0, 0.0]).unwrap();
        let alpha = mask.to_alpha_image(8, 4);
        assert_eq!(alpha.get_pixel(1, 2)[3], 255);
        assert_eq!(alpha.get_pixel(6, 2)[3], 0);
    }

    #[test]
    fn test_model_selection_indices() {
        assert_eq!(ModelSelection::try_from(0).unwrap(), ModelSelection::Lightweight);
        assert_eq!(ModelSelection::try_from(1).unwrap(), ModelSelection::Accurate);
        assert!(ModelSelection::try_from(2).is_err());
        assert_eq!(serde_json::to_string(&ModelSelection::Accurate).unwrap(), "1");
    }

    #[test]
    fn test_segmenter_delivers_results_with_same_frame() {
        let (tx, rx) = mpsc::channel();
        let mut segmenter = SelfieSegmenter::spawn(
            HalfMask { selection: None },
            ModelSelection::Lightweight,
            move |results| {
                let _ = tx.send(results);
            },
        )
        .unwrap();

        assert!(segmenter.send(frame(7)));
        let results = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(results.image.sequence, 7);
        assert_eq!(results.mask.unwrap().values(), &[1.0, 0.0]);

        segmenter.stop();
        assert!(!segmenter.is_running());
        assert!(!segmenter.send(frame(8)));
    }

    #[test]
    fn test_failed_prediction_yields_no_mask() {
        let (tx, rx) = mpsc::channel();
        let _segmenter = SelfieSegmenter::spawn(
            HalfMask { selection: None },
            ModelSelection::Accurate,
            move |results| {
                let _ = tx.send(results);
            },
        )
        .map(|s| {
            assert!(s.send(frame(99)));
            s
        })
        .unwrap();

        let results = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(results.image.sequence, 99);
        assert!(results.mask.is_none());
    }
}
