//! Person segmentation with the MediaPipe selfie models on ONNX Runtime
//!
//! Two model files map to the quality tiers: the square general model for
//! `Accurate` and the smaller landscape model for `Lightweight`. Both take an
//! NHWC float image in 0..1 and return one foreground confidence per pixel.

use super::{BackgroundModel, MaskPredictor, ModelSelection, SegmentationMask};
use crate::capture::Frame;
use crate::utils::error::{AppError, AppResult};
use image::imageops::{self, FilterType};
use ndarray::Array4;
use ort::session::Session;
use std::path::{Path, PathBuf};

/// Model file and input size for one quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelTier {
    pub file: &'static str,
    pub width: u32,
    pub height: u32,
}

impl ModelTier {
    pub fn for_selection(selection: ModelSelection) -> Self {
        match selection {
            ModelSelection::Lightweight => Self {
                file: "selfie_segmentation_landscape.onnx",
                width: 256,
                height: 144,
            },
            ModelSelection::Accurate => Self {
                file: "selfie_segmentation.onnx",
                width: 256,
                height: 256,
            },
        }
    }
}

pub struct OnnxSegmenter {
    model_dir: PathBuf,
    tier: ModelTier,
    session: Session,
}

impl OnnxSegmenter {
    /// Load the model for `selection` from `model_dir`
    pub fn load(model_dir: &Path, selection: ModelSelection) -> AppResult<Self> {
        let tier = ModelTier::for_selection(selection);
        let session = open_session(&model_dir.join(tier.file))?;
        Ok(Self {
            model_dir: model_dir.to_path_buf(),
            tier,
            session,
        })
    }
}

fn open_session(path: &Path) -> AppResult<Session> {
    if !path.exists() {
        return Err(AppError::Segmentation(format!("model not found: {:?}", path)));
    }

    ort::init()
        .with_name("WebcamRecorder")
        .commit()
        .map_err(|e| AppError::Segmentation(format!("Failed to initialize ONNX Runtime: {}", e)))?;

    let session = Session::builder()
        .map_err(|e| AppError::Segmentation(format!("Failed to create session builder: {}", e)))?
        .with_intra_threads(2)
        .map_err(|e| AppError::Segmentation(format!("Failed to set threads: {}", e)))?
        .commit_from_file(path)
        .map_err(|e| AppError::Segmentation(format!("Failed to load {:?}: {}", path, e)))?;

    tracing::info!("Loaded segmentation model from {:?}", path);
    Ok(session)
}

/// Resize to the model input and convert to NHWC RGB floats in 0..1
fn preprocess(frame: &Frame, width: u32, height: u32) -> Vec<f32> {
    let resized = imageops::resize(frame.image(), width, height, FilterType::Triangle);
    let mut input = Vec::with_capacity(width as usize * height as usize * 3);
    for pixel in resized.pixels() {
        input.push(pixel[0] as f32 / 255.0);
        input.push(pixel[1] as f32 / 255.0);
        input.push(pixel[2] as f32 / 255.0);
    }
    input
}

/// Model output as a mask; values are clamped to 0..1
fn to_mask(tier: ModelTier, output: &[f32]) -> AppResult<SegmentationMask> {
    let confidence = output.iter().map(|v| v.clamp(0.0, 1.0)).collect();
    SegmentationMask::new(tier.width, tier.height, confidence)
}

impl MaskPredictor for OnnxSegmenter {
    fn name(&self) -> &str {
        self.tier.file
    }

    fn configure(&mut self, selection: ModelSelection) {
        let tier = ModelTier::for_selection(selection);
        if tier == self.tier {
            return;
        }
        match open_session(&self.model_dir.join(tier.file)) {
            Ok(session) => {
                self.session = session;
                self.tier = tier;
            }
            Err(e) => tracing::warn!("Keeping {} model: {}", self.tier.file, e),
        }
    }

    fn predict(&mut self, frame: &Frame) -> AppResult<SegmentationMask> {
        let (width, height) = (self.tier.width, self.tier.height);
        let input = Array4::from_shape_vec(
            (1, height as usize, width as usize, 3),
            preprocess(frame, width, height),
        )
        .map_err(|e| AppError::Segmentation(format!("Failed to create input array: {}", e)))?;

        let input_tensor = ort::value::Tensor::from_array(input)
            .map_err(|e| AppError::Segmentation(format!("Failed to create tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| AppError::Segmentation(format!("Inference failed: {}", e)))?;

        let output = outputs
            .iter()
            .next()
            .ok_or_else(|| AppError::Segmentation("model produced no output".to_string()))?;
        let (_shape, data) = output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::Segmentation(format!("Failed to extract output: {}", e)))?;

        to_mask(self.tier, data)
    }
}

/// Directories searched for models when none is configured
fn model_dir_candidates() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(parent) = exe_path.parent() {
            dirs.push(parent.join("models"));
            // target/debug and target/release sit two levels below the crate
            if let Some(root) = parent.parent().and_then(Path::parent) {
                dirs.push(root.join("models"));
            }
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd.join("models"));
    }
    dirs
}

/// First directory holding the model file for `selection`
pub fn find_model_dir(configured: Option<&Path>, selection: ModelSelection) -> Option<PathBuf> {
    let file = ModelTier::for_selection(selection).file;
    match configured {
        Some(dir) => Some(dir.to_path_buf()).filter(|d| d.join(file).exists()),
        None => model_dir_candidates().into_iter().find(|d| d.join(file).exists()),
    }
}

/// The selfie model when its file can be loaded, background subtraction otherwise
pub fn default_predictor(model_dir: Option<&Path>, selection: ModelSelection) -> Box<dyn MaskPredictor> {
    let Some(dir) = find_model_dir(model_dir, selection) else {
        tracing::warn!(
            "No {} found, falling back to background subtraction",
            ModelTier::for_selection(selection).file
        );
        return Box::new(BackgroundModel::new());
    };

    match OnnxSegmenter::load(&dir, selection) {
        Ok(segmenter) => Box::new(segmenter),
        Err(e) => {
            tracing::warn!("{}; falling back to background subtraction", e);
            Box::new(BackgroundModel::new())
        }
    }
}
