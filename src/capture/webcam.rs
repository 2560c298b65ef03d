//! Webcam capture using nokhwa
//!
//! The camera is opened on a dedicated capture thread. Decoded frames are
//! written into a triple-buffered slot so the preview loop always reads the
//! most recent complete frame without waiting on the device.

use super::frame::Frame;
use super::traits::{CameraInfo, Resolution, VideoTrack};
use crate::utils::error::{AppError, AppResult};
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

/// Get list of available cameras
pub fn get_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| {
                let id = match info.index() {
                    CameraIndex::Index(i) => i.to_string(),
                    CameraIndex::String(s) => s.to_string(),
                };
                CameraInfo {
                    id,
                    name: info.human_name().to_string(),
                }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

type FrameSlot = Arc<Mutex<Option<Frame>>>;

/// Video track backed by a physical camera
pub struct WebcamVideoTrack {
    label: String,
    /// Latest frames, triple buffered
    frames: [FrameSlot; 3],
    /// Write index of the latest complete frame
    latest_frame_idx: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    capture_thread: Option<std::thread::JoinHandle<()>>,
}

impl WebcamVideoTrack {
    /// Open a camera and start capturing.
    ///
    /// Blocks until the device reports it is streaming (or failed to open), so
    /// callers on an async runtime should wrap this in `spawn_blocking`.
    pub fn open(camera_index: Option<u32>, ideal: Resolution) -> AppResult<Self> {
        let frames: [FrameSlot; 3] = [
            Arc::new(Mutex::new(None)),
            Arc::new(Mutex::new(None)),
            Arc::new(Mutex::new(None)),
        ];
        let latest_frame_idx = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));

        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<String, String>>(1);

        let frames_clone = frames.clone();
        let latest_frame_idx_clone = latest_frame_idx.clone();
        let running_clone = running.clone();
        let index = CameraIndex::Index(camera_index.unwrap_or(0));

        let handle = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || {
                Self::capture_thread(
                    index,
                    ideal,
                    ready_tx,
                    frames_clone,
                    latest_frame_idx_clone,
                    running_clone,
                );
            })
            .map_err(|e| AppError::Acquisition(format!("Failed to spawn capture thread: {}", e)))?;

        let label = match ready_rx.recv() {
            Ok(Ok(label)) => label,
            Ok(Err(message)) => {
                let _ = handle.join();
                return Err(AppError::Acquisition(message));
            }
            Err(_) => {
                let _ = handle.join();
                return Err(AppError::Acquisition(
                    "Camera thread exited before reporting status".to_string(),
                ));
            }
        };

        Ok(Self {
            label,
            frames,
            latest_frame_idx,
            running,
            capture_thread: Some(handle),
        })
    }

    fn open_camera(index: CameraIndex, ideal: Resolution) -> Result<Camera, String> {
        let preferred = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::HighestResolution(
            nokhwa::utils::Resolution::new(ideal.width, ideal.height),
        ));

        match Camera::new(index.clone(), preferred) {
            Ok(c) => Ok(c),
            Err(e) => {
                tracing::warn!("Failed to open camera at {}x{}: {:?}", ideal.width, ideal.height, e);

                let highest =
                    RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestResolution);
                match Camera::new(index.clone(), highest) {
                    Ok(c) => Ok(c),
                    Err(e2) => {
                        tracing::warn!("Failed with AbsoluteHighestResolution: {:?}", e2);

                        let any = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::None);
                        Camera::new(index, any)
                            .map_err(|e3| format!("Failed to open camera with all format attempts: {:?}", e3))
                    }
                }
            }
        }
    }

    fn capture_thread(
        index: CameraIndex,
        ideal: Resolution,
        ready_tx: mpsc::SyncSender<Result<String, String>>,
        frames: [FrameSlot; 3],
        latest_frame_idx: Arc<AtomicU64>,
        running: Arc<AtomicBool>,
    ) {
        let mut camera = match Self::open_camera(index, ideal) {
            Ok(c) => c,
            Err(message) => {
                running.store(false, Ordering::Release);
                let _ = ready_tx.send(Err(message));
                return;
            }
        };

        if let Err(e) = camera.open_stream() {
            running.store(false, Ordering::Release);
            let _ = ready_tx.send(Err(format!("Failed to open camera stream: {:?}", e)));
            return;
        }

        let label = camera.info().human_name().to_string();
        tracing::info!(
            "Camera opened: {} ({}x{} @ {}fps)",
            label,
            camera.resolution().width(),
            camera.resolution().height(),
            camera.frame_rate()
        );
        let _ = ready_tx.send(Ok(label));

        let mut write_idx: u64 = 0;
        let mut sequence: u64 = 0;

        while running.load(Ordering::Acquire) {
            match camera.frame() {
                Ok(buffer) => {
                    let width = buffer.resolution().width();
                    let height = buffer.resolution().height();
                    match buffer.decode_image::<RgbAFormat>() {
                        Ok(decoded) => match Frame::from_rgba(width, height, decoded.into_raw(), sequence) {
                            Ok(frame) => {
                                sequence += 1;
                                let slot = (write_idx % 3) as usize;
                                *frames[slot].lock() = Some(frame);
                                latest_frame_idx.store(write_idx, Ordering::Release);
                                write_idx = write_idx.wrapping_add(1);
                            }
                            Err(e) => tracing::warn!("Dropping camera frame: {}", e),
                        },
                        Err(e) => tracing::warn!("Failed to decode frame: {:?}", e),
                    }
                }
                Err(e) => {
                    tracing::debug!("Failed to capture frame: {:?}", e);
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
            }
        }

        if let Err(e) = camera.stop_stream() {
            tracing::warn!("Error stopping camera stream: {:?}", e);
        }

        tracing::info!("Camera capture thread stopped after {} frames", sequence);
    }
}

impl VideoTrack for WebcamVideoTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn latest_frame(&self) -> Option<Frame> {
        let idx = self.latest_frame_idx.load(Ordering::Acquire);
        let slot = (idx % 3) as usize;
        self.frames[slot].lock().clone()
    }

    fn is_live(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.capture_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WebcamVideoTrack {
    fn drop(&mut self) {
        self.stop();
    }
}
