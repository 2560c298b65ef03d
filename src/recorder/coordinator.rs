//! Recording coordinator
//!
//! `WebcamRecorder` owns the acquired stream, the drawing surface, the
//! recording sink and the preview loop. One compositing pass runs per preview
//! tick (face window variant) or per segmentation result (segmentation
//! variant); each pass's output is published to preview subscribers and, while
//! recording, fed to the sink.

use super::encoder::{CaptureSpec, EncoderFactory};
use super::saver::FileSaver;
use super::sink::RecordingSink;
use super::state::RecordingSession;
use crate::capture::{AudioSamples, Frame, MediaStream, StreamSource};
use crate::compositor::{DrawingSurface, FaceWindowCompositor, MaskCompositor};
use crate::config::{CompositorVariant, RecorderSettings};
use crate::segmentation::{default_predictor, BackgroundModel, MaskPredictor, SegmentationResults, SelfieSegmenter};
use crate::utils::error::{AppError, AppResult};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// Events emitted by the recorder
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    PreviewShown,
    PreviewHidden,
    BlurChanged(bool),
    RecordingStarted(Uuid),
    RecordingStopped(RecordingSession),
    Downloaded(PathBuf),
    /// Error occurred
    Error(String),
}

/// Where a finished pass goes: the surface it was drawn on, the sink and the
/// preview channel
#[derive(Clone)]
struct OutputTarget {
    surface: Arc<Mutex<DrawingSurface>>,
    sink: Arc<Mutex<RecordingSink>>,
    preview_tx: Arc<watch::Sender<Option<Frame>>>,
}

impl OutputTarget {
    /// Run `draw` on the surface and deliver the result
    fn render(&self, sequence: u64, draw: impl FnOnce(&mut DrawingSurface)) {
        let output = {
            let mut surface = self.surface.lock();
            draw(&mut surface);
            surface.to_frame(sequence)
        };

        {
            // Waits out a concurrent write, start or stop so no frame is lost
            let mut sink = self.sink.lock();
            if sink.is_recording() {
                if let Err(e) = sink.push_video(&output) {
                    tracing::warn!("Failed to record frame {}: {}", sequence, e);
                }
            }
        }

        self.preview_tx.send_replace(Some(output));
    }

    fn record_audio(&self, samples: &AudioSamples) {
        if samples.is_empty() {
            return;
        }
        let mut sink = self.sink.lock();
        if sink.is_recording() {
            if let Err(e) = sink.push_audio(samples) {
                tracing::warn!("Failed to record {} audio samples: {}", samples.data.len(), e);
            }
        }
    }
}

struct Shared {
    variant: CompositorVariant,
    stream: Mutex<MediaStream>,
    output: OutputTarget,
    face_window: FaceWindowCompositor,
    mask: Arc<MaskCompositor>,
    segmenter: Mutex<Option<SelfieSegmenter>>,
    blur: Arc<AtomicBool>,
    /// Sequence + 1 of the last frame handed to the segmenter
    last_segmented: AtomicU64,
    event_tx: broadcast::Sender<RecorderEvent>,
}

impl Shared {
    fn run_pass(&self) -> bool {
        let (frame, audio) = {
            let stream = self.stream.lock();
            let audio: Vec<AudioSamples> = match self.variant {
                // Drained every pass so buffers never hold stale audio
                CompositorVariant::Segmentation => stream.audio_tracks().iter().map(|t| t.drain()).collect(),
                CompositorVariant::FaceWindow => Vec::new(),
            };
            (stream.current_frame(), audio)
        };

        if let Some(samples) = audio.first() {
            self.output.record_audio(samples);
        }

        let Some(frame) = frame else {
            return false;
        };
        let blur = self.blur.load(Ordering::Acquire);

        match self.variant {
            CompositorVariant::FaceWindow => {
                self.output
                    .render(frame.sequence, |surface| self.face_window.composite(surface, &frame, blur));
            }
            CompositorVariant::Segmentation if blur => {
                let marker = frame.sequence + 1;
                if self.last_segmented.swap(marker, Ordering::AcqRel) == marker {
                    return true;
                }
                if let Some(segmenter) = self.segmenter.lock().as_ref() {
                    if !segmenter.send(frame) {
                        tracing::trace!("Segmenter busy, frame skipped ({} total)", segmenter.dropped_frames());
                    }
                }
            }
            CompositorVariant::Segmentation => {
                self.output
                    .render(frame.sequence, |surface| self.mask.composite(surface, &frame, None));
            }
        }
        true
    }

    fn emit(&self, event: RecorderEvent) {
        let _ = self.event_tx.send(event);
    }
}

struct PreviewTask {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

fn spawn_preview(shared: Arc<Shared>, interval: Duration) -> PreviewTask {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Compositing is CPU bound; awaiting it keeps passes from overlapping
                    let pass = shared.clone();
                    if let Err(e) = tokio::task::spawn_blocking(move || pass.run_pass()).await {
                        tracing::error!("Compositing pass failed: {}", e);
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Preview loop stopped");
    });

    PreviewTask { shutdown_tx, handle }
}

/// Webcam preview and recording controller
pub struct WebcamRecorder {
    shared: Arc<Shared>,
    settings: RecorderSettings,
    preview: Option<PreviewTask>,
}

impl WebcamRecorder {
    /// Acquire the stream and start previewing.
    ///
    /// The segmentation variant loads the selfie model, falling back to
    /// background subtraction when no model file is found.
    pub async fn open(
        source: &dyn StreamSource,
        settings: RecorderSettings,
        factory: Arc<dyn EncoderFactory>,
        saver: Arc<dyn FileSaver>,
    ) -> AppResult<Self> {
        let predictor: Box<dyn MaskPredictor> = match settings.variant {
            CompositorVariant::Segmentation => {
                let model_dir = settings.model_dir.clone();
                let selection = settings.model_selection;
                tokio::task::spawn_blocking(move || default_predictor(model_dir.as_deref(), selection))
                    .await
                    .map_err(|e| AppError::Segmentation(format!("Model loading task failed: {}", e)))?
            }
            CompositorVariant::FaceWindow => Box::new(BackgroundModel::new()),
        };
        Self::open_with_predictor(source, settings, factory, saver, predictor).await
    }

    /// Like `open`, with the predictor used by the segmentation variant
    pub async fn open_with_predictor<P>(
        source: &dyn StreamSource,
        settings: RecorderSettings,
        factory: Arc<dyn EncoderFactory>,
        saver: Arc<dyn FileSaver>,
        predictor: P,
    ) -> AppResult<Self>
    where
        P: MaskPredictor + 'static,
    {
        settings.validate()?;

        let stream = source.acquire(&settings.constraints()).await?;
        if stream.video_tracks().is_empty() {
            return Err(AppError::Acquisition("stream has no video track".to_string()));
        }
        tracing::info!(
            "Opened {:?} recorder on {}",
            settings.variant,
            stream.video_tracks()[0].label()
        );

        let (preview_tx, _) = watch::channel(None);
        let (event_tx, _) = broadcast::channel(100);

        let output = OutputTarget {
            surface: Arc::new(Mutex::new(DrawingSurface::new(0, 0))),
            sink: Arc::new(Mutex::new(RecordingSink::new(
                factory,
                saver,
                settings.filename.clone(),
                settings.mime_type.clone(),
            ))),
            preview_tx: Arc::new(preview_tx),
        };
        let mask = Arc::new(MaskCompositor::new(settings.blur_radius, settings.blur_quality));
        let blur = Arc::new(AtomicBool::new(false));

        let segmenter = match settings.variant {
            CompositorVariant::Segmentation => {
                let output = output.clone();
                let mask = mask.clone();
                let blur = blur.clone();
                let segmenter = SelfieSegmenter::spawn(predictor, settings.model_selection, move |results: SegmentationResults| {
                    // Blur may have been switched off while the model was busy
                    let layer = if blur.load(Ordering::Acquire) {
                        results.mask.as_ref()
                    } else {
                        None
                    };
                    output.render(results.image.sequence, |surface| {
                        mask.composite(surface, &results.image, layer)
                    });
                })?;
                Some(segmenter)
            }
            CompositorVariant::FaceWindow => None,
        };

        let shared = Arc::new(Shared {
            variant: settings.variant,
            stream: Mutex::new(stream),
            output,
            face_window: FaceWindowCompositor::new(
                settings.blur_radius,
                settings.face_window_ratio,
                settings.blur_quality,
            ),
            mask,
            segmenter: Mutex::new(segmenter),
            blur,
            last_segmented: AtomicU64::new(0),
            event_tx,
        });

        let mut recorder = Self {
            shared,
            settings,
            preview: None,
        };
        recorder.show_preview();
        Ok(recorder)
    }

    /// Run one compositing pass on the current frame.
    ///
    /// Returns false when no frame is available yet. Blocks while compositing.
    pub fn run_pass(&self) -> bool {
        self.shared.run_pass()
    }

    // ---- recording ----

    fn capture_spec(&self) -> AppResult<CaptureSpec> {
        let surface_dimensions = self.shared.output.surface.lock().dimensions();
        let (width, height) = match surface_dimensions {
            (0, _) | (_, 0) => self
                .shared
                .stream
                .lock()
                .current_frame()
                .map(|f| f.dimensions())
                .ok_or_else(|| AppError::Capture("no video frame available yet".to_string()))?,
            dimensions => dimensions,
        };

        let audio = match self.settings.variant {
            CompositorVariant::Segmentation => {
                self.shared.stream.lock().audio_tracks().first().map(|t| t.format())
            }
            CompositorVariant::FaceWindow => None,
        };

        Ok(CaptureSpec {
            width,
            height,
            fps: self.settings.fps,
            audio,
            mime_type: self.settings.mime_type.clone(),
        })
    }

    /// Start a recording session.
    ///
    /// Failures are logged and reported as an event; the recorder stays idle.
    pub fn start_recording(&self) -> bool {
        let started = self
            .capture_spec()
            .and_then(|spec| self.shared.output.sink.lock().start(&spec).map(|s| s.id));

        match started {
            Ok(id) => {
                self.shared.emit(RecorderEvent::RecordingStarted(id));
                true
            }
            Err(e) => {
                tracing::error!("Failed to start recording: {}", e);
                self.shared.emit(RecorderEvent::Error(e.to_string()));
                false
            }
        }
    }

    /// Stop the running session and wait for the encoder to flush
    pub async fn stop_recording(&self) -> AppResult<RecordingSession> {
        let sink = self.shared.output.sink.clone();
        let result = tokio::task::spawn_blocking(move || sink.lock().stop())
            .await
            .map_err(|e| AppError::Encoding(format!("Stop task failed: {}", e)))?;

        match &result {
            Ok(session) => self.shared.emit(RecorderEvent::RecordingStopped(session.clone())),
            Err(AppError::NotRecording) => {}
            Err(e) => {
                tracing::error!("Recording did not stop cleanly: {}", e);
                self.shared.emit(RecorderEvent::Error(e.to_string()));
            }
        }
        result
    }

    /// Start or stop recording; returns whether a session is running afterwards
    pub async fn toggle_recording(&self) -> bool {
        if self.is_recording() {
            let _ = self.stop_recording().await;
        } else {
            self.start_recording();
        }
        self.is_recording()
    }

    pub fn is_recording(&self) -> bool {
        self.shared.output.sink.lock().is_recording()
    }

    pub fn can_download(&self) -> bool {
        self.shared.output.sink.lock().can_download()
    }

    pub fn recorded_chunk_count(&self) -> usize {
        self.shared.output.sink.lock().chunk_count()
    }

    /// Save the recorded chunks as one file. `None` when there is nothing to save.
    pub async fn download_recording(&self) -> AppResult<Option<PathBuf>> {
        let sink = self.shared.output.sink.clone();
        let result = tokio::task::spawn_blocking(move || sink.lock().download())
            .await
            .map_err(|e| AppError::Encoding(format!("Download task failed: {}", e)))?;

        match &result {
            Ok(Some(path)) => self.shared.emit(RecorderEvent::Downloaded(path.clone())),
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Download failed: {}", e);
                self.shared.emit(RecorderEvent::Error(e.to_string()));
            }
        }
        result
    }

    // ---- blur ----

    pub fn set_blur(&self, enabled: bool) {
        if self.shared.blur.swap(enabled, Ordering::AcqRel) != enabled {
            tracing::debug!("Blur {}", if enabled { "enabled" } else { "disabled" });
            self.shared.emit(RecorderEvent::BlurChanged(enabled));
        }
    }

    /// Flip blur; returns the new value
    pub fn toggle_blur(&self) -> bool {
        let enabled = !self.is_blurred();
        self.set_blur(enabled);
        enabled
    }

    pub fn is_blurred(&self) -> bool {
        self.shared.blur.load(Ordering::Acquire)
    }

    // ---- preview ----

    /// Start the preview loop if it is not running
    pub fn show_preview(&mut self) {
        if self.preview.is_some() {
            return;
        }
        self.preview = Some(spawn_preview(self.shared.clone(), self.settings.frame_interval()));
        tracing::info!("Preview shown at {}fps", self.settings.fps);
        self.shared.emit(RecorderEvent::PreviewShown);
    }

    /// Stop the preview loop. The stream stays open.
    pub async fn hide_preview(&mut self) {
        let Some(task) = self.preview.take() else {
            return;
        };
        let _ = task.shutdown_tx.send(true);
        if let Err(e) = task.handle.await {
            tracing::warn!("Preview loop ended abnormally: {}", e);
        }
        tracing::info!("Preview hidden");
        self.shared.emit(RecorderEvent::PreviewHidden);
    }

    /// Returns whether the preview is shown afterwards
    pub async fn toggle_preview(&mut self) -> bool {
        if self.is_previewing() {
            self.hide_preview().await;
        } else {
            self.show_preview();
        }
        self.is_previewing()
    }

    pub fn is_previewing(&self) -> bool {
        self.preview.is_some()
    }

    // ---- subscriptions ----

    /// Composited output of the latest pass
    pub fn subscribe_preview(&self) -> watch::Receiver<Option<Frame>> {
        self.shared.output.preview_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Stop everything: preview loop, segmenter, a running session and the
    /// stream's tracks. Recorded chunks stay available for download.
    pub async fn shutdown(&mut self) {
        tracing::info!("Shutting down recorder");
        self.hide_preview().await;

        let segmenter = self.shared.segmenter.lock().take();
        if let Some(mut segmenter) = segmenter {
            let _ = tokio::task::spawn_blocking(move || segmenter.stop()).await;
        }

        if self.is_recording() {
            if let Err(e) = self.stop_recording().await {
                tracing::warn!("Recording stopped with error during shutdown: {}", e);
            }
        }

        self.shared.stream.lock().stop();
    }
}

impl Drop for WebcamRecorder {
    fn drop(&mut self) {
        if let Some(task) = self.preview.take() {
            let _ = task.shutdown_tx.send(true);
            task.handle.abort();
        }
        if let Some(mut segmenter) = self.shared.segmenter.lock().take() {
            segmenter.stop();
        }
        self.shared.stream.lock().stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{AudioFormat, AudioTrack, MediaConstraints, VideoTrack};
    use crate::recorder::sink::tests::{FakeEncoderFactory, MemorySaver};
    use crate::segmentation::{ModelSelection, SegmentationMask};
    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};

    struct FakeVideoTrack {
        frame: Option<Frame>,
        live: Arc<AtomicBool>,
    }

    impl VideoTrack for FakeVideoTrack {
        fn label(&self) -> &str {
            "fake camera"
        }

        fn latest_frame(&self) -> Option<Frame> {
            self.frame.clone()
        }

        fn is_live(&self) -> bool {
            self.live.load(Ordering::Acquire)
        }

        fn stop(&mut self) {
            self.live.store(false, Ordering::Release);
        }
    }

    struct FakeAudioTrack {
        live: Arc<AtomicBool>,
    }

    impl AudioTrack for FakeAudioTrack {
        fn label(&self) -> &str {
            "fake microphone"
        }

        fn format(&self) -> AudioFormat {
            AudioFormat {
                sample_rate: 48000,
                channels: 1,
            }
        }

        fn drain(&self) -> AudioSamples {
            AudioSamples {
                format: self.format(),
                data: vec![0.25; 16],
            }
        }

        fn is_live(&self) -> bool {
            self.live.load(Ordering::Acquire)
        }

        fn stop(&mut self) {
            self.live.store(false, Ordering::Release);
        }
    }

    struct FakeSource {
        frame: Option<Frame>,
        fail: bool,
        live: Arc<AtomicBool>,
    }

    impl FakeSource {
        fn with_frame(frame: Frame) -> Self {
            Self {
                frame: Some(frame),
                fail: false,
                live: Arc::new(AtomicBool::new(true)),
            }
        }
    }

    #[async_trait]
    impl StreamSource for FakeSource {
        async fn acquire(&self, constraints: &MediaConstraints) -> AppResult<MediaStream> {
            if self.fail {
                return Err(AppError::Acquisition("Permission denied".to_string()));
            }
            let video: Vec<Box<dyn VideoTrack>> = vec![Box::new(FakeVideoTrack {
                frame: self.frame.clone(),
                live: self.live.clone(),
            })];
            let audio: Vec<Box<dyn AudioTrack>> = if constraints.audio {
                vec![Box::new(FakeAudioTrack {
                    live: self.live.clone(),
                })]
            } else {
                Vec::new()
            };
            Ok(MediaStream::new(video, audio))
        }
    }

    struct FullForeground;

    impl MaskPredictor for FullForeground {
        fn name(&self) -> &str {
            "full-foreground"
        }

        fn configure(&mut self, _selection: ModelSelection) {}

        fn predict(&mut self, _frame: &Frame) -> AppResult<SegmentationMask> {
            Ok(SegmentationMask::uniform(4, 4, 1.0))
        }
    }

    fn checkerboard(sequence: u64) -> Frame {
        let image = RgbaImage::from_fn(32, 32, |x, y| {
            if ((x / 4) + (y / 4)) % 2 == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        Frame::new(image, sequence)
    }

    async fn open_paused(
        source: &FakeSource,
        settings: RecorderSettings,
        factory: Arc<FakeEncoderFactory>,
        saver: Arc<MemorySaver>,
    ) -> WebcamRecorder {
        let mut recorder = WebcamRecorder::open_with_predictor(source, settings, factory, saver, FullForeground)
            .await
            .unwrap();
        // Drive passes by hand
        recorder.hide_preview().await;
        recorder
    }

    #[tokio::test]
    async fn test_acquisition_failure_surfaces() {
        let source = FakeSource {
            frame: None,
            fail: true,
            live: Arc::new(AtomicBool::new(true)),
        };
        let result = WebcamRecorder::open(
            &source,
            RecorderSettings::default(),
            Arc::new(FakeEncoderFactory::default()),
            Arc::new(MemorySaver::default()),
        )
        .await;
        assert!(matches!(result, Err(AppError::Acquisition(_))));
    }

    #[tokio::test]
    async fn test_open_starts_preview() {
        let source = FakeSource::with_frame(checkerboard(1));
        let mut recorder = WebcamRecorder::open(
            &source,
            RecorderSettings::default(),
            Arc::new(FakeEncoderFactory::default()),
            Arc::new(MemorySaver::default()),
        )
        .await
        .unwrap();
        assert!(recorder.is_previewing());

        let mut preview = recorder.subscribe_preview();
        tokio::time::timeout(Duration::from_secs(5), preview.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(preview.borrow().as_ref().unwrap().dimensions(), (32, 32));

        assert!(!recorder.toggle_preview().await);
        assert!(recorder.toggle_preview().await);
        recorder.shutdown().await;
    }

    #[tokio::test]
    async fn test_pass_without_frame_is_noop() {
        let source = FakeSource {
            frame: None,
            fail: false,
            live: Arc::new(AtomicBool::new(true)),
        };
        let factory = Arc::new(FakeEncoderFactory::default());
        let recorder = open_paused(&source, RecorderSettings::default(), factory, Arc::default()).await;

        assert!(!recorder.run_pass());
        assert!(recorder.subscribe_preview().borrow().is_none());
        // No frame means no size to record at
        assert!(!recorder.start_recording());
        assert!(!recorder.is_recording());
    }

    #[tokio::test]
    async fn test_blur_toggle_changes_next_pass() {
        let source = FakeSource::with_frame(checkerboard(1));
        let recorder = open_paused(
            &source,
            RecorderSettings::default(),
            Arc::default(),
            Arc::default(),
        )
        .await;
        let mut events = recorder.subscribe();
        let preview = recorder.subscribe_preview();
        let raw = checkerboard(1);

        recorder.run_pass();
        assert_eq!(preview.borrow().as_ref().unwrap().image(), raw.image());

        assert!(recorder.toggle_blur());
        recorder.run_pass();
        assert_ne!(preview.borrow().as_ref().unwrap().image(), raw.image());

        recorder.set_blur(false);
        recorder.run_pass();
        assert_eq!(preview.borrow().as_ref().unwrap().image(), raw.image());

        assert!(matches!(events.try_recv(), Ok(RecorderEvent::BlurChanged(true))));
        assert!(matches!(events.try_recv(), Ok(RecorderEvent::BlurChanged(false))));
    }

    #[tokio::test]
    async fn test_record_three_passes_and_download() {
        let source = FakeSource::with_frame(checkerboard(7));
        let saver = Arc::new(MemorySaver::default());
        let recorder = open_paused(
            &source,
            RecorderSettings::default(),
            Arc::default(),
            saver.clone(),
        )
        .await;

        assert!(recorder.start_recording());
        assert!(recorder.is_recording());
        for _ in 0..3 {
            recorder.run_pass();
        }
        assert_eq!(recorder.recorded_chunk_count(), 3);

        let session = recorder.stop_recording().await.unwrap();
        assert_eq!(session.chunk_count, 3);
        assert!(!session.has_audio);
        assert!(recorder.can_download());

        // Passes after stop are not recorded
        recorder.run_pass();
        assert_eq!(recorder.recorded_chunk_count(), 3);

        let path = recorder.download_recording().await.unwrap().unwrap();
        assert!(path.ends_with("webcam-stream-capture.webm"));
        assert_eq!(recorder.recorded_chunk_count(), 0);
        assert!(!recorder.can_download());

        let saved = saver.saved.lock();
        assert_eq!(saved[0].2, 7u64.to_le_bytes().repeat(3));
    }

    #[tokio::test]
    async fn test_failed_start_is_logged_not_raised() {
        let source = FakeSource::with_frame(checkerboard(1));
        let factory = Arc::new(FakeEncoderFactory {
            fail: true,
            ..Default::default()
        });
        let recorder = open_paused(&source, RecorderSettings::default(), factory, Arc::default()).await;
        let mut events = recorder.subscribe();

        assert!(!recorder.start_recording());
        assert!(!recorder.is_recording());
        assert!(matches!(events.try_recv(), Ok(RecorderEvent::Error(_))));
        assert!(matches!(recorder.stop_recording().await, Err(AppError::NotRecording)));
        assert!(!recorder.toggle_recording().await);
    }

    #[tokio::test]
    async fn test_segmentation_records_audio_and_video() {
        let source = FakeSource::with_frame(checkerboard(2));
        let settings = RecorderSettings {
            variant: CompositorVariant::Segmentation,
            ..Default::default()
        };
        let recorder = open_paused(&source, settings, Arc::default(), Arc::default()).await;

        assert!(recorder.toggle_recording().await);
        // Blur off: raw frame drawn directly, audio drained first
        assert!(recorder.run_pass());
        assert_eq!(recorder.recorded_chunk_count(), 2);

        let session = recorder.stop_recording().await.unwrap();
        assert!(session.has_audio);
    }

    #[tokio::test]
    async fn test_audio_kept_while_sink_is_busy() {
        let source = FakeSource::with_frame(checkerboard(4));
        let settings = RecorderSettings {
            variant: CompositorVariant::Segmentation,
            ..Default::default()
        };
        let recorder = open_paused(&source, settings, Arc::default(), Arc::default()).await;
        assert!(recorder.start_recording());

        let shared = recorder.shared.clone();
        let pass = {
            let _busy = recorder.shared.output.sink.lock();
            let pass = std::thread::spawn(move || shared.run_pass());
            std::thread::sleep(Duration::from_millis(50));
            pass
        };
        assert!(pass.join().unwrap());

        // 16 f32 samples and one 8-byte frame
        let session = recorder.stop_recording().await.unwrap();
        assert_eq!(session.chunk_count, 2);
        assert_eq!(session.byte_count, 64 + 8);
    }

    #[tokio::test]
    async fn test_segmentation_result_reaches_preview() {
        let source = FakeSource::with_frame(checkerboard(3));
        let settings = RecorderSettings {
            variant: CompositorVariant::Segmentation,
            capture_audio: false,
            ..Default::default()
        };
        let recorder = open_paused(&source, settings, Arc::default(), Arc::default()).await;
        let mut preview = recorder.subscribe_preview();

        recorder.set_blur(true);
        assert!(recorder.run_pass());
        tokio::time::timeout(Duration::from_secs(5), preview.changed())
            .await
            .unwrap()
            .unwrap();

        // Full foreground mask keeps the frame sharp
        let output = preview.borrow().clone().unwrap();
        assert_eq!(output.sequence, 3);
        assert_eq!(output.image(), checkerboard(3).image());
    }

    #[tokio::test]
    async fn test_shutdown_releases_tracks() {
        let source = FakeSource::with_frame(checkerboard(1));
        let live = source.live.clone();
        let settings = RecorderSettings {
            variant: CompositorVariant::Segmentation,
            ..Default::default()
        };
        let mut recorder = WebcamRecorder::open(
            &source,
            settings,
            Arc::new(FakeEncoderFactory::default()),
            Arc::new(MemorySaver::default()),
        )
        .await
        .unwrap();
        assert!(recorder.start_recording());

        recorder.shutdown().await;

        assert!(!live.load(Ordering::Acquire));
        assert!(!recorder.is_previewing());
        assert!(!recorder.is_recording());
    }

    #[tokio::test]
    async fn test_drop_releases_tracks() {
        let source = FakeSource::with_frame(checkerboard(1));
        let live = source.live.clone();
        let recorder = WebcamRecorder::open(
            &source,
            RecorderSettings::default(),
            Arc::new(FakeEncoderFactory::default()),
            Arc::new(MemorySaver::default()),
        )
        .await
        .unwrap();

        drop(recorder);
        assert!(!live.load(Ordering::Acquire));
    }
}
