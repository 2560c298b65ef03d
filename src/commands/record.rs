//! `record`: interactive recording session
//!
//! Commands are read line by line from stdin:
//! `r` start/stop recording, `b` toggle blur, `p` toggle preview,
//! `d` download, `s` status, `q` quit.

use crate::capture::DeviceStreamSource;
use crate::config::{CompositorVariant, RecorderSettings};
use crate::recorder::{DownloadDirSaver, FfmpegEncoderFactory, RecorderEvent, WebcamRecorder};
use crate::segmentation::ModelSelection;
use crate::utils::error::AppResult;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, Default, Args)]
pub struct RecordArgs {
    /// JSON settings file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Camera index (from `devices`)
    #[arg(long)]
    pub camera: Option<u32>,

    #[arg(long)]
    pub width: Option<u32>,

    #[arg(long)]
    pub height: Option<u32>,

    #[arg(long)]
    pub fps: Option<u32>,

    #[arg(long, value_enum)]
    pub variant: Option<CompositorVariant>,

    /// Blur strength in pixels
    #[arg(long)]
    pub blur_radius: Option<f32>,

    /// Use the cheaper segmentation model
    #[arg(long)]
    pub lightweight: bool,

    /// Directory with the selfie segmentation ONNX models
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// Do not open the microphone
    #[arg(long)]
    pub no_audio: bool,

    /// Start with blur enabled
    #[arg(long)]
    pub blur: bool,

    /// Directory downloads are saved to
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// FFmpeg executable
    #[arg(long)]
    pub ffmpeg: Option<String>,
}

impl RecordArgs {
    /// Settings from the config file (or defaults) with flags applied
    pub fn settings(&self) -> AppResult<RecorderSettings> {
        let mut settings = match &self.config {
            Some(path) => RecorderSettings::load(path)?,
            None => RecorderSettings::default(),
        };

        if self.camera.is_some() {
            settings.camera_index = self.camera;
        }
        if let Some(width) = self.width {
            settings.width = width;
        }
        if let Some(height) = self.height {
            settings.height = height;
        }
        if let Some(fps) = self.fps {
            settings.fps = fps;
        }
        if let Some(variant) = self.variant {
            settings.variant = variant;
        }
        if let Some(radius) = self.blur_radius {
            settings.blur_radius = radius;
        }
        if self.lightweight {
            settings.model_selection = ModelSelection::Lightweight;
        }
        if let Some(dir) = &self.model_dir {
            settings.model_dir = Some(dir.clone());
        }
        if self.no_audio {
            settings.capture_audio = false;
        }
        if let Some(dir) = &self.output_dir {
            settings.download_dir = dir.clone();
        }
        if let Some(ffmpeg) = &self.ffmpeg {
            settings.ffmpeg_path = ffmpeg.clone();
        }

        settings.validate()?;
        Ok(settings)
    }
}

/// One line typed by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    ToggleRecording,
    ToggleBlur,
    TogglePreview,
    Download,
    Status,
    Help,
    Quit,
}

impl SessionCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "r" | "record" => Some(Self::ToggleRecording),
            "b" | "blur" => Some(Self::ToggleBlur),
            "p" | "preview" => Some(Self::TogglePreview),
            "d" | "download" => Some(Self::Download),
            "s" | "status" => Some(Self::Status),
            "h" | "?" | "help" => Some(Self::Help),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  r  start/stop recording");
    println!("  b  toggle blur");
    println!("  p  show/hide preview");
    println!("  d  download the recording");
    println!("  s  status");
    println!("  q  quit");
}

fn print_status(recorder: &WebcamRecorder) {
    let preview = recorder.subscribe_preview();
    let last_frame = preview
        .borrow()
        .as_ref()
        .map(|f| format!("frame {} ({}x{})", f.sequence, f.width(), f.height()))
        .unwrap_or_else(|| "no frame yet".to_string());

    println!(
        "recording: {}, blur: {}, preview: {}, chunks: {}, last output: {}",
        recorder.is_recording(),
        recorder.is_blurred(),
        recorder.is_previewing(),
        recorder.recorded_chunk_count(),
        last_frame
    );
}

pub async fn run_record(args: RecordArgs) -> AppResult<()> {
    let settings = args.settings()?;
    let factory = Arc::new(FfmpegEncoderFactory::new(settings.ffmpeg_path.clone()));
    let saver = Arc::new(DownloadDirSaver::new(settings.download_dir.clone()));

    let mut recorder = WebcamRecorder::open(&DeviceStreamSource::new(), settings, factory, saver).await?;
    if args.blur {
        recorder.set_blur(true);
    }

    let mut events = recorder.subscribe();
    let event_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RecorderEvent::RecordingStarted(id)) => println!("Recording started ({})", id),
                Ok(RecorderEvent::RecordingStopped(session)) => println!(
                    "Recording stopped: {} chunks, {} bytes, {}ms",
                    session.chunk_count,
                    session.byte_count,
                    session.duration_ms()
                ),
                Ok(RecorderEvent::Downloaded(path)) => println!("Saved {}", path.display()),
                Ok(RecorderEvent::Error(message)) => println!("Error: {}", message),
                Ok(event) => tracing::debug!("Recorder event: {:?}", event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Missed {} recorder events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match SessionCommand::parse(&line) {
            Some(SessionCommand::ToggleRecording) => {
                recorder.toggle_recording().await;
            }
            Some(SessionCommand::ToggleBlur) => {
                let enabled = recorder.toggle_blur();
                println!("Blur {}", if enabled { "on" } else { "off" });
            }
            Some(SessionCommand::TogglePreview) => {
                let shown = recorder.toggle_preview().await;
                println!("Preview {}", if shown { "shown" } else { "hidden" });
            }
            Some(SessionCommand::Download) => {
                if recorder.is_recording() {
                    println!("Stop the recording before downloading");
                    continue;
                }
                match recorder.download_recording().await {
                    Ok(Some(_)) => {}
                    Ok(None) => println!("Nothing recorded yet"),
                    Err(e) => println!("Download failed: {}", e),
                }
            }
            Some(SessionCommand::Status) => print_status(&recorder),
            Some(SessionCommand::Help) => print_help(),
            Some(SessionCommand::Quit) => break,
            None => println!("Unknown command: {} (h for help)", line.trim()),
        }
    }

    recorder.shutdown().await;
    if recorder.can_download() {
        tracing::warn!(
            "Discarding {} recorded chunks that were never downloaded",
            recorder.recorded_chunk_count()
        );
    }
    drop(recorder);
    let _ = event_task.await;

    Ok(())
}
