//! Chunked WebM encoding through FFmpeg
//!
//! Composited frames go to FFmpeg as raw RGBA on stdin. Audio, when present,
//! is streamed as interleaved f32le over a loopback TCP connection. FFmpeg
//! writes WebM to stdout, which a reader thread splits into chunks.

use super::chunks::ChunkCollector;
use crate::capture::{AudioFormat, AudioSamples, Frame};
use crate::config::RECORDING_MIME_TYPE;
use crate::utils::error::{AppError, AppResult};
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Size of one stdout read, and so the upper bound of one chunk
const CHUNK_READ_SIZE: usize = 64 * 1024;

/// How long FFmpeg gets to connect to the audio socket
const AUDIO_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// What a session records
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Audio layout, or None for a video-only recording
    pub audio: Option<AudioFormat>,
    pub mime_type: String,
}

/// One running encode. Chunks are delivered to the collector it was created with.
pub trait MediaEncoder: Send {
    fn encode_video(&mut self, frame: &Frame) -> AppResult<()>;

    fn encode_audio(&mut self, samples: &AudioSamples) -> AppResult<()>;

    /// Flush and wait until every trailing chunk has been delivered
    fn finish(self: Box<Self>) -> AppResult<()>;
}

/// Creates an encoder per recording session
pub trait EncoderFactory: Send + Sync {
    fn create(&self, spec: &CaptureSpec, chunks: ChunkCollector) -> AppResult<Box<dyn MediaEncoder>>;
}

/// Spawns `FfmpegWebmEncoder`s using the given FFmpeg executable
pub struct FfmpegEncoderFactory {
    ffmpeg_path: String,
}

impl FfmpegEncoderFactory {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn create(&self, spec: &CaptureSpec, chunks: ChunkCollector) -> AppResult<Box<dyn MediaEncoder>> {
        let encoder = FfmpegWebmEncoder::spawn(&self.ffmpeg_path, spec, chunks)?;
        Ok(Box::new(encoder))
    }
}

pub struct FfmpegWebmEncoder {
    process: Option<Child>,
    stdin: Option<ChildStdin>,
    audio: Option<TcpStream>,
    reader: Option<JoinHandle<u64>>,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl FfmpegWebmEncoder {
    pub fn spawn(ffmpeg_path: &str, spec: &CaptureSpec, chunks: ChunkCollector) -> AppResult<Self> {
        if spec.mime_type != RECORDING_MIME_TYPE {
            return Err(AppError::Config(format!(
                "unsupported recording type {}, only {} is available",
                spec.mime_type, RECORDING_MIME_TYPE
            )));
        }
        if spec.width == 0 || spec.height == 0 {
            return Err(AppError::Encoding(format!(
                "cannot record a {}x{} surface",
                spec.width, spec.height
            )));
        }

        let listener = match spec.audio {
            Some(_) => Some(TcpListener::bind(("127.0.0.1", 0))?),
            None => None,
        };

        let audio_port = match &listener {
            Some(listener) => Some(listener.local_addr()?.port()),
            None => None,
        };
        let args = build_args(spec, audio_port);

        tracing::info!("Starting FFmpeg recorder: {} {:?}", ffmpeg_path, args);

        let mut process = Command::new(ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AppError::Encoding(format!("Failed to start FFmpeg: {}", e)))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| AppError::Encoding("Failed to capture FFmpeg stdin".to_string()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| AppError::Encoding("Failed to capture FFmpeg stdout".to_string()))?;

        let reader = std::thread::Builder::new()
            .name("ffmpeg-chunks".to_string())
            .spawn(move || read_chunks(stdout, chunks))
            .map_err(|e| AppError::Encoding(format!("Failed to spawn chunk reader: {}", e)))?;

        let mut encoder = Self {
            process: Some(process),
            stdin: Some(stdin),
            audio: None,
            reader: Some(reader),
            width: spec.width,
            height: spec.height,
            frame_count: 0,
        };

        if let Some(listener) = listener {
            // On failure `encoder` drops here, which kills FFmpeg
            encoder.audio = Some(encoder.accept_audio(&listener)?);
        }

        Ok(encoder)
    }

    fn accept_audio(&mut self, listener: &TcpListener) -> AppResult<TcpStream> {
        listener.set_nonblocking(true)?;
        let deadline = Instant::now() + AUDIO_CONNECT_TIMEOUT;

        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    stream.set_nonblocking(false)?;
                    stream.set_nodelay(true)?;
                    tracing::debug!("FFmpeg audio input connected from {}", addr);
                    return Ok(stream);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if let Some(process) = self.process.as_mut() {
                        if let Some(status) = process.try_wait()? {
                            return Err(AppError::Encoding(format!(
                                "FFmpeg exited before opening audio input: {}",
                                status
                            )));
                        }
                    }
                    if Instant::now() >= deadline {
                        return Err(AppError::Encoding(
                            "Timed out waiting for FFmpeg to open audio input".to_string(),
                        ));
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

}

/// Build the FFmpeg command line for a session.
///
/// With audio, the loopback socket on `audio_port` is input 0 and stdin is
/// input 1; otherwise stdin is the only input.
fn build_args(spec: &CaptureSpec, audio_port: Option<u16>) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];
    let audio = spec.audio.zip(audio_port);

    // Audio is input 0 so FFmpeg connects before it starts probing stdin
    if let Some((format, port)) = audio {
        args.extend([
            "-thread_queue_size".to_string(),
            "512".to_string(),
            "-use_wallclock_as_timestamps".to_string(),
            "1".to_string(),
            "-f".to_string(),
            "f32le".to_string(),
            "-ar".to_string(),
            format.sample_rate.to_string(),
            "-ac".to_string(),
            format.channels.to_string(),
            "-i".to_string(),
            format!("tcp://127.0.0.1:{}", port),
        ]);
    }

    args.extend([
        "-thread_queue_size".to_string(),
        "512".to_string(),
        "-use_wallclock_as_timestamps".to_string(),
        "1".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgba".to_string(),
        "-s".to_string(),
        format!("{}x{}", spec.width, spec.height),
        "-i".to_string(),
        "pipe:0".to_string(),
    ]);

    if audio.is_some() {
        args.extend(["-map".to_string(), "1:v".to_string()]);
        args.extend(["-map".to_string(), "0:a".to_string()]);
    }

    args.extend([
        "-vsync".to_string(),
        "cfr".to_string(),
        "-r".to_string(),
        spec.fps.to_string(),
        "-c:v".to_string(),
        "libvpx".to_string(),
        "-deadline".to_string(),
        "realtime".to_string(),
        "-cpu-used".to_string(),
        "8".to_string(),
        "-b:v".to_string(),
        "2M".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
    ]);

    if audio.is_some() {
        // Opus only takes a few fixed rates
        args.extend([
            "-c:a".to_string(),
            "libopus".to_string(),
            "-ar".to_string(),
            "48000".to_string(),
            "-b:a".to_string(),
            "128k".to_string(),
        ]);
    }

    args.extend([
        "-flush_packets".to_string(),
        "1".to_string(),
        "-f".to_string(),
        "webm".to_string(),
        "pipe:1".to_string(),
    ]);

    args
}

fn read_chunks(mut stdout: impl Read, chunks: ChunkCollector) -> u64 {
    let mut total = 0u64;
    let mut buffer = vec![0u8; CHUNK_READ_SIZE];
    loop {
        match stdout.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                total += n as u64;
                chunks.on_data_available(buffer[..n].to_vec());
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::error!("Failed to read FFmpeg output: {}", e);
                break;
            }
        }
    }
    tracing::debug!("Chunk reader finished after {} bytes", total);
    total
}

impl MediaEncoder for FfmpegWebmEncoder {
    fn encode_video(&mut self, frame: &Frame) -> AppResult<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(AppError::InvalidFrame(format!(
                "frame is {}x{} but the recording is {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| AppError::Encoding("encoder already finished".to_string()))?;
        stdin
            .write_all(frame.as_bytes())
            .map_err(|e| AppError::Encoding(format!("Failed to write frame: {}", e)))?;
        self.frame_count += 1;
        Ok(())
    }

    fn encode_audio(&mut self, samples: &AudioSamples) -> AppResult<()> {
        let Some(audio) = self.audio.as_mut() else {
            return Ok(());
        };
        if samples.is_empty() {
            return Ok(());
        }
        audio
            .write_all(&samples.to_le_bytes())
            .map_err(|e| AppError::Encoding(format!("Failed to write audio: {}", e)))
    }

    fn finish(mut self: Box<Self>) -> AppResult<()> {
        // Closing the inputs signals EOF to FFmpeg
        drop(self.stdin.take());
        if let Some(audio) = self.audio.take() {
            let _ = audio.shutdown(Shutdown::Write);
        }

        let process = self
            .process
            .take()
            .ok_or_else(|| AppError::Encoding("encoder already finished".to_string()))?;
        let output = process
            .wait_with_output()
            .map_err(|e| AppError::Encoding(format!("Failed to wait for FFmpeg: {}", e)))?;

        let bytes = match self.reader.take() {
            Some(handle) => handle.join().unwrap_or(0),
            None => 0,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Encoding(format!("FFmpeg exited with error: {}", stderr.trim())));
        }

        tracing::info!(
            "FFmpeg recorder finished: {} frames in, {} bytes out",
            self.frame_count,
            bytes
        );
        Ok(())
    }
}

impl Drop for FfmpegWebmEncoder {
    fn drop(&mut self) {
        if let Some(mut process) = self.process.take() {
            let _ = process.kill();
            let _ = process.wait();
        }
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }
}
