//! Recording system module
//!
//! - `WebcamRecorder` drives preview, compositing and recording
//! - `RecordingSink` turns composited frames into chunks through a `MediaEncoder`
//! - `FileSaver` writes the concatenated chunks on download

pub mod chunks;
pub mod coordinator;
pub mod encoder;
pub mod saver;
pub mod sink;
pub mod state;

pub use chunks::{ChunkCollector, RecordedChunks};
pub use coordinator::{RecorderEvent, WebcamRecorder};
pub use encoder::{CaptureSpec, EncoderFactory, FfmpegEncoderFactory, FfmpegWebmEncoder, MediaEncoder};
pub use saver::{DownloadDirSaver, FileSaver};
pub use sink::RecordingSink;
pub use state::{RecordingSession, RecordingState};
