//! Camera and microphone capture
//!
//! This module provides the stream source used by the recorder: frame and
//! sample types, the track traits, and the device-backed implementation.

pub mod audio;
pub mod device;
pub mod frame;
pub mod traits;
pub mod webcam;

pub use audio::get_audio_input_devices;
pub use device::DeviceStreamSource;
pub use frame::{AudioFormat, AudioSamples, Frame};
pub use traits::{
    AudioDeviceInfo, AudioTrack, CameraInfo, MediaConstraints, MediaStream, Resolution,
    StreamSource, VideoTrack,
};
pub use webcam::get_cameras;
