//! Microphone capture using cpal
//!
//! cpal streams are not `Send`, so the input stream is built and kept alive on
//! its own thread. Samples are converted to interleaved f32 and buffered until
//! the recorder drains them.

use super::frame::{AudioFormat, AudioSamples};
use super::traits::{AudioDeviceInfo, AudioTrack};
use crate::utils::error::{AppError, AppResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

/// Upper bound on buffered samples (~10s of 48kHz stereo) before old samples are dropped
const MAX_BUFFERED_SAMPLES: usize = 48_000 * 2 * 10;

/// Get list of available audio input devices (microphones)
pub fn get_audio_input_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host
        .default_input_device()
        .and_then(|d| d.name().ok());

    match host.input_devices() {
        Ok(devices) => devices
            .filter_map(|device| device.name().ok())
            .map(|name| AudioDeviceInfo {
                id: name.clone(),
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                is_input: true,
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate audio input devices: {}", e);
            Vec::new()
        }
    }
}

fn default_input_device() -> Option<Device> {
    cpal::default_host().default_input_device()
}

type SampleBuffer = Arc<Mutex<VecDeque<f32>>>;

fn push_samples(buffer: &SampleBuffer, samples: impl Iterator<Item = f32>) {
    let mut guard = buffer.lock();
    guard.extend(samples);
    let overflow = guard.len().saturating_sub(MAX_BUFFERED_SAMPLES);
    if overflow > 0 {
        guard.drain(..overflow);
    }
}

/// Audio track backed by the default microphone
pub struct MicrophoneTrack {
    label: String,
    format: AudioFormat,
    buffer: SampleBuffer,
    running: Arc<AtomicBool>,
    stream_thread: Option<std::thread::JoinHandle<()>>,
}

impl MicrophoneTrack {
    /// Open the default input device and start buffering samples
    pub fn open() -> AppResult<Self> {
        let device = default_input_device()
            .ok_or_else(|| AppError::Acquisition("No microphone found".to_string()))?;
        let label = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let config = device.default_input_config().map_err(|e| {
            AppError::Acquisition(format!("Failed to get microphone config: {}", e))
        })?;
        let sample_format = config.sample_format();
        let format = AudioFormat {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        };

        let buffer: SampleBuffer = Arc::new(Mutex::new(VecDeque::new()));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), String>>(1);

        let stream_config = StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let buffer_clone = buffer.clone();
        let running_clone = running.clone();

        let handle = std::thread::Builder::new()
            .name("microphone-capture".to_string())
            .spawn(move || {
                let device = match default_input_device() {
                    Some(d) => d,
                    None => {
                        let _ = ready_tx.send(Err("Microphone disappeared".to_string()));
                        return;
                    }
                };
                let err_fn = |err: cpal::StreamError| tracing::error!("Microphone stream error: {}", err);
                let stream = match sample_format {
                    SampleFormat::F32 => {
                        let buffer = buffer_clone.clone();
                        device.build_input_stream(
                            &stream_config,
                            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                                push_samples(&buffer, data.iter().copied());
                            },
                            err_fn,
                            None,
                        )
                    }
                    SampleFormat::I16 => {
                        let buffer = buffer_clone.clone();
                        device.build_input_stream(
                            &stream_config,
                            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                                push_samples(&buffer, data.iter().map(|&s| s as f32 / i16::MAX as f32));
                            },
                            err_fn,
                            None,
                        )
                    }
                    SampleFormat::U16 => {
                        let buffer = buffer_clone.clone();
                        device.build_input_stream(
                            &stream_config,
                            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                                push_samples(&buffer, data.iter().map(|&s| (s as f32 - 32768.0) / 32768.0));
                            },
                            err_fn,
                            None,
                        )
                    }
                    other => {
                        let _ = ready_tx.send(Err(format!("Unsupported sample format: {:?}", other)));
                        return;
                    }
                };

                let stream = match stream {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("Failed to build microphone stream: {}", e)));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(format!("Failed to start microphone stream: {}", e)));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while running_clone.load(Ordering::SeqCst) {
                    std::thread::sleep(std::time::Duration::from_millis(50));
                }

                drop(stream);
                tracing::info!("Microphone stream stopped");
            })
            .map_err(|e| AppError::Acquisition(format!("Failed to spawn microphone thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(message)) => {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                return Err(AppError::Acquisition(message));
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                return Err(AppError::Acquisition(
                    "Microphone thread exited before reporting status".to_string(),
                ));
            }
        }

        tracing::info!(
            "Microphone opened: {} ({}Hz, {}ch)",
            label,
            format.sample_rate,
            format.channels
        );

        Ok(Self {
            label,
            format,
            buffer,
            running,
            stream_thread: Some(handle),
        })
    }
}

impl AudioTrack for MicrophoneTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn drain(&self) -> AudioSamples {
        let data: Vec<f32> = self.buffer.lock().drain(..).collect();
        AudioSamples {
            format: self.format,
            data,
        }
    }

    fn is_live(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.stream_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MicrophoneTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_samples_drops_oldest_on_overflow() {
        let buffer: SampleBuffer = Arc::new(Mutex::new(VecDeque::new()));
        push_samples(&buffer, std::iter::repeat(0.0).take(MAX_BUFFERED_SAMPLES));
        push_samples(&buffer, [1.0, 2.0].into_iter());

        let guard = buffer.lock();
        assert_eq!(guard.len(), MAX_BUFFERED_SAMPLES);
        assert_eq!(guard.back().copied(), Some(2.0));
    }
}
