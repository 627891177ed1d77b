use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::{BridgeError, BridgeResult};

/// One captured window of mono samples, already at the target rate
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Normalized samples in [-1.0, 1.0] (not yet clamped)
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Configuration for a capture backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Target sample rate (will resample if needed)
    pub target_sample_rate: u32,
    /// Samples per emitted frame
    pub frame_size: usize,
    /// Frames buffered between the device callback and the consumer
    pub queue_frames: usize,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // Live API input rate
            frame_size: 4096,          // ~256ms at 16kHz
            queue_frames: 8,
        }
    }
}

/// Frames dropped because the consumer fell behind
#[derive(Debug, Clone, Default)]
pub struct OverrunCounter(Arc<AtomicU64>);

impl OverrunCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal default input device
/// - File: replays a WAV file at real-time pace (headless runs, tests)
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames. Fails with
    /// `PermissionDenied` or `DeviceUnavailable` when the device cannot be
    /// opened.
    async fn start(&mut self) -> BridgeResult<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio and release the device. Idempotent.
    async fn stop(&mut self) -> BridgeResult<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Frames dropped because the receiver was full
    fn overruns(&self) -> u64;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create a capture backend for the given source
    pub fn create(
        source: AudioSource,
        config: AudioBackendConfig,
    ) -> BridgeResult<Box<dyn AudioBackend>> {
        match source {
            AudioSource::Microphone => {
                let backend = super::microphone::MicrophoneBackend::new(config);
                Ok(Box::new(backend))
            }

            AudioSource::File(path) => {
                if path.is_empty() {
                    return Err(BridgeError::Config("Empty input file path".to_string()));
                }
                let backend = super::file::FileBackend::new(path, config);
                Ok(Box::new(backend))
            }
        }
    }
}

/// Audio source type
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Default microphone input
    Microphone,
    /// WAV file input (for testing/headless runs)
    File(String),
}
