use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame, OverrunCounter};
use super::capture::CapturePipeline;
use crate::error::{BridgeError, BridgeResult};

/// Replay chunk length
const CHUNK_MS: u64 = 100;

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to read audio samples")?
            }
        };

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels.max(1) as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Capture backend that replays a WAV file as if it were a microphone
pub struct FileBackend {
    path: String,
    config: AudioBackendConfig,
    paced: bool,
    task: Option<JoinHandle<()>>,
    overruns: OverrunCounter,
}

impl FileBackend {
    /// Replay at real-time pace, dropping frames when the consumer lags
    pub fn new(path: impl Into<String>, config: AudioBackendConfig) -> Self {
        Self {
            path: path.into(),
            config,
            paced: true,
            task: None,
            overruns: OverrunCounter::new(),
        }
    }

    /// Replay as fast as the consumer accepts frames
    pub fn unpaced(path: impl Into<String>, config: AudioBackendConfig) -> Self {
        let mut backend = Self::new(path, config);
        backend.paced = false;
        backend
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> BridgeResult<mpsc::Receiver<AudioFrame>> {
        if self.task.is_some() {
            return Err(BridgeError::DeviceUnavailable(format!(
                "{} is already being replayed",
                self.path
            )));
        }

        let file = AudioFile::open(&self.path)
            .map_err(|e| BridgeError::DeviceUnavailable(format!("{:#}", e)))?;

        let (frame_tx, frame_rx) = mpsc::channel(self.config.queue_frames.max(1));
        let mut pipeline = CapturePipeline::new(file.sample_rate, file.channels, &self.config);
        let chunk_len = ((file.sample_rate as u64 * CHUNK_MS / 1000) as usize).max(1)
            * file.channels.max(1) as usize;
        let paced = self.paced;
        let overruns = self.overruns.clone();
        let path = file.path.clone();

        let task = tokio::spawn(async move {
            info!("Replaying {} as capture input", path);
            let mut ticker = tokio::time::interval(Duration::from_millis(CHUNK_MS));

            for chunk in file.samples.chunks(chunk_len) {
                if paced {
                    ticker.tick().await;
                    if !pipeline.push_nonblocking(chunk, &frame_tx, &overruns) {
                        break;
                    }
                } else {
                    for frame in pipeline.push(chunk) {
                        if frame_tx.send(frame).await.is_err() {
                            return;
                        }
                    }
                }
            }

            info!("Finished replaying {}", path);
        });

        self.task = Some(task);
        Ok(frame_rx)
    }

    async fn stop(&mut self) -> BridgeResult<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        task.abort();
        let _ = task.await;

        let overruns = self.overruns.get();
        if overruns > 0 {
            warn!("File replay dropped {} frames", overruns);
        }

        info!("File capture stopped");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.is_some()
    }

    fn overruns(&self) -> u64 {
        self.overruns.get()
    }

    fn name(&self) -> &str {
        "WAV file replay"
    }
}

impl Drop for FileBackend {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_pacing() {
        let paced = FileBackend::new("in.wav", AudioBackendConfig::default());
        let unpaced = FileBackend::unpaced("in.wav", AudioBackendConfig::default());

        assert!(paced.paced);
        assert!(!unpaced.paced);
        assert_eq!(unpaced.path, "in.wav");
        assert!(!unpaced.is_capturing());
        assert_eq!(unpaced.overruns(), 0);
    }
}
