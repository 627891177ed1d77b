// Shared capture path: downmix -> resample -> frame
//
// Used by both the microphone callback and the WAV replay task.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::trace;

use super::backend::{AudioBackendConfig, AudioFrame, OverrunCounter};
use super::resample::{downmix_to_mono, BlockFramer, LinearResampler};

/// Converts raw interleaved device buffers into fixed-size mono frames
pub(crate) struct CapturePipeline {
    channels: u16,
    target_rate: u32,
    resampler: LinearResampler,
    framer: BlockFramer,
    emitted_samples: u64,
}

impl CapturePipeline {
    pub(crate) fn new(device_rate: u32, channels: u16, config: &AudioBackendConfig) -> Self {
        Self {
            channels,
            target_rate: config.target_sample_rate,
            resampler: LinearResampler::new(device_rate, config.target_sample_rate),
            framer: BlockFramer::new(config.frame_size),
            emitted_samples: 0,
        }
    }

    /// Feed one interleaved device buffer, returning completed frames
    pub(crate) fn push(&mut self, interleaved: &[f32]) -> Vec<AudioFrame> {
        let mono = downmix_to_mono(interleaved, self.channels);
        let resampled = self.resampler.process(&mono);

        self.framer
            .push(&resampled)
            .into_iter()
            .map(|samples| {
                let timestamp_ms = self.emitted_samples * 1000 / self.target_rate.max(1) as u64;
                self.emitted_samples += samples.len() as u64;
                AudioFrame {
                    samples,
                    sample_rate: self.target_rate,
                    timestamp_ms,
                }
            })
            .collect()
    }

    /// Push and hand frames to a bounded queue without blocking.
    ///
    /// Returns false once the receiver is gone.
    pub(crate) fn push_nonblocking(
        &mut self,
        interleaved: &[f32],
        frame_tx: &mpsc::Sender<AudioFrame>,
        overruns: &OverrunCounter,
    ) -> bool {
        for frame in self.push(interleaved) {
            match frame_tx.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(frame)) => {
                    let total = overruns.record();
                    trace!(
                        "Capture queue full, dropped frame at {}ms ({} overruns)",
                        frame.timestamp_ms,
                        total
                    );
                }
                Err(TrySendError::Closed(_)) => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(frame_size: usize) -> AudioBackendConfig {
        AudioBackendConfig {
            target_sample_rate: 16000,
            frame_size,
            queue_frames: 1,
        }
    }

    #[test]
    fn test_stereo_48k_becomes_mono_16k_frames() {
        let mut pipeline = CapturePipeline::new(48000, 2, &config(1600));

        // 100ms of stereo at 48kHz
        let frames = pipeline.push(&vec![0.5; 4800 * 2]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples.len(), 1600);
        assert_eq!(frames[0].sample_rate, 16000);
        assert_eq!(frames[0].timestamp_ms, 0);
    }

    #[test]
    fn test_timestamps_advance_by_frame() {
        let mut pipeline = CapturePipeline::new(16000, 1, &config(160));
        let frames = pipeline.push(&vec![0.0; 480]);
        let stamps: Vec<u64> = frames.iter().map(|f| f.timestamp_ms).collect();
        assert_eq!(stamps, vec![0, 10, 20]);
    }

    #[tokio::test]
    async fn test_full_queue_counts_overrun() {
        let mut pipeline = CapturePipeline::new(16000, 1, &config(10));
        let (tx, mut rx) = mpsc::channel(1);
        let overruns = OverrunCounter::new();

        assert!(pipeline.push_nonblocking(&[0.0; 30], &tx, &overruns));
        assert_eq!(overruns.get(), 2);
        assert!(rx.recv().await.is_some());

        drop(rx);
        assert!(!pipeline.push_nonblocking(&[0.0; 10], &tx, &overruns));
    }
}
