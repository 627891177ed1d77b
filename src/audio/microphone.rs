// Microphone capture backend using cpal
//
// cpal streams are not Send on every platform, so the stream lives on a
// dedicated device thread for its whole life. The thread reports whether the
// device opened, then parks until the backend is stopped.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame, OverrunCounter};
use super::capture::CapturePipeline;
use crate::error::{BridgeError, BridgeResult};

/// Handle to the thread that owns the cpal input stream
struct DeviceThread {
    stop_tx: std::sync::mpsc::Sender<()>,
    thread: std::thread::JoinHandle<()>,
}

/// Default-microphone backend
pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    device: Option<DeviceThread>,
    overruns: OverrunCounter,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            device: None,
            overruns: OverrunCounter::new(),
        }
    }

    /// List available input device names
    pub fn list_devices() -> BridgeResult<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| device_error("Failed to enumerate input devices", e))?
            .filter_map(|d| d.name().ok())
            .collect();
        Ok(devices)
    }
}

/// Classify a platform error as a permission refusal or a missing device
pub(crate) fn device_error(context: &str, err: impl std::fmt::Display) -> BridgeError {
    let message = format!("{}: {}", context, err);
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        BridgeError::PermissionDenied(message)
    } else {
        BridgeError::DeviceUnavailable(message)
    }
}

fn open_input_stream(
    config: &AudioBackendConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
    overruns: OverrunCounter,
) -> BridgeResult<(cpal::Stream, String)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| BridgeError::DeviceUnavailable("No input device available".to_string()))?;
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let supported = device
        .default_input_config()
        .map_err(|e| device_error("Failed to query input config", e))?;
    let sample_format = supported.sample_format();
    let stream_config: cpal::StreamConfig = supported.into();

    info!(
        "Opening microphone '{}' ({}Hz, {} channels, {:?})",
        name, stream_config.sample_rate.0, stream_config.channels, sample_format
    );

    let mut pipeline =
        CapturePipeline::new(stream_config.sample_rate.0, stream_config.channels, config);
    let err_fn = |err: cpal::StreamError| error!("Microphone stream error: {}", err);

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                pipeline.push_nonblocking(data, &frame_tx, &overruns);
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                pipeline.push_nonblocking(&samples, &frame_tx, &overruns);
            },
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            &stream_config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data
                    .iter()
                    .map(|&s| (s as f32 - 32768.0) / 32768.0)
                    .collect();
                pipeline.push_nonblocking(&samples, &frame_tx, &overruns);
            },
            err_fn,
            None,
        ),
        other => {
            return Err(BridgeError::DeviceUnavailable(format!(
                "Unsupported input sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| device_error("Failed to build input stream", e))?;

    stream
        .play()
        .map_err(|e| device_error("Failed to start input stream", e))?;

    Ok((stream, name))
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> BridgeResult<mpsc::Receiver<AudioFrame>> {
        if self.device.is_some() {
            return Err(BridgeError::DeviceUnavailable(
                "Microphone is already capturing".to_string(),
            ));
        }

        let (frame_tx, frame_rx) = mpsc::channel(self.config.queue_frames.max(1));
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let config = self.config.clone();
        let overruns = self.overruns.clone();

        let thread = std::thread::Builder::new()
            .name("livecord-mic".to_string())
            .spawn(move || match open_input_stream(&config, frame_tx, overruns) {
                Ok((stream, name)) => {
                    let _ = ready_tx.send(Ok(name));
                    // Returns on stop() or when the backend is dropped
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })?;

        let name = match ready_rx.await {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(BridgeError::DeviceUnavailable(
                    "Microphone thread exited before opening the device".to_string(),
                ));
            }
        };

        self.device = Some(DeviceThread { stop_tx, thread });
        info!("Microphone capture started on '{}'", name);

        Ok(frame_rx)
    }

    async fn stop(&mut self) -> BridgeResult<()> {
        let Some(device) = self.device.take() else {
            return Ok(());
        };

        info!("Stopping microphone capture");
        let _ = device.stop_tx.send(());

        let joined = tokio::task::spawn_blocking(move || device.thread.join()).await;
        if !matches!(joined, Ok(Ok(()))) {
            warn!("Microphone thread did not shut down cleanly");
        }

        let overruns = self.overruns.get();
        if overruns > 0 {
            warn!("Microphone dropped {} frames while capturing", overruns);
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.device.is_some()
    }

    fn overruns(&self) -> u64 {
        self.overruns.get()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

impl Drop for MicrophoneBackend {
    fn drop(&mut self) {
        if let Some(device) = self.device.take() {
            let _ = device.stop_tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_errors_are_classified() {
        let err = device_error("open", "Access denied by user");
        assert!(matches!(err, BridgeError::PermissionDenied(_)));

        let err = device_error("open", "The requested device is no longer available");
        assert!(matches!(err, BridgeError::DeviceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let mut backend = MicrophoneBackend::new(AudioBackendConfig::default());
        assert!(!backend.is_capturing());
        backend.stop().await.unwrap();
        backend.stop().await.unwrap();
        assert!(!backend.is_capturing());
    }
}
