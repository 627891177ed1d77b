use std::sync::Arc;

use super::config::SessionConfig;
use super::credentials::credentials_from_config;
use super::session::SessionParts;
use crate::audio::{
    AudioBackendConfig, AudioBackendFactory, AudioSource, CpalOutput, OutputSink, VirtualOutput,
};
use crate::config::Config;
use crate::error::BridgeResult;
use crate::live::GeminiLiveTransport;

/// Builds the collaborators for each new voice session
///
/// Every connect gets fresh parts; nothing is shared between sessions.
pub trait SessionFactory: Send + Sync {
    fn session_config(&self) -> SessionConfig;

    /// Construct (not open) transport, credentials and devices
    fn parts(&self) -> BridgeResult<SessionParts>;
}

/// Real devices and the Gemini Live WebSocket transport
pub struct DeviceSessionFactory {
    config: Config,
    source: AudioSource,
    muted: bool,
}

impl DeviceSessionFactory {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            source: AudioSource::Microphone,
            muted: false,
        }
    }

    /// Capture from something other than the default microphone
    pub fn with_source(mut self, source: AudioSource) -> Self {
        self.source = source;
        self
    }

    /// Discard synthesized audio instead of opening a speaker
    pub fn muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }
}

impl SessionFactory for DeviceSessionFactory {
    fn session_config(&self) -> SessionConfig {
        SessionConfig::from_app_config(&self.config)
    }

    fn parts(&self) -> BridgeResult<SessionParts> {
        let audio = &self.config.audio;

        let input = AudioBackendFactory::create(
            self.source.clone(),
            AudioBackendConfig {
                target_sample_rate: audio.input_sample_rate,
                frame_size: audio.frame_size,
                queue_frames: audio.capture_queue_frames,
            },
        )?;

        let output: Arc<dyn OutputSink> = if self.muted {
            Arc::new(VirtualOutput::realtime())
        } else {
            Arc::new(CpalOutput::new(audio.output_gain))
        };

        Ok(SessionParts {
            transport: Arc::new(GeminiLiveTransport::new(
                self.config.live.endpoint.clone(),
                audio.outbound_queue_frames,
            )),
            credentials: credentials_from_config(&self.config.live),
            input,
            output,
        })
    }
}
