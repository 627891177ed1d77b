use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;
use crate::live::{Modality, SetupMessage};

/// What the session does when the outbound queue to the service is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrunPolicy {
    /// Drop the frame and count an overrun; capture never waits
    #[default]
    Drop,
    /// Wait for the transport; backlog builds up in the bounded capture
    /// queue, whose overflow is counted as overrun by the backend
    Block,
}

/// Configuration for a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Target model identifier
    pub model: String,

    /// Response modality requested from the service
    pub response_modality: Modality,

    /// Prebuilt voice used for synthesized speech
    pub voice_name: String,

    /// System instruction setting the conversational tone
    pub system_instruction: String,

    /// Sample rate of inbound synthesized audio
    pub output_sample_rate: u32,

    /// Overrun handling between capture and transport
    pub overrun_policy: OverrunPolicy,

    /// Maximum time to wait for the service to acknowledge setup
    pub connect_timeout: Duration,

    /// Close the session when no inbound event arrives for this long
    pub stall_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_app_config(&Config::default())
    }
}

impl SessionConfig {
    pub fn from_app_config(config: &Config) -> Self {
        Self {
            model: config.live.model.clone(),
            response_modality: Modality::Audio,
            voice_name: config.live.voice_name.clone(),
            system_instruction: config.live.system_instruction.clone(),
            output_sample_rate: config.audio.output_sample_rate,
            overrun_policy: config.audio.overrun_policy,
            connect_timeout: Duration::from_secs(config.live.connect_timeout_secs),
            stall_timeout: config.live.stall_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Setup message sent when the connection opens
    pub fn setup_message(&self) -> SetupMessage {
        SetupMessage::new(
            &self.model,
            self.response_modality,
            &self.voice_name,
            Some(&self.system_instruction),
        )
    }
}
