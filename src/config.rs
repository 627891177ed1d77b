use anyhow::{Context, Result};
use serde::Deserialize;

use crate::live::DEFAULT_ENDPOINT;
use crate::session::OverrunPolicy;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub live: LiveConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "livecord".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 7878,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub endpoint: String,
    pub model: String,
    pub voice_name: String,
    pub system_instruction: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Inline API key; takes precedence over `api_key_env`
    pub api_key: Option<String>,
    pub connect_timeout_secs: u64,
    /// Close the session when nothing arrives for this long (off when unset)
    pub stall_timeout_secs: Option<u64>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            voice_name: "Kore".to_string(),
            system_instruction:
                "You are chatting in a Discord voice channel. Be casual, brief, and conversational."
                    .to_string(),
            api_key_env: "API_KEY".to_string(),
            api_key: None,
            connect_timeout_secs: 10,
            stall_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    /// Samples per outbound frame
    pub frame_size: usize,
    /// Frames buffered between the microphone callback and the session
    pub capture_queue_frames: usize,
    /// Frames buffered between the session and the socket writer
    pub outbound_queue_frames: usize,
    pub overrun_policy: OverrunPolicy,
    pub output_gain: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            frame_size: 4096,
            capture_queue_frames: 8,
            outbound_queue_frames: 16,
            overrun_policy: OverrunPolicy::Drop,
            output_gain: 1.0,
        }
    }
}

impl Config {
    /// Load `path` (any format the config crate understands, extension
    /// optional) and apply `LIVECORD__SECTION__KEY` environment overrides.
    /// A missing file falls back to defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("LIVECORD")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let config: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.audio.frame_size == 0 {
            anyhow::bail!("audio.frame_size must be greater than zero");
        }
        if self.audio.input_sample_rate == 0 || self.audio.output_sample_rate == 0 {
            anyhow::bail!("audio sample rates must be greater than zero");
        }
        if self.live.model.is_empty() {
            anyhow::bail!("live.model must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_live_api() {
        let config = Config::default();
        assert_eq!(config.audio.input_sample_rate, 16000);
        assert_eq!(config.audio.output_sample_rate, 24000);
        assert_eq!(config.audio.frame_size, 4096);
        assert_eq!(config.live.voice_name, "Kore");
        assert_eq!(config.live.api_key_env, "API_KEY");
        assert_eq!(config.audio.overrun_policy, OverrunPolicy::Drop);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load("/nonexistent/livecord-config").unwrap();
        assert_eq!(config.service.http.port, 7878);
    }

    #[test]
    fn test_load_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("livecord.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[live]
voice_name = "Puck"
stall_timeout_secs = 30

[audio]
frame_size = 2048
overrun_policy = "block"
"#
        )
        .unwrap();

        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.live.voice_name, "Puck");
        assert_eq!(config.live.stall_timeout_secs, Some(30));
        assert_eq!(config.audio.frame_size, 2048);
        assert_eq!(config.audio.overrun_policy, OverrunPolicy::Block);
        // Untouched keys keep their defaults
        assert_eq!(config.live.model, "gemini-2.5-flash-native-audio-preview-12-2025");
    }

    #[test]
    fn test_zero_frame_size_is_rejected() {
        let mut config = Config::default();
        config.audio.frame_size = 0;
        assert!(config.validate().is_err());
    }
}
