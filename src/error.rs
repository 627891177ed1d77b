//! Error types for the voice bridge

use thiserror::Error;

/// Errors surfaced by the capture pipeline, transport and session
#[derive(Error, Debug)]
pub enum BridgeError {
    /// No API key configured for the live service
    #[error("No API key configured (set {0})")]
    MissingCredential(String),

    /// The user or OS refused microphone access
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    /// No usable audio device
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Live connection failed or dropped
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed inbound payload
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Decode(e.to_string())
    }
}

impl From<base64::DecodeError> for BridgeError {
    fn from(e: base64::DecodeError) -> Self {
        BridgeError::Decode(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        BridgeError::Transport(e.to_string())
    }
}

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
