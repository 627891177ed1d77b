//! Voice session management
//!
//! This module provides the `VoiceSession` abstraction that manages:
//! - Credential lookup and the connection to the live service
//! - Microphone capture and forwarding of encoded frames
//! - Decoding inbound audio and gapless playback scheduling
//! - A single teardown path for local, remote and error closes
//! - Session statistics and state

mod config;
mod credentials;
mod factory;
mod session;
mod state;
mod stats;

pub use config::{OverrunPolicy, SessionConfig};
pub use credentials::{credentials_from_config, CredentialSource, EnvCredentials, StaticCredentials};
pub use factory::{DeviceSessionFactory, SessionFactory};
pub use session::{DisconnectCallback, SessionParts, VoiceSession};
pub use state::{CloseReason, SessionState};
pub use stats::SessionStats;
