//! Live audio service transport
//!
//! One bidirectional streaming connection per voice session:
//! - `setup` is sent first and must be acknowledged with `setupComplete`
//! - microphone audio goes out as `realtimeInput` chunks
//! - synthesized audio comes back inside `serverContent.modelTurn`

pub mod client;
pub mod messages;
pub mod transport;

pub use client::{GeminiLiveTransport, DEFAULT_ENDPOINT};
pub use messages::{ClientMessage, Modality, ServerMessage, SetupMessage};
pub use transport::{ConnectionTasks, LiveChannel, LiveTransport, TransportEvent};
