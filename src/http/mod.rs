//! HTTP API for the chat client UI
//!
//! This module lets the UI drive the voice bridge:
//! - POST /voice/connect - Open the voice session
//! - POST /voice/disconnect - Close it
//! - GET /voice/status - Connection state and statistics
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::{AppState, VoiceSlot};
