use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a voice session
///
/// `Connecting → Open → Streaming → Closed`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Credentials checked, connection requested
    Connecting,
    /// Service acknowledged setup; capture not yet running
    Open,
    /// Audio flowing both ways
    Streaming,
    /// Torn down
    Closed,
}

impl SessionState {
    fn as_u8(self) -> u8 {
        match self {
            SessionState::Connecting => 0,
            SessionState::Open => 1,
            SessionState::Streaming => 2,
            SessionState::Closed => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Connecting,
            1 => SessionState::Open,
            2 => SessionState::Streaming,
            _ => SessionState::Closed,
        }
    }
}

/// Atomically readable session state
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub(crate) fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Move forward; never leaves `Closed`
    pub(crate) fn advance(&self, next: SessionState) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < next.as_u8()).then_some(next.as_u8())
            })
            .is_ok()
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum CloseReason {
    /// Caller invoked disconnect
    Local,
    /// Service closed the connection
    Remote(Option<String>),
    /// Connection failed mid-session
    TransportError(String),
    /// No inbound traffic within the stall timeout
    Stalled,
}
