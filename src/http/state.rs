use crate::session::{SessionFactory, SessionStats, VoiceSession};
use std::sync::Arc;
use tokio::sync::RwLock;

/// The single voice connection slot
pub enum VoiceSlot {
    Idle,
    /// connect() in progress
    Connecting,
    Live(Arc<VoiceSession>),
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Builds devices and transport for each connect
    pub factory: Arc<dyn SessionFactory>,
    /// At most one voice session at a time
    pub voice: Arc<RwLock<VoiceSlot>>,
    /// Final statistics of the most recently closed session
    pub last_session: Arc<RwLock<Option<SessionStats>>>,
}

impl AppState {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            voice: Arc::new(RwLock::new(VoiceSlot::Idle)),
            last_session: Arc::new(RwLock::new(None)),
        }
    }

    /// Drop the live session from the slot if it has closed
    pub async fn reap_closed(&self) {
        let closed = {
            let mut slot = self.voice.write().await;
            let finished = matches!(&*slot, VoiceSlot::Live(session) if !session.is_streaming());
            if !finished {
                return;
            }
            match std::mem::replace(&mut *slot, VoiceSlot::Idle) {
                VoiceSlot::Live(session) => Some(session),
                _ => None,
            }
        };

        if let Some(session) = closed {
            let stats = session.stats().await;
            *self.last_session.write().await = Some(stats);
        }
    }
}
