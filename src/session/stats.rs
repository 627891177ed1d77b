use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use super::state::{CloseReason, SessionState};

/// Statistics about a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Session identifier
    pub session_id: String,

    /// Current lifecycle state
    pub state: SessionState,

    /// When connect() was called
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Audio frames handed to the transport
    pub frames_sent: u64,

    /// Inbound audio frames decoded and scheduled
    pub frames_received: u64,

    /// Captured frames dropped by the capture queue or the overrun policy
    pub frames_dropped: u64,

    /// Inbound payloads that failed to decode
    pub decode_errors: u64,

    /// Seconds of synthesized audio placed on the playback timeline
    pub seconds_scheduled: f64,

    /// Why the session ended, once closed
    pub close_reason: Option<CloseReason>,
}

/// Live counters updated by the session tasks
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) frames_sent: AtomicU64,
    pub(crate) frames_received: AtomicU64,
    pub(crate) frames_dropped: AtomicU64,
    pub(crate) decode_errors: AtomicU64,
    /// Microseconds, to keep the counter atomic
    pub(crate) micros_scheduled: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn add_scheduled(&self, secs: f64) {
        self.micros_scheduled
            .fetch_add((secs * 1_000_000.0).round() as u64, Ordering::Relaxed);
    }

    pub(crate) fn load(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub(crate) fn seconds_scheduled(&self) -> f64 {
        self.micros_scheduled.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }
}
