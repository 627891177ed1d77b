//! Gapless playback of synthesized audio
//!
//! Inbound frames arrive in bursts and with jitter. The scheduler keeps a
//! single "next start" cursor and places each frame either directly after
//! the previous one or, if the device clock has already passed that point,
//! immediately.

mod scheduler;

pub use scheduler::{next_slot, PlaybackScheduler, Placement};
