use std::sync::Arc;

use tracing::{debug, trace};

use crate::audio::{DecodedFrame, OutputSink};

/// Where a frame landed on the output timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub start_secs: f64,
    pub duration_secs: f64,
    /// Silence between the previous frame's end and this start
    pub gap_secs: f64,
}

/// Pure scheduling rule: returns `(start, new_next_start)`
///
/// `start = max(next_start, now)`; the cursor then moves to the end of the
/// frame. A late frame starts at `now`; it is never dropped.
pub fn next_slot(next_start: f64, now: f64, duration: f64) -> (f64, f64) {
    let start = next_start.max(now);
    (start, start + duration)
}

/// Owns the playback timeline cursor for one session
///
/// The cursor has a single writer: whoever owns the scheduler. The session
/// keeps it inside its inbound dispatch task, so no lock guards it.
pub struct PlaybackScheduler {
    sink: Arc<dyn OutputSink>,
    next_start: f64,
    frames_scheduled: u64,
    seconds_scheduled: f64,
}

impl PlaybackScheduler {
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self {
            sink,
            next_start: 0.0,
            frames_scheduled: 0,
            seconds_scheduled: 0.0,
        }
    }

    /// Place a decoded frame right after the previous one, or now if late
    pub fn schedule(&mut self, frame: &DecodedFrame) -> Placement {
        let now = self.sink.current_time();
        let duration = frame.duration_secs();
        let previous_end = self.next_start;
        let (start, next) = next_slot(previous_end, now, duration);

        self.sink.schedule(start, frame);
        self.next_start = next;
        self.frames_scheduled += 1;
        self.seconds_scheduled += duration;

        let gap_secs = if self.frames_scheduled > 1 {
            start - previous_end
        } else {
            0.0
        };

        if gap_secs > 0.0 {
            debug!(
                "Late frame: playing at {:.3}s with {:.0}ms gap",
                start,
                gap_secs * 1000.0
            );
        } else {
            trace!("Scheduled {:.3}s of audio at {:.3}s", duration, start);
        }

        Placement {
            start_secs: start,
            duration_secs: duration,
            gap_secs,
        }
    }

    /// The listener barged in: drop queued audio and restart the cursor
    ///
    /// The next frame starts at the device clock.
    pub fn interrupt(&mut self) {
        self.sink.flush();
        debug!(
            "Playback interrupted, discarding audio queued up to {:.3}s",
            self.next_start
        );
        self.next_start = 0.0;
    }

    /// End of the last scheduled frame
    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    pub fn frames_scheduled(&self) -> u64 {
        self.frames_scheduled
    }

    pub fn seconds_scheduled(&self) -> f64 {
        self.seconds_scheduled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::VirtualOutput;

    fn frame_of(duration_secs: f64) -> DecodedFrame {
        DecodedFrame {
            samples: vec![0.0; (duration_secs * 24000.0).round() as usize],
            sample_rate: 24000,
        }
    }

    #[test]
    fn test_next_slot_rule() {
        assert_eq!(next_slot(0.0, 2.0, 0.5), (2.0, 2.5));
        assert_eq!(next_slot(3.0, 2.0, 0.5), (3.0, 3.5));
    }

    #[test]
    fn test_burst_is_gapless() {
        let output = Arc::new(VirtualOutput::manual());
        output.set_time(1.0);
        let mut scheduler = PlaybackScheduler::new(output.clone());

        let a = scheduler.schedule(&frame_of(0.5));
        let b = scheduler.schedule(&frame_of(0.3));

        assert!((a.start_secs - 1.0).abs() < 1e-9);
        assert!((b.start_secs - 1.5).abs() < 1e-9);
        assert_eq!(b.gap_secs, 0.0);
        assert!((scheduler.next_start() - 1.8).abs() < 1e-9);
        assert_eq!(output.scheduled().len(), 2);
    }

    #[test]
    fn test_late_frame_plays_immediately_with_gap() {
        let output = Arc::new(VirtualOutput::manual());
        let mut scheduler = PlaybackScheduler::new(output.clone());

        scheduler.schedule(&frame_of(0.5));
        output.set_time(2.0);
        let late = scheduler.schedule(&frame_of(0.25));

        assert!((late.start_secs - 2.0).abs() < 1e-9);
        assert!((late.gap_secs - 1.5).abs() < 1e-9);
        assert_eq!(scheduler.frames_scheduled(), 2);
    }

    #[test]
    fn test_interrupt_restarts_at_device_clock() {
        let output = Arc::new(VirtualOutput::manual());
        let mut scheduler = PlaybackScheduler::new(output.clone());

        scheduler.schedule(&frame_of(0.5));
        scheduler.schedule(&frame_of(0.5));
        output.set_time(0.2);
        scheduler.interrupt();
        let placed = scheduler.schedule(&frame_of(0.25));

        assert_eq!(output.flush_count(), 1);
        assert!((placed.start_secs - 0.2).abs() < 1e-9);
        assert!((scheduler.next_start() - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_never_starts_before_device_clock() {
        let output = Arc::new(VirtualOutput::manual());
        let mut scheduler = PlaybackScheduler::new(output.clone());

        // Irregular arrivals: (clock at arrival, frame duration)
        let arrivals = [
            (0.0, 0.2),
            (0.05, 0.2),
            (0.1, 0.1),
            (0.9, 0.3),
            (0.95, 0.05),
            (2.0, 0.4),
            (2.1, 0.4),
        ];

        let mut previous: Option<Placement> = None;
        for (now, duration) in arrivals {
            output.set_time(now);
            let placed = scheduler.schedule(&frame_of(duration));
            assert!(placed.start_secs >= now);
            if let Some(prev) = previous {
                assert!(placed.start_secs >= prev.start_secs);
                assert!(placed.start_secs + 1e-9 >= prev.start_secs + prev.duration_secs);
            }
            previous = Some(placed);
        }
    }
}
