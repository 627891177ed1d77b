// Integration tests for inbound audio decoding and gapless playback
//
// These tests feed base64 PCM payloads, as the live service sends them,
// through decoding and the playback scheduler onto a virtual output.

use anyhow::Result;
use livecord::audio::pcm::{decode_frame, encode_frame, float_to_i16, i16_to_float};
use livecord::audio::{OutputSink, VirtualOutput, OUTPUT_SAMPLE_RATE};
use livecord::playback::PlaybackScheduler;
use std::sync::Arc;

fn payload(seconds: f64) -> String {
    let samples = vec![0.2; (OUTPUT_SAMPLE_RATE as f64 * seconds) as usize];
    encode_frame(&samples, OUTPUT_SAMPLE_RATE).data
}

#[test]
fn test_pcm_conversion_is_asymmetric() {
    assert_eq!(float_to_i16(1.0), 32767);
    assert_eq!(float_to_i16(-1.0), -32768);
    assert_eq!(i16_to_float(-32768), -1.0);
    assert!(i16_to_float(32767) < 1.0);
}

#[test]
fn test_streamed_turn_plays_without_gaps() -> Result<()> {
    let output = Arc::new(VirtualOutput::manual());
    output.set_time(0.25);
    let mut scheduler = PlaybackScheduler::new(output.clone());

    // Uneven frame sizes, as a model turn streams them
    for seconds in [0.2, 0.04, 0.5, 0.1] {
        let frame = decode_frame(&payload(seconds), OUTPUT_SAMPLE_RATE)?;
        scheduler.schedule(&frame);
        output.advance(0.01);
    }

    let scheduled = output.scheduled();
    assert_eq!(scheduled.len(), 4);
    assert_eq!(scheduled[0].start_secs, 0.25);
    for pair in scheduled.windows(2) {
        let end = pair[0].start_secs + pair[0].duration_secs;
        assert!((pair[1].start_secs - end).abs() < 1e-9, "Frames must abut");
    }
    assert!((scheduler.seconds_scheduled() - 0.84).abs() < 1e-9);

    Ok(())
}

#[test]
fn test_frames_never_start_before_the_clock() -> Result<()> {
    let output = Arc::new(VirtualOutput::manual());
    let mut scheduler = PlaybackScheduler::new(output.clone());

    // Clock jumps past the queued audio between arrivals
    for (i, jump) in [0.0, 0.05, 1.0, 0.0, 3.0].into_iter().enumerate() {
        output.advance(jump);
        let now = output.current_time();
        let frame = decode_frame(&payload(0.1), OUTPUT_SAMPLE_RATE)?;
        let placement = scheduler.schedule(&frame);
        assert!(placement.start_secs >= now, "Frame {} placed in the past", i);
    }

    let scheduled = output.scheduled();
    assert!((scheduled[1].start_secs - 0.1).abs() < 1e-9);
    assert!((scheduled[2].start_secs - 1.05).abs() < 1e-9);
    assert!((scheduled[3].start_secs - 1.15).abs() < 1e-9);
    assert!((scheduled[4].start_secs - 4.05).abs() < 1e-9);

    Ok(())
}

#[test]
fn test_undecodable_payload_leaves_timeline_untouched() {
    let output = Arc::new(VirtualOutput::manual());
    let scheduler = PlaybackScheduler::new(output.clone());

    assert!(decode_frame("not-base64!", OUTPUT_SAMPLE_RATE).is_err());
    assert!(decode_frame("AAEC", OUTPUT_SAMPLE_RATE).is_err());

    assert_eq!(scheduler.frames_scheduled(), 0);
    assert!(output.scheduled().is_empty());
}
