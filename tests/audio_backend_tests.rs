// Tests for audio backend abstractions
//
// These tests verify capture frame types, backend configuration and the
// backend factory.

use livecord::audio::{
    AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, OverrunCounter,
    INPUT_SAMPLE_RATE,
};
use livecord::BridgeError;

#[test]
fn test_audio_frame_duration() {
    let frame = AudioFrame {
        samples: vec![0.0; 4096],
        sample_rate: 16000,
        timestamp_ms: 512,
    };

    assert_eq!(frame.duration_ms(), 256);
    assert_eq!(frame.timestamp_ms, 512);
}

#[test]
fn test_audio_backend_config_default() {
    let config = AudioBackendConfig::default();

    // The live service expects 16 kHz mono in 4096-sample windows
    assert_eq!(config.target_sample_rate, INPUT_SAMPLE_RATE);
    assert_eq!(config.frame_size, 4096);
    assert!(config.queue_frames > 0);
}

#[test]
fn test_overrun_counter_is_shared_between_clones() {
    let counter = OverrunCounter::new();
    let callback_side = counter.clone();

    assert_eq!(callback_side.record(), 1);
    assert_eq!(callback_side.record(), 2);
    assert_eq!(counter.get(), 2);
}

#[test]
fn test_factory_creates_file_backend() {
    let backend = AudioBackendFactory::create(
        AudioSource::File("tests/fixtures/input.wav".to_string()),
        AudioBackendConfig::default(),
    )
    .expect("file backend");

    assert_eq!(backend.name(), "WAV file replay");
    assert!(!backend.is_capturing(), "Creating a backend must not start it");
}

#[test]
fn test_factory_rejects_empty_file_path() {
    let result = AudioBackendFactory::create(
        AudioSource::File(String::new()),
        AudioBackendConfig::default(),
    );

    assert!(matches!(result, Err(BridgeError::Config(_))));
}

#[test]
fn test_factory_does_not_open_microphone() {
    // Construction is lazy, so this works on machines without an input device
    let backend = AudioBackendFactory::create(AudioSource::Microphone, AudioBackendConfig::default())
        .expect("microphone backend");

    assert!(!backend.is_capturing());
    assert_eq!(backend.overruns(), 0);
}
