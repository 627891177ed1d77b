pub mod backend;
mod capture;
pub mod file;
pub mod microphone;
pub mod output;
pub mod pcm;
pub mod resample;

pub use backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource,
    OverrunCounter,
};
pub use file::{AudioFile, FileBackend};
pub use microphone::MicrophoneBackend;
pub use output::{CpalOutput, OutputSink, ScheduledFrame, VirtualOutput};
pub use pcm::{DecodedFrame, EncodedFrame, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
