pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod live;
pub mod playback;
pub mod session;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSource,
    CpalOutput, DecodedFrame, EncodedFrame, FileBackend, OutputSink, VirtualOutput,
};
pub use config::Config;
pub use error::{BridgeError, BridgeResult};
pub use http::{create_router, AppState};
pub use live::{GeminiLiveTransport, LiveTransport};
pub use playback::PlaybackScheduler;
pub use session::{
    CloseReason, DeviceSessionFactory, OverrunPolicy, SessionConfig, SessionFactory,
    SessionParts, SessionState, SessionStats, VoiceSession,
};
