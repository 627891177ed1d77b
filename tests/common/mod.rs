// In-memory stand-ins for the live service and the microphone
//
// The fake transport hands the "server" ends of the connection to the test,
// and the fake backend lets the test push capture frames by hand.

#![allow(dead_code)]

use livecord::audio::pcm::encode_frame;
use livecord::audio::{AudioBackend, AudioFrame, VirtualOutput};
use livecord::error::{BridgeError, BridgeResult};
use livecord::live::messages::{ClientMessage, SetupMessage};
use livecord::live::{ConnectionTasks, LiveChannel, LiveTransport, ServerMessage, TransportEvent};
use livecord::session::{SessionParts, SessionStats, StaticCredentials, VoiceSession};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How the fake service answers `open`
#[derive(Clone)]
pub enum Answer {
    Accept,
    Reject(String),
    /// Never acknowledge setup
    Hang,
}

/// The service side of an accepted connection
pub struct FakeServer {
    pub api_key: String,
    pub setup: SetupMessage,
    pub events: mpsc::Sender<TransportEvent>,
    pub outbound: mpsc::Receiver<ClientMessage>,
}

pub struct FakeTransport {
    answer: Answer,
    outbound_capacity: usize,
    opened: AtomicBool,
    server: Mutex<Option<FakeServer>>,
}

impl FakeTransport {
    pub fn new(answer: Answer) -> Arc<Self> {
        Self::with_capacity(answer, 16)
    }

    pub fn with_capacity(answer: Answer, outbound_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            answer,
            outbound_capacity,
            opened: AtomicBool::new(false),
            server: Mutex::new(None),
        })
    }

    pub fn was_opened(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn take_server(&self) -> FakeServer {
        self.server
            .lock()
            .take()
            .expect("transport was not opened")
    }
}

#[async_trait::async_trait]
impl LiveTransport for FakeTransport {
    async fn open(&self, api_key: &str, setup: SetupMessage) -> BridgeResult<LiveChannel> {
        self.opened.store(true, Ordering::SeqCst);

        match &self.answer {
            Answer::Accept => {}
            Answer::Reject(reason) => return Err(BridgeError::Transport(reason.clone())),
            Answer::Hang => std::future::pending::<()>().await,
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(self.outbound_capacity);
        let (events_tx, events_rx) = mpsc::channel(64);

        *self.server.lock() = Some(FakeServer {
            api_key: api_key.to_string(),
            setup,
            events: events_tx,
            outbound: outbound_rx,
        });

        Ok(LiveChannel {
            outbound: outbound_tx,
            events: events_rx,
            tasks: ConnectionTasks::default(),
        })
    }

    fn name(&self) -> &str {
        "fake transport"
    }
}

/// Observes and drives a [`FakeBackend`] from the test
#[derive(Clone, Default)]
pub struct MicControl {
    started: Arc<AtomicBool>,
    capturing: Arc<AtomicBool>,
    stops: Arc<AtomicUsize>,
    frames: Arc<Mutex<Option<mpsc::Sender<AudioFrame>>>>,
}

impl MicControl {
    pub fn was_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// The capture source runs out, as at the end of a replayed file
    pub fn end_capture(&self) {
        self.frames.lock().take();
    }

    /// Deliver one captured frame of `len` samples
    pub async fn push(&self, len: usize, timestamp_ms: u64) {
        let sender = self.frames.lock().clone().expect("backend not started");
        sender
            .send(AudioFrame {
                samples: vec![0.25; len],
                sample_rate: 16000,
                timestamp_ms,
            })
            .await
            .expect("capture queue closed");
    }
}

pub struct FakeBackend {
    mic: MicControl,
    failure: Option<BridgeError>,
}

impl FakeBackend {
    pub fn new() -> (Self, MicControl) {
        let mic = MicControl::default();
        (
            Self {
                mic: mic.clone(),
                failure: None,
            },
            mic,
        )
    }

    pub fn failing(err: BridgeError) -> (Self, MicControl) {
        let (mut backend, mic) = Self::new();
        backend.failure = Some(err);
        (backend, mic)
    }
}

#[async_trait::async_trait]
impl AudioBackend for FakeBackend {
    async fn start(&mut self) -> BridgeResult<mpsc::Receiver<AudioFrame>> {
        self.mic.started.store(true, Ordering::SeqCst);
        if let Some(err) = self.failure.take() {
            return Err(err);
        }

        let (tx, rx) = mpsc::channel(16);
        *self.mic.frames.lock() = Some(tx);
        self.mic.capturing.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop(&mut self) -> BridgeResult<()> {
        self.mic.stops.fetch_add(1, Ordering::SeqCst);
        self.mic.capturing.store(false, Ordering::SeqCst);
        self.mic.frames.lock().take();
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.mic.is_capturing()
    }

    fn overruns(&self) -> u64 {
        0
    }

    fn name(&self) -> &str {
        "fake microphone"
    }
}

/// Test-side handles on the collaborators of one session
pub struct Handles {
    pub transport: Arc<FakeTransport>,
    pub mic: MicControl,
    pub output: Arc<VirtualOutput>,
}

pub fn harness(transport: Arc<FakeTransport>, api_key: Option<&str>) -> (SessionParts, Handles) {
    let (backend, mic) = FakeBackend::new();
    harness_with_backend(transport, api_key, backend, mic)
}

pub fn harness_with_backend(
    transport: Arc<FakeTransport>,
    api_key: Option<&str>,
    backend: FakeBackend,
    mic: MicControl,
) -> (SessionParts, Handles) {
    let output = Arc::new(VirtualOutput::manual());
    let parts = SessionParts {
        transport: transport.clone(),
        credentials: Box::new(StaticCredentials::new(api_key.map(str::to_string))),
        input: Box::new(backend),
        output: output.clone(),
    };
    (
        parts,
        Handles {
            transport,
            mic,
            output,
        },
    )
}

/// Counts disconnect callback invocations
pub fn callback_counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    (count, move || {
        seen.fetch_add(1, Ordering::SeqCst);
    })
}

/// A server message carrying `samples` of 24 kHz synthesized audio
pub fn audio_event(samples: usize) -> TransportEvent {
    let encoded = encode_frame(&vec![0.1; samples], 24000);
    payload_event(&encoded.data)
}

/// A server message whose audio part carries `data` verbatim
pub fn payload_event(data: &str) -> TransportEvent {
    let message: ServerMessage = serde_json::from_value(serde_json::json!({
        "serverContent": {
            "modelTurn": {
                "parts": [{ "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": data } }]
            }
        }
    }))
    .expect("valid server message");
    TransportEvent::Message(message)
}

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Poll session statistics until `condition` holds or two seconds pass
pub async fn wait_for_stats(
    session: &VoiceSession,
    mut condition: impl FnMut(&SessionStats) -> bool,
) -> SessionStats {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let stats = session.stats().await;
        if condition(&stats) || tokio::time::Instant::now() >= deadline {
            return stats;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
