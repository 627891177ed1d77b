use super::config::{OverrunPolicy, SessionConfig};
use super::credentials::CredentialSource;
use super::state::{CloseReason, SessionState, StateCell};
use super::stats::{Counters, SessionStats};
use crate::audio::pcm::decode_frame;
use crate::audio::{pcm, AudioBackend, AudioFrame, OutputSink};
use crate::error::{BridgeError, BridgeResult};
use crate::live::{
    ClientMessage, ConnectionTasks, LiveChannel, LiveTransport, ServerMessage, TransportEvent,
};
use crate::playback::PlaybackScheduler;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Invoked once when a connected session ends, whatever the cause
pub type DisconnectCallback = Box<dyn FnOnce() + Send + 'static>;

/// Collaborators a session is built from
pub struct SessionParts {
    /// Opens the connection to the live service
    pub transport: Arc<dyn LiveTransport>,
    /// Supplies the API key
    pub credentials: Box<dyn CredentialSource>,
    /// Microphone (or stand-in) capture
    pub input: Box<dyn AudioBackend>,
    /// Speaker (or stand-in) output
    pub output: Arc<dyn OutputSink>,
}

/// Everything a streaming session owns and must release on close
struct Resources {
    input: Box<dyn AudioBackend>,
    output: Arc<dyn OutputSink>,
    connection: ConnectionTasks,
    capture_task: JoinHandle<()>,
    inbound_task: JoinHandle<()>,
}

struct Shared {
    session_id: String,
    started_at: chrono::DateTime<Utc>,
    state: StateCell,
    counters: Counters,
    /// Capture-queue overruns reported by the backend when it was released
    final_capture_overruns: AtomicU64,
    close_reason: parking_lot::Mutex<Option<CloseReason>>,
    on_disconnect: parking_lot::Mutex<Option<DisconnectCallback>>,
    /// `None` once closed; held for the whole teardown
    resources: Mutex<Option<Resources>>,
}

/// One live voice connection: microphone → service → speaker
///
/// Created by [`VoiceSession::connect`], which only returns once audio is
/// flowing. Ends through [`VoiceSession::disconnect`], a remote close, a
/// transport error or the stall watchdog; all four run the same teardown
/// and invoke the disconnect callback exactly once.
pub struct VoiceSession {
    shared: Arc<Shared>,
}

impl VoiceSession {
    /// Connect to the live service and start streaming
    ///
    /// Fails with `MissingCredential` before touching any device, with
    /// `Transport`/`Timeout` if the service cannot be reached, and with
    /// `PermissionDenied`/`DeviceUnavailable` if audio devices cannot be
    /// opened. On failure nothing is left running and `on_disconnect` is
    /// not called.
    pub async fn connect(
        config: SessionConfig,
        parts: SessionParts,
        on_disconnect: impl FnOnce() + Send + 'static,
    ) -> BridgeResult<Self> {
        let SessionParts {
            transport,
            credentials,
            mut input,
            output,
        } = parts;

        let api_key = credentials
            .api_key()
            .ok_or_else(|| BridgeError::MissingCredential(credentials.describe()))?;

        let session_id = format!("voice-{}", uuid::Uuid::new_v4());
        info!(
            "Connecting voice session {} via {} (model {}, voice {})",
            session_id,
            transport.name(),
            config.model,
            config.voice_name
        );

        let shared = Arc::new(Shared {
            session_id,
            started_at: Utc::now(),
            state: StateCell::new(SessionState::Connecting),
            counters: Counters::default(),
            final_capture_overruns: AtomicU64::new(0),
            close_reason: parking_lot::Mutex::new(None),
            on_disconnect: parking_lot::Mutex::new(Some(Box::new(on_disconnect))),
            resources: Mutex::new(None),
        });

        let channel = match tokio::time::timeout(
            config.connect_timeout,
            transport.open(&api_key, config.setup_message()),
        )
        .await
        {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                error!("Voice session {} failed to connect: {}", shared.session_id, e);
                return Err(e);
            }
            Err(_) => {
                error!(
                    "Voice session {} timed out waiting for setup",
                    shared.session_id
                );
                return Err(BridgeError::Timeout(config.connect_timeout));
            }
        };

        shared.state.advance(SessionState::Open);
        info!("Voice session {} open", shared.session_id);

        let LiveChannel {
            outbound,
            events,
            tasks,
        } = channel;

        let audio_rx = match Self::start_devices(&mut *input, &*output).await {
            Ok(rx) => rx,
            Err(e) => {
                error!(
                    "Voice session {} could not start audio: {}",
                    shared.session_id, e
                );
                drop(outbound);
                drop(events);
                tasks.shutdown().await;
                return Err(e);
            }
        };

        // Hold the slot while spawning so a close racing with connect
        // still finds the resources to release
        let mut slot = shared.resources.lock().await;
        shared.state.advance(SessionState::Streaming);

        let capture_task = tokio::spawn(forward_capture(
            Arc::clone(&shared),
            audio_rx,
            outbound,
            config.overrun_policy,
        ));

        let inbound_task = tokio::spawn(dispatch_inbound(
            Arc::clone(&shared),
            events,
            PlaybackScheduler::new(Arc::clone(&output)),
            config.output_sample_rate,
            config.stall_timeout,
        ));

        *slot = Some(Resources {
            input,
            output,
            connection: tasks,
            capture_task,
            inbound_task,
        });
        drop(slot);

        info!(
            "Voice session {} streaming ({:?} overrun policy)",
            shared.session_id, config.overrun_policy
        );

        Ok(Self { shared })
    }

    /// Open the speaker, then the microphone; undo both on failure
    async fn start_devices(
        input: &mut dyn AudioBackend,
        output: &dyn OutputSink,
    ) -> BridgeResult<mpsc::Receiver<AudioFrame>> {
        output.open().await?;

        match input.start().await {
            Ok(rx) => {
                info!("Capturing from {}", input.name());
                Ok(rx)
            }
            Err(e) => {
                let _ = input.stop().await;
                output.close().await;
                Err(e)
            }
        }
    }

    /// Close the session
    ///
    /// Safe to call any number of times and concurrently with a remote
    /// close. Returns once capture, transport and output are released.
    pub async fn disconnect(&self) {
        teardown(Arc::clone(&self.shared), CloseReason::Local).await;
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.get()
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == SessionState::Streaming
    }

    /// Get current session statistics
    pub async fn stats(&self) -> SessionStats {
        let capture_overruns = {
            let resources = self.shared.resources.lock().await;
            match resources.as_ref() {
                Some(res) => res.input.overruns(),
                None => self.shared.final_capture_overruns.load(Ordering::Relaxed),
            }
        };

        let counters = &self.shared.counters;
        let duration = Utc::now().signed_duration_since(self.shared.started_at);

        SessionStats {
            session_id: self.shared.session_id.clone(),
            state: self.state(),
            started_at: self.shared.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            frames_sent: Counters::load(&counters.frames_sent),
            frames_received: Counters::load(&counters.frames_received),
            frames_dropped: Counters::load(&counters.frames_dropped) + capture_overruns,
            decode_errors: Counters::load(&counters.decode_errors),
            seconds_scheduled: counters.seconds_scheduled(),
            close_reason: self.shared.close_reason.lock().clone(),
        }
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        if self.shared.state.get() == SessionState::Closed {
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            warn!(
                "Voice session {} dropped while connected, closing",
                self.shared.session_id
            );
            runtime.spawn(teardown(Arc::clone(&self.shared), CloseReason::Local));
        }
    }
}

/// Release everything the session owns, once
async fn teardown(shared: Arc<Shared>, reason: CloseReason) {
    let mut slot = shared.resources.lock().await;
    let Some(resources) = slot.take() else {
        return;
    };

    shared.state.advance(SessionState::Closed);
    match &reason {
        CloseReason::Local => info!("Closing voice session {}", shared.session_id),
        CloseReason::Remote(detail) => info!(
            "Voice session {} closed by service ({})",
            shared.session_id,
            detail.as_deref().unwrap_or("no reason")
        ),
        CloseReason::TransportError(e) => {
            error!("Voice session {} transport error: {}", shared.session_id, e)
        }
        CloseReason::Stalled => warn!(
            "Voice session {} stalled, no inbound traffic",
            shared.session_id
        ),
    }
    *shared.close_reason.lock() = Some(reason);

    let Resources {
        mut input,
        output,
        connection,
        capture_task,
        inbound_task,
    } = resources;

    // No capture forwarding or playback scheduling past this point
    capture_task.abort();
    inbound_task.abort();
    let _ = capture_task.await;
    let _ = inbound_task.await;

    if let Err(e) = input.stop().await {
        error!("Failed to stop {}: {}", input.name(), e);
    }
    shared
        .final_capture_overruns
        .store(input.overruns(), Ordering::Relaxed);
    output.close().await;

    // The capture task held the last outbound sender, so the writer is
    // already sending its close frame
    connection.shutdown().await;
    drop(slot);

    info!("Voice session {} closed", shared.session_id);

    let callback = shared.on_disconnect.lock().take();
    if let Some(callback) = callback {
        callback();
    }
}

/// Encode captured frames and hand them to the transport
async fn forward_capture(
    shared: Arc<Shared>,
    mut audio_rx: mpsc::Receiver<AudioFrame>,
    outbound: mpsc::Sender<ClientMessage>,
    policy: OverrunPolicy,
) {
    debug!("Capture forwarding started");
    let counters = &shared.counters;

    while let Some(frame) = audio_rx.recv().await {
        if shared.state.get() != SessionState::Streaming {
            break;
        }

        let message = ClientMessage::from(pcm::encode_frame(&frame.samples, frame.sample_rate));

        match policy {
            OverrunPolicy::Drop => match outbound.try_send(message) {
                Ok(()) => {
                    Counters::bump(&counters.frames_sent);
                }
                Err(TrySendError::Full(_)) => {
                    let dropped = Counters::bump(&counters.frames_dropped);
                    if dropped == 1 || dropped % 100 == 0 {
                        warn!(
                            "Transport is behind, dropped frame at {}ms ({} dropped so far)",
                            frame.timestamp_ms, dropped
                        );
                    }
                }
                Err(TrySendError::Closed(_)) => break,
            },
            OverrunPolicy::Block => {
                if outbound.send(message).await.is_err() {
                    break;
                }
                Counters::bump(&counters.frames_sent);
            }
        }
    }

    if outbound.is_closed() || shared.state.get() != SessionState::Streaming {
        debug!("Capture forwarding stopped");
        return;
    }

    // Capture ran out (end of a replayed file, or the device went away).
    // The sender is held until teardown aborts this task.
    info!(
        "Capture input ended for voice session {}, connection stays open",
        shared.session_id
    );
    let _outbound = outbound;
    std::future::pending::<()>().await;
}

/// Deliver inbound events: audio to the scheduler, close/error to teardown
async fn dispatch_inbound(
    shared: Arc<Shared>,
    mut events: mpsc::Receiver<TransportEvent>,
    mut scheduler: PlaybackScheduler,
    sample_rate: u32,
    stall_timeout: Option<Duration>,
) {
    let reason = loop {
        let next = match stall_timeout {
            Some(limit) => match tokio::time::timeout(limit, events.recv()).await {
                Ok(event) => event,
                Err(_) => break CloseReason::Stalled,
            },
            None => events.recv().await,
        };

        match next {
            Some(TransportEvent::Message(msg)) => {
                handle_message(&shared, &mut scheduler, &msg, sample_rate)
            }
            Some(TransportEvent::Undecodable(e)) => {
                let total = Counters::bump(&shared.counters.decode_errors);
                warn!("Dropping unparseable message ({} so far): {}", total, e);
            }
            Some(TransportEvent::Closed { reason }) => break CloseReason::Remote(reason),
            Some(TransportEvent::Error(e)) => break CloseReason::TransportError(e),
            None => break CloseReason::Remote(None),
        }
    };

    // Teardown aborts this task, so it runs on its own
    tokio::spawn(teardown(shared, reason));
}

fn handle_message(
    shared: &Shared,
    scheduler: &mut PlaybackScheduler,
    msg: &ServerMessage,
    sample_rate: u32,
) {
    if shared.state.get() != SessionState::Streaming {
        trace!("Ignoring message after close");
        return;
    }

    if msg
        .server_content
        .as_ref()
        .is_some_and(|content| content.interrupted)
    {
        info!("Voice session {} interrupted by the listener", shared.session_id);
        scheduler.interrupt();
    }

    if let Some(go_away) = &msg.go_away {
        info!(
            "Service will close voice session {} soon (time left: {})",
            shared.session_id,
            go_away.time_left.as_deref().unwrap_or("unknown")
        );
    }

    let Some(data) = msg.audio_payload() else {
        trace!("Ignoring message without audio");
        return;
    };

    match decode_frame(data, sample_rate) {
        Ok(frame) if frame.samples.is_empty() => trace!("Ignoring empty audio frame"),
        Ok(frame) => {
            let placement = scheduler.schedule(&frame);
            Counters::bump(&shared.counters.frames_received);
            shared.counters.add_scheduled(placement.duration_secs);
        }
        Err(e) => {
            let total = Counters::bump(&shared.counters.decode_errors);
            warn!("Dropping undecodable audio frame ({} so far): {}", total, e);
        }
    }
}
