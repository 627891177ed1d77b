//! Scheduled audio output
//!
//! An [`OutputSink`] exposes a device clock and accepts buffers to start at a
//! given time on that clock. The playback scheduler decides the start times;
//! sinks only render what they are given.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use super::microphone::device_error;
use super::pcm::DecodedFrame;
use super::resample::LinearResampler;
use crate::error::{BridgeError, BridgeResult};

/// Output device with a readable clock and start-time scheduling
#[async_trait::async_trait]
pub trait OutputSink: Send + Sync {
    /// Acquire the device. Idempotent.
    async fn open(&self) -> BridgeResult<()>;

    /// Device clock in seconds
    fn current_time(&self) -> f64;

    /// Queue a frame to begin playing at `start_secs` on the device clock
    fn schedule(&self, start_secs: f64, frame: &DecodedFrame);

    /// Discard everything scheduled that has not played yet
    fn flush(&self);

    /// Stop rendering and release the device. Idempotent.
    async fn close(&self);

    /// Whether the sink still holds its device
    fn is_open(&self) -> bool;
}

/// A buffer placed on the device timeline, in device frames
struct Placed {
    start_frame: u64,
    samples: Vec<f32>,
}

impl Placed {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// End of the last placed buffer and the resampler that produced it
#[derive(Default)]
struct Tail {
    end_frame: u64,
    resampler: Option<LinearResampler>,
}

/// State shared between the scheduler side and the device callback
struct Timeline {
    device_rate: u32,
    frames_rendered: AtomicU64,
    queue: Mutex<VecDeque<Placed>>,
    tail: Mutex<Tail>,
    gain: f32,
}

impl Timeline {
    fn new(device_rate: u32, gain: f32) -> Self {
        Self {
            device_rate,
            frames_rendered: AtomicU64::new(0),
            queue: Mutex::new(VecDeque::new()),
            tail: Mutex::new(Tail::default()),
            gain,
        }
    }

    fn current_time(&self) -> f64 {
        self.frames_rendered.load(Ordering::Acquire) as f64 / self.device_rate as f64
    }

    /// Put a frame on the timeline
    ///
    /// A frame starting at (or before) the end of the previous one is
    /// appended to it through the same resampler, so back-to-back frames
    /// stay sample-contiguous at any device rate. Buffers never overlap.
    fn place(&self, start_secs: f64, frame: &DecodedFrame) {
        let requested = (start_secs * self.device_rate as f64).max(0.0);
        let mut tail = self.tail.lock();

        let contiguous = requested < tail.end_frame as f64 + 1.5
            && tail
                .resampler
                .as_ref()
                .is_some_and(|r| r.from_rate() == frame.sample_rate);

        let start_frame = if contiguous {
            tail.end_frame
        } else {
            tail.resampler = Some(LinearResampler::new(frame.sample_rate, self.device_rate));
            (requested.round() as u64).max(tail.end_frame)
        };

        let samples = match tail.resampler.as_mut() {
            Some(resampler) => resampler.process(&frame.samples),
            None => return,
        };
        tail.end_frame = start_frame + samples.len() as u64;
        drop(tail);

        self.queue.lock().push_back(Placed {
            start_frame,
            samples,
        });
    }

    /// Drop queued buffers; the next frame starts a new run
    fn flush(&self) {
        self.queue.lock().clear();
        let mut tail = self.tail.lock();
        tail.resampler = None;
        tail.end_frame = self.frames_rendered.load(Ordering::Acquire);
    }

    /// Fill one interleaved device buffer (mono source copied to every channel)
    fn render(&self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = out.len() / channels;
        let first = self.frames_rendered.load(Ordering::Acquire);
        let mut queue = self.queue.lock();

        for i in 0..frames {
            let position = first + i as u64;

            while queue.front().is_some_and(|p| p.end_frame() <= position) {
                queue.pop_front();
            }

            let value = match queue.front() {
                Some(p) if p.start_frame <= position => {
                    p.samples[(position - p.start_frame) as usize] * self.gain
                }
                _ => 0.0,
            };

            for sample in &mut out[i * channels..(i + 1) * channels] {
                *sample = value;
            }
        }

        drop(queue);
        self.frames_rendered
            .fetch_add(frames as u64, Ordering::Release);
    }
}

/// Handle to the thread that owns the cpal output stream
struct OutputThread {
    stop_tx: std::sync::mpsc::Sender<()>,
    thread: std::thread::JoinHandle<()>,
    timeline: Arc<Timeline>,
}

/// Default speaker output via cpal
///
/// The device is opened by [`OutputSink::open`] and released by
/// [`OutputSink::close`]; the clock reads zero while closed.
pub struct CpalOutput {
    gain: f32,
    device: Mutex<Option<OutputThread>>,
}

impl CpalOutput {
    pub fn new(gain: f32) -> Self {
        Self {
            gain,
            device: Mutex::new(None),
        }
    }

    fn spawn_device(gain: f32) -> BridgeResult<OutputThread> {
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("livecord-speaker".to_string())
            .spawn(move || match open_output_stream(gain) {
                Ok((stream, timeline)) => {
                    let _ = ready_tx.send(Ok(timeline));
                    // Returns on close() or when the output is dropped
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })?;

        let timeline = match ready_rx.recv() {
            Ok(result) => result?,
            Err(_) => {
                return Err(BridgeError::DeviceUnavailable(
                    "Speaker thread exited before opening the device".to_string(),
                ))
            }
        };

        Ok(OutputThread {
            stop_tx,
            thread,
            timeline,
        })
    }
}

fn open_output_stream(gain: f32) -> BridgeResult<(cpal::Stream, Arc<Timeline>)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| BridgeError::DeviceUnavailable("No output device available".to_string()))?;
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let supported = device
        .default_output_config()
        .map_err(|e| device_error("Failed to query output config", e))?;
    let sample_format = supported.sample_format();
    let stream_config: cpal::StreamConfig = supported.into();
    let channels = stream_config.channels as usize;

    info!(
        "Opening speaker '{}' ({}Hz, {} channels, {:?})",
        name, stream_config.sample_rate.0, stream_config.channels, sample_format
    );

    let timeline = Arc::new(Timeline::new(stream_config.sample_rate.0, gain));
    let render = Arc::clone(&timeline);
    let err_fn = |err: cpal::StreamError| error!("Speaker stream error: {}", err);

    let stream = match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                render.render(data, channels);
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => {
            let mut scratch = Vec::new();
            device.build_output_stream(
                &stream_config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0.0f32);
                    render.render(&mut scratch, channels);
                    for (out, &s) in data.iter_mut().zip(scratch.iter()) {
                        *out = super::pcm::float_to_i16(s);
                    }
                },
                err_fn,
                None,
            )
        }
        other => {
            return Err(BridgeError::DeviceUnavailable(format!(
                "Unsupported output sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| device_error("Failed to build output stream", e))?;

    stream
        .play()
        .map_err(|e| device_error("Failed to start output stream", e))?;

    Ok((stream, timeline))
}

#[async_trait::async_trait]
impl OutputSink for CpalOutput {
    async fn open(&self) -> BridgeResult<()> {
        if self.is_open() {
            return Ok(());
        }

        // Opening waits on the device thread
        let gain = self.gain;
        let device = tokio::task::spawn_blocking(move || Self::spawn_device(gain))
            .await
            .map_err(|e| BridgeError::DeviceUnavailable(format!("Speaker thread failed: {}", e)))??;

        let mut slot = self.device.lock();
        if slot.is_none() {
            *slot = Some(device);
        } else {
            let _ = device.stop_tx.send(());
        }
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.device
            .lock()
            .as_ref()
            .map(|d| d.timeline.current_time())
            .unwrap_or(0.0)
    }

    fn schedule(&self, start_secs: f64, frame: &DecodedFrame) {
        if let Some(device) = self.device.lock().as_ref() {
            device.timeline.place(start_secs, frame);
        }
    }

    fn flush(&self) {
        if let Some(device) = self.device.lock().as_ref() {
            device.timeline.flush();
        }
    }

    async fn close(&self) {
        let device = self.device.lock().take();
        let Some(device) = device else {
            return;
        };

        info!("Releasing speaker output");
        device.timeline.flush();
        let _ = device.stop_tx.send(());

        let joined = tokio::task::spawn_blocking(move || device.thread.join()).await;
        if !matches!(joined, Ok(Ok(()))) {
            error!("Speaker thread did not shut down cleanly");
        }
    }

    fn is_open(&self) -> bool {
        self.device.lock().is_some()
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        if let Some(device) = self.device.lock().take() {
            let _ = device.stop_tx.send(());
        }
    }
}

/// A frame accepted by [`VirtualOutput`]
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledFrame {
    pub start_secs: f64,
    pub duration_secs: f64,
    pub sample_count: usize,
}

enum Clock {
    Manual(Mutex<f64>),
    Wall(Instant),
}

/// Software output sink with no device behind it
///
/// Records every scheduled frame. The clock is either advanced by hand
/// (tests) or follows wall time (headless runs).
pub struct VirtualOutput {
    clock: Clock,
    scheduled: Mutex<Vec<ScheduledFrame>>,
    flushes: AtomicU64,
    open: AtomicBool,
}

impl VirtualOutput {
    /// Clock starts at zero and only moves via [`VirtualOutput::advance`]
    pub fn manual() -> Self {
        Self::with_clock(Clock::Manual(Mutex::new(0.0)))
    }

    /// Clock follows wall time since creation
    pub fn realtime() -> Self {
        Self::with_clock(Clock::Wall(Instant::now()))
    }

    fn with_clock(clock: Clock) -> Self {
        Self {
            clock,
            scheduled: Mutex::new(Vec::new()),
            flushes: AtomicU64::new(0),
            open: AtomicBool::new(true),
        }
    }

    /// Move a manual clock forward
    pub fn advance(&self, secs: f64) {
        if let Clock::Manual(now) = &self.clock {
            *now.lock() += secs;
        }
    }

    /// Set a manual clock
    pub fn set_time(&self, secs: f64) {
        if let Clock::Manual(now) = &self.clock {
            *now.lock() = secs;
        }
    }

    pub fn scheduled(&self) -> Vec<ScheduledFrame> {
        self.scheduled.lock().clone()
    }

    /// How many times queued playback was discarded
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl OutputSink for VirtualOutput {
    async fn open(&self) -> BridgeResult<()> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn current_time(&self) -> f64 {
        match &self.clock {
            Clock::Manual(now) => *now.lock(),
            Clock::Wall(origin) => origin.elapsed().as_secs_f64(),
        }
    }

    fn schedule(&self, start_secs: f64, frame: &DecodedFrame) {
        if !self.is_open() {
            return;
        }
        debug!(
            "Virtual output: {} samples at {:.3}s",
            frame.samples.len(),
            start_secs
        );
        self.scheduled.lock().push(ScheduledFrame {
            start_secs,
            duration_secs: frame.duration_secs(),
            sample_count: frame.samples.len(),
        });
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
