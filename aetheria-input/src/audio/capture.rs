//! Microphone acquisition loop feeding the breath envelope

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;

use super::breath::{BreathFilter, BreathFilterConfig};
use super::source::{AudioBackend, AudioBlock, AudioRequest, AudioStream, BlockSink};
use crate::error::SensorError;
use crate::shared::{AtomicF32, SensorStatus, StatusCell};
use crate::worker::{Worker, RESTART_TIMEOUT};

/// Default gain applied to the envelope at read time
pub const DEFAULT_BREATH_MULTIPLIER: f32 = 50.0;

/// How long the loop idles between stop checks while the device pushes blocks
const IDLE_TICK: Duration = Duration::from_millis(100);

/// Breath signal shared between the audio callback and readers
pub struct BreathState {
    /// Envelope follower, touched only by the delivery callback
    filter: Mutex<BreathFilter>,
    raw: AtomicF32,
    smoothed: AtomicF32,
    multiplier: AtomicF32,
    status: StatusCell,
    running: AtomicBool,
    blocks: AtomicU64,
}

impl BreathState {
    pub fn new(config: BreathFilterConfig, multiplier: f32) -> Self {
        Self {
            filter: Mutex::new(BreathFilter::new(config)),
            raw: AtomicF32::new(0.0),
            smoothed: AtomicF32::new(0.0),
            multiplier: AtomicF32::new(multiplier),
            status: StatusCell::new(SensorStatus::Stopped),
            running: AtomicBool::new(false),
            blocks: AtomicU64::new(0),
        }
    }

    /// Process one delivered block and publish the new envelope
    pub fn on_block(&self, block: AudioBlock<'_>) {
        if !self.is_running() {
            return;
        }

        if let Some(status) = block.status {
            tracing::warn!("Audio input status: {}", status);
        }

        let (raw, smoothed) = {
            let mut filter = self.filter.lock();
            filter.process(block.samples);
            (filter.raw(), filter.smoothed())
        };

        self.raw.store(raw);
        self.smoothed.store(smoothed);
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }

    /// Gain-scaled breath intensity
    pub fn intensity(&self) -> f32 {
        self.smoothed.load() * self.multiplier.load()
    }

    /// Envelope before gain
    pub fn smoothed(&self) -> f32 {
        self.smoothed.load()
    }

    /// RMS of the latest block
    pub fn raw(&self) -> f32 {
        self.raw.load()
    }

    pub fn multiplier(&self) -> f32 {
        self.multiplier.load()
    }

    pub fn set_multiplier(&self, multiplier: f32) {
        if !multiplier.is_finite() || multiplier < 0.0 {
            tracing::warn!("Ignoring invalid breath multiplier {}", multiplier);
            return;
        }
        self.multiplier.store(multiplier);
        tracing::info!("Breath multiplier set to {:.1}x", multiplier);
    }

    pub fn status(&self) -> SensorStatus {
        self.status.get()
    }

    /// Blocks processed since the last start
    pub fn block_count(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    fn reset(&self) {
        self.filter.lock().reset();
        self.raw.store(0.0);
        self.smoothed.store(0.0);
        self.blocks.store(0, Ordering::Relaxed);
    }
}

/// Closes the stream on every exit path of the loop, including unwinding
struct StreamGuard(Option<Box<dyn AudioStream>>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if let Some(mut stream) = self.0.take() {
            stream.close();
            tracing::info!("Audio input closed");
        }
    }
}

/// Owns the microphone loop and its breath signal
pub struct AudioCapture {
    backend: Arc<dyn AudioBackend>,
    state: Arc<BreathState>,
    worker: Option<Worker>,
}

impl AudioCapture {
    pub fn new(backend: Arc<dyn AudioBackend>, config: BreathFilterConfig, multiplier: f32) -> Self {
        Self {
            backend,
            state: Arc::new(BreathState::new(config, multiplier)),
            worker: None,
        }
    }

    /// Start acquisition on the `audio-capture` thread.
    ///
    /// Returns immediately unless a previous loop is still stopping, in which
    /// case it waits up to [`RESTART_TIMEOUT`] for that loop to release the
    /// device. Device failures surface through [`Self::status`]; the errors
    /// returned here are a stuck previous loop or a failed thread spawn.
    pub fn start(&mut self, request: AudioRequest) -> Result<(), SensorError> {
        if let Some(worker) = self.worker.as_mut() {
            if !worker.is_finished() && self.state.is_running() {
                tracing::warn!("Audio capture already running");
                return Ok(());
            }
            // A stopped loop may still be releasing the device
            if !worker.join_timeout(RESTART_TIMEOUT) {
                return Err(SensorError::StillStopping { name: "audio-capture" });
            }
            self.worker = None;
        }

        self.state.reset();
        self.state.set_running(true);
        self.state.status.set(SensorStatus::Starting);

        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        let spawned = Worker::spawn("audio-capture", move |stop_rx| {
            run_audio_loop(backend.as_ref(), &request, state, stop_rx);
        });

        match spawned {
            Ok(worker) => {
                self.worker = Some(worker);
                Ok(())
            }
            Err(e) => {
                self.state.set_running(false);
                self.state.status.set(SensorStatus::Stopped);
                Err(e)
            }
        }
    }

    /// Signal the loop to exit after the current block. Does not block.
    pub fn stop(&mut self) {
        self.state.set_running(false);
        if let Some(worker) = self.worker.as_mut() {
            worker.signal_stop();
        }
    }

    /// Whether a loop thread is still owned (running or not yet joined)
    pub fn is_active(&self) -> bool {
        self.worker.is_some()
    }

    /// Wait up to `timeout` for the loop to exit and release the device
    pub fn join_timeout(&mut self, timeout: Duration) -> bool {
        match self.worker.as_mut() {
            Some(worker) => {
                let joined = worker.join_timeout(timeout);
                if joined {
                    self.worker = None;
                }
                joined
            }
            None => true,
        }
    }

    pub fn intensity(&self) -> f32 {
        self.state.intensity()
    }

    pub fn set_multiplier(&self, multiplier: f32) {
        self.state.set_multiplier(multiplier);
    }

    pub fn status(&self) -> SensorStatus {
        self.state.status()
    }

    /// Shared signal for readers on other threads
    pub fn state(&self) -> Arc<BreathState> {
        Arc::clone(&self.state)
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_audio_loop(
    backend: &dyn AudioBackend,
    request: &AudioRequest,
    state: Arc<BreathState>,
    stop_rx: Receiver<()>,
) {
    tracing::info!(
        "Starting audio capture ({} device {:?} @ {}Hz, {} samples/block)",
        backend.name(),
        request.device.as_deref().unwrap_or("default"),
        request.sample_rate,
        request.block_size
    );

    let sink_state = Arc::clone(&state);
    let sink: BlockSink = Box::new(move |block: AudioBlock<'_>| sink_state.on_block(block));

    let stream = match backend.open(request, sink) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("Could not start microphone: {}", e);
            state.set_running(false);
            state.status.set(SensorStatus::DeviceUnavailable);
            return;
        }
    };
    let guard = StreamGuard(Some(stream));
    state.status.set(SensorStatus::Ok);

    while state.is_running() {
        match stop_rx.recv_timeout(IDLE_TICK) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    state.set_running(false);
    drop(guard);
    state.status.set(SensorStatus::Stopped);
    tracing::info!("Audio capture thread stopped");
}
