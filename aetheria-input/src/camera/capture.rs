//! Camera acquisition loop feeding the motion estimate

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use image::RgbImage;
use parking_lot::Mutex;

use super::frame::CameraFrame;
use super::motion::{MotionAnalyzer, MotionConfig, MotionReading};
use super::source::{VideoBackend, VideoSource};
use crate::error::SensorError;
use crate::shared::{AtomicF32, SensorStatus, StatusCell};
use crate::worker::{Worker, RESTART_TIMEOUT};

/// Pause after a failed frame read before trying again
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Motion signal shared between the capture thread and readers
pub struct MotionState {
    /// Previous-frame holder, touched only by the capture thread
    analyzer: Mutex<MotionAnalyzer>,
    reading: Mutex<MotionReading>,
    threshold: AtomicF32,
    latest_frame: Mutex<Option<Arc<CameraFrame>>>,
    status: StatusCell,
    running: AtomicBool,
    frames: AtomicU64,
}

impl MotionState {
    pub fn new(config: MotionConfig, threshold: f32) -> Self {
        Self {
            analyzer: Mutex::new(MotionAnalyzer::new(config)),
            reading: Mutex::new(MotionReading::default()),
            threshold: AtomicF32::new(threshold),
            latest_frame: Mutex::new(None),
            status: StatusCell::new(SensorStatus::Stopped),
            running: AtomicBool::new(false),
            frames: AtomicU64::new(0),
        }
    }

    /// Score one frame against the previous one and publish the result
    pub fn on_frame(&self, image: RgbImage) {
        if !self.is_running() {
            return;
        }

        let intensity = self.analyzer.lock().analyze(&image);
        if let Some(intensity) = intensity {
            *self.reading.lock() = MotionReading::evaluate(intensity, self.threshold.load());
        }

        let frame_number = self.frames.fetch_add(1, Ordering::Relaxed);
        *self.latest_frame.lock() = Some(Arc::new(CameraFrame::new(image, frame_number)));
    }

    /// Latest committed motion pair
    pub fn reading(&self) -> MotionReading {
        *self.reading.lock()
    }

    pub fn detected(&self) -> bool {
        self.reading().detected
    }

    pub fn intensity(&self) -> f32 {
        self.reading().intensity
    }

    pub fn threshold(&self) -> f32 {
        self.threshold.load()
    }

    /// Applies from the next processed frame
    pub fn set_threshold(&self, threshold: f32) {
        if !threshold.is_finite() || threshold < 0.0 {
            tracing::warn!("Ignoring invalid motion threshold {}", threshold);
            return;
        }
        self.threshold.store(threshold);
        tracing::info!("Motion threshold set to {:.1}", threshold);
    }

    /// Shared snapshot of the latest colour frame
    pub fn latest_frame(&self) -> Option<Arc<CameraFrame>> {
        self.latest_frame.lock().clone()
    }

    pub fn status(&self) -> SensorStatus {
        self.status.get()
    }

    /// Frames processed since the last start
    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    fn reset(&self) {
        self.analyzer.lock().reset();
        *self.reading.lock() = MotionReading::default();
        *self.latest_frame.lock() = None;
        self.frames.store(0, Ordering::Relaxed);
    }
}

/// Releases the camera on every exit path of the loop, including unwinding
struct ReleaseGuard(Option<Box<dyn VideoSource>>);

impl ReleaseGuard {
    fn source(&mut self) -> Option<&mut Box<dyn VideoSource>> {
        self.0.as_mut()
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if let Some(mut source) = self.0.take() {
            source.release();
            tracing::info!("Camera released");
        }
    }
}

/// Owns the camera loop and its motion signal
pub struct MotionDetector {
    backend: Arc<dyn VideoBackend>,
    state: Arc<MotionState>,
    retry_delay: Duration,
    worker: Option<Worker>,
}

impl MotionDetector {
    pub fn new(backend: Arc<dyn VideoBackend>, config: MotionConfig, threshold: f32) -> Self {
        Self {
            backend,
            state: Arc::new(MotionState::new(config, threshold)),
            retry_delay: DEFAULT_RETRY_DELAY,
            worker: None,
        }
    }

    /// Set the pause between a failed read and the next attempt
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Start acquisition from camera `index` on the `camera-capture` thread.
    ///
    /// Returns immediately unless a previous loop is still stopping, in which
    /// case it waits up to [`RESTART_TIMEOUT`] for that loop to release the
    /// device. Device failures surface through [`Self::status`]; the errors
    /// returned here are a stuck previous loop or a failed thread spawn.
    pub fn start(&mut self, index: u32) -> Result<(), SensorError> {
        if let Some(worker) = self.worker.as_mut() {
            if !worker.is_finished() && self.state.is_running() {
                tracing::warn!("Camera capture already running");
                return Ok(());
            }
            // A stopped loop may still be releasing the device
            if !worker.join_timeout(RESTART_TIMEOUT) {
                return Err(SensorError::StillStopping { name: "camera-capture" });
            }
            self.worker = None;
        }

        self.state.reset();
        self.state.set_running(true);
        self.state.status.set(SensorStatus::Starting);

        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        let retry_delay = self.retry_delay;
        let spawned = Worker::spawn("camera-capture", move |stop_rx| {
            run_camera_loop(backend.as_ref(), index, retry_delay, state, stop_rx);
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

    /// Signal the loop to exit after the current frame. Does not block.
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

    /// Wait up to `timeout` for the loop to exit and release the camera
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

    pub fn detected(&self) -> bool {
        self.state.detected()
    }

    pub fn intensity(&self) -> f32 {
        self.state.intensity()
    }

    pub fn set_threshold(&self, threshold: f32) {
        self.state.set_threshold(threshold);
    }

    pub fn latest_frame(&self) -> Option<Arc<CameraFrame>> {
        self.state.latest_frame()
    }

    pub fn status(&self) -> SensorStatus {
        self.state.status()
    }

    /// Shared signal for readers on other threads
    pub fn state(&self) -> Arc<MotionState> {
        Arc::clone(&self.state)
    }
}

impl Drop for MotionDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_camera_loop(
    backend: &dyn VideoBackend,
    index: u32,
    retry_delay: Duration,
    state: Arc<MotionState>,
    stop_rx: Receiver<()>,
) {
    tracing::info!("Starting camera capture ({} camera {})", backend.name(), index);

    let source = match backend.open(index) {
        Ok(source) => source,
        Err(e) => {
            tracing::error!("Could not open camera {}: {}", index, e);
            state.set_running(false);
            state.status.set(SensorStatus::DeviceUnavailable);
            return;
        }
    };
    let mut guard = ReleaseGuard(Some(source));
    state.status.set(SensorStatus::Ok);

    while state.is_running() {
        match stop_rx.try_recv() {
            Err(TryRecvError::Empty) => {}
            Ok(()) | Err(TryRecvError::Disconnected) => break,
        }

        let Some(source) = guard.source() else {
            break;
        };

        match source.read_frame() {
            Ok(image) => state.on_frame(image),
            Err(e) => {
                tracing::warn!("Failed to capture frame: {}", e);
                match stop_rx.recv_timeout(retry_delay) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        }
    }

    state.set_running(false);
    drop(guard);
    *state.latest_frame.lock() = None;
    state.status.set(SensorStatus::Stopped);
    tracing::info!("Camera capture thread stopped");
}
