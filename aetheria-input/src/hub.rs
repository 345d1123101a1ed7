//! Single entry point over both acquisition loops

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::{AudioBackend, AudioCapture, BreathState, SimulatedMicrophone};
use crate::camera::{CameraFrame, MotionDetector, MotionReading, MotionState, SimulatedCamera, VideoBackend};
use crate::error::SensorError;
use crate::settings::SensorConfig;
use crate::shared::SensorStatus;
use crate::tuning::SensorTuning;

/// Owns the breath and motion loops and exposes their latest values.
///
/// There is no ready signal: right after [`SensorHub::start`] intensities read
/// 0 and no frame is available until the devices deliver.
pub struct SensorHub {
    config: SensorConfig,
    audio: AudioCapture,
    video: MotionDetector,
}

impl SensorHub {
    pub fn new(
        mut config: SensorConfig,
        audio_backend: Arc<dyn AudioBackend>,
        video_backend: Arc<dyn VideoBackend>,
    ) -> Self {
        config.sanitize();

        let audio = AudioCapture::new(audio_backend, config.audio.filter, config.audio.breath_multiplier);
        let video = MotionDetector::new(video_backend, config.video.motion, config.video.motion_threshold)
            .with_retry_delay(config.video.retry_delay());

        Self { config, audio, video }
    }

    /// Hub backed by the synthetic microphone and camera
    pub fn simulated(config: SensorConfig) -> Self {
        Self::new(
            config,
            Arc::new(SimulatedMicrophone::default()),
            Arc::new(SimulatedCamera::default()),
        )
    }

    /// Hub backed by hardware where the matching feature is enabled,
    /// simulated devices otherwise
    pub fn with_default_backends(config: SensorConfig) -> Self {
        #[cfg(feature = "microphone")]
        let audio: Arc<dyn AudioBackend> = Arc::new(crate::audio::CpalBackend::new());
        #[cfg(not(feature = "microphone"))]
        let audio: Arc<dyn AudioBackend> = Arc::new(SimulatedMicrophone::default());

        #[cfg(feature = "webcam")]
        let video: Arc<dyn VideoBackend> = Arc::new(crate::camera::NokhwaBackend::new());
        #[cfg(not(feature = "webcam"))]
        let video: Arc<dyn VideoBackend> = Arc::new(SimulatedCamera::default());

        Self::new(config, audio, video)
    }

    /// Launch both loops and return immediately.
    ///
    /// Device failures are reported through [`Self::audio_status`] and
    /// [`Self::video_status`]. An error here means a thread could not be
    /// spawned, or a loop from the previous run did not exit in time.
    pub fn start(&mut self) -> Result<(), SensorError> {
        tracing::info!("Starting sensor hub");
        self.audio.start(self.config.audio.request())?;
        if let Err(e) = self.video.start(self.config.video.camera_index) {
            self.audio.stop();
            return Err(e);
        }
        Ok(())
    }

    /// Signal both loops to exit. Does not block.
    pub fn stop(&mut self) {
        self.audio.stop();
        self.video.stop();
    }

    /// Stop both loops and wait up to `timeout` in total for them to release
    /// their devices. Returns `false` if a loop is still running.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        self.stop();
        let deadline = Instant::now() + timeout;

        let audio_done = self.audio.join_timeout(timeout);
        let video_done = self.video.join_timeout(deadline.saturating_duration_since(Instant::now()));

        if audio_done && video_done {
            tracing::info!("Sensor hub stopped");
        } else {
            tracing::warn!(
                "Sensor hub shutdown timed out (audio joined: {}, video joined: {})",
                audio_done,
                video_done
            );
        }
        audio_done && video_done
    }

    pub fn breath_intensity(&self) -> f32 {
        self.audio.intensity()
    }

    pub fn motion_detected(&self) -> bool {
        self.video.detected()
    }

    pub fn motion_intensity(&self) -> f32 {
        self.video.intensity()
    }

    pub fn camera_frame(&self) -> Option<Arc<CameraFrame>> {
        self.video.latest_frame()
    }

    pub fn audio_status(&self) -> SensorStatus {
        self.audio.status()
    }

    pub fn video_status(&self) -> SensorStatus {
        self.video.status()
    }

    pub fn set_breath_multiplier(&self, multiplier: f32) {
        self.audio.set_multiplier(multiplier);
    }

    pub fn set_motion_threshold(&self, threshold: f32) {
        self.video.set_threshold(threshold);
    }

    /// Handle for adjusting tunables from another thread
    pub fn tuning(&self) -> SensorTuning {
        SensorTuning::new(self.audio.state(), self.video.state())
    }

    /// Read-only handle for consumers on other threads
    pub fn reader(&self) -> SensorReader {
        SensorReader {
            breath: self.audio.state(),
            motion: self.video.state(),
        }
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        self.reader().snapshot()
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }
}

impl Drop for SensorHub {
    fn drop(&mut self) {
        if self.audio.is_active() || self.video.is_active() {
            self.shutdown(self.config.shutdown_timeout());
        }
    }
}

/// Cloneable read access to the published signals
#[derive(Clone)]
pub struct SensorReader {
    breath: Arc<BreathState>,
    motion: Arc<MotionState>,
}

impl SensorReader {
    pub fn breath_intensity(&self) -> f32 {
        self.breath.intensity()
    }

    pub fn motion_detected(&self) -> bool {
        self.motion.detected()
    }

    pub fn motion_intensity(&self) -> f32 {
        self.motion.intensity()
    }

    pub fn camera_frame(&self) -> Option<Arc<CameraFrame>> {
        self.motion.latest_frame()
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            breath_intensity: self.breath.intensity(),
            motion: self.motion.reading(),
            audio_status: self.breath.status(),
            video_status: self.motion.status(),
            audio_blocks: self.breath.block_count(),
            video_frames: self.motion.frame_count(),
        }
    }
}

/// Every scalar signal at one instant (each read independently)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSnapshot {
    pub breath_intensity: f32,
    pub motion: MotionReading,
    pub audio_status: SensorStatus,
    pub video_status: SensorStatus,
    pub audio_blocks: u64,
    pub video_frames: u64,
}
