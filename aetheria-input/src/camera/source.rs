//! Video backend seam

use image::RgbImage;

use crate::error::SensorError;

/// An open camera
pub trait VideoSource {
    /// Block until the next frame is available.
    ///
    /// [`SensorError::FrameRead`] marks a transient failure; the capture loop
    /// skips the frame and retries.
    fn read_frame(&mut self) -> Result<RgbImage, SensorError>;

    /// Release the device. Called exactly once by the capture loop.
    fn release(&mut self);
}

/// Factory for cameras (hardware, simulated, or mock)
pub trait VideoBackend: Send + Sync {
    /// Human-readable backend name for logs
    fn name(&self) -> &str;

    /// Open the camera at `index`
    fn open(&self, index: u32) -> Result<Box<dyn VideoSource>, SensorError>;
}
