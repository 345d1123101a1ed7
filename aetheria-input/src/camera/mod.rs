//! Camera capture and motion estimate
//!
//! A backend hands out frames on a pull basis; the capture thread scores each
//! frame against the previous one and publishes the motion pair together with
//! a shared snapshot of the latest colour frame.

mod capture;
mod frame;
mod motion;
#[cfg(feature = "webcam")]
mod native;
mod simulated;
mod source;

// Re-export public API
pub use capture::{MotionDetector, MotionState, DEFAULT_RETRY_DELAY};
pub use frame::CameraFrame;
pub use motion::{
    difference_mask, motion_intensity, moving_area, polygon_area, to_blurred_gray, MotionAnalyzer,
    MotionConfig, MotionReading, DEFAULT_MOTION_THRESHOLD,
};
#[cfg(feature = "webcam")]
pub use native::{CameraInfo, NokhwaBackend};
pub use simulated::SimulatedCamera;
pub use source::{VideoBackend, VideoSource};
