//! Error types for device backends and capture threads

use thiserror::Error;

/// Errors raised while opening or reading a sensor device.
///
/// These never cross an acquisition-thread boundary: inside the capture loops
/// they are logged and folded into the signal's [`SensorStatus`](crate::SensorStatus).
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Audio input device unavailable: {0}")]
    AudioDeviceUnavailable(String),
    #[error("Camera {index} unavailable: {reason}")]
    CameraUnavailable { index: u32, reason: String },
    #[error("Failed to read camera frame: {0}")]
    FrameRead(String),
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),
    #[error("{name} thread is still shutting down")]
    StillStopping { name: &'static str },
    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl SensorError {
    /// Whether the error describes a device that could not be opened at all.
    pub fn is_device_unavailable(&self) -> bool {
        matches!(
            self,
            SensorError::AudioDeviceUnavailable(_)
                | SensorError::CameraUnavailable { .. }
                | SensorError::UnsupportedFormat(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_errors_are_classified() {
        let camera = SensorError::CameraUnavailable {
            index: 2,
            reason: "busy".to_string(),
        };
        assert!(camera.is_device_unavailable());
        assert_eq!(camera.to_string(), "Camera 2 unavailable: busy");
        assert!(!SensorError::FrameRead("timeout".to_string()).is_device_unavailable());

        let stopping = SensorError::StillStopping { name: "camera-capture" };
        assert!(!stopping.is_device_unavailable());
        assert_eq!(stopping.to_string(), "camera-capture thread is still shutting down");
    }
}
