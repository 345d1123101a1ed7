//! Aetheria Input - breath and motion sensing for game controls
//!
//! Two background acquisition loops turn a microphone into a smoothed breath
//! intensity and a camera into a frame-differencing motion estimate. The
//! [`SensorHub`] owns both loops and exposes their latest values through
//! cheap, non-blocking getters that a game can poll every frame.
//!
//! Hardware backends sit behind the `microphone` (cpal) and `webcam` (nokhwa)
//! features; without them the hub runs on simulated devices.

pub mod audio;
pub mod calibration;
pub mod camera;
pub mod error;
pub mod hub;
pub mod settings;
pub mod shared;
pub mod telemetry;
pub mod tuning;
mod worker;

#[cfg(test)]
mod testing;

pub use calibration::{normalized_effort, BreathCalibration, CalibrationPhase};
pub use error::SensorError;
pub use hub::{SensorHub, SensorReader, SensorSnapshot};
pub use settings::{AudioConfig, SensorConfig, SettingsError, VideoConfig};
pub use shared::SensorStatus;
pub use tuning::{SensitivityControls, SensorTuning};
