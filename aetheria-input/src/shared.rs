//! Lock-free cells shared between acquisition threads and readers

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

/// An `f32` stored as raw bits in an `AtomicU32`.
///
/// Readers always observe a complete value written by some `store`, never a
/// torn mix of two writes.
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// Health of one acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SensorStatus {
    /// Loop not running (never started, or stopped cleanly)
    #[default]
    Stopped = 0,
    /// Loop spawned, device not yet open
    Starting = 1,
    /// Device open and delivering data
    Ok = 2,
    /// Device could not be opened; the loop has exited
    DeviceUnavailable = 3,
}

impl SensorStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SensorStatus::Starting,
            2 => SensorStatus::Ok,
            3 => SensorStatus::DeviceUnavailable,
            _ => SensorStatus::Stopped,
        }
    }

    /// Get display name
    pub fn name(&self) -> &'static str {
        match self {
            SensorStatus::Stopped => "Stopped",
            SensorStatus::Starting => "Starting",
            SensorStatus::Ok => "Ok",
            SensorStatus::DeviceUnavailable => "Device unavailable",
        }
    }

    /// True while the loop is expected to produce readings.
    pub fn is_live(&self) -> bool {
        matches!(self, SensorStatus::Starting | SensorStatus::Ok)
    }
}

impl std::fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Atomic holder for a [`SensorStatus`].
#[derive(Debug, Default)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new(status: SensorStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    pub fn get(&self) -> SensorStatus {
        SensorStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, status: SensorStatus) {
        self.0.store(status as u8, Ordering::Release);
    }
}
