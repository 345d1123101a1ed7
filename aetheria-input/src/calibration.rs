//! Peak-breath calibration window

use std::time::{Duration, Instant};

/// Default length of the listening window
pub const DEFAULT_CALIBRATION_WINDOW: Duration = Duration::from_secs(4);

/// Peaks at or below this are too weak to calibrate against
const MIN_CALIBRATED_BREATH: f32 = 0.1;

/// Calibration progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    Idle,
    Listening,
    Done,
}

/// Records the strongest breath reading over a timed window
#[derive(Debug, Clone)]
pub struct BreathCalibration {
    window: Duration,
    phase: CalibrationPhase,
    started_at: Option<Instant>,
    peak: f32,
}

impl Default for BreathCalibration {
    fn default() -> Self {
        Self::new(DEFAULT_CALIBRATION_WINDOW)
    }
}

impl BreathCalibration {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            phase: CalibrationPhase::Idle,
            started_at: None,
            peak: 0.0,
        }
    }

    /// Start (or restart) listening at `now`
    pub fn begin(&mut self, now: Instant) {
        self.phase = CalibrationPhase::Listening;
        self.started_at = Some(now);
        self.peak = 0.0;
    }

    /// Record a reading taken at `now`.
    ///
    /// Readings inside the window update the peak; the first reading past the
    /// window ends it without being recorded.
    pub fn sample(&mut self, now: Instant, reading: f32) -> CalibrationPhase {
        let Some(started_at) = self.started_at else {
            return self.phase;
        };
        if self.phase != CalibrationPhase::Listening {
            return self.phase;
        }

        if now.saturating_duration_since(started_at) <= self.window {
            let reading = if reading.is_finite() { reading.max(0.0) } else { 0.0 };
            self.peak = self.peak.max(reading);
        } else {
            self.phase = CalibrationPhase::Done;
            tracing::info!("Breath calibration finished, peak {:.3}", self.peak);
        }
        self.phase
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    /// Highest reading seen so far
    pub fn peak(&self) -> f32 {
        self.peak
    }

    /// Time left in the window, `None` unless listening
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match (self.phase, self.started_at) {
            (CalibrationPhase::Listening, Some(started_at)) => {
                Some(self.window.saturating_sub(now.saturating_duration_since(started_at)))
            }
            _ => None,
        }
    }

    /// Calibrated maximum: the peak if it is strong enough, otherwise 1.0
    pub fn max_breath(&self) -> f32 {
        if self.peak > MIN_CALIBRATED_BREATH {
            self.peak
        } else {
            1.0
        }
    }
}

/// Breath reading as a fraction of the calibrated maximum
pub fn normalized_effort(reading: f32, max_breath: f32) -> f32 {
    if max_breath > MIN_CALIBRATED_BREATH {
        reading / max_breath
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_records_peak_within_window() {
        let start = Instant::now();
        let mut calibration = BreathCalibration::default();
        assert_eq!(calibration.phase(), CalibrationPhase::Idle);
        assert_eq!(calibration.sample(start, 5.0), CalibrationPhase::Idle);

        calibration.begin(start);
        calibration.sample(start + Duration::from_secs(1), 2.0);
        calibration.sample(start + Duration::from_secs(2), 7.5);
        calibration.sample(start + Duration::from_secs(3), 3.0);
        assert_eq!(calibration.sample(start + Duration::from_secs(4), 4.0), CalibrationPhase::Listening);
        assert_eq!(calibration.remaining(start + Duration::from_secs(3)), Some(Duration::from_secs(1)));

        let phase = calibration.sample(start + Duration::from_millis(4100), 50.0);
        assert_eq!(phase, CalibrationPhase::Done);
        assert_eq!(calibration.peak(), 7.5);
        assert_eq!(calibration.max_breath(), 7.5);
        assert_eq!(calibration.remaining(start), None);
    }

    #[test]
    fn test_weak_peak_falls_back_to_one() {
        let start = Instant::now();
        let mut calibration = BreathCalibration::new(Duration::from_secs(1));
        calibration.begin(start);
        calibration.sample(start, 0.05);
        calibration.sample(start, -3.0);
        calibration.sample(start, f32::NAN);
        calibration.sample(start + Duration::from_secs(2), 0.0);

        assert_eq!(calibration.peak(), 0.05);
        assert_eq!(calibration.max_breath(), 1.0);
    }

    #[test]
    fn test_begin_restarts_window() {
        let start = Instant::now();
        let mut calibration = BreathCalibration::new(Duration::from_secs(1));
        calibration.begin(start);
        calibration.sample(start, 9.0);
        calibration.sample(start + Duration::from_secs(2), 0.0);

        calibration.begin(start + Duration::from_secs(3));
        assert_eq!(calibration.phase(), CalibrationPhase::Listening);
        assert_eq!(calibration.peak(), 0.0);
    }

    #[test]
    fn test_normalized_effort() {
        assert_relative_eq!(normalized_effort(2.0, 8.0), 0.25);
        assert_eq!(normalized_effort(2.0, 0.1), 0.0);
        assert_eq!(normalized_effort(2.0, 0.0), 0.0);
    }
}
