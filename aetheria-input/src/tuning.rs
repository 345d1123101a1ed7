//! Runtime sensitivity handles

use std::sync::Arc;

use crate::audio::BreathState;
use crate::camera::MotionState;

/// Cloneable handle for adjusting the hub's tunables from any thread
#[derive(Clone)]
pub struct SensorTuning {
    breath: Arc<BreathState>,
    motion: Arc<MotionState>,
}

impl SensorTuning {
    pub(crate) fn new(breath: Arc<BreathState>, motion: Arc<MotionState>) -> Self {
        Self { breath, motion }
    }

    /// Applies from the next breath read
    pub fn set_breath_multiplier(&self, multiplier: f32) {
        self.breath.set_multiplier(multiplier);
    }

    /// Applies from the next processed frame
    pub fn set_motion_threshold(&self, threshold: f32) {
        self.motion.set_threshold(threshold);
    }

    pub fn breath_multiplier(&self) -> f32 {
        self.breath.multiplier()
    }

    pub fn motion_threshold(&self) -> f32 {
        self.motion.threshold()
    }
}

/// Stepwise sensitivity adjustment for the diagnostic view.
///
/// Values start at their own defaults and are only pushed to the hub when
/// stepped or when [`SensitivityControls::apply`] is called.
pub struct SensitivityControls {
    tuning: SensorTuning,
    multiplier: f32,
    threshold: f32,
}

impl SensitivityControls {
    pub const MULTIPLIER_START: f32 = 100.0;
    pub const MULTIPLIER_STEP: f32 = 10.0;
    pub const MULTIPLIER_MIN: f32 = 10.0;
    pub const MULTIPLIER_MAX: f32 = 500.0;

    pub const THRESHOLD_START: f32 = 30.0;
    pub const THRESHOLD_STEP: f32 = 5.0;
    pub const THRESHOLD_MIN: f32 = 5.0;
    pub const THRESHOLD_MAX: f32 = 100.0;

    pub fn new(tuning: SensorTuning) -> Self {
        Self {
            tuning,
            multiplier: Self::MULTIPLIER_START,
            threshold: Self::THRESHOLD_START,
        }
    }

    /// Start from given values instead of the defaults, clamped to range
    pub fn with_values(tuning: SensorTuning, multiplier: f32, threshold: f32) -> Self {
        Self {
            tuning,
            multiplier: multiplier.clamp(Self::MULTIPLIER_MIN, Self::MULTIPLIER_MAX),
            threshold: threshold.clamp(Self::THRESHOLD_MIN, Self::THRESHOLD_MAX),
        }
    }

    pub fn multiplier(&self) -> f32 {
        self.multiplier
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Push both current values to the hub
    pub fn apply(&self) {
        self.tuning.set_breath_multiplier(self.multiplier);
        self.tuning.set_motion_threshold(self.threshold);
    }

    pub fn increase_multiplier(&mut self) -> f32 {
        self.step_multiplier(Self::MULTIPLIER_STEP)
    }

    pub fn decrease_multiplier(&mut self) -> f32 {
        self.step_multiplier(-Self::MULTIPLIER_STEP)
    }

    pub fn increase_threshold(&mut self) -> f32 {
        self.step_threshold(Self::THRESHOLD_STEP)
    }

    pub fn decrease_threshold(&mut self) -> f32 {
        self.step_threshold(-Self::THRESHOLD_STEP)
    }

    fn step_multiplier(&mut self, delta: f32) -> f32 {
        self.multiplier = (self.multiplier + delta).clamp(Self::MULTIPLIER_MIN, Self::MULTIPLIER_MAX);
        self.tuning.set_breath_multiplier(self.multiplier);
        self.multiplier
    }

    fn step_threshold(&mut self, delta: f32) -> f32 {
        self.threshold = (self.threshold + delta).clamp(Self::THRESHOLD_MIN, Self::THRESHOLD_MAX);
        self.tuning.set_motion_threshold(self.threshold);
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::BreathFilterConfig;
    use crate::camera::MotionConfig;

    fn tuning() -> SensorTuning {
        SensorTuning::new(
            Arc::new(BreathState::new(BreathFilterConfig::default(), 50.0)),
            Arc::new(MotionState::new(MotionConfig::default(), 30.0)),
        )
    }

    #[test]
    fn test_tuning_clones_share_state() {
        let tuning = tuning();
        let other = tuning.clone();
        other.set_breath_multiplier(75.0);
        other.set_motion_threshold(12.0);
        assert_eq!(tuning.breath_multiplier(), 75.0);
        assert_eq!(tuning.motion_threshold(), 12.0);
    }

    #[test]
    fn test_values_are_written_only_when_stepped() {
        let tuning = tuning();
        let mut controls = SensitivityControls::new(tuning.clone());
        assert_eq!(controls.multiplier(), 100.0);
        assert_eq!(tuning.breath_multiplier(), 50.0);

        assert_eq!(controls.increase_multiplier(), 110.0);
        assert_eq!(tuning.breath_multiplier(), 110.0);
        assert_eq!(controls.decrease_threshold(), 25.0);
        assert_eq!(tuning.motion_threshold(), 25.0);
    }

    #[test]
    fn test_multiplier_stays_in_range() {
        let mut controls = SensitivityControls::new(tuning());
        for _ in 0..100 {
            controls.increase_multiplier();
        }
        assert_eq!(controls.multiplier(), 500.0);
        for _ in 0..100 {
            controls.decrease_multiplier();
        }
        assert_eq!(controls.multiplier(), 10.0);
    }

    #[test]
    fn test_threshold_stays_in_range() {
        let tuning = tuning();
        let mut controls = SensitivityControls::new(tuning.clone());
        for _ in 0..30 {
            controls.increase_threshold();
        }
        assert_eq!(controls.threshold(), 100.0);
        for _ in 0..30 {
            controls.decrease_threshold();
        }
        assert_eq!(controls.threshold(), 5.0);
        assert_eq!(tuning.motion_threshold(), 5.0);
    }

    #[test]
    fn test_with_values_clamps_start() {
        let mut controls = SensitivityControls::with_values(tuning(), 50.0, 300.0);
        assert_eq!(controls.multiplier(), 50.0);
        assert_eq!(controls.threshold(), 100.0);
        assert_eq!(controls.decrease_multiplier(), 40.0);
    }

    #[test]
    fn test_apply_pushes_both_values() {
        let tuning = tuning();
        SensitivityControls::new(tuning.clone()).apply();
        assert_eq!(tuning.breath_multiplier(), 100.0);
        assert_eq!(tuning.motion_threshold(), 30.0);
    }
}
