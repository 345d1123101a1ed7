//! Breath envelope: noise-gated RMS, moving average and two-speed release

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Tuning constants for [`BreathFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BreathFilterConfig {
    /// Blocks with RMS at or below this are treated as silence
    pub noise_threshold: f32,
    /// Number of gated RMS values averaged together
    pub history_len: usize,
    /// Averaged RMS must exceed this to register as sustained breath
    pub activation_threshold: f32,
    /// Decay factor while input passes the gate but stays weak
    pub sustain_decay: f32,
    /// Decay factor on silence
    pub release_decay: f32,
    /// History is dropped once the envelope falls below this
    pub reset_floor: f32,
}

impl Default for BreathFilterConfig {
    fn default() -> Self {
        Self {
            noise_threshold: 0.05,
            history_len: 8,
            activation_threshold: 0.1,
            sustain_decay: 0.8,
            release_decay: 0.7,
            reset_floor: 0.001,
        }
    }
}

impl BreathFilterConfig {
    /// Clamp values into ranges the filter can work with
    pub fn sanitize(&mut self) {
        self.history_len = self.history_len.max(1);
        self.noise_threshold = self.noise_threshold.max(0.0);
        self.activation_threshold = self.activation_threshold.max(0.0);
        self.sustain_decay = self.sustain_decay.clamp(0.0, 1.0);
        self.release_decay = self.release_decay.clamp(0.0, 1.0);
        self.reset_floor = self.reset_floor.max(0.0);
    }
}

/// Root-mean-square magnitude of a block. Empty blocks read as silence.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Per-block breath envelope follower.
///
/// Only the audio callback mutates this; readers see the values it publishes.
#[derive(Debug, Clone)]
pub struct BreathFilter {
    config: BreathFilterConfig,
    history: VecDeque<f32>,
    raw: f32,
    smoothed: f32,
}

impl Default for BreathFilter {
    fn default() -> Self {
        Self::new(BreathFilterConfig::default())
    }
}

impl BreathFilter {
    pub fn new(mut config: BreathFilterConfig) -> Self {
        config.sanitize();
        Self {
            history: VecDeque::with_capacity(config.history_len),
            config,
            raw: 0.0,
            smoothed: 0.0,
        }
    }

    /// Feed one block of mono samples, returning the new smoothed intensity
    pub fn process(&mut self, samples: &[f32]) -> f32 {
        let level = rms(samples);
        self.push_level(level)
    }

    /// Advance the envelope with an already computed RMS level
    pub fn push_level(&mut self, level: f32) -> f32 {
        self.raw = level;

        // NaN fails this comparison and is handled as silence
        if level > self.config.noise_threshold {
            if self.history.len() >= self.config.history_len {
                self.history.pop_front();
            }
            self.history.push_back(level);

            let filtered = self.history.iter().sum::<f32>() / self.history.len() as f32;
            if filtered > self.config.activation_threshold {
                self.smoothed = filtered;
            } else {
                self.smoothed = (self.smoothed * self.config.sustain_decay).max(0.0);
            }
        } else {
            self.smoothed = (self.smoothed * self.config.release_decay).max(0.0);
            if self.smoothed < self.config.reset_floor {
                self.history.clear();
            }
        }

        self.smoothed
    }

    /// RMS of the most recent block
    pub fn raw(&self) -> f32 {
        self.raw
    }

    /// Current envelope value (never negative)
    pub fn smoothed(&self) -> f32 {
        self.smoothed
    }

    /// Gated levels currently averaged, oldest first
    pub fn history(&self) -> impl ExactSizeIterator<Item = f32> + '_ {
        self.history.iter().copied()
    }

    pub fn config(&self) -> &BreathFilterConfig {
        &self.config
    }

    /// Forget all state
    pub fn reset(&mut self) {
        self.history.clear();
        self.raw = 0.0;
        self.smoothed = 0.0;
    }
}
