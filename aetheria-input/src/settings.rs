//! Sensor configuration
//!
//! Handles loading/saving of the JSON sensor profile and keeps every tunable
//! inside the range the capture loops can work with.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::audio::{AudioRequest, BreathFilterConfig, DEFAULT_BLOCK_SIZE, DEFAULT_BREATH_MULTIPLIER, DEFAULT_SAMPLE_RATE};
use crate::camera::{MotionConfig, DEFAULT_MOTION_THRESHOLD, DEFAULT_RETRY_DELAY};

/// Microphone settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioConfig {
    /// Input device name; `None` selects the system default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub sample_rate: u32,
    /// Mono samples per delivered block
    pub block_size: usize,
    /// Gain applied to the envelope at read time
    pub breath_multiplier: f32,
    pub filter: BreathFilterConfig,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            breath_multiplier: DEFAULT_BREATH_MULTIPLIER,
            filter: BreathFilterConfig::default(),
        }
    }
}

impl AudioConfig {
    pub fn request(&self) -> AudioRequest {
        AudioRequest {
            device: self.device.clone(),
            sample_rate: self.sample_rate,
            block_size: self.block_size,
        }
    }
}

/// Camera settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoConfig {
    pub camera_index: u32,
    /// Intensity above which motion counts as detected
    pub motion_threshold: f32,
    /// Pause after a failed frame read, in milliseconds
    pub retry_delay_ms: u64,
    pub motion: MotionConfig,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            motion_threshold: DEFAULT_MOTION_THRESHOLD,
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
            motion: MotionConfig::default(),
        }
    }
}

impl VideoConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn default_shutdown_timeout_ms() -> u64 {
    2000
}

/// Everything needed to build a [`SensorHub`](crate::SensorHub)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub video: VideoConfig,
    /// Upper bound on waiting for the capture threads at shutdown
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            video: VideoConfig::default(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl SensorConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Force every value into its usable range
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        if self.audio.sample_rate == 0 {
            self.audio.sample_rate = defaults.audio.sample_rate;
        }
        if self.audio.block_size == 0 {
            self.audio.block_size = defaults.audio.block_size;
        }
        if !self.audio.breath_multiplier.is_finite() || self.audio.breath_multiplier < 0.0 {
            self.audio.breath_multiplier = defaults.audio.breath_multiplier;
        }
        self.audio.filter.sanitize();

        self.video.motion.sanitize();
        self.video.motion_threshold = if self.video.motion_threshold.is_finite() {
            self.video.motion_threshold.clamp(0.0, self.video.motion.max_intensity)
        } else {
            defaults.video.motion_threshold
        };
    }

    /// Load settings from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&contents)?;
        config.sanitize();
        Ok(config)
    }

    /// Save settings to a JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Default profile location
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("Aetheria");
            p.push("sensors.json");
            p
        })
    }

    /// Load the profile from the config directory, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring unreadable sensor config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save the profile to the config directory
    pub fn save(&self) -> Result<(), SettingsError> {
        let Some(path) = Self::config_path() else {
            return Err(SettingsError::NoConfigDir);
        };
        self.save_to_file(&path)
    }
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Could not find config directory")]
    NoConfigDir,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("aetheria-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn test_default_settings() {
        let config = SensorConfig::default();
        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.audio.block_size, 1024);
        assert_eq!(config.audio.breath_multiplier, 50.0);
        assert_eq!(config.video.camera_index, 0);
        assert_eq!(config.video.motion_threshold, 30.0);
        assert_eq!(config.video.motion.blur_kernel, 21);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SensorConfig =
            serde_json::from_str(r#"{ "audio": { "device": "USB Mic", "breathMultiplier": 120.0 } }"#).unwrap();
        assert_eq!(config.audio.device.as_deref(), Some("USB Mic"));
        assert_eq!(config.audio.breath_multiplier, 120.0);
        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.video, VideoConfig::default());
        assert_eq!(config.shutdown_timeout_ms, 2000);
    }

    #[test]
    fn test_sanitize_clamps_values() {
        let mut config = SensorConfig::default();
        config.audio.sample_rate = 0;
        config.audio.block_size = 0;
        config.audio.breath_multiplier = -4.0;
        config.audio.filter.history_len = 0;
        config.video.motion_threshold = 250.0;
        config.video.motion.blur_kernel = 8;
        config.sanitize();

        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.audio.block_size, 1024);
        assert_eq!(config.audio.breath_multiplier, 50.0);
        assert_eq!(config.audio.filter.history_len, 1);
        assert_eq!(config.video.motion_threshold, 100.0);
        assert_eq!(config.video.motion.blur_kernel, 9);
    }

    #[test]
    fn test_save_and_load_file() {
        let path = temp_path("settings");
        let mut config = SensorConfig::default();
        config.audio.device = Some("Line In".to_string());
        config.video.camera_index = 2;
        config.video.motion_threshold = 45.0;

        config.save_to_file(&path).unwrap();
        let loaded = SensorConfig::load_from_file(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_reports_malformed_json() {
        let path = temp_path("malformed");
        fs::write(&path, "{ not json").unwrap();
        let result = SensorConfig::load_from_file(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(SettingsError::Json(_))));
        assert!(matches!(
            SensorConfig::load_from_file(&temp_path("missing")),
            Err(SettingsError::Io(_))
        ));
    }

    #[test]
    fn test_request_mirrors_audio_config() {
        let audio = AudioConfig {
            device: Some("Mic".to_string()),
            sample_rate: 48_000,
            block_size: 512,
            ..Default::default()
        };
        let request = audio.request();
        assert_eq!(request.device.as_deref(), Some("Mic"));
        assert_eq!(request.sample_rate, 48_000);
        assert_eq!(request.block_size, 512);
    }
}
