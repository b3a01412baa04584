//! Player configuration: stream sizes, detector thresholds and actuator
//! control, loaded from ~/.peachy/player.yaml.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::drip::DetectorSettings;
use crate::error::{ConfigError, Result};

/// Session settings for the cued player and the drip listener.
///
/// Every field is optional in the YAML file; missing fields take their
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlayerConfig {
    /// Microphone sampling rate in Hz.
    pub input_sample_rate: u32,
    /// Distance below full scale at which a sample counts as a drip.
    pub threshold_margin: u16,
    /// Quiet time that ends a drip.
    pub release_ms: u32,
    /// Idle sleep between scheduling ticks.
    pub tick_ms: u64,
    pub output_buffer_frames: usize,
    pub input_buffer_samples: usize,
    /// Drips ahead of target before the actuator is told to stop.
    pub actuator_dead_band: f64,
    pub actuator_baud_rate: u32,
    /// Minimum spacing of repeated identical actuator commands.
    pub actuator_repeat_ms: u64,
    /// A sublayer looping longer than this is reported as slow.
    pub slow_sublayer_secs: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 48000,
            threshold_margin: 400,
            release_ms: 6,
            tick_ms: 10,
            output_buffer_frames: 11025,
            input_buffer_samples: 48000,
            actuator_dead_band: 2.0,
            actuator_baud_rate: 9600,
            actuator_repeat_ms: 1000,
            slow_sublayer_secs: 30.0,
        }
    }
}

impl PlayerConfig {
    /// Standard path (~/.peachy/player.yaml).
    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::home_dir()?.join(".peachy").join("player.yaml"))
    }

    /// Load config from the standard path.
    /// Returns None if the file doesn't exist or doesn't parse.
    pub fn load() -> Option<Self> {
        let path = Self::default_path()?;
        let content = std::fs::read_to_string(path).ok()?;
        match Self::from_yaml(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("ignoring ~/.peachy/player.yaml: {e}");
                None
            }
        }
    }

    /// Load config from an explicit path. Unlike [`load`](Self::load), a
    /// missing or malformed file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml(&content)?)
    }

    pub fn from_yaml(content: &str) -> std::result::Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (field, value) in [
            ("input_sample_rate", self.input_sample_rate as f64),
            ("tick_ms", self.tick_ms as f64),
            ("output_buffer_frames", self.output_buffer_frames as f64),
            ("input_buffer_samples", self.input_buffer_samples as f64),
            ("actuator_baud_rate", self.actuator_baud_rate as f64),
            ("slow_sublayer_secs", self.slow_sublayer_secs),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::NotPositive { field, value });
            }
        }
        if !(self.actuator_dead_band >= 0.0) {
            return Err(ConfigError::NotPositive {
                field: "actuator_dead_band",
                value: self.actuator_dead_band,
            });
        }
        Ok(())
    }

    pub fn detector_settings(&self, drips_per_height: f64) -> DetectorSettings {
        DetectorSettings {
            sampling_rate: self.input_sample_rate,
            threshold_margin: self.threshold_margin,
            release_ms: self.release_ms,
            drips_per_height,
        }
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn actuator_repeat_interval(&self) -> Duration {
        Duration::from_millis(self.actuator_repeat_ms)
    }

    pub fn slow_sublayer(&self) -> Duration {
        Duration::from_secs_f64(self.slow_sublayer_secs)
    }
}
