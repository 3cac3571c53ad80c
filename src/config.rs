use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

pub const STANDARD_GRAVITY: f64 = 9.81; // m/s²

/// Tunable constants for the whole pipeline.
///
/// Every field has a default matching the logger's reference vehicle, and a
/// JSON config file may override any subset of them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // Crash detection
    pub small_crash_threshold: f64, // m/s²
    pub large_crash_threshold: f64, // m/s²
    pub cooldown_time: f64,         // seconds

    // Vehicle model
    pub motor_force: f64, // N
    pub rolling_resistance_coefficient: f64,
    pub gravity: f64,      // m/s²
    pub wheel_radius: f64, // feeds the equivalent mass factor
    pub min_acceleration: f64, // m/s²

    // Smoothing window
    pub min_window_size: usize,
    pub max_window_size: usize,
    pub target_window_ratio: f64,
    pub target_window_seconds: f64,

    // Movement detection
    pub min_moving_speed: f64,   // m/s
    pub motion_accel_floor: f64, // m/s²
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            small_crash_threshold: 10.0 * STANDARD_GRAVITY,
            large_crash_threshold: 30.0 * STANDARD_GRAVITY,
            cooldown_time: 2.0,
            motor_force: 500.0,
            rolling_resistance_coefficient: 0.02,
            gravity: STANDARD_GRAVITY,
            wheel_radius: 7.6,
            min_acceleration: 0.2,
            min_window_size: 5,
            max_window_size: 50,
            target_window_ratio: 0.1,
            target_window_seconds: 1.0,
            min_moving_speed: 0.5,
            motion_accel_floor: 0.5,
        }
    }
}

impl PipelineConfig {
    /// Load a config from JSON; missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Correction for drivetrain rotational inertia.
    pub fn equivalent_mass_factor(&self) -> f64 {
        1.04 + 0.0025 * self.wheel_radius * self.wheel_radius
    }

    pub fn validate(&self) -> PipelineResult<()> {
        let positive = [
            ("small_crash_threshold", self.small_crash_threshold),
            ("large_crash_threshold", self.large_crash_threshold),
            ("motor_force", self.motor_force),
            ("gravity", self.gravity),
            ("target_window_ratio", self.target_window_ratio),
            ("target_window_seconds", self.target_window_seconds),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be positive and finite (got {value})"
                )));
            }
        }

        let non_negative = [
            ("cooldown_time", self.cooldown_time),
            (
                "rolling_resistance_coefficient",
                self.rolling_resistance_coefficient,
            ),
            ("wheel_radius", self.wheel_radius),
            ("min_acceleration", self.min_acceleration),
            ("min_moving_speed", self.min_moving_speed),
            ("motion_accel_floor", self.motion_accel_floor),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be non-negative and finite (got {value})"
                )));
            }
        }

        if self.large_crash_threshold <= self.small_crash_threshold {
            return Err(PipelineError::InvalidConfig(format!(
                "large_crash_threshold ({}) must exceed small_crash_threshold ({})",
                self.large_crash_threshold, self.small_crash_threshold
            )));
        }

        // Degree-2 fit needs at least three points
        if self.min_window_size < 3 {
            return Err(PipelineError::InvalidConfig(format!(
                "min_window_size must be at least 3 (got {})",
                self.min_window_size
            )));
        }
        if self.max_window_size < self.min_window_size {
            return Err(PipelineError::InvalidConfig(format!(
                "max_window_size ({}) is smaller than min_window_size ({})",
                self.max_window_size, self.min_window_size
            )));
        }
        if self.min_window_size == self.max_window_size && self.min_window_size % 2 == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "window range [{0}, {0}] contains no odd size",
                self.min_window_size
            )));
        }

        Ok(())
    }
}
