//! Motion classification for the mass path.
//!
//! Samples carrying a speed reading are judged by speed; the rest fall back
//! to the gravity-compensated acceleration magnitude. The raw mask is then
//! dilated by one sample on each side so the ramp into and out of a motion
//! burst is kept.

use crate::config::PipelineConfig;
use crate::types::NormalizedSample;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MovementThresholds {
    pub min_moving_speed: f64,   // m/s
    pub motion_accel_floor: f64, // m/s²
}

impl MovementThresholds {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            min_moving_speed: config.min_moving_speed,
            motion_accel_floor: config.motion_accel_floor,
        }
    }

    pub fn is_moving(&self, sample: &NormalizedSample) -> bool {
        match sample.sample.speed {
            Some(speed) => speed > self.min_moving_speed,
            None => sample.accel_norm_magnitude() > self.motion_accel_floor,
        }
    }
}

/// Widen a mask by one element in each direction.
pub fn dilate(mask: &[bool]) -> Vec<bool> {
    let n = mask.len();
    (0..n)
        .map(|i| {
            mask[i] || (i > 0 && mask[i - 1]) || (i + 1 < n && mask[i + 1])
        })
        .collect()
}

/// Movement mask aligned with `samples`.
pub fn movement_mask(samples: &[NormalizedSample], thresholds: &MovementThresholds) -> Vec<bool> {
    let raw: Vec<bool> = samples.iter().map(|s| thresholds.is_moving(s)).collect();
    let mask = dilate(&raw);
    log::debug!(
        "Movement mask: {} raw, {} after padding, of {} samples",
        raw.iter().filter(|&&m| m).count(),
        mask.iter().filter(|&&m| m).count(),
        samples.len()
    );
    mask
}
