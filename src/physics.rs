//! Longitudinal-dynamics mass estimator
//! Infers vehicle mass from a known motor force and the measured acceleration
//! while the vehicle is moving.
//!
//! Model: F = m·(a + c_rr·g + g·sin θ) / k, solved for m, where k is the
//! equivalent mass factor covering drivetrain rotational inertia.
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::smoothing::{AdaptiveSmoother, SmoothingStrategy, WindowChoice};
use crate::stats::{self, ExpandingStats};
use crate::types::{NormalizedSample, Orientation};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MassEstimate {
    pub time: f64,
    pub incline_angle: f64,  // radians, sign-agnostic
    pub accel_smoothed: f64, // m/s²
    pub mass_estimate: f64,  // kg
    pub cumulative_mean: f64,
    pub cumulative_std: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MassEstimation {
    pub records: Vec<MassEstimate>,
    pub final_mass_estimate: f64, // median of records, kg
    pub window: WindowChoice,
    pub strategy: SmoothingStrategy,
    pub moving_samples: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VehicleModel {
    pub motor_force: f64,
    pub rolling_resistance_coefficient: f64,
    pub gravity: f64,
    pub equivalent_mass_factor: f64,
}

impl VehicleModel {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            motor_force: config.motor_force,
            rolling_resistance_coefficient: config.rolling_resistance_coefficient,
            gravity: config.gravity,
            equivalent_mass_factor: config.equivalent_mass_factor(),
        }
    }

    /// Mass implied by one (acceleration, incline) observation.
    pub fn mass_for(&self, accel: f64, incline_angle: f64) -> f64 {
        let resistance = self.rolling_resistance_coefficient * self.gravity;
        let grade = self.gravity * incline_angle.sin();
        self.motor_force / (accel + resistance + grade) * self.equivalent_mass_factor
    }
}

/// Combined tilt from roll and pitch: atan(√(tan²roll + tan²pitch)).
pub fn incline_angle(orientation: &Orientation) -> f64 {
    let tan_roll = orientation.roll.to_radians().tan();
    let tan_pitch = orientation.pitch.to_radians().tan();
    (tan_roll * tan_roll + tan_pitch * tan_pitch).sqrt().atan()
}

/// Running (mean, std) after each value.
pub fn convergence_trace(masses: &[f64]) -> Vec<(f64, f64)> {
    masses
        .iter()
        .scan(ExpandingStats::new(), |acc, &m| {
            acc.push(m);
            Some((acc.mean(), acc.std_dev()))
        })
        .collect()
}

/// Estimate vehicle mass from the moving samples selected by `mask`.
pub fn estimate_vehicle_mass(
    samples: &[NormalizedSample],
    mask: &[bool],
    config: &PipelineConfig,
) -> PipelineResult<MassEstimation> {
    if samples.is_empty() {
        return Err(PipelineError::EmptyBatch);
    }
    if mask.len() != samples.len() {
        return Err(PipelineError::Numerical(format!(
            "movement mask length {} does not match {} samples",
            mask.len(),
            samples.len()
        )));
    }

    let moving: Vec<&NormalizedSample> = samples
        .iter()
        .zip(mask)
        .filter_map(|(s, &m)| m.then_some(s))
        .collect();
    if moving.is_empty() {
        return Err(PipelineError::NoMovingPeriods);
    }
    log::info!("{} of {} samples while moving", moving.len(), samples.len());

    let times: Vec<f64> = moving.iter().map(|s| s.time()).collect();
    let magnitudes: Vec<f64> = moving.iter().map(|s| s.accel_norm_magnitude()).collect();

    let smoother = AdaptiveSmoother::from_config(config);
    let smoothed = smoother.smooth(&magnitudes, &times)?;
    log::info!(
        "Using adaptive window size: {} points ({:?})",
        smoothed.window.size,
        smoothed.window.policy
    );

    let model = VehicleModel::from_config(config);
    let accelerating: Vec<(f64, f64, f64, f64)> = moving
        .iter()
        .zip(&smoothed.values)
        .filter(|&(_, &accel)| accel > config.min_acceleration)
        .map(|(s, &accel)| {
            let incline = incline_angle(&s.sample.orientation);
            (s.time(), incline, accel, model.mass_for(accel, incline))
        })
        .collect();
    if accelerating.is_empty() {
        return Err(PipelineError::NoValidAccelerationEvents {
            min_acceleration: config.min_acceleration,
        });
    }

    let masses: Vec<f64> = accelerating.iter().map(|&(_, _, _, m)| m).collect();
    let trace = convergence_trace(&masses);
    let records: Vec<MassEstimate> = accelerating
        .iter()
        .zip(trace)
        .map(
            |(&(time, incline_angle, accel_smoothed, mass_estimate), (mean, std))| MassEstimate {
                time,
                incline_angle,
                accel_smoothed,
                mass_estimate,
                cumulative_mean: mean,
                cumulative_std: std,
            },
        )
        .collect();

    let final_mass_estimate = stats::median(&masses).ok_or_else(|| {
        PipelineError::Numerical("median of an empty estimate set".to_string())
    })?;
    log::info!(
        "Final mass estimate {:.1} kg from {} acceleration samples",
        final_mass_estimate,
        records.len()
    );

    Ok(MassEstimation {
        records,
        final_mass_estimate,
        window: smoothed.window,
        strategy: smoothed.strategy,
        moving_samples: moving.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccelData, Sample};
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn moving_sample(time: f64, accel: f64, roll: f64, pitch: f64) -> NormalizedSample {
        NormalizedSample {
            sample: Sample::new(
                time,
                AccelData::default(),
                Orientation::new(roll, pitch, 0.0),
            ),
            accel_norm: AccelData::new(accel, 0.0, 0.0),
        }
    }

    #[test]
    fn test_mass_closed_form_at_rest_on_flat() {
        let config = PipelineConfig::default();
        let model = VehicleModel::from_config(&config);
        let expected = config.motor_force
            / (config.rolling_resistance_coefficient * config.gravity)
            * config.equivalent_mass_factor();
        assert_relative_eq!(model.mass_for(0.0, 0.0), expected, epsilon = 1e-9);
        // 500 / 0.1962 * 1.1844
        assert_relative_eq!(model.mass_for(0.0, 0.0), 3018.348623853211, epsilon = 1e-6);
    }

    #[test]
    fn test_mass_decreases_with_acceleration_and_grade() {
        let model = VehicleModel::from_config(&PipelineConfig::default());
        let flat = model.mass_for(1.0, 0.0);
        assert!(model.mass_for(2.0, 0.0) < flat);
        assert!(model.mass_for(1.0, 5.0_f64.to_radians()) < flat);
    }

    #[test]
    fn test_incline_angle() {
        assert_abs_diff_eq!(incline_angle(&Orientation::new(0.0, 0.0, 90.0)), 0.0);
        assert_abs_diff_eq!(
            incline_angle(&Orientation::new(0.0, 10.0, 0.0)),
            10.0_f64.to_radians(),
            epsilon = 1e-12
        );
        // Sign-agnostic
        assert_abs_diff_eq!(
            incline_angle(&Orientation::new(-7.0, 0.0, 0.0)),
            incline_angle(&Orientation::new(7.0, 0.0, 0.0)),
            epsilon = 1e-12
        );
        // Combined tilt exceeds either component
        let combined = incline_angle(&Orientation::new(5.0, 5.0, 0.0));
        assert!(combined > 5.0_f64.to_radians());
    }

    #[test]
    fn test_convergence_constant_series() {
        let trace = convergence_trace(&[1200.0; 50]);
        for (mean, std) in trace {
            assert_relative_eq!(mean, 1200.0, epsilon = 1e-9);
            assert_abs_diff_eq!(std, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_convergence_bounded_variance() {
        // Deterministic noise in [1150, 1250]
        let masses: Vec<f64> = (0..2000)
            .map(|i| 1200.0 + 50.0 * ((i as f64) * 0.7).sin())
            .collect();
        let trace = convergence_trace(&masses);
        for &(mean, std) in &trace[1..] {
            assert!(mean > 1150.0 && mean < 1250.0);
            assert!(std <= 100.0, "std={std}");
        }
        let (_, late_std) = trace[trace.len() - 1];
        assert!(late_std < 40.0);
    }

    #[test]
    fn test_no_moving_periods() {
        let samples = vec![moving_sample(0.0, 1.0, 0.0, 0.0); 3];
        let mask = [false, false, false];
        let err = estimate_vehicle_mass(&samples, &mask, &PipelineConfig::default()).unwrap_err();
        assert_eq!(err, PipelineError::NoMovingPeriods);
    }

    #[test]
    fn test_no_valid_acceleration_events() {
        let samples: Vec<NormalizedSample> = (0..20)
            .map(|i| moving_sample(i as f64 * 0.1, 0.05, 0.0, 0.0))
            .collect();
        let mask = vec![true; samples.len()];
        let err = estimate_vehicle_mass(&samples, &mask, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NoValidAccelerationEvents { .. }
        ));
    }

    #[test]
    fn test_mask_length_mismatch() {
        let samples = vec![moving_sample(0.0, 1.0, 0.0, 0.0); 3];
        assert!(estimate_vehicle_mass(&samples, &[true], &PipelineConfig::default()).is_err());
    }

    #[test]
    fn test_constant_acceleration_run() {
        let config = PipelineConfig::default();
        let samples: Vec<NormalizedSample> = (0..100)
            .map(|i| moving_sample(i as f64 * 0.05, 1.5, 0.0, 3.0))
            .collect();
        let mask = vec![true; samples.len()];
        let result = estimate_vehicle_mass(&samples, &mask, &config).unwrap();

        assert_eq!(result.records.len(), 100);
        assert_eq!(result.moving_samples, 100);
        assert_eq!(result.window.size, 21);

        let expected = VehicleModel::from_config(&config).mass_for(1.5, 3.0_f64.to_radians());
        assert_relative_eq!(result.final_mass_estimate, expected, epsilon = 1e-6);
        for record in &result.records {
            assert_relative_eq!(record.accel_smoothed, 1.5, epsilon = 1e-9);
            assert_abs_diff_eq!(record.cumulative_std, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_only_masked_samples_contribute() {
        let config = PipelineConfig::default();
        let mut samples: Vec<NormalizedSample> = (0..40)
            .map(|i| moving_sample(i as f64 * 0.1, 2.0, 0.0, 0.0))
            .collect();
        // Stationary tail with a spike that must not leak in
        samples.extend((40..60).map(|i| moving_sample(i as f64 * 0.1, 50.0, 0.0, 0.0)));
        let mask: Vec<bool> = (0..60).map(|i| i < 40).collect();

        let result = estimate_vehicle_mass(&samples, &mask, &config).unwrap();
        assert_eq!(result.moving_samples, 40);
        assert!(result.records.iter().all(|r| r.time < 4.0));
        assert!(result
            .records
            .iter()
            .all(|r| (r.accel_smoothed - 2.0).abs() < 1e-9));
    }
}
