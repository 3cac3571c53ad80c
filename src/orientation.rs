//! Gravity compensation using logged roll/pitch/yaw.
//!
//! The body-to-global rotation is composed intrinsically as
//! `R = R_z(yaw) · R_y(pitch) · R_x(roll)`. Gravity `(0, 0, g)` in the global
//! frame is resolved into the body frame with `Rᵀ` and subtracted from the
//! measured acceleration, leaving only the dynamic component.

use nalgebra::Vector3;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{AccelData, NormalizedSample, Orientation, Rotation, Sample, Vec3};

/// Body-to-global rotation for an orientation given in degrees.
pub fn body_to_global(orientation: &Orientation) -> Rotation {
    let roll = orientation.roll.to_radians();
    let pitch = orientation.pitch.to_radians();
    let yaw = orientation.yaw.to_radians();

    let r_x = Rotation::from_axis_angle(&Vector3::x_axis(), roll);
    let r_y = Rotation::from_axis_angle(&Vector3::y_axis(), pitch);
    let r_z = Rotation::from_axis_angle(&Vector3::z_axis(), yaw);

    r_z * r_y * r_x
}

/// Gravity as seen by the sensor in the given orientation.
pub fn gravity_in_body_frame(orientation: &Orientation, gravity: f64) -> Vec3 {
    let gravity_global = Vec3::new(0.0, 0.0, gravity);
    body_to_global(orientation).inverse_transform_vector(&gravity_global)
}

/// Subtract the orientation-resolved gravity from one sample's acceleration.
pub fn normalize_sample(sample: &Sample, gravity: f64) -> AccelData {
    let gravity_local = gravity_in_body_frame(&sample.orientation, gravity);
    AccelData::from(sample.accel.to_vec3() - gravity_local)
}

/// Gravity-compensate a batch. Any non-finite input is reported with its
/// index instead of leaking NaN downstream.
pub fn normalize_acceleration(
    samples: &[Sample],
    gravity: f64,
) -> PipelineResult<Vec<NormalizedSample>> {
    samples
        .iter()
        .enumerate()
        .map(|(index, sample)| {
            if !sample.orientation.is_finite() {
                return Err(PipelineError::MalformedSample {
                    index,
                    reason: format!(
                        "non-finite orientation (roll={}, pitch={}, yaw={})",
                        sample.orientation.roll, sample.orientation.pitch, sample.orientation.yaw
                    ),
                });
            }
            if !sample.accel.is_finite() {
                return Err(PipelineError::MalformedSample {
                    index,
                    reason: format!(
                        "non-finite acceleration ({}, {}, {})",
                        sample.accel.x, sample.accel.y, sample.accel.z
                    ),
                });
            }

            let accel_norm = normalize_sample(sample, gravity);
            if !accel_norm.is_finite() {
                return Err(PipelineError::MalformedSample {
                    index,
                    reason: "gravity compensation produced a non-finite value".to_string(),
                });
            }

            Ok(NormalizedSample {
                sample: sample.clone(),
                accel_norm,
            })
        })
        .collect()
}
