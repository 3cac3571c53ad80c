pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// Roll/pitch/yaw in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Orientation {
    pub fn new(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self { roll, pitch, yaw }
    }

    pub fn is_finite(&self) -> bool {
        self.roll.is_finite() && self.pitch.is_finite() && self.yaw.is_finite()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelData {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AccelData {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

impl From<Vec3> for AccelData {
    fn from(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
}

/// One telemetry row: seconds since start, body-frame acceleration (m/s²),
/// orientation, and the optional speed/GPS channels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub accel: AccelData,
    pub orientation: Orientation,
    pub speed: Option<f64>, // m/s
    pub position: Option<GpsFix>,
}

impl Sample {
    pub fn new(time: f64, accel: AccelData, orientation: Orientation) -> Self {
        Self {
            time,
            accel,
            orientation,
            speed: None,
            position: None,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }
}

/// A sample with gravity removed from its acceleration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSample {
    pub sample: Sample,
    pub accel_norm: AccelData,
}

impl NormalizedSample {
    pub fn time(&self) -> f64 {
        self.sample.time
    }

    pub fn accel_norm_magnitude(&self) -> f64 {
        self.accel_norm.magnitude()
    }
}
