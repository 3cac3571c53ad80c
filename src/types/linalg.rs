//! Linear algebra type aliases
//!
//! Fixed-size nalgebra types for the orientation transform and the
//! local polynomial fits used by the smoother.

use nalgebra::{Rotation3, SMatrix, SVector, Vector3};

// ===== Body/global frame vectors =====
pub type Vec3 = Vector3<f64>;
pub type Rotation = Rotation3<f64>;

// ===== Local polynomial regression =====
pub const POLY_ORDER: usize = 2;
pub const POLY_COEFFS: usize = POLY_ORDER + 1; // a0 + a1·x + a2·x²

pub type PolyCoeffs = SVector<f64, POLY_COEFFS>;
pub type NormalMatrix = SMatrix<f64, POLY_COEFFS, POLY_COEFFS>; // XᵀX
