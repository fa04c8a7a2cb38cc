use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::linalg::{matmul33, rotation_x, rotation_y, rotation_z, transform_points};

/// Random rotation about the x, y and z axes, each drawn uniformly within
/// `±max_degrees`, applied about the origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RandomRotation {
    /// Maximum absolute rotation per axis, in degrees.
    pub max_degrees: f64,
}

impl Default for RandomRotation {
    fn default() -> Self {
        Self { max_degrees: 15.0 }
    }
}

impl RandomRotation {
    /// Create a new random rotation with the given bound in degrees.
    pub fn new(max_degrees: f64) -> Self {
        Self { max_degrees }
    }

    /// Draw a rotation matrix `Rz * Ry * Rx`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> [[f64; 3]; 3] {
        let bound = self.max_degrees.abs().to_radians();
        if bound == 0.0 {
            return [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        }
        let ax = rng.random_range(-bound..=bound);
        let ay = rng.random_range(-bound..=bound);
        let az = rng.random_range(-bound..=bound);
        matmul33(&rotation_z(az), &matmul33(&rotation_y(ay), &rotation_x(ax)))
    }
}

/// Rotate points about the origin in place.
pub fn rotate_points_inplace(points: &mut [[f64; 3]], rotation: &[[f64; 3]; 3]) {
    let src = points.to_vec();
    transform_points(&src, rotation, &[0.0; 3], points);
}
