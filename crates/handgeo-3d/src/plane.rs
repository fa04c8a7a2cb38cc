use serde::{Deserialize, Serialize};

use crate::linalg::{
    cross_vec3, dot_product3, mat33_mul_vec3, normalize_vec3, scale_vec3, sub_vec3,
};

/// A plane given by a mean point and two spanning vectors.
///
/// The spanning vectors are neither required to be unit length nor
/// orthogonal; that is up to whoever produced them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneDescriptor {
    /// A point on the plane, usually the mean of the fitted points.
    pub mean: [f64; 3],
    /// Two vectors spanning the plane.
    pub components: [[f64; 3]; 2],
}

impl PlaneDescriptor {
    /// Create a new plane descriptor.
    pub fn new(mean: [f64; 3], components: [[f64; 3]; 2]) -> Self {
        Self { mean, components }
    }

    /// The plane normal `components[0] x components[1]`, not normalized.
    #[inline]
    pub fn normal(&self) -> [f64; 3] {
        cross_vec3(&self.components[0], &self.components[1])
    }

    /// Signed distance of `point` along the (unnormalized) normal.
    ///
    /// Equals the euclidean distance when the spanning vectors are orthonormal.
    #[inline]
    pub fn signed_distance(&self, point: &[f64; 3]) -> f64 {
        dot_product3(&sub_vec3(point, &self.mean), &self.normal())
    }
}

/// A circle embedded in 3d space: center, plane normal and radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleTarget {
    /// Center of the circle.
    pub mean: [f64; 3],
    /// Normal of the plane containing the circle. Need not be unit length.
    pub normal: [f64; 3],
    /// Radius of the circle.
    pub radius: f64,
}

impl CircleTarget {
    /// Create a new circle target.
    pub fn new(mean: [f64; 3], normal: [f64; 3], radius: f64) -> Self {
        Self {
            mean,
            normal,
            radius,
        }
    }

    /// Create a circle target whose radius is `perimeter / 2π`.
    ///
    /// Example:
    ///
    /// ```
    /// use handgeo_3d::plane::CircleTarget;
    ///
    /// let target = CircleTarget::from_perimeter([0.0; 3], [0.0, 0.0, 1.0], 2.0 * std::f64::consts::PI);
    /// assert!((target.radius - 1.0).abs() < 1e-12);
    /// ```
    pub fn from_perimeter(mean: [f64; 3], normal: [f64; 3], perimeter: f64) -> Self {
        Self::new(mean, normal, perimeter / (2.0 * std::f64::consts::PI))
    }

    /// Build the in-plane coordinate frame of the circle.
    pub fn frame(&self) -> PlaneFrame {
        PlaneFrame::new(self.mean, &self.normal)
    }

    /// Apply a rotation about the origin to the circle.
    pub fn rotated(&self, rotation: &[[f64; 3]; 3]) -> Self {
        Self {
            mean: mat33_mul_vec3(rotation, &self.mean),
            normal: mat33_mul_vec3(rotation, &self.normal),
            radius: self.radius,
        }
    }
}

/// Coordinates of a point relative to a [`PlaneFrame`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneCoords {
    /// Signed distance along the unit normal.
    pub height: f64,
    /// Coordinate along the first in-plane axis.
    pub x: f64,
    /// Coordinate along the second in-plane axis.
    pub y: f64,
}

impl PlaneCoords {
    /// Distance from the frame origin within the plane.
    #[inline]
    pub fn radius(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Polar angle within the plane, in `(-π, π]`.
    #[inline]
    pub fn angle(&self) -> f64 {
        self.y.atan2(self.x)
    }
}

/// A right-handed orthonormal frame `(u, v, n)` anchored at a point of a plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneFrame {
    /// Origin of the frame.
    pub origin: [f64; 3],
    /// First in-plane axis.
    pub u: [f64; 3],
    /// Second in-plane axis, `n x u`.
    pub v: [f64; 3],
    /// Unit normal.
    pub n: [f64; 3],
}

impl PlaneFrame {
    /// Build a frame from an origin and a (not necessarily unit) normal.
    ///
    /// The first in-plane axis is the projection of the coordinate axis least
    /// aligned with the normal, so the frame only depends on the normal. A zero
    /// normal produces NaN axes.
    pub fn new(origin: [f64; 3], normal: &[f64; 3]) -> Self {
        let n = normalize_vec3(normal);

        let mut axis_index = 0;
        for i in 1..3 {
            if n[i].abs() < n[axis_index].abs() {
                axis_index = i;
            }
        }
        let mut axis = [0.0; 3];
        axis[axis_index] = 1.0;

        let u = normalize_vec3(&sub_vec3(&axis, &scale_vec3(&n, n[axis_index])));
        let v = cross_vec3(&n, &u);

        Self { origin, u, v, n }
    }

    /// Express `point` in this frame.
    #[inline]
    pub fn coords(&self, point: &[f64; 3]) -> PlaneCoords {
        let d = sub_vec3(point, &self.origin);
        PlaneCoords {
            height: dot_product3(&d, &self.n),
            x: dot_product3(&d, &self.u),
            y: dot_product3(&d, &self.v),
        }
    }

    /// Map frame coordinates back to a 3d point.
    #[inline]
    pub fn point(&self, coords: &PlaneCoords) -> [f64; 3] {
        let mut p = self.origin;
        for k in 0..3 {
            p[k] += coords.x * self.u[k] + coords.y * self.v[k] + coords.height * self.n[k];
        }
        p
    }
}
