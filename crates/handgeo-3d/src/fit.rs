use serde::{Deserialize, Serialize};

use crate::linalg::{cross_vec3, dot_product3, norm_vec3, sub_vec3};
use crate::plane::{CircleTarget, PlaneDescriptor};
use crate::utils;

/// Error types for the fitting module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FitError {
    /// Not enough points to define a plane.
    #[error("Plane fitting requires at least {required} points, got {actual}")]
    InsufficientPoints {
        /// Minimum number of points required.
        required: usize,
        /// Actual number of points provided.
        actual: usize,
    },

    /// A point has a NaN or infinite coordinate.
    #[error("Point {index} has a non-finite coordinate")]
    NonFinite {
        /// Index of the offending point.
        index: usize,
    },
}

/// Ratio between the second and first principal variance below which the
/// fitted plane is reported as degenerate.
const DEGENERATE_RATIO: f64 = 1e-12;

/// Result of fitting a plane to a point cloud with PCA.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneFit {
    /// Mean of the points.
    pub mean: [f64; 3],
    /// Principal directions sorted by decreasing variance, unit length.
    pub components: [[f64; 3]; 3],
    /// Variance of the points along each principal direction.
    pub explained_variance: [f64; 3],
}

impl PlaneFit {
    /// Unit normal of the fitted plane, `components[0] x components[1]`.
    pub fn normal(&self) -> [f64; 3] {
        self.components[2]
    }

    /// The plane spanned by the first two principal directions.
    pub fn descriptor(&self) -> PlaneDescriptor {
        PlaneDescriptor::new(self.mean, [self.components[0], self.components[1]])
    }

    /// Whether the points are (numerically) collinear or coincident, in which
    /// case the normal is arbitrary.
    pub fn is_degenerate(&self) -> bool {
        self.explained_variance[1] <= self.explained_variance[0] * DEGENERATE_RATIO
    }
}

/// Fit a plane to a set of points with PCA.
///
/// The principal directions are the singular vectors of the 3x3 covariance
/// matrix. Each of the first two directions is signed so that its largest
/// component is positive, and the third one is their cross product.
///
/// # Arguments
///
/// * `points` - At least three 3d points.
///
/// Example:
///
/// ```
/// use handgeo_3d::fit::fit_plane;
///
/// let points = vec![[0.0, 0.0, 1.0], [2.0, 0.0, 1.0], [0.0, 1.0, 1.0], [2.0, 1.0, 1.0]];
/// let fit = fit_plane(&points).unwrap();
/// assert!((fit.normal()[2].abs() - 1.0).abs() < 1e-9);
/// ```
pub fn fit_plane(points: &[[f64; 3]]) -> Result<PlaneFit, FitError> {
    if points.len() < 3 {
        return Err(FitError::InsufficientPoints {
            required: 3,
            actual: points.len(),
        });
    }
    if let Some(index) = points
        .iter()
        .position(|p| !p.iter().all(|v| v.is_finite()))
    {
        return Err(FitError::NonFinite { index });
    }

    let mean = centroid(points);
    let n = points.len() as f64;

    // covariance C = Σ (p - mean)(p - mean)^T / n
    let data = utils::points_to_faer_mat(points);
    let cov = faer::Mat::<f64>::from_fn(3, 3, |i, j| {
        let mut acc = 0.0;
        for r in 0..data.nrows() {
            acc += (data.read(r, i) - mean[i]) * (data.read(r, j) - mean[j]);
        }
        acc / n
    });

    let svd = cov.svd();
    let v = svd.v();

    let mut directions: Vec<([f64; 3], f64)> = (0..3)
        .map(|c| {
            let dir = [v.read(0, c), v.read(1, c), v.read(2, c)];
            let variance = points
                .iter()
                .map(|p| dot_product3(&sub_vec3(p, &mean), &dir).powi(2))
                .sum::<f64>()
                / n;
            (dir, variance)
        })
        .collect();
    directions.sort_by(|a, b| b.1.total_cmp(&a.1));

    let c0 = canonical_sign(directions[0].0);
    let c1 = canonical_sign(directions[1].0);
    let c2 = cross_vec3(&c0, &c1);

    let fit = PlaneFit {
        mean,
        components: [c0, c1, c2],
        explained_variance: [directions[0].1, directions[1].1, directions[2].1],
    };

    if fit.is_degenerate() {
        log::warn!(
            "Degenerate plane fit over {} points: variances {:?}",
            points.len(),
            fit.explained_variance
        );
    }

    Ok(fit)
}

/// Length of the closed polyline visiting `points` in order and returning to
/// the first one.
///
/// Returns 0 for fewer than two points.
pub fn loop_perimeter(points: &[[f64; 3]]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let open: f64 = points
        .windows(2)
        .map(|w| norm_vec3(&sub_vec3(&w[1], &w[0])))
        .sum();
    let closing = norm_vec3(&sub_vec3(&points[0], &points[points.len() - 1]));
    open + closing
}

/// Fit the circle target of an ordered loop of points.
///
/// The plane comes from [`fit_plane`] and the radius is the loop perimeter
/// divided by `2π`.
pub fn fit_circle(points: &[[f64; 3]]) -> Result<CircleTarget, FitError> {
    let fit = fit_plane(points)?;
    Ok(CircleTarget::from_perimeter(
        fit.mean,
        fit.normal(),
        loop_perimeter(points),
    ))
}

/// Mean of a non-empty set of points.
pub fn centroid(points: &[[f64; 3]]) -> [f64; 3] {
    let mut sum = [0.0; 3];
    for p in points {
        sum[0] += p[0];
        sum[1] += p[1];
        sum[2] += p[2];
    }
    let n = points.len() as f64;
    [sum[0] / n, sum[1] / n, sum[2] / n]
}

fn canonical_sign(dir: [f64; 3]) -> [f64; 3] {
    let mut max_index = 0;
    for i in 1..3 {
        if dir[i].abs() > dir[max_index].abs() {
            max_index = i;
        }
    }
    if dir[max_index] < 0.0 {
        [-dir[0], -dir[1], -dir[2]]
    } else {
        dir
    }
}
