use handgeo_3d::{linalg::scale_vec3, PlaneDescriptor, PointBatch};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{check_descriptors, LossError, LossOutput, Reduction};

/// Sum of squared signed distances of `points` to `plane`.
///
/// The distance is measured along `components[0] x components[1]` without
/// normalizing it, so the result is only a euclidean distance when the plane
/// basis is orthonormal. A degenerate basis gives a near-zero normal and hence
/// a near-zero loss regardless of the points.
///
/// Example:
///
/// ```
/// use handgeo_3d::PlaneDescriptor;
/// use handgeo_loss::plane_fit_error;
///
/// let plane = PlaneDescriptor::new([0.0; 3], [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
/// let err = plane_fit_error(&[[1.0, 0.0, 0.5], [3.0, 2.0, 0.0]], &plane);
/// assert_eq!(err, 0.25);
/// ```
pub fn plane_fit_error(points: &[[f64; 3]], plane: &PlaneDescriptor) -> f64 {
    points
        .iter()
        .map(|p| {
            let distance = plane.signed_distance(p);
            distance * distance
        })
        .sum()
}

/// Plane fitting loss over a batch.
///
/// Each item is scored with [`plane_fit_error`] against its own plane and
/// multiplied by `scale`. The scale exists to bring losses over small units
/// (e.g. meters) in line with other loss terms; historically `1e13` was used,
/// see [`PlaneFitLoss::LEGACY_SCALE`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneFitLoss {
    /// Coefficient applied to every per-item error.
    pub scale: f64,
    /// How per-item losses are combined.
    pub reduction: Reduction,
}

impl Default for PlaneFitLoss {
    fn default() -> Self {
        Self {
            scale: 1.0,
            reduction: Reduction::Sum,
        }
    }
}

impl PlaneFitLoss {
    /// Scale coefficient used by the first training runs on meter-scale meshes.
    pub const LEGACY_SCALE: f64 = 1e13;

    /// Create a new loss with the given scale and sum reduction.
    pub fn new(scale: f64) -> Self {
        Self {
            scale,
            ..Default::default()
        }
    }

    /// Set the reduction.
    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }

    /// Evaluate the loss.
    ///
    /// # Arguments
    ///
    /// * `points` - The points to score, one item per plane.
    /// * `planes` - The plane of each batch item.
    pub fn forward(
        &self,
        points: &PointBatch,
        planes: &[PlaneDescriptor],
    ) -> Result<LossOutput, LossError> {
        check_descriptors(points.batch_size(), planes.len())?;

        let per_item = planes
            .par_iter()
            .enumerate()
            .map(|(i, plane)| self.scale * plane_fit_error(points.item(i), plane))
            .collect();

        Ok(LossOutput::new(per_item, self.reduction))
    }

    /// Gradient of the reduced loss with respect to every point.
    pub fn backward(
        &self,
        points: &PointBatch,
        planes: &[PlaneDescriptor],
    ) -> Result<PointBatch, LossError> {
        check_descriptors(points.batch_size(), planes.len())?;

        let factor = 2.0 * self.scale * self.reduction.gradient_factor(planes.len());
        let mut grad = PointBatch::zeros(points.batch_size(), points.points_per_item())?
            .into_points();

        grad.par_chunks_mut(points.points_per_item())
            .zip(planes.par_iter())
            .enumerate()
            .for_each(|(i, (grad_item, plane))| {
                let normal = plane.normal();
                for (g, p) in grad_item.iter_mut().zip(points.item(i)) {
                    *g = scale_vec3(&normal, factor * plane.signed_distance(p));
                }
            });

        Ok(PointBatch::new(grad, points.points_per_item())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use handgeo_3d::linalg::{add_vec3, scale_vec3};

    fn xy_plane(mean: [f64; 3]) -> PlaneDescriptor {
        PlaneDescriptor::new(mean, [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
    }

    fn sample_points() -> Vec<[f64; 3]> {
        vec![
            [0.1, 0.2, 0.3],
            [-0.4, 0.5, -0.1],
            [0.7, -0.2, 0.05],
            [0.0, 0.0, 0.0],
        ]
    }

    #[test]
    fn test_points_on_plane_have_zero_error() {
        let plane = PlaneDescriptor::new([1.0, 2.0, 3.0], [[1.0, 1.0, 0.0], [0.0, 1.0, 1.0]]);
        let points: Vec<_> = [(0.5, 0.5), (-2.0, 1.0), (3.0, -4.0)]
            .iter()
            .map(|(a, b)| {
                add_vec3(
                    &plane.mean,
                    &add_vec3(
                        &scale_vec3(&plane.components[0], *a),
                        &scale_vec3(&plane.components[1], *b),
                    ),
                )
            })
            .collect();
        assert_relative_eq!(plane_fit_error(&points, &plane), 0.0, epsilon = 1e-20);
    }

    #[test]
    fn test_off_plane_point() {
        let plane = xy_plane([0.0; 3]);
        assert_eq!(plane_fit_error(&[[1.0, 0.0, 0.5]], &plane), 0.25);
    }

    #[test]
    fn test_translation_invariance() {
        let plane = PlaneDescriptor::new([0.1, -0.3, 0.2], [[1.0, 0.2, 0.0], [0.0, 1.0, -0.3]]);
        let points = sample_points();
        let base = plane_fit_error(&points, &plane);

        let shift = [3.0, -1.5, 7.25];
        let moved: Vec<_> = points.iter().map(|p| add_vec3(p, &shift)).collect();
        let moved_plane = PlaneDescriptor::new(add_vec3(&plane.mean, &shift), plane.components);
        assert_relative_eq!(plane_fit_error(&moved, &moved_plane), base, epsilon = 1e-9);

        // moving only the mean changes the loss
        assert!((plane_fit_error(&points, &moved_plane) - base).abs() > 1e-3);
    }

    #[test]
    fn test_quadratic_scaling() {
        let plane = PlaneDescriptor::new([0.1, -0.3, 0.2], [[1.0, 0.2, 0.0], [0.0, 1.0, -0.3]]);
        let points = sample_points();
        let base = plane_fit_error(&points, &plane);

        let k = 3.5;
        let scaled: Vec<_> = points.iter().map(|p| scale_vec3(p, k)).collect();
        let scaled_plane = PlaneDescriptor::new(scale_vec3(&plane.mean, k), plane.components);
        assert_relative_eq!(
            plane_fit_error(&scaled, &scaled_plane),
            k * k * base,
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_degenerate_basis_silently_zero() {
        let plane = PlaneDescriptor::new([0.0; 3], [[1.0, 0.0, 0.0], [2.0, 0.0, 0.0]]);
        assert_eq!(plane_fit_error(&[[0.0, 5.0, 5.0]], &plane), 0.0);
    }

    #[test]
    fn test_nan_propagates() {
        let plane = xy_plane([0.0; 3]);
        assert!(plane_fit_error(&[[0.0, 0.0, f64::NAN]], &plane).is_nan());
    }

    #[test]
    fn test_forward_scale_and_reduction() -> Result<(), LossError> {
        let batch = PointBatch::new(
            vec![[0.0, 0.0, 1.0], [0.0, 0.0, 1.0], [0.0, 0.0, 2.0], [0.0, 0.0, 0.0]],
            2,
        )?;
        let planes = [xy_plane([0.0; 3]), xy_plane([0.0; 3])];

        let out = PlaneFitLoss::default().forward(&batch, &planes)?;
        assert_eq!(out.per_item, vec![2.0, 4.0]);
        assert_eq!(out.value, 6.0);

        let out = PlaneFitLoss::new(PlaneFitLoss::LEGACY_SCALE)
            .with_reduction(Reduction::Mean)
            .forward(&batch, &planes)?;
        assert_relative_eq!(out.value, 3.0e13);
        Ok(())
    }

    #[test]
    fn test_forward_descriptor_mismatch() -> Result<(), LossError> {
        let batch = PointBatch::zeros(2, 3)?;
        let res = PlaneFitLoss::default().forward(&batch, &[xy_plane([0.0; 3])]);
        assert_eq!(
            res,
            Err(LossError::BatchSizeMismatch {
                batch_size: 2,
                descriptors: 1
            })
        );
        Ok(())
    }

    #[test]
    fn test_empty_batch_is_rejected() -> Result<(), LossError> {
        let empty = PointBatch::new(vec![], 3)?;
        let loss = PlaneFitLoss::default().with_reduction(Reduction::Mean);
        assert_eq!(loss.forward(&empty, &[]), Err(LossError::EmptyBatch));
        assert_eq!(loss.backward(&empty, &[]).map(|_| ()), Err(LossError::EmptyBatch));
        Ok(())
    }

    #[test]
    fn test_backward_matches_finite_differences() -> Result<(), LossError> {
        let loss = PlaneFitLoss::new(2.0).with_reduction(Reduction::Mean);
        let planes = [
            PlaneDescriptor::new([0.1, -0.3, 0.2], [[1.0, 0.2, 0.0], [0.0, 1.0, -0.3]]),
            xy_plane([0.0, 0.0, 0.4]),
        ];
        let batch = PointBatch::new([sample_points(), sample_points()].concat(), 4)?;
        let grad = loss.backward(&batch, &planes)?;

        let h = 1e-6;
        for idx in 0..batch.points().len() {
            for k in 0..3 {
                let mut plus = batch.clone().into_points();
                plus[idx][k] += h;
                let mut minus = batch.clone().into_points();
                minus[idx][k] -= h;
                let f_plus = loss.forward(&PointBatch::new(plus, 4)?, &planes)?.value;
                let f_minus = loss.forward(&PointBatch::new(minus, 4)?, &planes)?.value;
                let numeric = (f_plus - f_minus) / (2.0 * h);
                assert_relative_eq!(grad.points()[idx][k], numeric, epsilon = 1e-6);
            }
        }
        Ok(())
    }
}
