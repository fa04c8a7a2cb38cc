use std::f64::consts::PI;

use handgeo_3d::{CircleTarget, PlaneFrame, PointBatch};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{check_descriptors, LossError, LossOutput, Reduction};

/// Points closer than this to the circle axis get no radial or angular gradient.
const AXIS_EPS: f64 = 1e-12;

/// How the angular difference between prediction and reference is measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AngleMode {
    /// Plain difference of the two polar angles, each in `(-π, π]`.
    #[default]
    Raw,
    /// Difference reduced into `(-π, π]`, continuous across the angular origin.
    Wrapped,
}

impl AngleMode {
    /// Angular difference `angle - reference` under this mode.
    #[inline]
    pub fn difference(&self, angle: f64, reference: f64) -> f64 {
        match self {
            AngleMode::Raw => angle - reference,
            AngleMode::Wrapped => wrap_angle(angle - reference),
        }
    }
}

/// Reduce an angle into `(-π, π]`.
///
/// Example:
///
/// ```
/// use handgeo_loss::wrap_angle;
///
/// let a = wrap_angle(3.0 * std::f64::consts::FRAC_PI_2);
/// assert!((a + std::f64::consts::FRAC_PI_2).abs() < 1e-12);
/// ```
#[inline]
pub fn wrap_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(2.0 * PI);
    if a > PI {
        a - 2.0 * PI
    } else {
        a
    }
}

/// Weights of the three on-circle penalty terms.
///
/// The angular term is off by default: a point anywhere on the circle scores
/// zero unless `angle` is set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OnCircleWeights {
    /// Weight of the squared distance to the circle plane.
    pub off_plane: f64,
    /// Weight of the squared difference between observed and target radius.
    pub radius: f64,
    /// Weight of the squared angular difference to the reference point.
    pub angle: f64,
}

impl Default for OnCircleWeights {
    fn default() -> Self {
        Self {
            off_plane: 1.0,
            radius: 1.0,
            angle: 0.0,
        }
    }
}

impl OnCircleWeights {
    /// Default weights with the angular term enabled at weight `angle`.
    pub fn with_angle(angle: f64) -> Self {
        Self {
            angle,
            ..Default::default()
        }
    }
}

/// Unweighted penalty terms of a single point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleTerms {
    /// Squared distance to the circle plane.
    pub off_plane: f64,
    /// Squared difference between the in-plane radius and the target radius.
    pub radius: f64,
    /// Squared angular difference to the reference point.
    pub angle: f64,
}

impl CircleTerms {
    /// Weighted sum of the terms.
    #[inline]
    pub fn weighted(&self, weights: &OnCircleWeights) -> f64 {
        weights.off_plane * self.off_plane + weights.radius * self.radius + weights.angle * self.angle
    }
}

/// Compute the penalty terms of `point` against `target`.
///
/// `reference` is the ground truth point matched with `point`; only its polar
/// angle in the circle plane is used.
///
/// Example:
///
/// ```
/// use handgeo_3d::CircleTarget;
/// use handgeo_loss::{on_circle_terms, AngleMode};
///
/// let target = CircleTarget::new([0.0; 3], [0.0, 0.0, 1.0], 1.0);
/// let terms = on_circle_terms(&[2.0, 0.0, 0.5], &[1.0, 0.0, 0.0], &target, AngleMode::Raw);
/// assert_eq!(terms.off_plane, 0.25);
/// assert_eq!(terms.radius, 1.0);
/// assert_eq!(terms.angle, 0.0);
/// ```
pub fn on_circle_terms(
    point: &[f64; 3],
    reference: &[f64; 3],
    target: &CircleTarget,
    mode: AngleMode,
) -> CircleTerms {
    point_terms(&target.frame(), point, reference, target.radius, mode)
}

#[inline]
fn point_terms(
    frame: &PlaneFrame,
    point: &[f64; 3],
    reference: &[f64; 3],
    radius: f64,
    mode: AngleMode,
) -> CircleTerms {
    let c = frame.coords(point);
    let dr = c.radius() - radius;
    let dtheta = mode.difference(c.angle(), frame.coords(reference).angle());
    CircleTerms {
        off_plane: c.height * c.height,
        radius: dr * dr,
        angle: dtheta * dtheta,
    }
}

/// On-circle loss over a batch.
///
/// Every predicted point is scored on how far it is from the plane of its
/// item's circle, how far its in-plane distance to the center is from the
/// target radius, and, when the angle weight is nonzero, how far its polar
/// angle is from the one of the matching reference point. The plane normal is normalized, so the off-plane term is a
/// squared euclidean distance; a zero normal yields NaN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OnCircleLoss {
    /// Weights of the penalty terms.
    pub weights: OnCircleWeights,
    /// Raw or wrap-aware angular difference.
    pub angle_mode: AngleMode,
    /// How per-item losses are combined.
    pub reduction: Reduction,
}

impl OnCircleLoss {
    /// Create a loss with default weights, raw angles and sum reduction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default weights with wrap-aware angles, used once an angle weight is set.
    pub fn wrapped() -> Self {
        Self::default().with_angle_mode(AngleMode::Wrapped)
    }

    /// Set the term weights.
    pub fn with_weights(mut self, weights: OnCircleWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Set the angle mode.
    pub fn with_angle_mode(mut self, angle_mode: AngleMode) -> Self {
        self.angle_mode = angle_mode;
        self
    }

    /// Set the reduction.
    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }

    fn check_inputs(
        predicted: &PointBatch,
        reference: &PointBatch,
        targets: &[CircleTarget],
    ) -> Result<(), LossError> {
        predicted.check_same_shape("predicted", reference, "reference")?;
        check_descriptors(predicted.batch_size(), targets.len())
    }

    /// Evaluate the loss.
    ///
    /// # Arguments
    ///
    /// * `predicted` - Predicted points.
    /// * `reference` - Ground truth points, same shape as `predicted`.
    /// * `targets` - The circle of each batch item.
    pub fn forward(
        &self,
        predicted: &PointBatch,
        reference: &PointBatch,
        targets: &[CircleTarget],
    ) -> Result<LossOutput, LossError> {
        Self::check_inputs(predicted, reference, targets)?;

        let per_item = targets
            .par_iter()
            .enumerate()
            .map(|(i, target)| {
                let frame = target.frame();
                predicted
                    .item(i)
                    .iter()
                    .zip(reference.item(i))
                    .map(|(p, r)| {
                        point_terms(&frame, p, r, target.radius, self.angle_mode)
                            .weighted(&self.weights)
                    })
                    .sum()
            })
            .collect();

        Ok(LossOutput::new(per_item, self.reduction))
    }

    /// Per-item sums of the unweighted terms, for monitoring.
    pub fn terms(
        &self,
        predicted: &PointBatch,
        reference: &PointBatch,
        targets: &[CircleTarget],
    ) -> Result<Vec<CircleTerms>, LossError> {
        Self::check_inputs(predicted, reference, targets)?;

        Ok(targets
            .par_iter()
            .enumerate()
            .map(|(i, target)| {
                let frame = target.frame();
                let zero = CircleTerms {
                    off_plane: 0.0,
                    radius: 0.0,
                    angle: 0.0,
                };
                predicted
                    .item(i)
                    .iter()
                    .zip(reference.item(i))
                    .map(|(p, r)| point_terms(&frame, p, r, target.radius, self.angle_mode))
                    .fold(zero, |acc, t| CircleTerms {
                        off_plane: acc.off_plane + t.off_plane,
                        radius: acc.radius + t.radius,
                        angle: acc.angle + t.angle,
                    })
            })
            .collect())
    }

    /// Gradient of the reduced loss with respect to the predicted points.
    ///
    /// Points within a tiny distance of the circle axis contribute only the
    /// off-plane gradient, as radius and angle are not differentiable there.
    pub fn backward(
        &self,
        predicted: &PointBatch,
        reference: &PointBatch,
        targets: &[CircleTarget],
    ) -> Result<PointBatch, LossError> {
        Self::check_inputs(predicted, reference, targets)?;

        let factor = 2.0 * self.reduction.gradient_factor(targets.len());
        let mut grad = PointBatch::zeros(predicted.batch_size(), predicted.points_per_item())?
            .into_points();

        grad.par_chunks_mut(predicted.points_per_item())
            .zip(targets.par_iter())
            .enumerate()
            .for_each(|(i, (grad_item, target))| {
                let frame = target.frame();
                for ((g, p), r) in grad_item
                    .iter_mut()
                    .zip(predicted.item(i))
                    .zip(reference.item(i))
                {
                    *g = self.point_gradient(&frame, p, r, target.radius, factor);
                }
            });

        Ok(PointBatch::new(grad, predicted.points_per_item())?)
    }

    fn point_gradient(
        &self,
        frame: &PlaneFrame,
        point: &[f64; 3],
        reference: &[f64; 3],
        radius: f64,
        factor: f64,
    ) -> [f64; 3] {
        let c = frame.coords(point);

        // d(h^2)/dp = 2 h n
        let mut g_n = self.weights.off_plane * c.height;
        let (mut g_u, mut g_v) = (0.0, 0.0);

        let r = c.radius();
        if r > AXIS_EPS {
            // d((r - R)^2)/dp = 2 (r - R) (x u + y v) / r
            let radial = self.weights.radius * (r - radius) / r;
            g_u += radial * c.x;
            g_v += radial * c.y;

            // d(dθ^2)/dp = 2 dθ (-y u + x v) / r^2
            let dtheta = self
                .angle_mode
                .difference(c.angle(), frame.coords(reference).angle());
            let angular = self.weights.angle * dtheta / (r * r);
            g_u -= angular * c.y;
            g_v += angular * c.x;
        }
        g_n *= factor;
        g_u *= factor;
        g_v *= factor;

        [
            g_n * frame.n[0] + g_u * frame.u[0] + g_v * frame.v[0],
            g_n * frame.n[1] + g_u * frame.u[1] + g_v * frame.v[1],
            g_n * frame.n[2] + g_u * frame.u[2] + g_v * frame.v[2],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_circle() -> CircleTarget {
        CircleTarget::new([0.0; 3], [0.0, 0.0, 1.0], 1.0)
    }

    fn polar(theta: f64, radius: f64, height: f64) -> [f64; 3] {
        [radius * theta.cos(), radius * theta.sin(), height]
    }

    #[test]
    fn test_wrap_angle() {
        assert_relative_eq!(wrap_angle(0.0), 0.0);
        assert_relative_eq!(wrap_angle(PI), PI);
        assert_relative_eq!(wrap_angle(-PI), PI);
        assert_relative_eq!(wrap_angle(2.0 * PI - 0.1), -0.1, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(-2.0 * PI + 0.1), 0.1, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(5.0 * PI), PI, epsilon = 1e-12);
    }

    #[test]
    fn test_scenario_terms() {
        let target = unit_circle();
        let reference = [1.0, 0.0, 0.0];

        let on = on_circle_terms(&[1.0, 0.0, 0.0], &reference, &target, AngleMode::Raw);
        assert_eq!(on.weighted(&OnCircleWeights::default()), 0.0);

        let lifted = on_circle_terms(&[1.0, 0.0, 0.5], &reference, &target, AngleMode::Raw);
        assert_eq!(lifted.off_plane, 0.25);
        assert_eq!(lifted.radius, 0.0);

        let wide = on_circle_terms(&[2.0, 0.0, 0.0], &reference, &target, AngleMode::Raw);
        assert_eq!(wide.off_plane, 0.0);
        assert_eq!(wide.radius, 1.0);
        assert_eq!(wide.angle, 0.0);
    }

    #[test]
    fn test_points_on_circle_have_zero_loss() -> Result<(), LossError> {
        let target = CircleTarget::new([0.3, -0.2, 1.0], [0.2, 0.5, -1.0], 0.04);
        let frame = target.frame();
        let points: Vec<_> = (0..8)
            .map(|i| {
                frame.point(&handgeo_3d::PlaneCoords {
                    height: 0.0,
                    x: 0.04 * (i as f64 * 0.7).cos(),
                    y: 0.04 * (i as f64 * 0.7).sin(),
                })
            })
            .collect();
        let batch = PointBatch::new(points, 8)?;

        for loss in [OnCircleLoss::new(), OnCircleLoss::wrapped()] {
            let out = loss.forward(&batch, &batch, &[target])?;
            assert_relative_eq!(out.value, 0.0, epsilon = 1e-20);
        }
        Ok(())
    }

    #[test]
    fn test_forward_scenario_batch() -> Result<(), LossError> {
        let predicted = PointBatch::new(
            vec![[1.0, 0.0, 0.0], [1.0, 0.0, 0.5], [2.0, 0.0, 0.0]],
            3,
        )?;
        let reference = PointBatch::new(vec![[1.0, 0.0, 0.0]; 3], 3)?;
        let out = OnCircleLoss::new().forward(&predicted, &reference, &[unit_circle()])?;
        assert_relative_eq!(out.value, 1.25);

        let weights = OnCircleWeights {
            off_plane: 4.0,
            radius: 0.5,
            angle: 1.0,
        };
        let out = OnCircleLoss::new()
            .with_weights(weights)
            .forward(&predicted, &reference, &[unit_circle()])?;
        assert_relative_eq!(out.value, 1.5);

        let terms = OnCircleLoss::new().terms(&predicted, &reference, &[unit_circle()])?;
        assert_relative_eq!(terms[0].off_plane, 0.25);
        assert_relative_eq!(terms[0].radius, 1.0);
        Ok(())
    }

    #[test]
    fn test_angle_term_is_opt_in() -> Result<(), LossError> {
        let predicted = PointBatch::new(vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], 2)?;
        let reference = PointBatch::new(vec![[0.0, 1.0, 0.0], [-1.0, 0.0, 0.0]], 2)?;
        let targets = [unit_circle()];

        for loss in [OnCircleLoss::new(), OnCircleLoss::wrapped()] {
            let out = loss.forward(&predicted, &reference, &targets)?;
            assert_eq!(out.value, 0.0);
            let grad = loss.backward(&predicted, &reference, &targets)?;
            assert!(grad.points().iter().flatten().all(|g| g.abs() < 1e-15));
        }

        let out = OnCircleLoss::new()
            .with_weights(OnCircleWeights::with_angle(1.0))
            .forward(&predicted, &reference, &targets)?;
        assert_relative_eq!(out.value, 2.0 * (PI / 2.0).powi(2), epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_wrapped_agrees_away_from_boundary() -> Result<(), LossError> {
        let predicted = PointBatch::new(
            vec![polar(0.3, 1.1, 0.1), polar(-0.5, 0.9, 0.0), polar(1.2, 1.0, -0.2)],
            3,
        )?;
        let reference = PointBatch::new(
            vec![polar(0.1, 1.0, 0.0), polar(-0.2, 1.0, 0.0), polar(1.5, 1.0, 0.0)],
            3,
        )?;
        let weights = OnCircleWeights::with_angle(1.0);
        let raw = OnCircleLoss::new()
            .with_weights(weights)
            .forward(&predicted, &reference, &[unit_circle()])?;
        let wrapped = OnCircleLoss::wrapped()
            .with_weights(weights)
            .forward(&predicted, &reference, &[unit_circle()])?;
        assert_relative_eq!(raw.value, wrapped.value, epsilon = 1e-12);
        let without_angle = OnCircleLoss::new().forward(&predicted, &reference, &[unit_circle()])?;
        assert!(raw.value > without_angle.value);
        Ok(())
    }

    #[test]
    fn test_wrapped_differs_by_periodic_correction() {
        let target = unit_circle();
        let point = polar(179f64.to_radians(), 1.0, 0.0);
        let reference = polar(-179f64.to_radians(), 1.0, 0.0);

        let raw_diff = AngleMode::Raw.difference(179f64.to_radians(), -179f64.to_radians());
        let wrapped_diff = AngleMode::Wrapped.difference(179f64.to_radians(), -179f64.to_radians());
        assert_relative_eq!(raw_diff - wrapped_diff, 2.0 * PI, epsilon = 1e-12);
        assert_relative_eq!(wrapped_diff, -2f64.to_radians(), epsilon = 1e-12);

        let raw = on_circle_terms(&point, &reference, &target, AngleMode::Raw);
        let wrapped = on_circle_terms(&point, &reference, &target, AngleMode::Wrapped);
        assert_relative_eq!(raw.off_plane, wrapped.off_plane);
        assert_relative_eq!(raw.radius, wrapped.radius);
        assert_relative_eq!(raw.angle, (358f64.to_radians()).powi(2), epsilon = 1e-9);
        assert_relative_eq!(wrapped.angle, (2f64.to_radians()).powi(2), epsilon = 1e-9);
    }

    #[test]
    fn test_negative_radius_not_guarded() {
        let target = CircleTarget::new([0.0; 3], [0.0, 0.0, 1.0], -1.0);
        let terms = on_circle_terms(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0], &target, AngleMode::Raw);
        assert_eq!(terms.radius, 4.0);
    }

    #[test]
    fn test_zero_normal_propagates_nan() {
        let target = CircleTarget::new([0.0; 3], [0.0; 3], 1.0);
        let terms = on_circle_terms(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0], &target, AngleMode::Raw);
        assert!(terms.off_plane.is_nan());
    }

    #[test]
    fn test_shape_mismatch() -> Result<(), LossError> {
        let predicted = PointBatch::zeros(2, 3)?;
        let reference = PointBatch::zeros(2, 4)?;
        let targets = [unit_circle(), unit_circle()];
        assert!(matches!(
            OnCircleLoss::new().forward(&predicted, &reference, &targets),
            Err(LossError::Geom(_))
        ));
        assert!(matches!(
            OnCircleLoss::new().forward(&predicted, &predicted, &targets[..1]),
            Err(LossError::BatchSizeMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_backward_matches_finite_differences() -> Result<(), LossError> {
        let targets = [
            CircleTarget::new([0.1, 0.0, -0.2], [0.1, 0.3, 1.0], 0.8),
            unit_circle(),
        ];
        let predicted = PointBatch::new(
            vec![
                [0.9, 0.2, -0.1],
                [-0.3, 0.7, 0.2],
                [0.2, -1.1, 0.0],
                polar(2.5, 1.3, 0.3),
                polar(-1.0, 0.4, -0.1),
                polar(0.2, 1.0, 0.0),
            ],
            3,
        )?;
        let reference = PointBatch::new(
            vec![
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, -1.0, 0.0],
                polar(2.0, 1.0, 0.0),
                polar(-1.4, 1.0, 0.0),
                polar(0.0, 1.0, 0.0),
            ],
            3,
        )?;

        for loss in [
            OnCircleLoss::new(),
            OnCircleLoss::new().with_weights(OnCircleWeights::with_angle(0.7)),
            OnCircleLoss::wrapped()
                .with_weights(OnCircleWeights::with_angle(1.0))
                .with_reduction(Reduction::Mean),
        ] {
            let grad = loss.backward(&predicted, &reference, &targets)?;
            let h = 1e-6;
            for idx in 0..predicted.points().len() {
                for k in 0..3 {
                    let mut plus = predicted.clone().into_points();
                    plus[idx][k] += h;
                    let mut minus = predicted.clone().into_points();
                    minus[idx][k] -= h;
                    let f_plus = loss
                        .forward(&PointBatch::new(plus, 3)?, &reference, &targets)?
                        .value;
                    let f_minus = loss
                        .forward(&PointBatch::new(minus, 3)?, &reference, &targets)?
                        .value;
                    let numeric = (f_plus - f_minus) / (2.0 * h);
                    assert_relative_eq!(grad.points()[idx][k], numeric, epsilon = 1e-5);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_backward_on_axis_keeps_plane_gradient() -> Result<(), LossError> {
        let predicted = PointBatch::new(vec![[0.0, 0.0, 0.5]], 1)?;
        let grad = OnCircleLoss::new().backward(&predicted, &predicted, &[unit_circle()])?;
        assert_eq!(grad.points()[0], [0.0, 0.0, 1.0]);
        Ok(())
    }
}
