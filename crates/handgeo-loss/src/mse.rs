use handgeo_3d::{linalg::sub_vec3, PointBatch};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{check_non_empty, LossError, LossOutput, Reduction};

/// Weighted mean squared error between predicted and ground truth points.
///
/// The per-item value is `weight * Σ |p - r|² / (3 M)` over the `M` points of
/// the item, so with [`Reduction::Mean`] the loss is the mean over every
/// coordinate of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MseLoss {
    /// Coefficient applied to every per-item error.
    pub weight: f64,
    /// How per-item losses are combined.
    pub reduction: Reduction,
}

impl Default for MseLoss {
    fn default() -> Self {
        Self {
            weight: 1.0,
            reduction: Reduction::Mean,
        }
    }
}

impl MseLoss {
    /// Create a new loss with the given weight and mean reduction.
    pub fn new(weight: f64) -> Self {
        Self {
            weight,
            ..Default::default()
        }
    }

    /// Set the reduction.
    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }

    fn check_inputs(predicted: &PointBatch, reference: &PointBatch) -> Result<(), LossError> {
        predicted.check_same_shape("predicted", reference, "reference")?;
        check_non_empty(predicted.batch_size())
    }

    /// Evaluate the loss.
    ///
    /// Example:
    ///
    /// ```
    /// use handgeo_3d::PointBatch;
    /// use handgeo_loss::MseLoss;
    ///
    /// let predicted = PointBatch::new(vec![[1.0, 0.0, 0.0], [0.0, 0.0, 3.0]], 2).unwrap();
    /// let reference = PointBatch::new(vec![[0.0; 3]; 2], 2).unwrap();
    /// let out = MseLoss::default().forward(&predicted, &reference).unwrap();
    /// assert!((out.value - 10.0 / 6.0).abs() < 1e-12);
    /// ```
    pub fn forward(
        &self,
        predicted: &PointBatch,
        reference: &PointBatch,
    ) -> Result<LossOutput, LossError> {
        Self::check_inputs(predicted, reference)?;

        let norm = self.weight / (3 * predicted.points_per_item()) as f64;
        let per_item = (0..predicted.batch_size())
            .into_par_iter()
            .map(|i| {
                let sq: f64 = predicted
                    .item(i)
                    .iter()
                    .zip(reference.item(i))
                    .map(|(p, r)| sub_vec3(p, r).iter().map(|d| d * d).sum::<f64>())
                    .sum();
                norm * sq
            })
            .collect();

        Ok(LossOutput::new(per_item, self.reduction))
    }

    /// Gradient of the reduced loss with respect to the predicted points.
    pub fn backward(
        &self,
        predicted: &PointBatch,
        reference: &PointBatch,
    ) -> Result<PointBatch, LossError> {
        Self::check_inputs(predicted, reference)?;

        let factor = 2.0 * self.weight * self.reduction.gradient_factor(predicted.batch_size())
            / (3 * predicted.points_per_item()) as f64;
        let grad = predicted
            .points()
            .par_iter()
            .zip(reference.points())
            .map(|(p, r)| {
                let d = sub_vec3(p, r);
                [factor * d[0], factor * d[1], factor * d[2]]
            })
            .collect();

        Ok(PointBatch::new(grad, predicted.points_per_item())?)
    }
}
