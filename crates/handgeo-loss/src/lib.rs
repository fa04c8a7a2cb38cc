#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Squared error between predicted and ground truth points.
pub mod mse;

/// Loss penalizing points that are off a circle embedded in 3d.
pub mod on_circle;

/// Loss penalizing points that are off a fitted plane.
pub mod plane_fit;

use handgeo_3d::GeomError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use mse::MseLoss;
pub use on_circle::{on_circle_terms, wrap_angle, AngleMode, CircleTerms, OnCircleLoss, OnCircleWeights};
pub use plane_fit::{plane_fit_error, PlaneFitLoss};

/// Error types for the loss functions.
#[derive(Debug, Error, PartialEq)]
pub enum LossError {
    /// The point batches are malformed or disagree in shape.
    #[error(transparent)]
    Geom(#[from] GeomError),

    /// The batch has no items, so no reduction is defined.
    #[error("Batch has no items")]
    EmptyBatch,

    /// The number of plane or circle descriptors differs from the batch size.
    #[error("Batch has {batch_size} items but {descriptors} descriptors were given")]
    BatchSizeMismatch {
        /// Number of items in the point batch.
        batch_size: usize,
        /// Number of descriptors provided.
        descriptors: usize,
    },
}

/// How per-item losses are combined into a single scalar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reduction {
    /// Sum over batch items.
    #[default]
    Sum,
    /// Average over batch items.
    Mean,
}

impl Reduction {
    /// Reduce per-item values.
    pub fn reduce(&self, per_item: &[f64]) -> f64 {
        let sum: f64 = per_item.iter().sum();
        match self {
            Reduction::Sum => sum,
            Reduction::Mean => sum / per_item.len() as f64,
        }
    }

    /// Factor applied to per-item gradients under this reduction.
    pub fn gradient_factor(&self, batch_size: usize) -> f64 {
        match self {
            Reduction::Sum => 1.0,
            Reduction::Mean => 1.0 / batch_size as f64,
        }
    }
}

/// Result of evaluating a loss over a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct LossOutput {
    /// Loss of each batch item, before reduction.
    pub per_item: Vec<f64>,
    /// Reduced loss.
    pub value: f64,
}

impl LossOutput {
    pub(crate) fn new(per_item: Vec<f64>, reduction: Reduction) -> Self {
        let value = reduction.reduce(&per_item);
        if !value.is_finite() {
            log::debug!("Non-finite loss over {} items", per_item.len());
        }
        Self { per_item, value }
    }
}

pub(crate) fn check_non_empty(batch_size: usize) -> Result<(), LossError> {
    if batch_size == 0 {
        return Err(LossError::EmptyBatch);
    }
    Ok(())
}

pub(crate) fn check_descriptors(batch_size: usize, descriptors: usize) -> Result<(), LossError> {
    check_non_empty(batch_size)?;
    if batch_size != descriptors {
        return Err(LossError::BatchSizeMismatch {
            batch_size,
            descriptors,
        });
    }
    Ok(())
}
