use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::TrainError;

/// Learning rate as a function of the number of completed epochs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum LrSchedule {
    /// Keep the initial learning rate.
    #[default]
    Constant,
    /// Multiply the learning rate by `gamma` every epoch.
    Exponential {
        /// Decay factor per epoch.
        gamma: f64,
    },
    /// Cosine annealing between the initial rate and `eta_min` with period `2 * t_max`.
    CosineAnnealing {
        /// Number of epochs from the initial rate down to `eta_min`.
        t_max: usize,
        /// Minimum learning rate.
        eta_min: f64,
    },
}

impl LrSchedule {
    /// Learning rate after `epoch` completed epochs.
    ///
    /// Example:
    ///
    /// ```
    /// use handgeo_train::LrSchedule;
    ///
    /// let schedule = LrSchedule::Exponential { gamma: 0.5 };
    /// assert_eq!(schedule.learning_rate(0.1, 2), 0.025);
    /// ```
    pub fn learning_rate(&self, base_lr: f64, epoch: usize) -> f64 {
        match *self {
            LrSchedule::Constant => base_lr,
            LrSchedule::Exponential { gamma } => base_lr * gamma.powi(epoch as i32),
            LrSchedule::CosineAnnealing { t_max, eta_min } => {
                let phase = PI * epoch as f64 / t_max as f64;
                eta_min + (base_lr - eta_min) * (1.0 + phase.cos()) / 2.0
            }
        }
    }

    pub(crate) fn validate(&self) -> Result<(), TrainError> {
        match *self {
            LrSchedule::Constant => Ok(()),
            LrSchedule::Exponential { gamma } if gamma > 0.0 && gamma.is_finite() => Ok(()),
            LrSchedule::Exponential { gamma } => Err(TrainError::InvalidConfig(format!(
                "exponential schedule gamma must be positive, got {gamma}"
            ))),
            LrSchedule::CosineAnnealing { t_max: 0, .. } => Err(TrainError::InvalidConfig(
                "cosine annealing t_max must be greater than zero".into(),
            )),
            LrSchedule::CosineAnnealing { .. } => Ok(()),
        }
    }
}
