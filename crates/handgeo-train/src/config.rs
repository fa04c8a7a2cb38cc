use std::path::PathBuf;

use handgeo_3d::augment::RandomRotation;
use handgeo_loss::{MseLoss, OnCircleLoss, PlaneFitLoss, Reduction};
use serde::{Deserialize, Serialize};

use crate::optim::OptimizerConfig;
use crate::scheduler::LrSchedule;
use crate::TrainError;

/// Loss terms minimized during training.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveConfig {
    /// On-circle loss between predictions and the circle targets.
    pub on_circle: OnCircleLoss,
    /// Optional plane fitting loss between predictions and the sample planes.
    pub plane_fit: Option<PlaneFitLoss>,
    /// Optional squared error between predictions and the ground truth points.
    pub mse: Option<MseLoss>,
}

impl Default for ObjectiveConfig {
    fn default() -> Self {
        Self {
            on_circle: OnCircleLoss::new().with_reduction(Reduction::Mean),
            plane_fit: None,
            mse: None,
        }
    }
}

/// Everything a training run needs besides the model and the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Number of epochs to run.
    pub epochs: usize,
    /// Number of samples per training batch. Incomplete batches are dropped.
    pub batch_size: usize,
    /// Initial learning rate.
    pub learning_rate: f64,
    /// Learning rate schedule, stepped once per epoch.
    pub schedule: LrSchedule,
    /// Optimizer and its hyperparameters.
    pub optimizer: OptimizerConfig,
    /// Loss terms.
    pub objective: ObjectiveConfig,
    /// Save a checkpoint every this many epochs, 0 disables checkpoints.
    pub checkpoint_every: usize,
    /// Directory checkpoints are written to.
    pub output_dir: PathBuf,
    /// Seed of the shuffling and augmentation generator.
    pub seed: u64,
    /// Random rotation applied to every training sample.
    pub augment: Option<RandomRotation>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 1000,
            batch_size: 32,
            learning_rate: 0.01,
            schedule: LrSchedule::Exponential { gamma: 0.85 },
            optimizer: OptimizerConfig::default(),
            objective: ObjectiveConfig::default(),
            checkpoint_every: 5,
            output_dir: PathBuf::from("output"),
            seed: 0,
            augment: None,
        }
    }
}

impl TrainConfig {
    /// Check the configuration for values no run can make sense of.
    pub fn validate(&self) -> Result<(), TrainError> {
        if self.epochs == 0 {
            return Err(TrainError::InvalidConfig("epochs must be greater than zero".into()));
        }
        if self.batch_size == 0 {
            return Err(TrainError::InvalidConfig(
                "batch_size must be greater than zero".into(),
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(TrainError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        self.schedule.validate()?;
        Ok(())
    }
}
