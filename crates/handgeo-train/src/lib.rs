#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Saving and loading model checkpoints.
pub mod checkpoint;

/// Training run configuration.
pub mod config;

/// Samples, datasets and synthetic ring generation.
pub mod dataset;

/// The model interface and a reference affine model.
pub mod model;

/// First order optimizers.
pub mod optim;

/// Learning rate schedules.
pub mod scheduler;

/// The epoch loop.
pub mod trainer;

use handgeo_3d::{FitError, GeomError};
use handgeo_loss::LossError;
use thiserror::Error;

pub use checkpoint::{CheckpointError, CheckpointMetadata, CheckpointStore};
pub use config::{ObjectiveConfig, TrainConfig};
pub use dataset::{Batch, Dataset, InMemoryDataset, RingGenerator, Sample};
pub use model::{AffineModel, Model, ModelState};
pub use optim::{AdamW, Optimizer, OptimizerConfig, Sgd};
pub use scheduler::LrSchedule;
pub use trainer::{EpochStats, Trainer};

/// Error types for training.
#[derive(Debug, Error)]
pub enum TrainError {
    /// The configuration cannot be used for a run.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A loss rejected its inputs.
    #[error(transparent)]
    Loss(#[from] LossError),

    /// Samples could not be stacked into a batch.
    #[error(transparent)]
    Geom(#[from] GeomError),

    /// A plane or circle could not be fitted to a sample.
    #[error(transparent)]
    Fit(#[from] FitError),

    /// A checkpoint could not be saved or loaded.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// A model state does not belong to the model it is loaded into.
    #[error("Model state mismatch: expected {expected}, found {found}")]
    StateMismatch {
        /// Description of the receiving model.
        expected: String,
        /// Description of the stored state.
        found: String,
    },

    /// The dataset does not fill a single batch.
    #[error("Dataset of {dataset_len} samples does not fill a batch of {batch_size}")]
    EmptyEpoch {
        /// Number of samples in the dataset.
        dataset_len: usize,
        /// Configured batch size.
        batch_size: usize,
    },

    /// A dataset returned no sample for an index below its length.
    #[error("Sample {index} out of range for dataset of length {len}")]
    SampleOutOfRange {
        /// Requested index.
        index: usize,
        /// Reported dataset length.
        len: usize,
    },

    /// The model changed the number of points.
    #[error("Model returned {found} points, expected {expected}")]
    OutputSizeMismatch {
        /// Number of input points.
        expected: usize,
        /// Number of predicted points.
        found: usize,
    },
}
