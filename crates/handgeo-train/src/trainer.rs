use std::path::{Path, PathBuf};

use handgeo_3d::PointBatch;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::checkpoint::{CheckpointMetadata, CheckpointStore};
use crate::config::TrainConfig;
use crate::dataset::{Batch, Dataset, Sample};
use crate::model::Model;
use crate::optim::Optimizer;
use crate::TrainError;

/// Summary of one training epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// Number of completed epochs, starting at 1.
    pub epoch: usize,
    /// Mean per-sample training loss over the epoch.
    pub train_loss: f64,
    /// Mean per-sample validation loss after the epoch.
    pub valid_loss: Option<f64>,
    /// Learning rate used during the epoch.
    pub learning_rate: f64,
    /// Checkpoint written at the end of the epoch.
    pub checkpoint: Option<PathBuf>,
}

struct Objective {
    per_item: Vec<f64>,
    value: f64,
}

/// Owns a model, its optimizer and the run configuration, and drives the
/// epoch loop.
pub struct Trainer<M: Model> {
    config: TrainConfig,
    model: M,
    optimizer: Box<dyn Optimizer>,
    store: Option<CheckpointStore>,
    epoch: usize,
}

impl<M: Model> Trainer<M> {
    /// Create a trainer starting from epoch 0.
    ///
    /// # Arguments
    ///
    /// * `config` - The run configuration, validated here.
    /// * `model` - The model to train.
    pub fn new(config: TrainConfig, model: M) -> Result<Self, TrainError> {
        config.validate()?;
        let optimizer = config.optimizer.build(model.parameters().len());
        let store = (config.checkpoint_every > 0).then(|| CheckpointStore::new(&config.output_dir));
        Ok(Self {
            config,
            model,
            optimizer,
            store,
            epoch: 0,
        })
    }

    /// Create a trainer continuing from a saved checkpoint.
    ///
    /// The model parameters and the epoch counter are restored; the optimizer
    /// starts with fresh moment estimates.
    pub fn resume(
        config: TrainConfig,
        mut model: M,
        location: impl AsRef<Path>,
    ) -> Result<Self, TrainError> {
        let (state, metadata) = CheckpointStore::load(location.as_ref())?;
        model.load_state(&state)?;
        let mut trainer = Self::new(config, model)?;
        trainer.epoch = metadata.epoch;
        log::info!(
            "Resuming from epoch {} of {}",
            metadata.epoch,
            location.as_ref().display()
        );
        Ok(trainer)
    }

    /// The run configuration.
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// The model being trained.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Consume the trainer and return the model.
    pub fn into_model(self) -> M {
        self.model
    }

    /// Number of completed epochs.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Learning rate for the next epoch.
    pub fn learning_rate(&self) -> f64 {
        self.config
            .schedule
            .learning_rate(self.config.learning_rate, self.epoch)
    }

    /// Run one optimization step on a batch.
    ///
    /// Returns the reduced objective before the update.
    pub fn train_step(&mut self, batch: &Batch, lr: f64) -> Result<f64, TrainError> {
        Ok(self.step(batch, lr)?.value)
    }

    /// Mean per-sample objective over a dataset, without updating the model.
    pub fn evaluate<D: Dataset + ?Sized>(&self, dataset: &D) -> Result<f64, TrainError> {
        if dataset.is_empty() {
            return Err(TrainError::EmptyEpoch {
                dataset_len: 0,
                batch_size: self.config.batch_size,
            });
        }

        let indices: Vec<usize> = (0..dataset.len()).collect();
        let mut total = 0.0;
        for chunk in indices.chunks(self.config.batch_size) {
            let samples = collect_samples(dataset, chunk)?;
            let batch = Batch::collate(samples)?;
            let predicted = self.predict_batch(&batch.input)?;
            total += self.objective(&predicted, &batch)?.per_item.iter().sum::<f64>();
        }

        Ok(total / dataset.len() as f64)
    }

    /// Run one epoch over `dataset` with learning rate `lr`.
    ///
    /// Samples are shuffled and the last incomplete batch is dropped. Returns
    /// the mean per-sample training loss.
    pub fn train_epoch<D: Dataset + ?Sized>(
        &mut self,
        dataset: &D,
        lr: f64,
    ) -> Result<f64, TrainError> {
        let batch_size = self.config.batch_size;
        let num_batches = dataset.len() / batch_size;
        if num_batches == 0 {
            return Err(TrainError::EmptyEpoch {
                dataset_len: dataset.len(),
                batch_size,
            });
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(self.epoch as u64));
        let mut indices: Vec<usize> = (0..dataset.len()).collect();
        indices.shuffle(&mut rng);

        let mut total = 0.0;
        for (i, chunk) in indices.chunks_exact(batch_size).enumerate() {
            let samples = collect_samples(dataset, chunk)?;
            let batch = match self.config.augment {
                Some(augment) => {
                    let rotated: Vec<Sample> = samples
                        .iter()
                        .map(|s| s.rotated(&augment.sample(&mut rng)))
                        .collect();
                    Batch::collate(&rotated)?
                }
                None => Batch::collate(samples)?,
            };

            let objective = self.step(&batch, lr)?;
            log::debug!(
                "epoch {} batch {}/{}: loss {:.6e}",
                self.epoch + 1,
                i + 1,
                num_batches,
                objective.value
            );
            total += objective.per_item.iter().sum::<f64>();
        }

        Ok(total / (num_batches * batch_size) as f64)
    }

    /// Train until `config.epochs` epochs are completed.
    ///
    /// # Arguments
    ///
    /// * `train` - Training samples.
    /// * `valid` - Optional validation samples, evaluated after every epoch.
    ///
    /// Returns the statistics of the epochs run by this call.
    pub fn fit<D: Dataset + ?Sized>(
        &mut self,
        train: &D,
        valid: Option<&D>,
    ) -> Result<Vec<EpochStats>, TrainError> {
        let mut history = Vec::with_capacity(self.config.epochs.saturating_sub(self.epoch));

        while self.epoch < self.config.epochs {
            let learning_rate = self.learning_rate();
            let train_loss = self.train_epoch(train, learning_rate)?;
            let valid_loss = match valid {
                Some(valid) if !valid.is_empty() => Some(self.evaluate(valid)?),
                _ => None,
            };
            self.epoch += 1;

            match valid_loss {
                Some(valid_loss) => log::info!(
                    "epoch {}/{}: train loss {:.6e}, valid loss {:.6e}, lr {:.3e}",
                    self.epoch,
                    self.config.epochs,
                    train_loss,
                    valid_loss,
                    learning_rate
                ),
                None => log::info!(
                    "epoch {}/{}: train loss {:.6e}, lr {:.3e}",
                    self.epoch,
                    self.config.epochs,
                    train_loss,
                    learning_rate
                ),
            }

            let checkpoint = match &self.store {
                Some(store) if self.epoch % self.config.checkpoint_every == 0 => {
                    let metadata = CheckpointMetadata {
                        epoch: self.epoch,
                        train_loss,
                        valid_loss,
                        learning_rate,
                        config: self.config.clone(),
                    };
                    Some(store.save(&self.model.state(), &metadata)?)
                }
                _ => None,
            };

            history.push(EpochStats {
                epoch: self.epoch,
                train_loss,
                valid_loss,
                learning_rate,
                checkpoint,
            });
        }

        Ok(history)
    }

    fn step(&mut self, batch: &Batch, lr: f64) -> Result<Objective, TrainError> {
        let predicted = self.predict_batch(&batch.input)?;
        let objective = self.objective(&predicted, batch)?;

        let objective_config = &self.config.objective;
        let mut grad = objective_config
            .on_circle
            .backward(&predicted, &batch.reference, &batch.targets)?;
        if let Some(plane_fit) = &objective_config.plane_fit {
            accumulate(&mut grad, &plane_fit.backward(&predicted, &batch.planes)?);
        }
        if let Some(mse) = &objective_config.mse {
            accumulate(&mut grad, &mse.backward(&predicted, &batch.reference)?);
        }

        let mut param_grads = vec![0.0; self.model.parameters().len()];
        for (input, grad_output) in batch.input.items().zip(grad.items()) {
            let item_grads = self.model.backward(input, grad_output);
            for (acc, g) in param_grads.iter_mut().zip(item_grads) {
                *acc += g;
            }
        }

        self.optimizer
            .step(self.model.parameters_mut(), &param_grads, lr);
        Ok(objective)
    }

    fn predict_batch(&self, input: &PointBatch) -> Result<PointBatch, TrainError> {
        let points_per_item = input.points_per_item();
        let mut points = Vec::with_capacity(input.points().len());
        for item in input.items() {
            let output = self.model.predict(item);
            if output.len() != points_per_item {
                return Err(TrainError::OutputSizeMismatch {
                    expected: points_per_item,
                    found: output.len(),
                });
            }
            points.extend(output);
        }
        Ok(PointBatch::new(points, points_per_item)?)
    }

    fn objective(&self, predicted: &PointBatch, batch: &Batch) -> Result<Objective, TrainError> {
        let objective = &self.config.objective;
        let on_circle = objective
            .on_circle
            .forward(predicted, &batch.reference, &batch.targets)?;
        let mut per_item = on_circle.per_item;
        let mut value = on_circle.value;

        if let Some(plane_fit) = &objective.plane_fit {
            let plane = plane_fit.forward(predicted, &batch.planes)?;
            for (total, item) in per_item.iter_mut().zip(plane.per_item) {
                *total += item;
            }
            value += plane.value;
        }

        if let Some(mse) = &objective.mse {
            let mse = mse.forward(predicted, &batch.reference)?;
            for (total, item) in per_item.iter_mut().zip(mse.per_item) {
                *total += item;
            }
            value += mse.value;
        }

        Ok(Objective { per_item, value })
    }
}

fn accumulate(grad: &mut PointBatch, term: &PointBatch) {
    for (g, t) in grad.items_mut().flatten().zip(term.points()) {
        for k in 0..3 {
            g[k] += t[k];
        }
    }
}

fn collect_samples<'a, D: Dataset + ?Sized>(
    dataset: &'a D,
    indices: &[usize],
) -> Result<Vec<&'a Sample>, TrainError> {
    indices
        .iter()
        .map(|&index| {
            dataset.get(index).ok_or(TrainError::SampleOutOfRange {
                index,
                len: dataset.len(),
            })
        })
        .collect()
}
