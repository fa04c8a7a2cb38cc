use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::TrainConfig;
use crate::model::ModelState;

const STATE_FILE: &str = "state.bin";
const METADATA_FILE: &str = "metadata.json";
const DIR_PREFIX: &str = "checkpoint-";

/// Errors raised while saving or loading checkpoints.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failed to encode or decode the model state.
    #[error("Bincode error: {0}")]
    Bincode(String),

    /// Failed to encode or decode the metadata.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The directory does not hold a complete checkpoint.
    #[error("Not a checkpoint directory: {0}")]
    InvalidDirectory(PathBuf),
}

/// Training progress stored next to the model state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Number of completed epochs.
    pub epoch: usize,
    /// Mean training loss of the last epoch.
    #[serde(with = "json_float")]
    pub train_loss: f64,
    /// Validation loss of the last epoch, if a validation set was given.
    #[serde(with = "json_float::option")]
    pub valid_loss: Option<f64>,
    /// Learning rate used during the last epoch.
    #[serde(with = "json_float")]
    pub learning_rate: f64,
    /// Configuration of the run.
    pub config: TrainConfig,
}

// JSON has no NaN or infinity, non-finite values are stored as strings.
mod json_float {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum JsonFloat {
        Number(f64),
        Text(String),
    }

    impl JsonFloat {
        fn into_f64<E: Error>(self) -> Result<f64, E> {
            match self {
                JsonFloat::Number(v) => Ok(v),
                JsonFloat::Text(text) => text
                    .parse::<f64>()
                    .map_err(|_| E::custom(format!("invalid float: {text}"))),
            }
        }
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_str(&value.to_string())
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        JsonFloat::deserialize(deserializer)?.into_f64()
    }

    pub mod option {
        use super::JsonFloat;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<f64>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => super::serialize(v, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<f64>, D::Error> {
            Option::<JsonFloat>::deserialize(deserializer)?
                .map(JsonFloat::into_f64)
                .transpose()
        }
    }
}

/// A directory of checkpoints, one sub-directory per saved epoch.
///
/// Layout:
///
/// ```text
/// <root>/checkpoint-<epoch>/state.bin
/// <root>/checkpoint-<epoch>/metadata.json
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    /// Create a store rooted at `root`. The directory is created on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of the checkpoint of a given epoch.
    pub fn checkpoint_dir(&self, epoch: usize) -> PathBuf {
        self.root.join(format!("{DIR_PREFIX}{epoch}"))
    }

    /// Persist a model state and its metadata.
    ///
    /// Returns the directory the checkpoint was written to. An existing
    /// checkpoint of the same epoch is overwritten.
    pub fn save(
        &self,
        state: &ModelState,
        metadata: &CheckpointMetadata,
    ) -> Result<PathBuf, CheckpointError> {
        let dir = self.checkpoint_dir(metadata.epoch);
        fs::create_dir_all(&dir)?;

        let mut writer = BufWriter::new(File::create(dir.join(STATE_FILE))?);
        bincode::encode_into_std_write(state, &mut writer, bincode::config::standard())
            .map_err(|e| CheckpointError::Bincode(e.to_string()))?;

        let writer = BufWriter::new(File::create(dir.join(METADATA_FILE))?);
        serde_json::to_writer_pretty(writer, metadata)?;

        log::info!("Saved checkpoint of epoch {} to {}", metadata.epoch, dir.display());
        Ok(dir)
    }

    /// Load a checkpoint from one of the directories written by [`CheckpointStore::save`].
    pub fn load(
        location: impl AsRef<Path>,
    ) -> Result<(ModelState, CheckpointMetadata), CheckpointError> {
        let dir = location.as_ref();
        let state_path = dir.join(STATE_FILE);
        let metadata_path = dir.join(METADATA_FILE);
        if !state_path.is_file() || !metadata_path.is_file() {
            return Err(CheckpointError::InvalidDirectory(dir.to_path_buf()));
        }

        let mut reader = BufReader::new(File::open(state_path)?);
        let state: ModelState =
            bincode::decode_from_std_read(&mut reader, bincode::config::standard())
                .map_err(|e| CheckpointError::Bincode(e.to_string()))?;

        let reader = BufReader::new(File::open(metadata_path)?);
        let metadata: CheckpointMetadata = serde_json::from_reader(reader)?;

        log::debug!("Loaded checkpoint of epoch {} from {}", metadata.epoch, dir.display());
        Ok((state, metadata))
    }

    /// Directory of the checkpoint with the highest epoch, if any.
    pub fn latest(&self) -> Result<Option<PathBuf>, CheckpointError> {
        if !self.root.is_dir() {
            return Ok(None);
        }

        let mut best: Option<(usize, PathBuf)> = None;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            let Some(epoch) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix(DIR_PREFIX))
                .and_then(|epoch| epoch.parse::<usize>().ok())
            else {
                continue;
            };
            if !path.join(STATE_FILE).is_file() || !path.join(METADATA_FILE).is_file() {
                continue;
            }
            match &best {
                Some((best_epoch, _)) if *best_epoch >= epoch => {}
                _ => best = Some((epoch, path)),
            }
        }

        Ok(best.map(|(_, path)| path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(epoch: usize) -> CheckpointMetadata {
        CheckpointMetadata {
            epoch,
            train_loss: 0.5,
            valid_loss: Some(0.75),
            learning_rate: 0.01,
            config: TrainConfig::default(),
        }
    }

    fn state() -> ModelState {
        ModelState {
            name: "affine".to_string(),
            parameters: vec![1.0, -2.5, 3.25],
        }
    }

    #[test]
    fn test_save_load() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempfile::tempdir()?;
        let store = CheckpointStore::new(tmp.path());

        let dir = store.save(&state(), &metadata(5))?;
        assert_eq!(dir, tmp.path().join("checkpoint-5"));
        assert!(dir.join("state.bin").is_file());
        assert!(dir.join("metadata.json").is_file());

        let (loaded_state, loaded_metadata) = CheckpointStore::load(&dir)?;
        assert_eq!(loaded_state, state());
        assert_eq!(loaded_metadata, metadata(5));
        Ok(())
    }

    #[test]
    fn test_latest() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempfile::tempdir()?;
        let store = CheckpointStore::new(tmp.path().join("runs"));
        assert_eq!(store.latest()?, None);

        for epoch in [5, 20, 10] {
            store.save(&state(), &metadata(epoch))?;
        }
        fs::create_dir_all(tmp.path().join("runs").join("checkpoint-99"))?;
        fs::create_dir_all(tmp.path().join("runs").join("logs"))?;
        // an interrupted save leaves the state without its metadata
        let partial = tmp.path().join("runs").join("checkpoint-50");
        fs::create_dir_all(&partial)?;
        fs::copy(store.checkpoint_dir(5).join("state.bin"), partial.join("state.bin"))?;

        assert_eq!(store.latest()?, Some(store.checkpoint_dir(20)));
        Ok(())
    }

    #[test]
    fn test_non_finite_losses_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempfile::tempdir()?;
        let store = CheckpointStore::new(tmp.path());

        let diverged = CheckpointMetadata {
            train_loss: f64::NAN,
            valid_loss: Some(f64::INFINITY),
            ..metadata(3)
        };
        let dir = store.save(&state(), &diverged)?;
        let json = fs::read_to_string(dir.join("metadata.json"))?;
        assert!(json.contains("\"NaN\""));
        assert!(json.contains("\"inf\""));

        let (_, loaded) = CheckpointStore::load(&dir)?;
        assert!(loaded.train_loss.is_nan());
        assert_eq!(loaded.valid_loss, Some(f64::INFINITY));
        assert_eq!(loaded.learning_rate, 0.01);

        let no_valid = CheckpointMetadata {
            train_loss: f64::NEG_INFINITY,
            valid_loss: None,
            ..metadata(4)
        };
        let back: CheckpointMetadata = serde_json::from_str(&serde_json::to_string(&no_valid)?)?;
        assert_eq!(back, no_valid);
        Ok(())
    }

    #[test]
    fn test_load_invalid_directory() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempfile::tempdir()?;
        let res = CheckpointStore::load(tmp.path());
        assert!(matches!(res, Err(CheckpointError::InvalidDirectory(_))));

        fs::write(tmp.path().join("state.bin"), [0xff, 0xff, 0xff])?;
        fs::write(
            tmp.path().join("metadata.json"),
            serde_json::to_string(&metadata(1))?,
        )?;
        let res = CheckpointStore::load(tmp.path());
        assert!(matches!(res, Err(CheckpointError::Bincode(_))));
        Ok(())
    }
}
