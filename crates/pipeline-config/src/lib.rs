//! Pipeline configuration loaded once at startup and passed by reference.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "pipeline.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {reason}")]
    Io { path: PathBuf, reason: String },
    #[error("invalid configuration: {0}")]
    Parse(String),
    #[error("configuration rejected: {0}")]
    Invalid(String),
    #[error("run mode must be TRAIN or VALID, got `{0}`")]
    UnknownRunMode(String),
    #[error("image root {0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("feature store {0} does not exist")]
    MissingStore(PathBuf),
}

/// Which half of the dataset a run operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    #[serde(rename = "TRAIN")]
    Train,
    #[serde(rename = "VALID")]
    Valid,
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRAIN" => Ok(Self::Train),
            "VALID" => Ok(Self::Valid),
            other => Err(ConfigError::UnknownRunMode(other.to_string())),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => f.write_str("TRAIN"),
            Self::Valid => f.write_str("VALID"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// Width of an extracted image feature row.
    pub image_dim: usize,
    /// Width of a word embedding row.
    pub word_dim: usize,
    /// Images handed to the extractor per call.
    pub extraction_batch: usize,
    /// Negatives drawn for every genuine pair.
    pub negatives_per_batch: usize,
    #[serde(default)]
    pub sampling_seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorePaths {
    pub training: PathBuf,
    pub validation: PathBuf,
    pub embeddings: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub weights_path: PathBuf,
    #[serde(default = "default_input_name")]
    pub input_name: String,
    #[serde(default = "default_output_name")]
    pub output_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataLocations {
    pub training_images: PathBuf,
    pub validation_images: PathBuf,
    pub training_class_ranges: PathBuf,
    pub validation_class_ranges: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub training: TrainingSettings,
    pub stores: StorePaths,
    pub model: ModelSettings,
    pub data: DataLocations,
}

/// Paths a single run touches, picked from [`PipelineConfig`] by run mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings<'a> {
    pub mode: RunMode,
    pub images_root: &'a Path,
    pub feature_store: &'a Path,
    pub class_ranges: &'a Path,
}

impl RunSettings<'_> {
    /// Fails unless the image root is a directory and the store file exists.
    pub fn check_paths(&self) -> Result<(), ConfigError> {
        if !self.images_root.is_dir() {
            return Err(ConfigError::NotADirectory(self.images_root.to_path_buf()));
        }
        if !self.feature_store.is_file() {
            return Err(ConfigError::MissingStore(self.feature_store.to_path_buf()));
        }
        Ok(())
    }
}

impl PipelineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let training = &self.training;
        if training.image_dim == 0 || training.word_dim == 0 {
            return Err(ConfigError::Invalid(
                "image_dim and word_dim must be non-zero".into(),
            ));
        }
        if training.extraction_batch == 0 {
            return Err(ConfigError::Invalid(
                "extraction_batch must be at least 1".into(),
            ));
        }
        if training.negatives_per_batch == 0 {
            return Err(ConfigError::Invalid(
                "negatives_per_batch must be at least 1".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn run_settings(&self, mode: RunMode) -> RunSettings<'_> {
        match mode {
            RunMode::Train => RunSettings {
                mode,
                images_root: &self.data.training_images,
                feature_store: &self.stores.training,
                class_ranges: &self.data.training_class_ranges,
            },
            RunMode::Valid => RunSettings {
                mode,
                images_root: &self.data.validation_images,
                feature_store: &self.stores.validation,
                class_ranges: &self.data.validation_class_ranges,
            },
        }
    }
}

fn default_input_name() -> String {
    "input".to_string()
}

fn default_output_name() -> String {
    "output".to_string()
}
