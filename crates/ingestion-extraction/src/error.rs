use std::path::PathBuf;

use index_classes::IndexError;
use pipeline_config::ConfigError;
use storage_features::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to walk {root}: {reason}")]
    Walk { root: PathBuf, reason: String },
    #[error("failed to load image {path}: {reason}")]
    Image { path: PathBuf, reason: String },
    #[error("feature extractor failed: {0}")]
    Extractor(String),
    #[error("extractor returned {found:?} features for a chunk expecting {expected:?}")]
    OutputShape {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("extractor produces {found}-wide features, configuration expects {expected}")]
    ExtractorWidth { expected: usize, found: usize },
    #[error("row buffer does not match its shape: {0}")]
    Shape(String),
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("I/O error: {0}")]
    Io(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<std::io::Error> for ExtractionError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
