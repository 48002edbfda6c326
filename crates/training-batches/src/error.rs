use index_classes::IndexError;
use storage_features::StoreError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SamplingError {
    #[error("only {population} rows remain after exclusion, {requested} negatives requested")]
    InsufficientPopulation { population: usize, requested: usize },
    #[error("invalid exclusion for {total} rows: {reason}")]
    InvalidExclusion { total: usize, reason: String },
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("no embedding for class `{0}`")]
    MissingMapping(String),
    #[error("no class entry for label `{0}`")]
    MissingClass(String),
    #[error("image table is empty")]
    EmptyStore,
    #[error("{table} rows are {found}-dimensional, configured for {expected}")]
    DimensionMismatch {
        table: &'static str,
        expected: usize,
        found: usize,
    },
    #[error(transparent)]
    Sampling(#[from] SamplingError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
