use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("integrity error: {0}")]
    Integrity(String),
    #[error("vector/id count mismatch: {vectors} vectors for {ids} ids")]
    ShapeMismatch { vectors: usize, ids: usize },
    #[error("table `{table}` holds {expected}-dimensional rows, got {found}")]
    DimensionMismatch {
        table: String,
        expected: usize,
        found: usize,
    },
    #[error("row {index} out of range for table of {len} rows")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("no table named `{0}`")]
    MissingTable(String),
    #[error("invalid table name: {0}")]
    InvalidTableName(String),
    #[error("store opened read-only")]
    ReadOnly,
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
