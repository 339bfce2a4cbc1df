use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("invalid timestamp {value:?}: {source}")]
    InvalidTimestamp {
        value: String,
        source: chrono::ParseError,
    },
    #[error("failed to read dataset: {0}")]
    DatasetError(#[from] csv::Error),
    #[error("row {row}: {source}")]
    InvalidRow {
        row: usize,
        source: Box<ModelError>,
    },
    #[error("dataset holds no rows")]
    EmptyDataset,
    #[error("test fraction must be in [0, 1), got {0}")]
    InvalidSplit(f64),
    #[error("features and target differ in length ({features} vs {target})")]
    LengthMismatch { features: usize, target: usize },
    #[error("model expects {expected} feature columns, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("target values must be 0 or 1, found {0}")]
    InvalidTarget(u8),
    #[error("model has not been trained")]
    NotTrained,
    #[error("model file {path} does not match the expected feature columns")]
    IncompatibleColumns { path: PathBuf },
    #[error("failed to (de)serialize model: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
