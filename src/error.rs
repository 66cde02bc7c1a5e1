//! Typed errors for the storage, bundle and parsing layers.
//!
//! Orchestration code and the CLI wrap these in `anyhow` with context.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("malformed bundle {path}: {reason}")]
    MalformedBundle { path: PathBuf, reason: String },

    #[error("invalid timeframe: {0:?}")]
    InvalidTimeframe(String),

    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("date arithmetic out of range: {0}")]
    OutOfRange(String),

    #[error("invalid timestamp {value:?} in {path}")]
    InvalidTimestamp { path: PathBuf, value: String },
}

impl DataError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DataError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        DataError::MalformedBundle {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type DataResult<T> = std::result::Result<T, DataError>;
