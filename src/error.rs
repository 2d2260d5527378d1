use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OscillationError {
    #[error("{operation} failed: {detail}")]
    Device { operation: &'static str, detail: String },
    #[error("insufficient data: requested {requested} samples, board has {available}")]
    InsufficientData { requested: usize, available: usize },
    #[error("division by zero: {numerator} / {denominator}")]
    DivisionByZero { numerator: f64, denominator: f64 },
    #[error("band power estimation failed: {0}")]
    Spectral(String),
    #[error("column {column} has {found} rows, expected {expected}")]
    LengthMismatch {
        column: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("failed to write {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl OscillationError {
    pub fn device(operation: &'static str, detail: impl std::fmt::Display) -> Self {
        OscillationError::Device {
            operation,
            detail: detail.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OscillationError>;
