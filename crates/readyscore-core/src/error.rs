use thiserror::Error;

/// Core error type shared across readyscore crates.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The dataset cannot be represented as a table.
    #[error("invalid dataset: {0}")]
    InvalidDataset(String),
    /// Unknown dimension name.
    #[error("unknown dimension: {0}")]
    UnknownDimension(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Convenience alias for results returned by readyscore crates.
pub type Result<T> = std::result::Result<T, CoreError>;
