//! Error types for the crate

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, CointError>;

#[derive(Error, Debug)]
pub enum CointError {
    /// Malformed shape or size of a series matrix, lag order or test result
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The decomposition failed (singular moments, degenerate sample)
    #[error("Numerical error: {0}")]
    NumericalError(String),

    /// Malformed price or series file
    #[error("Data error: {0}")]
    Data(String),

    /// Failure reported by the host backtesting engine
    #[error("Engine error: {0}")]
    Engine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CointError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        CointError::InvalidInput(msg.into())
    }

    pub fn numerical(msg: impl Into<String>) -> Self {
        CointError::NumericalError(msg.into())
    }

    /// True for the two failure kinds the rank selection itself can raise
    pub fn is_statistical(&self) -> bool {
        matches!(self, CointError::InvalidInput(_) | CointError::NumericalError(_))
    }
}
