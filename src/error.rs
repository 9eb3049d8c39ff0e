//! Error types for the gaze estimation library.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Calibration procedure error
    #[error("Calibration error: {0}")]
    CalibrationError(String),

    /// Secondary-detector worker error
    #[error("Worker error: {0}")]
    WorkerError(String),

    /// Profile persistence error
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Temporal filter construction or configuration error
    #[error("Filter error: {0}")]
    FilterError(String),
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
