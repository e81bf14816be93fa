//! Top-level error type

use lattice_history::HistoryError;
use lattice_idle::IdleError;
use thiserror::Error;

pub type LatticeResult<T> = Result<T, LatticeError>;

#[derive(Debug, Error)]
pub enum LatticeError {
    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Idle(#[from] IdleError),

    /// Configuration file or environment could not be applied
    #[error("Configuration error: {0}")]
    Config(String),

    /// The tracing subscriber could not be installed
    #[error("Logging error: {0}")]
    Logging(String),
}

impl LatticeError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
