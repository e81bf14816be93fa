//! Error types for idle compaction

use lattice_history::HistoryError;
use thiserror::Error;

/// Result type alias for idle compaction operations
pub type IdleResult<T> = Result<T, IdleError>;

#[derive(Debug, Error)]
pub enum IdleError {
    /// Reading the conversation history failed
    #[error(transparent)]
    History(#[from] HistoryError),

    /// The activity source could not report on a conversation
    #[error("Activity source error: {0}")]
    Activity(String),

    /// The compaction executor reported a failure
    #[error("Compaction failed: {0}")]
    Compaction(String),

    /// Invalid scheduler settings or an unreadable threshold source
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IdleError {
    /// Wrap an error returned by the activity source
    pub fn activity(err: anyhow::Error) -> Self {
        Self::Activity(format!("{:#}", err))
    }

    /// Wrap an error returned by the compaction executor
    pub fn compaction(err: anyhow::Error) -> Self {
        Self::Compaction(format!("{:#}", err))
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
