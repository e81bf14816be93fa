//! Error types for history operations

use std::path::Path;
use thiserror::Error;

/// Result type alias for history operations
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Errors surfaced by the history log engine
///
/// Malformed lines are deliberately absent: readers skip and log them
/// instead of failing the whole read.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// File system failure
    #[error("IO error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Update/delete/truncate target is absent from the log
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller supplied data that violates a log invariant
    #[error("Validation error: {0}")]
    Validation(String),

    /// A record could not be serialized for writing
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid storage configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl HistoryError {
    /// Create an IO error with a description of what was being attempted
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an IO error for an operation on a specific path
    pub fn io_at(action: &str, path: &Path, source: std::io::Error) -> Self {
        Self::io(format!("Failed to {} {}", action, path.display()), source)
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error reports a missing target
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display_includes_path() {
        let err = HistoryError::io_at(
            "open",
            Path::new("/tmp/chat.jsonl"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let text = err.to_string();
        assert!(text.contains("Failed to open /tmp/chat.jsonl"));
        assert!(text.contains("denied"));
    }

    #[test]
    fn test_not_found_classifier() {
        assert!(HistoryError::not_found("message m1").is_not_found());
        assert!(!HistoryError::validation("bad").is_not_found());
    }
}
