//! Conversation identifiers

use crate::error::{HistoryError, HistoryResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a conversation (one chat session / minion)
///
/// Opaque to the engine except that it names a directory under the data
/// directory, so it must be a single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reject ids that would escape the data directory
    pub fn validate(&self) -> HistoryResult<()> {
        let id = self.0.as_str();
        if id.is_empty() {
            return Err(HistoryError::validation("conversation id is empty"));
        }
        if id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
            return Err(HistoryError::validation(format!(
                "conversation id {:?} is not a single path component",
                id
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ConversationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_plain_ids() {
        assert!(ConversationId::from("minion-7f3a").validate().is_ok());
        assert!(ConversationId::from("a.b_c").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_path_escapes() {
        for bad in ["", ".", "..", "a/b", "..\\x", "nul\0"] {
            assert!(
                ConversationId::from(bad).validate().is_err(),
                "expected {:?} to be rejected",
                bad
            );
        }
    }
}
