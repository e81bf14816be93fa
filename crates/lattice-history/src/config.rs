//! Storage configuration and on-disk layout

use crate::error::{HistoryError, HistoryResult};
use crate::ids::ConversationId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default window size for chunked scans (256 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Default log file name inside a conversation directory
pub const DEFAULT_LOG_FILE: &str = "chat.jsonl";

/// Default staged-partial file name inside a conversation directory
pub const DEFAULT_PARTIAL_FILE: &str = "partial.json";

/// History storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Root directory holding one subdirectory per conversation
    pub data_dir: PathBuf,
    /// Bytes read per window when scanning a log
    pub chunk_size: usize,
    /// Name of the append-only log file
    pub log_file_name: String,
    /// Name of the staged partial record file
    pub partial_file_name: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lattice")
            .join("sessions");
        Self {
            data_dir,
            chunk_size: DEFAULT_CHUNK_SIZE,
            log_file_name: DEFAULT_LOG_FILE.to_string(),
            partial_file_name: DEFAULT_PARTIAL_FILE.to_string(),
        }
    }
}

impl HistoryConfig {
    /// Create a configuration rooted at a custom data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Override the scan window size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Check values that would make the engine misbehave
    pub fn validate(&self) -> HistoryResult<()> {
        if self.chunk_size == 0 {
            return Err(HistoryError::config("chunk_size must be greater than zero"));
        }
        if self.log_file_name.is_empty() || self.partial_file_name.is_empty() {
            return Err(HistoryError::config("file names must not be empty"));
        }
        if self.log_file_name == self.partial_file_name {
            return Err(HistoryError::config(
                "log_file_name and partial_file_name must differ",
            ));
        }
        Ok(())
    }

    /// Directory owned by one conversation
    pub fn conversation_dir(&self, id: &ConversationId) -> PathBuf {
        self.data_dir.join(id.as_str())
    }

    /// Path of a conversation's `chat.jsonl`
    pub fn log_path(&self, id: &ConversationId) -> PathBuf {
        self.conversation_dir(id).join(&self.log_file_name)
    }

    /// Path of a conversation's `partial.json`
    pub fn partial_path(&self, id: &ConversationId) -> PathBuf {
        self.conversation_dir(id).join(&self.partial_file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let config = HistoryConfig::with_data_dir("/data");
        let id = ConversationId::from("c1");
        assert_eq!(config.log_path(&id), PathBuf::from("/data/c1/chat.jsonl"));
        assert_eq!(config.partial_path(&id), PathBuf::from("/data/c1/partial.json"));
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_validate() {
        assert!(HistoryConfig::with_data_dir("/data").validate().is_ok());
        assert!(
            HistoryConfig::with_data_dir("/data")
                .with_chunk_size(0)
                .validate()
                .is_err()
        );
        let mut same_names = HistoryConfig::with_data_dir("/data");
        same_names.partial_file_name = same_names.log_file_name.clone();
        assert!(same_names.validate().is_err());
    }

    #[test]
    fn test_sparse_config_uses_defaults() {
        let config: HistoryConfig = serde_json::from_str(r#"{"data_dir":"/x"}"#).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/x"));
        assert_eq!(config.log_file_name, DEFAULT_LOG_FILE);
    }
}
