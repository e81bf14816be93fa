//! Append-only conversation history log
//!
//! Each conversation owns one directory under the data directory:
//!
//! ```text
//! <data_dir>/
//!   <conversation-id>/
//!     chat.jsonl     one record per line
//!     partial.json   staged in-flight record (optional)
//! ```
//!
//! Mutations take the conversation's lock from [`MutationSerializer`];
//! plain reads do not.

mod boundary_ops;
mod read_ops;
mod truncate_ops;
mod write_ops;


pub use boundary_ops::{BoundaryLocation, CompactionWindow};

use crate::config::HistoryConfig;
use crate::error::{HistoryError, HistoryResult};
use crate::ids::ConversationId;
use crate::record::{Record, to_line};
use crate::sequence::SequenceAllocator;
use crate::serializer::MutationSerializer;
use crate::storage::{LineScanner, atomic};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// History log engine shared by every conversation in one data directory
#[derive(Debug)]
pub struct HistoryLog {
    config: HistoryConfig,
    scanner: LineScanner,
    sequences: SequenceAllocator,
    serializer: MutationSerializer,
}

impl HistoryLog {
    /// Create an engine over `config.data_dir`
    pub fn new(config: HistoryConfig) -> HistoryResult<Self> {
        config.validate()?;
        Ok(Self {
            scanner: LineScanner::new(config.chunk_size),
            config,
            sequences: SequenceAllocator::new(),
            serializer: MutationSerializer::new(),
        })
    }

    /// Create an engine with default settings rooted at `data_dir`
    pub fn open(data_dir: impl Into<PathBuf>) -> HistoryResult<Self> {
        Self::new(HistoryConfig::with_data_dir(data_dir))
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Per-conversation lock shared with the partial store
    pub fn serializer(&self) -> &MutationSerializer {
        &self.serializer
    }

    pub fn sequences(&self) -> &SequenceAllocator {
        &self.sequences
    }

    pub(crate) fn scanner(&self) -> &LineScanner {
        &self.scanner
    }

    pub(crate) fn log_path(&self, id: &ConversationId) -> HistoryResult<PathBuf> {
        id.validate()?;
        Ok(self.config.log_path(id))
    }

    pub(crate) fn partial_path(&self, id: &ConversationId) -> HistoryResult<PathBuf> {
        id.validate()?;
        Ok(self.config.partial_path(id))
    }

    /// Replace the whole log with `records`
    pub(crate) async fn rewrite(&self, path: &Path, records: &[Record]) -> HistoryResult<()> {
        let mut bytes = Vec::new();
        for record in records {
            bytes.extend_from_slice(&to_line(record)?);
        }
        atomic::write_all(path, &bytes).await?;
        debug!("Rewrote {:?} with {} records", path, records.len());
        Ok(())
    }

    /// Conversations that currently have a directory in the data dir
    pub async fn list_conversations(&self) -> HistoryResult<Vec<ConversationId>> {
        let data_dir = &self.config.data_dir;
        let mut entries = match fs::read_dir(data_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HistoryError::io_at("read directory", data_dir, e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| HistoryError::io_at("read directory entry in", data_dir, e))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let id = ConversationId::new(name);
            match id.validate() {
                Ok(()) => ids.push(id),
                Err(e) => warn!("Ignoring conversation directory {:?}: {}", entry.path(), e),
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Existence check that surfaces real I/O failures
pub(crate) async fn path_exists(path: &Path) -> HistoryResult<bool> {
    match fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(HistoryError::io_at("stat", path, e)),
    }
}
