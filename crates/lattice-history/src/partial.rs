//! Staging for the in-flight record of a conversation
//!
//! While a response streams, its accumulated content lives in
//! `partial.json` next to the log. On completion (or interruption) the
//! partial is folded into the log by [`PartialStagingStore::commit`].

use crate::error::{HistoryError, HistoryResult};
use crate::ids::ConversationId;
use crate::log::HistoryLog;
use crate::record::{Record, parse_line};
use crate::storage::atomic;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

/// Result of folding a partial into the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// No partial was staged
    NothingStaged,
    /// Appended as a new record
    Appended,
    /// Replaced the record with the same sequence
    Updated,
    /// Not worth persisting; dropped
    Discarded,
}

/// Read a staged partial, treating missing or malformed files as absent
pub(crate) async fn read_partial_file(path: &Path) -> HistoryResult<Option<Record>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(parse_line(&bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(HistoryError::io_at("read", path, e)),
    }
}

/// At most one not-yet-durable record per conversation
#[derive(Debug, Clone)]
pub struct PartialStagingStore {
    log: Arc<HistoryLog>,
}

impl PartialStagingStore {
    pub fn new(log: Arc<HistoryLog>) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &Arc<HistoryLog> {
        &self.log
    }

    /// Stage `record`, replacing any previous partial
    pub async fn write(&self, id: &ConversationId, mut record: Record) -> HistoryResult<()> {
        let _guard = self.log.serializer().lock(id).await;
        let path = self.log.partial_path(id)?;
        record.metadata.partial = Some(true);
        record.conversation_id = Some(id.to_string());
        atomic::write_all(&path, &serde_json::to_vec(&record)?).await
    }

    pub async fn read(&self, id: &ConversationId) -> HistoryResult<Option<Record>> {
        let path = self.log.partial_path(id)?;
        read_partial_file(&path).await
    }

    pub async fn delete(&self, id: &ConversationId) -> HistoryResult<()> {
        let _guard = self.log.serializer().lock(id).await;
        atomic::remove_if_exists(&self.log.partial_path(id)?).await?;
        Ok(())
    }

    /// Fold the staged partial into the log and remove it.
    ///
    /// The partial is committed only when it has durable content and either
    /// no record exists at its sequence in the active window or it has more
    /// parts than that record. The partial file is deleted in every case.
    pub async fn commit(&self, id: &ConversationId) -> HistoryResult<CommitOutcome> {
        let _guard = self.log.serializer().lock(id).await;
        let path = self.log.partial_path(id)?;

        let Some(partial) = read_partial_file(&path).await? else {
            return Ok(CommitOutcome::NothingStaged);
        };

        let outcome = self.fold(id, partial).await;
        if let Err(e) = atomic::remove_if_exists(&path).await {
            warn!(conversation_id = %id, "Failed to remove staged partial: {}", e);
        }
        outcome
    }

    async fn fold(&self, id: &ConversationId, mut partial: Record) -> HistoryResult<CommitOutcome> {
        // Stream errors are transient; the content gathered so far is kept
        partial.metadata.error = None;
        partial.metadata.error_type = None;
        partial.metadata.partial = None;

        let sequence = partial.sequence().ok_or_else(|| {
            HistoryError::validation(format!(
                "staged partial {} has no historySequence",
                partial.id
            ))
        })?;

        let window = self.log.read_from_boundary(id, 0).await?;
        let existing = window.iter().find(|r| r.sequence() == Some(sequence));

        let worthy = partial.parts.iter().any(|p| p.is_commit_worthy());
        let richer = existing.is_none_or(|e| partial.parts.len() > e.parts.len());
        if !worthy || !richer {
            debug!(
                conversation_id = %id,
                "Discarding staged partial {} (commit-worthy: {}, richer: {})",
                partial.id, worthy, richer
            );
            return Ok(CommitOutcome::Discarded);
        }

        if existing.is_some() {
            self.log.update_locked(id, partial).await?;
            info!(conversation_id = %id, "Committed staged partial over sequence {}", sequence);
            Ok(CommitOutcome::Updated)
        } else {
            self.log.append_locked(id, partial).await?;
            info!(conversation_id = %id, "Committed staged partial at sequence {}", sequence);
            Ok(CommitOutcome::Appended)
        }
    }
}
