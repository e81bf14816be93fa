//! Write operations: append, update, delete, clear, migrate

use super::{HistoryLog, path_exists};
use crate::error::{HistoryError, HistoryResult};
use crate::ids::ConversationId;
use crate::partial::read_partial_file;
use crate::record::{Record, to_line};
use crate::storage::atomic;
use tokio::fs;
use tracing::{debug, info};

use super::boundary_ops::carry_compaction_boundary;

impl HistoryLog {
    /// Append one record, assigning a sequence if it has none.
    ///
    /// Returns the record exactly as persisted.
    pub async fn append(&self, id: &ConversationId, record: Record) -> HistoryResult<Record> {
        let _guard = self.serializer().lock(id).await;
        self.append_locked(id, record).await
    }

    /// Append while the caller already holds the conversation lock
    pub(crate) async fn append_locked(
        &self,
        id: &ConversationId,
        mut record: Record,
    ) -> HistoryResult<Record> {
        let path = self.log_path(id)?;
        match record.sequence() {
            Some(sequence) => {
                self.sequences()
                    .note_observed(id, sequence, || self.last_sequence_at(&path))
                    .await?
            }
            None => {
                let sequence = self
                    .sequences()
                    .next_for(id, || self.last_sequence_at(&path))
                    .await?;
                record.metadata.history_sequence = Some(sequence);
            }
        }
        record.conversation_id = Some(id.to_string());

        let line = to_line(&record)?;
        atomic::append_one(&path, &line).await?;
        debug!(
            conversation_id = %id,
            "Appended record {} at sequence {:?}",
            record.id,
            record.sequence()
        );
        Ok(record)
    }

    /// Replace the record with the same `historySequence`.
    ///
    /// A valid compaction boundary on the replaced record survives a plain
    /// assistant replacement.
    pub async fn update(&self, id: &ConversationId, record: Record) -> HistoryResult<()> {
        let _guard = self.serializer().lock(id).await;
        self.update_locked(id, record).await
    }

    pub(crate) async fn update_locked(
        &self,
        id: &ConversationId,
        mut record: Record,
    ) -> HistoryResult<()> {
        let sequence = record.sequence().ok_or_else(|| {
            HistoryError::validation(format!(
                "cannot update record {} without a historySequence",
                record.id
            ))
        })?;
        let path = self.log_path(id)?;

        // Sequence positions are not indexed, so this is a full read + rewrite
        let mut records = self.read_all_at(&path).await?;
        let existing = records
            .iter_mut()
            .find(|r| r.sequence() == Some(sequence))
            .ok_or_else(|| {
                HistoryError::not_found(format!(
                    "no record with historySequence {} in conversation {}",
                    sequence, id
                ))
            })?;

        carry_compaction_boundary(existing, &mut record);
        record.conversation_id = Some(id.to_string());
        *existing = record;

        self.rewrite(&path, &records).await?;
        debug!(conversation_id = %id, "Updated record at sequence {}", sequence);
        Ok(())
    }

    /// Remove exactly one record by id; other records keep their sequences
    pub async fn delete_by_id(&self, id: &ConversationId, record_id: &str) -> HistoryResult<()> {
        let _guard = self.serializer().lock(id).await;
        let path = self.log_path(id)?;

        let mut records = self.read_all_at(&path).await?;
        let position = records
            .iter()
            .position(|r| r.id == record_id)
            .ok_or_else(|| {
                HistoryError::not_found(format!(
                    "no record {} in conversation {}",
                    record_id, id
                ))
            })?;

        // Seed from the full set first so the counter cannot fall back onto
        // the removed record's sequence.
        if let Some(max) = records.iter().filter_map(Record::sequence).max() {
            self.sequences().raise_to(id, max.saturating_add(1));
        }
        records.remove(position);

        self.rewrite(&path, &records).await?;
        debug!(conversation_id = %id, "Deleted record {}", record_id);
        Ok(())
    }

    /// Remove the log and any staged partial; sequences restart at 0
    pub async fn clear(&self, id: &ConversationId) -> HistoryResult<()> {
        let _guard = self.serializer().lock(id).await;
        let log_removed = atomic::remove_if_exists(&self.log_path(id)?).await?;
        atomic::remove_if_exists(&self.partial_path(id)?).await?;
        self.sequences().reset(id, 0);
        info!(conversation_id = %id, "Cleared history (log existed: {})", log_removed);
        Ok(())
    }

    /// Move a conversation to a new id as a unit.
    ///
    /// Renames the directory, then rewrites every record (and the staged
    /// partial) to carry the new id. The sequence counter moves along.
    pub async fn migrate(&self, from: &ConversationId, to: &ConversationId) -> HistoryResult<()> {
        from.validate()?;
        to.validate()?;
        if from == to {
            return Err(HistoryError::validation(format!(
                "cannot migrate conversation {} onto itself",
                from
            )));
        }
        let _guards = self.serializer().lock_pair(from, to).await;

        let from_dir = self.config().conversation_dir(from);
        let to_dir = self.config().conversation_dir(to);
        if !path_exists(&from_dir).await? {
            return Err(HistoryError::not_found(format!("conversation {}", from)));
        }
        if path_exists(&to_dir).await? {
            return Err(HistoryError::validation(format!(
                "conversation {} already exists",
                to
            )));
        }
        fs::rename(&from_dir, &to_dir)
            .await
            .map_err(|e| HistoryError::io_at("rename", &from_dir, e))?;

        let log_path = self.log_path(to)?;
        if path_exists(&log_path).await? {
            let mut records = self.read_all_at(&log_path).await?;
            for record in &mut records {
                record.conversation_id = Some(to.to_string());
            }
            self.rewrite(&log_path, &records).await?;
        }

        let partial_path = self.partial_path(to)?;
        if let Some(mut partial) = read_partial_file(&partial_path).await? {
            partial.conversation_id = Some(to.to_string());
            atomic::write_all(&partial_path, &serde_json::to_vec(&partial)?).await?;
        }

        match self.sequences().forget(from) {
            Some(next) => self.sequences().reset(to, next),
            None => {
                self.sequences().forget(to);
            }
        }

        info!("Migrated conversation {} to {}", from, to);
        Ok(())
    }
}
