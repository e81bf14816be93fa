//! Truncation by record id and by share of the total token weight

use super::HistoryLog;
use crate::error::{HistoryError, HistoryResult};
use crate::ids::ConversationId;
use crate::record::Record;
use crate::storage::atomic;
use tracing::{debug, info};

impl HistoryLog {
    /// Drop the record `record_id` and everything after it.
    ///
    /// The counter continues from the new tail.
    pub async fn truncate_after_id(&self, id: &ConversationId, record_id: &str) -> HistoryResult<()> {
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
        let dropped = records.len() - position;
        records.truncate(position);
        self.rewrite(&path, &records).await?;

        let next = records
            .iter()
            .filter_map(Record::sequence)
            .max()
            .map_or(0, |max| max.saturating_add(1));
        self.sequences().reset(id, next);

        debug!(
            conversation_id = %id,
            "Truncated {} records from {} onward; next sequence {}",
            dropped, record_id, next
        );
        Ok(())
    }

    /// Remove the oldest records until at least `floor(total * fraction)` of
    /// the approximate token weight is gone.
    ///
    /// Records are never split. Returns the removed sequences, oldest first.
    /// `fraction == 1.0` deletes the log without reading it, resets the
    /// counter to 0 and returns an empty list.
    pub async fn truncate_by_percentage(
        &self,
        id: &ConversationId,
        fraction: f64,
    ) -> HistoryResult<Vec<u64>> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(HistoryError::validation(format!(
                "truncation fraction {} is outside [0, 1]",
                fraction
            )));
        }
        let _guard = self.serializer().lock(id).await;
        let path = self.log_path(id)?;

        if fraction >= 1.0 {
            atomic::remove_if_exists(&path).await?;
            self.sequences().reset(id, 0);
            info!(conversation_id = %id, "Truncated entire history");
            return Ok(Vec::new());
        }

        let mut records = self.read_all_at(&path).await?;
        let weights: Vec<usize> = records.iter().map(Record::approx_tokens).collect();
        let total: usize = weights.iter().sum();
        let target = (total as f64 * fraction).floor() as usize;

        let mut removed_weight = 0;
        let mut cut = 0;
        while cut < records.len() && removed_weight < target {
            removed_weight += weights[cut];
            cut += 1;
        }
        if cut == 0 {
            return Ok(Vec::new());
        }

        if let Some(max) = records.iter().filter_map(Record::sequence).max() {
            self.sequences().raise_to(id, max.saturating_add(1));
        }
        let removed: Vec<u64> = records.drain(..cut).filter_map(|r| r.sequence()).collect();
        self.rewrite(&path, &records).await?;

        info!(
            conversation_id = %id,
            "Truncated {} records ({} of {} tokens)",
            cut, removed_weight, total
        );
        Ok(removed)
    }
}
