//! Read operations: tail reads, full iteration, sequence discovery

use std::ops::ControlFlow;
use std::path::Path;

use super::HistoryLog;
use crate::error::{HistoryError, HistoryResult};
use crate::ids::ConversationId;
use crate::record::{Record, parse_line};
use crate::storage::{Direction, ScannedLine};
use tokio::fs;
use tracing::debug;

fn parse_batch(batch: Vec<ScannedLine>) -> Vec<Record> {
    batch
        .into_iter()
        .filter_map(|line| parse_line(&line.bytes))
        .collect()
}

impl HistoryLog {
    /// Whether the conversation has any history, judged by file size only
    pub async fn has_any(&self, id: &ConversationId) -> HistoryResult<bool> {
        let path = self.log_path(id)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.len() > 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(HistoryError::io_at("stat", &path, e)),
        }
    }

    /// The newest `n` records in chronological order.
    ///
    /// Reads backward from the end and stops as soon as `n` records parsed.
    pub async fn read_last(&self, id: &ConversationId, n: usize) -> HistoryResult<Vec<Record>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let path = self.log_path(id)?;
        let mut newest_first = Vec::with_capacity(n);
        self.scanner()
            .scan(&path, Direction::Backward, |batch| {
                for record in parse_batch(batch) {
                    newest_first.push(record);
                    if newest_first.len() == n {
                        return ControlFlow::Break(());
                    }
                }
                ControlFlow::Continue(())
            })
            .await?;
        newest_first.reverse();
        Ok(newest_first)
    }

    /// Every record in chronological order
    pub async fn read_all(&self, id: &ConversationId) -> HistoryResult<Vec<Record>> {
        let path = self.log_path(id)?;
        self.read_all_at(&path).await
    }

    pub(crate) async fn read_all_at(&self, path: &Path) -> HistoryResult<Vec<Record>> {
        self.read_from_offset(path, 0).await
    }

    /// Records from byte `offset` (a line start) to the end of the log
    pub(crate) async fn read_from_offset(&self, path: &Path, offset: u64) -> HistoryResult<Vec<Record>> {
        let mut records = Vec::new();
        self.scanner()
            .scan_forward_from(path, offset, |batch| {
                records.extend(parse_batch(batch));
                ControlFlow::Continue(())
            })
            .await?;
        debug!("Read {} records from {:?} at offset {}", records.len(), path, offset);
        Ok(records)
    }

    /// Stream the full history to `visitor` one window at a time.
    ///
    /// Forward batches are oldest first; backward batches are newest first,
    /// both within and across batches. Return `ControlFlow::Break` to stop.
    pub async fn iterate<F>(
        &self,
        id: &ConversationId,
        direction: Direction,
        mut visitor: F,
    ) -> HistoryResult<()>
    where
        F: FnMut(&[Record]) -> ControlFlow<()>,
    {
        let path = self.log_path(id)?;
        self.scanner()
            .scan(&path, direction, |batch| {
                let records = parse_batch(batch);
                if records.is_empty() {
                    ControlFlow::Continue(())
                } else {
                    visitor(&records)
                }
            })
            .await
    }

    /// Newest valid `historySequence` in the log, scanning backward past
    /// records that lack one
    pub async fn last_sequence(&self, id: &ConversationId) -> HistoryResult<Option<u64>> {
        let path = self.log_path(id)?;
        self.last_sequence_at(&path).await
    }

    pub(crate) async fn last_sequence_at(&self, path: &Path) -> HistoryResult<Option<u64>> {
        let mut found = None;
        self.scanner()
            .scan(path, Direction::Backward, |batch| {
                found = parse_batch(batch).iter().find_map(Record::sequence);
                if found.is_some() {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await?;
        Ok(found)
    }

    /// The sequence the next auto-assigned append will receive
    pub async fn next_sequence(&self, id: &ConversationId) -> HistoryResult<u64> {
        let path = self.log_path(id)?;
        self.sequences()
            .peek_next(id, || self.last_sequence_at(&path))
            .await
    }
}
