//! Compaction boundary lookup
//!
//! A boundary is an assistant record with `compactionBoundary: true`, a
//! recognised `compacted` marker and a positive `compactionEpoch`. Records
//! that claim to be boundaries but fail any of these checks are read as
//! ordinary records; the only report is a warning when an update replaces
//! one.

use std::ops::ControlFlow;

use super::HistoryLog;
use crate::error::HistoryResult;
use crate::ids::ConversationId;
use crate::record::{Record, Role, parse_line};
use crate::storage::Direction;
use tracing::{debug, warn};

/// Cheap pre-filter so only candidate lines are parsed during the scan
const BOUNDARY_KEY: &[u8] = b"\"compactionBoundary\"";

/// A durable boundary and where its line starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryLocation {
    pub offset: u64,
    pub epoch: u64,
    pub sequence: Option<u64>,
}

/// Page of history bounded by a compaction boundary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompactionWindow {
    pub records: Vec<Record>,
    /// Whether records older than the oldest one in `records` exist
    pub has_older: bool,
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Carry a valid boundary from `existing` onto an assistant `replacement`
/// that does not carry its own.
///
/// Late in-place rewrites of a summary record would otherwise erase the
/// checkpoint. Malformed boundaries are not carried.
pub(crate) fn carry_compaction_boundary(existing: &Record, replacement: &mut Record) {
    if !existing.metadata.claims_boundary() {
        return;
    }
    if let Some(defect) = existing.boundary_defect() {
        warn!(
            "Not preserving malformed compaction boundary on record {} (sequence {:?}): {}",
            existing.id,
            existing.sequence(),
            defect
        );
        return;
    }
    if replacement.role != Role::Assistant || replacement.is_compaction_boundary() {
        return;
    }

    let from = &existing.metadata;
    let to = &mut replacement.metadata;
    to.compacted = from.compacted.clone();
    to.compaction_boundary = from.compaction_boundary.clone();
    to.compaction_epoch = from.compaction_epoch.clone();
    if to.compaction_summary.is_none() {
        to.compaction_summary = from.compaction_summary.clone();
    }
    debug!(
        "Preserved compaction boundary (epoch {:?}) on record {}",
        existing.boundary_epoch(),
        replacement.id
    );
}

impl HistoryLog {
    /// Valid boundaries, newest first, stopping after `limit` if given
    pub async fn boundary_locations(
        &self,
        id: &ConversationId,
        limit: Option<usize>,
    ) -> HistoryResult<Vec<BoundaryLocation>> {
        let path = self.log_path(id)?;
        let mut found = Vec::new();
        if limit == Some(0) {
            return Ok(found);
        }

        self.scanner()
            .scan(&path, Direction::Backward, |batch| {
                for line in batch {
                    if !contains_bytes(&line.bytes, BOUNDARY_KEY) {
                        continue;
                    }
                    let Some(record) = parse_line(&line.bytes) else {
                        continue;
                    };
                    if let Some(epoch) = record.boundary_epoch() {
                        found.push(BoundaryLocation {
                            offset: line.offset,
                            epoch,
                            sequence: record.sequence(),
                        });
                        if limit.is_some_and(|l| found.len() >= l) {
                            return ControlFlow::Break(());
                        }
                    }
                }
                ControlFlow::Continue(())
            })
            .await?;
        Ok(found)
    }

    /// Byte offset of the `skip`-th most recent valid boundary (0 = newest)
    pub async fn find_boundary_offset(
        &self,
        id: &ConversationId,
        skip: usize,
    ) -> HistoryResult<Option<u64>> {
        let locations = self.boundary_locations(id, Some(skip + 1)).await?;
        Ok(locations.get(skip).map(|l| l.offset))
    }

    /// Records from the `skip`-th most recent boundary to the end.
    ///
    /// Falls back to shallower boundaries, then to the full log, when fewer
    /// than `skip + 1` boundaries exist.
    pub async fn read_from_boundary(&self, id: &ConversationId, skip: usize) -> HistoryResult<Vec<Record>> {
        let path = self.log_path(id)?;
        let locations = self.boundary_locations(id, Some(skip + 1)).await?;
        let offset = match locations.last() {
            Some(location) => {
                if locations.len() <= skip {
                    debug!(
                        conversation_id = %id,
                        "Only {} boundaries for skip {}, using the oldest found",
                        locations.len(),
                        skip
                    );
                }
                location.offset
            }
            None => 0,
        };
        self.read_from_offset(&path, offset).await
    }

    /// Page of records older than `before_sequence`.
    ///
    /// Uses the newest boundary whose tail holds at least one such record,
    /// falling back to the full log. One backward scan collects the page and
    /// then keeps going only until it sees an older record.
    pub async fn read_window(
        &self,
        id: &ConversationId,
        before_sequence: u64,
    ) -> HistoryResult<CompactionWindow> {
        let path = self.log_path(id)?;
        let mut records = Vec::new();
        let mut oldest: Option<u64> = None;
        let mut has_older = false;

        self.scanner()
            .scan(&path, Direction::Backward, |batch| {
                for line in batch {
                    let Some(record) = parse_line(&line.bytes) else {
                        continue;
                    };
                    let Some(sequence) = record.sequence() else {
                        continue;
                    };
                    if let Some(floor) = oldest {
                        if sequence < floor {
                            has_older = true;
                            return ControlFlow::Break(());
                        }
                        continue;
                    }
                    let is_boundary = record.is_compaction_boundary();
                    if sequence < before_sequence {
                        records.push(record);
                    }
                    if is_boundary && !records.is_empty() {
                        oldest = records.iter().filter_map(Record::sequence).min();
                    }
                }
                ControlFlow::Continue(())
            })
            .await?;

        records.reverse();
        Ok(CompactionWindow { records, has_older })
    }
}
