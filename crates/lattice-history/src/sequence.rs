//! Per-conversation sequence counters
//!
//! Counters live in memory for the lifetime of the owning [`HistoryLog`]
//! and are seeded lazily from the log itself.
//!
//! [`HistoryLog`]: crate::HistoryLog

use crate::error::{HistoryError, HistoryResult};
use crate::ids::ConversationId;
use dashmap::DashMap;
use std::future::Future;

/// Monotonic sequence allocator, one counter per conversation
#[derive(Debug, Default)]
pub struct SequenceAllocator {
    /// Next sequence to hand out, keyed by conversation
    counters: DashMap<ConversationId, u64>,
}

impl SequenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the counter from `load` if it has not been seen yet.
    ///
    /// `load` returns the newest valid sequence in the log, if any.
    async fn ensure<F, Fut>(&self, id: &ConversationId, load: F) -> HistoryResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = HistoryResult<Option<u64>>>,
    {
        if self.counters.contains_key(id) {
            return Ok(());
        }
        let next = match load().await? {
            Some(last) => successor(last)?,
            None => 0,
        };
        self.counters.entry(id.clone()).or_insert(next);
        Ok(())
    }

    /// Hand out the next sequence for `id` and advance the counter
    pub async fn next_for<F, Fut>(&self, id: &ConversationId, load: F) -> HistoryResult<u64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = HistoryResult<Option<u64>>>,
    {
        self.ensure(id, load).await?;
        let mut counter = self.counters.entry(id.clone()).or_insert(0);
        let assigned = *counter;
        *counter = successor(assigned)?;
        Ok(assigned)
    }

    /// Record a caller-supplied sequence so later allocations stay above it
    pub async fn note_observed<F, Fut>(
        &self,
        id: &ConversationId,
        sequence: u64,
        load: F,
    ) -> HistoryResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = HistoryResult<Option<u64>>>,
    {
        let floor = successor(sequence)?;
        self.ensure(id, load).await?;
        let mut counter = self.counters.entry(id.clone()).or_insert(0);
        *counter = (*counter).max(floor);
        Ok(())
    }

    /// The sequence the next allocation would return, without advancing
    pub async fn peek_next<F, Fut>(&self, id: &ConversationId, load: F) -> HistoryResult<u64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = HistoryResult<Option<u64>>>,
    {
        self.ensure(id, load).await?;
        Ok(self.peek(id).unwrap_or(0))
    }

    /// Current value of the counter, if seeded
    pub fn peek(&self, id: &ConversationId) -> Option<u64> {
        self.counters.get(id).map(|c| *c)
    }

    /// Raise the counter to at least `next`; never lowers it
    pub fn raise_to(&self, id: &ConversationId, next: u64) {
        let mut counter = self.counters.entry(id.clone()).or_insert(next);
        *counter = (*counter).max(next);
    }

    /// Set the counter exactly (truncation and clear)
    pub fn reset(&self, id: &ConversationId, next: u64) {
        self.counters.insert(id.clone(), next);
    }

    /// Drop the counter; it will be reseeded from disk on next use
    pub fn forget(&self, id: &ConversationId) -> Option<u64> {
        self.counters.remove(id).map(|(_, next)| next)
    }
}

fn successor(sequence: u64) -> HistoryResult<u64> {
    sequence.checked_add(1).ok_or_else(|| {
        HistoryError::validation(format!("historySequence {} is out of range", sequence))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn id() -> ConversationId {
        ConversationId::from("c1")
    }

    #[tokio::test]
    async fn test_empty_log_starts_at_zero() {
        let alloc = SequenceAllocator::new();
        assert_eq!(alloc.next_for(&id(), || async { Ok(None) }).await.unwrap(), 0);
        assert_eq!(alloc.next_for(&id(), || async { Ok(None) }).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_seeds_from_last_sequence_once() {
        let alloc = SequenceAllocator::new();
        let loads = AtomicUsize::new(0);
        for expected in 8..11 {
            let got = alloc
                .next_for(&id(), || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(7))
                })
                .await
                .unwrap();
            assert_eq!(got, expected);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_note_observed_only_moves_forward() {
        let alloc = SequenceAllocator::new();
        alloc
            .note_observed(&id(), 10, || async { Ok(Some(3)) })
            .await
            .unwrap();
        assert_eq!(alloc.peek(&id()), Some(11));
        alloc
            .note_observed(&id(), 2, || async { Ok(None) })
            .await
            .unwrap();
        assert_eq!(alloc.peek(&id()), Some(11));
    }

    #[tokio::test]
    async fn test_rejects_unrepresentable_sequence() {
        let alloc = SequenceAllocator::new();
        let err = alloc
            .note_observed(&id(), u64::MAX, || async { Ok(None) })
            .await
            .unwrap_err();
        assert!(matches!(err, HistoryError::Validation(_)));
    }

    #[test]
    fn test_raise_reset_forget() {
        let alloc = SequenceAllocator::new();
        alloc.raise_to(&id(), 5);
        alloc.raise_to(&id(), 3);
        assert_eq!(alloc.peek(&id()), Some(5));
        alloc.reset(&id(), 0);
        assert_eq!(alloc.peek(&id()), Some(0));
        assert_eq!(alloc.forget(&id()), Some(0));
        assert_eq!(alloc.peek(&id()), None);
    }
}
