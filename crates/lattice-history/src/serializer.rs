//! Per-conversation mutation ordering
//!
//! Every read-modify-write on a conversation's files runs while holding that
//! conversation's lock. Tokio mutexes queue waiters in FIFO order, so callers
//! run in the order they arrived. Different conversations never contend.

use crate::ids::ConversationId;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<ConversationId, Arc<Mutex<()>>>;

/// Guard held while mutating one conversation
///
/// Dropping the last guard for a conversation removes its lock entry.
pub struct ConversationGuard {
    id: ConversationId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl ConversationGuard {
    pub fn conversation_id(&self) -> &ConversationId {
        &self.id
    }
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone, so the entry stays while anyone queues
        self.locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// FIFO mutual exclusion keyed by conversation id
#[derive(Debug, Default)]
pub struct MutationSerializer {
    locks: Arc<LockMap>,
}

impl MutationSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for every earlier caller on `id`, then take the lock
    pub async fn lock(&self, id: &ConversationId) -> ConversationGuard {
        let mutex = self
            .locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        ConversationGuard {
            id: id.clone(),
            guard: Some(mutex.lock_owned().await),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Lock two conversations in a stable order
    pub async fn lock_pair(
        &self,
        a: &ConversationId,
        b: &ConversationId,
    ) -> (ConversationGuard, ConversationGuard) {
        if a <= b {
            let first = self.lock(a).await;
            let second = self.lock(b).await;
            (first, second)
        } else {
            let second = self.lock(b).await;
            let first = self.lock(a).await;
            (first, second)
        }
    }

    /// Run `f` with exclusive access to `id`, propagating its result
    pub async fn with_lock<F, Fut, T>(&self, id: &ConversationId, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.lock(id).await;
        f().await
    }

    /// Number of conversations with a live lock entry
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}
