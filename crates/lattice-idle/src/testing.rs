//! Test doubles for the scheduler's collaborators

use crate::sources::{ActivityMetadata, ActivitySource, CompactionExecutor};
use async_trait::async_trait;
use lattice_history::ConversationId;
use parking_lot::Mutex;
use std::collections::HashSet;
use tokio::sync::{Notify, Semaphore};

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn hours_ago(hours: i64) -> i64 {
    now_ms() - hours * 3600 * 1000
}

#[derive(Debug, Default)]
pub(crate) struct FakeActivity {
    streaming: Mutex<HashSet<ConversationId>>,
    failing: Mutex<HashSet<ConversationId>>,
}

impl FakeActivity {
    pub(crate) fn set_streaming(&self, id: &ConversationId, streaming: bool) {
        let mut set = self.streaming.lock();
        if streaming {
            set.insert(id.clone());
        } else {
            set.remove(id);
        }
    }

    pub(crate) fn fail_for(&self, id: &ConversationId) {
        self.failing.lock().insert(id.clone());
    }
}

#[async_trait]
impl ActivitySource for FakeActivity {
    async fn metadata(&self, id: &ConversationId) -> anyhow::Result<ActivityMetadata> {
        if self.failing.lock().contains(id) {
            anyhow::bail!("no activity data for {}", id);
        }
        Ok(ActivityMetadata {
            streaming: self.streaming.lock().contains(id),
        })
    }
}

/// Records every call; optionally blocks each call until a permit is added
#[derive(Debug, Default)]
pub(crate) struct RecordingExecutor {
    calls: Mutex<Vec<ConversationId>>,
    failing: Mutex<HashSet<ConversationId>>,
    panicking: Mutex<HashSet<ConversationId>>,
    pub(crate) started: Notify,
    gate: Option<Semaphore>,
}

impl RecordingExecutor {
    pub(crate) fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub(crate) fn open_gate(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub(crate) fn fail_for(&self, id: &ConversationId) {
        self.failing.lock().insert(id.clone());
    }

    pub(crate) fn panic_for(&self, id: &ConversationId) {
        self.panicking.lock().insert(id.clone());
    }

    pub(crate) fn calls(&self) -> Vec<ConversationId> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CompactionExecutor for RecordingExecutor {
    async fn execute(&self, id: &ConversationId) -> anyhow::Result<()> {
        self.calls.lock().push(id.clone());
        self.started.notify_one();
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        let panics = self.panicking.lock().contains(id);
        if panics {
            panic!("summarizer crashed on {}", id);
        }
        if self.failing.lock().contains(id) {
            anyhow::bail!("summarizer unavailable");
        }
        Ok(())
    }
}
