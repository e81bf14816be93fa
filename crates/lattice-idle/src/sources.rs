//! Collaborators the scheduler consumes but does not own

use async_trait::async_trait;
use lattice_history::ConversationId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Live state of a conversation as reported by the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityMetadata {
    /// A response is being streamed right now
    pub streaming: bool,
}

/// Reports whether a conversation is currently active
#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn metadata(&self, id: &ConversationId) -> anyhow::Result<ActivityMetadata>;
}

/// Performs the actual summarization of a conversation
#[async_trait]
pub trait CompactionExecutor: Send + Sync {
    async fn execute(&self, id: &ConversationId) -> anyhow::Result<()>;
}

/// A conversation known to the scheduler and its idle threshold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedConversation {
    pub id: ConversationId,
    /// `None` or `Some(0)` disables idle compaction
    pub idle_threshold_hours: Option<u64>,
}

impl ManagedConversation {
    pub fn new(id: impl Into<ConversationId>, idle_threshold_hours: Option<u64>) -> Self {
        Self {
            id: id.into(),
            idle_threshold_hours,
        }
    }

    /// The effective threshold, if idle compaction is enabled
    pub fn threshold(&self) -> Option<Duration> {
        match self.idle_threshold_hours {
            Some(hours) if hours > 0 => Some(Duration::from_secs(hours.saturating_mul(3600))),
            _ => None,
        }
    }
}

/// Enumerates managed conversations and their idle thresholds
#[async_trait]
pub trait IdleThresholds: Send + Sync {
    async fn managed(&self) -> anyhow::Result<Vec<ManagedConversation>>;
}

/// In-memory threshold table
#[derive(Debug, Default)]
pub struct StaticIdleThresholds {
    entries: RwLock<BTreeMap<ConversationId, Option<u64>>>,
}

impl StaticIdleThresholds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) the threshold for `id`; 0 disables
    pub fn set(&self, id: impl Into<ConversationId>, hours: Option<u64>) {
        self.entries.write().insert(id.into(), hours);
    }

    pub fn remove(&self, id: &ConversationId) -> bool {
        self.entries.write().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<I> FromIterator<(I, Option<u64>)> for StaticIdleThresholds
where
    I: Into<ConversationId>,
{
    fn from_iter<T: IntoIterator<Item = (I, Option<u64>)>>(iter: T) -> Self {
        let entries = iter.into_iter().map(|(id, hours)| (id.into(), hours)).collect();
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl IdleThresholds for StaticIdleThresholds {
    async fn managed(&self) -> anyhow::Result<Vec<ManagedConversation>> {
        Ok(self
            .entries
            .read()
            .iter()
            .map(|(id, hours)| ManagedConversation::new(id.clone(), *hours))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_or_missing_threshold_disables() {
        assert_eq!(ManagedConversation::new("a", None).threshold(), None);
        assert_eq!(ManagedConversation::new("a", Some(0)).threshold(), None);
        assert_eq!(
            ManagedConversation::new("a", Some(24)).threshold(),
            Some(Duration::from_secs(24 * 3600))
        );
    }

    #[tokio::test]
    async fn test_static_thresholds() {
        let thresholds: StaticIdleThresholds =
            [("b", Some(12)), ("a", None)].into_iter().collect();
        thresholds.set("c", Some(0));
        assert_eq!(thresholds.len(), 3);

        let managed = thresholds.managed().await.unwrap();
        let ids: Vec<&str> = managed.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(managed[1].threshold(), Some(Duration::from_secs(12 * 3600)));

        assert!(thresholds.remove(&ConversationId::from("b")));
        assert!(!thresholds.remove(&ConversationId::from("b")));
    }
}
