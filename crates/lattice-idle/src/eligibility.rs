//! Idle compaction eligibility
//!
//! Checks run in a fixed order and the first failing one decides the
//! reason. The history read is a plain (unlocked) tail read, so a verdict
//! can go stale; the scheduler re-checks right before executing.

use crate::error::{IdleError, IdleResult};
use crate::sources::ActivitySource;
use lattice_history::{ConversationId, HistoryLog, Record, Role};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Why a conversation is not compacted right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibleReason {
    NoMessages,
    NoRecencyData,
    NotIdleEnough,
    CurrentlyStreaming,
    AlreadyCompacted,
    AwaitingResponse,
}

impl IneligibleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IneligibleReason::NoMessages => "no_messages",
            IneligibleReason::NoRecencyData => "no_recency_data",
            IneligibleReason::NotIdleEnough => "not_idle_enough",
            IneligibleReason::CurrentlyStreaming => "currently_streaming",
            IneligibleReason::AlreadyCompacted => "already_compacted",
            IneligibleReason::AwaitingResponse => "awaiting_response",
        }
    }
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Ineligible(IneligibleReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }

    pub fn reason(&self) -> Option<IneligibleReason> {
        match self {
            Eligibility::Eligible => None,
            Eligibility::Ineligible(reason) => Some(*reason),
        }
    }
}

/// Most recent timestamp among `records`, in milliseconds
pub fn recency_from_records(records: &[Record]) -> Option<i64> {
    records.iter().filter_map(Record::timestamp).max()
}

/// Evaluates whether a conversation has been idle long enough to compact
#[derive(Clone)]
pub struct EligibilityChecker {
    log: Arc<HistoryLog>,
    activity: Arc<dyn ActivitySource>,
    tail_window: usize,
}

impl fmt::Debug for EligibilityChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EligibilityChecker")
            .field("tail_window", &self.tail_window)
            .finish_non_exhaustive()
    }
}

impl EligibilityChecker {
    pub fn new(log: Arc<HistoryLog>, activity: Arc<dyn ActivitySource>, tail_window: usize) -> Self {
        Self {
            log,
            activity,
            tail_window: tail_window.max(1),
        }
    }

    pub fn log(&self) -> &Arc<HistoryLog> {
        &self.log
    }

    /// Check `id` against `threshold` at wall-clock time `now_ms`
    pub async fn check(
        &self,
        id: &ConversationId,
        threshold: Duration,
        now_ms: i64,
    ) -> IdleResult<Eligibility> {
        let tail = self.log.read_last(id, self.tail_window).await?;
        let Some(last) = tail.last() else {
            return Ok(Eligibility::Ineligible(IneligibleReason::NoMessages));
        };

        let Some(recency) = recency_from_records(&tail) else {
            return Ok(Eligibility::Ineligible(IneligibleReason::NoRecencyData));
        };
        let threshold_ms = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
        if now_ms.saturating_sub(recency) < threshold_ms {
            return Ok(Eligibility::Ineligible(IneligibleReason::NotIdleEnough));
        }

        let activity = self
            .activity
            .metadata(id)
            .await
            .map_err(IdleError::activity)?;
        if activity.streaming {
            return Ok(Eligibility::Ineligible(IneligibleReason::CurrentlyStreaming));
        }

        if last.metadata.compacted_kind().is_some() {
            return Ok(Eligibility::Ineligible(IneligibleReason::AlreadyCompacted));
        }
        if last.role == Role::User {
            return Ok(Eligibility::Ineligible(IneligibleReason::AwaitingResponse));
        }
        Ok(Eligibility::Eligible)
    }
}
