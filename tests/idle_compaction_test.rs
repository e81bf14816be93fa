//! Idle scheduler driving a compaction that writes back into the log

use async_trait::async_trait;
use lattice::{
    ActivityMetadata, ActivitySource, CompactedKind, CompactionExecutor, ConversationId,
    Eligibility, HistoryConfig, HistoryLog, IneligibleReason, Lattice, LatticeConfig, Record,
    StaticIdleThresholds,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tempfile::TempDir;

struct NeverStreaming;

#[async_trait]
impl ActivitySource for NeverStreaming {
    async fn metadata(&self, _id: &ConversationId) -> anyhow::Result<ActivityMetadata> {
        Ok(ActivityMetadata::default())
    }
}

/// Appends a summary boundary, as a real summarizer would
struct SummarizingExecutor {
    log: Arc<HistoryLog>,
    epoch: AtomicU64,
}

#[async_trait]
impl CompactionExecutor for SummarizingExecutor {
    async fn execute(&self, id: &ConversationId) -> anyhow::Result<()> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let summary = Record::assistant(format!("summary-{}", epoch), "summary of earlier turns")
            .with_compaction_boundary(CompactedKind::Idle, epoch)
            .timestamped_now();
        self.log.append(id, summary).await?;
        Ok(())
    }
}

fn hours_ago(hours: i64) -> i64 {
    chrono::Utc::now().timestamp_millis() - hours * 3600 * 1000
}

async fn wait_for_idle(scheduler: &lattice::IdleCompactionScheduler) {
    for _ in 0..1000 {
        if scheduler.is_idle() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("scheduler did not drain");
}

#[tokio::test]
async fn test_idle_conversation_is_compacted_once() {
    let tmp = TempDir::new().unwrap();
    let lattice = Lattice::open(&LatticeConfig {
        history: HistoryConfig::with_data_dir(tmp.path()),
        ..Default::default()
    })
    .unwrap();
    let log = lattice.log().clone();

    let idle = ConversationId::from("idle");
    let busy = ConversationId::from("busy");
    log.append(&idle, Record::user("u0", "hi").with_timestamp(hours_ago(30)))
        .await
        .unwrap();
    log.append(&idle, Record::assistant("a1", "hello").with_timestamp(hours_ago(25)))
        .await
        .unwrap();
    log.append(&busy, Record::assistant("a0", "recent").timestamped_now())
        .await
        .unwrap();

    let thresholds: StaticIdleThresholds = [(idle.clone(), Some(24)), (busy.clone(), Some(24))]
        .into_iter()
        .collect();
    let executor = Arc::new(SummarizingExecutor {
        log: log.clone(),
        epoch: AtomicU64::new(0),
    });
    let scheduler = lattice
        .idle_scheduler(Arc::new(NeverStreaming), Arc::new(thresholds), executor)
        .unwrap();

    assert_eq!(scheduler.trigger_now().await.unwrap(), 1);
    wait_for_idle(&scheduler).await;

    let active = log.read_from_boundary(&idle, 0).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].boundary_epoch(), Some(1));
    assert!(!log.read_all(&busy).await.unwrap().iter().any(Record::is_compaction_boundary));

    // The summary is fresh, so nothing qualifies on the next pass
    assert_eq!(scheduler.trigger_now().await.unwrap(), 0);
    let verdict = scheduler
        .checker()
        .check(&idle, Duration::ZERO, chrono::Utc::now().timestamp_millis())
        .await
        .unwrap();
    assert_eq!(
        verdict,
        Eligibility::Ineligible(IneligibleReason::AlreadyCompacted)
    );
}
