//! Lattice: crash-safe conversation history with idle compaction
//!
//! This crate ties together:
//! - [`lattice_history`]: the append-only per-conversation log
//! - [`lattice_idle`]: the background idle compaction scheduler
//! - configuration loading and logging setup

pub mod config;
pub mod error;
pub mod logging;

pub use config::{LatticeConfig, LoggingConfig};
pub use error::{LatticeError, LatticeResult};
pub use logging::init_logging;

pub use lattice_history::{
    BoundaryLocation, CommitOutcome, CompactedKind, CompactionWindow, ConversationId, Direction,
    HistoryConfig, HistoryError, HistoryLog, HistoryResult, Part, PartialStagingStore, Record,
    RecordMetadata, Role, ToolState,
};
pub use lattice_idle::{
    ActivityMetadata, ActivitySource, CompactionExecutor, Eligibility, IdleCompactionScheduler,
    IdleConfig, IdleError, IdleThresholds, IneligibleReason, ManagedConversation,
    StaticIdleThresholds,
};

use std::sync::Arc;

/// A history log, its partial store, and the settings for an idle scheduler
#[derive(Debug, Clone)]
pub struct Lattice {
    log: Arc<HistoryLog>,
    partials: PartialStagingStore,
    idle: IdleConfig,
}

impl Lattice {
    pub fn open(config: &LatticeConfig) -> LatticeResult<Self> {
        config.validate()?;
        let log = Arc::new(HistoryLog::new(config.history.clone())?);
        tracing::info!("Opened history at {}", config.history.data_dir.display());
        Ok(Self {
            partials: PartialStagingStore::new(log.clone()),
            log,
            idle: config.idle.clone(),
        })
    }

    pub fn log(&self) -> &Arc<HistoryLog> {
        &self.log
    }

    pub fn partials(&self) -> &PartialStagingStore {
        &self.partials
    }

    /// Build an idle scheduler over this history; call `start()` to run it
    pub fn idle_scheduler(
        &self,
        activity: Arc<dyn ActivitySource>,
        thresholds: Arc<dyn IdleThresholds>,
        executor: Arc<dyn CompactionExecutor>,
    ) -> LatticeResult<IdleCompactionScheduler> {
        Ok(IdleCompactionScheduler::new(
            self.idle.clone(),
            self.log.clone(),
            activity,
            thresholds,
            executor,
        )?)
    }
}
