//! Idle compaction for Lattice conversations
//!
//! Conversations that have been quiet longer than their configured
//! threshold are summarized in the background, one at a time, by an
//! injected [`CompactionExecutor`].

pub mod config;
pub mod eligibility;
pub mod error;
pub mod scheduler;
pub mod sources;

#[cfg(test)]
mod testing;

pub use config::IdleConfig;
pub use eligibility::{Eligibility, EligibilityChecker, IneligibleReason, recency_from_records};
pub use error::{IdleError, IdleResult};
pub use scheduler::IdleCompactionScheduler;
pub use sources::{
    ActivityMetadata, ActivitySource, CompactionExecutor, IdleThresholds, ManagedConversation,
    StaticIdleThresholds,
};
