//! Crash-safe conversation history for Lattice
//!
//! This crate provides:
//! - An append-only JSONL log per conversation with chunked scanning
//! - Monotonic per-conversation sequence numbers
//! - Serialized mutations with atomic rewrites
//! - Compaction boundary lookup and windowed reads
//! - Staging of in-flight (partial) records

pub mod config;
pub mod error;
pub mod ids;
pub mod log;
pub mod partial;
pub mod record;
pub mod sequence;
pub mod serializer;
pub mod storage;

pub use config::HistoryConfig;
pub use error::{HistoryError, HistoryResult};
pub use ids::ConversationId;
pub use log::{BoundaryLocation, CompactionWindow, HistoryLog};
pub use partial::{CommitOutcome, PartialStagingStore};
pub use record::{CompactedKind, Part, Record, RecordMetadata, Role, ToolState};
pub use sequence::SequenceAllocator;
pub use serializer::{ConversationGuard, MutationSerializer};
pub use storage::Direction;
