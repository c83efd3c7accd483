//! Sync state machine between local files and remote documents.

pub mod conflict;
pub mod engine;
pub mod state;

pub use conflict::{ConflictType, classify, diff};
pub use engine::{PushOptions, StatusEntry, SyncEngine, SyncError, SyncOutcome, SyncStatus};
pub use state::{
    MappingUpdate, StateError, SyncDirection, SyncMapping, SyncState, SyncStateStore,
    content_hash, file_hash,
};
