//! Error types for tally-sync.

use thiserror::Error;

use tally_core::{ConfigError, SourceError};
use tally_store::StoreError;

use crate::reconciler::CyclePhase;

/// All errors that can end a reconciliation cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Bad namespace, missing config key, Type/Version mismatch, reserved id.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The namespace `config.json` could not be read.
    #[error("cannot load namespace configuration: {0}")]
    ConfigLoad(#[source] StoreError),

    /// The namespace `config.json` is not a flat JSON string map.
    #[error("namespace configuration is not a JSON string map: {0}")]
    ConfigDecode(#[source] serde_json::Error),

    /// The checksum index exists but could not be read.
    #[error("cannot load checksum index: {0}")]
    IndexLoad(#[source] StoreError),

    /// The checksum index exists but is not valid JSON.
    #[error("checksum index is corrupt: {0}")]
    IndexDecode(#[source] serde_json::Error),

    #[error("source query failed: {0}")]
    Source(#[from] SourceError),

    /// Writing a changed item failed. The index was not advanced for it.
    #[error("cannot write item {id}: {source}")]
    Write {
        id: String,
        #[source]
        source: StoreError,
    },

    /// Enumerating stored objects for orphan pruning failed.
    #[error("cannot list stored objects: {0}")]
    List(#[source] StoreError),

    /// Persisting the checksum index failed. Earlier writes stay in place.
    #[error("cannot persist checksum index: {0}")]
    IndexPersist(#[source] StoreError),
}

impl SyncError {
    /// Phase of the cycle in which this error was raised.
    ///
    /// Configuration and source errors are reported as `DiffingItems`: they
    /// surface while the current item set is being assembled and validated.
    pub fn phase(&self) -> CyclePhase {
        match self {
            SyncError::ConfigLoad(_)
            | SyncError::ConfigDecode(_)
            | SyncError::IndexLoad(_)
            | SyncError::IndexDecode(_) => CyclePhase::LoadingIndex,
            SyncError::Config(_) | SyncError::Source(_) => CyclePhase::DiffingItems,
            SyncError::Write { .. } => CyclePhase::WritingChanges,
            SyncError::List(_) => CyclePhase::PruningOrphans,
            SyncError::IndexPersist(_) => CyclePhase::PersistingIndex,
        }
    }

    /// `true` when the error was raised before anything was written.
    pub fn is_pre_write(&self) -> bool {
        matches!(
            self.phase(),
            CyclePhase::LoadingIndex | CyclePhase::DiffingItems
        )
    }
}
