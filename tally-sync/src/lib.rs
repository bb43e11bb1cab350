//! # tally-sync
//!
//! Checksum-gated reconciliation of inventory snapshots.
//!
//! Call [`run`] with a validated [`Trigger`] to execute one cycle against a
//! namespace under a root directory, or drive a [`Reconciler`] directly over
//! any [`ObjectStore`](tally_store::ObjectStore).

pub mod checksum_index;
pub mod error;
pub mod fingerprint;
pub mod pipeline;
pub mod reconciler;
pub mod status;
pub mod trigger;

pub use checksum_index::ChecksumIndex;
pub use error::SyncError;
pub use fingerprint::{fingerprint, FingerprintError, Fingerprinter, Sha256Fingerprinter};
pub use pipeline::{load_config, run, save_config, sync_host, sync_namespace, SyncNamespaceResult};
pub use reconciler::{
    CycleOptions, CyclePhase, CycleReport, ItemOutcome, PruneMode, PruneOutcome, Reconciler,
};
pub use trigger::{Trigger, TriggerMessage, DEVICE_ID_ATTRIBUTE};
