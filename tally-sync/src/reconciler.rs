//! Per-cycle reconciliation of a fresh item snapshot against a namespace.
//!
//! ## Cycle protocol
//!
//! 1. Validate every item (Type/Version pairing, reserved ids) before any write.
//! 2. Fingerprint each payload; a fingerprint failure skips that item.
//! 3. Compare with the indexed fingerprint and skip if identical.
//! 4. Otherwise `put` the item with its type metadata, then advance the index.
//! 5. List stored objects; typed objects absent from the snapshot are orphans.
//! 6. Delete orphans. Delete failures are reported and pruning continues.
//! 7. Drop index entries for ids absent from the snapshot.
//! 8. Persist the index as a single `state.json` put.
//!
//! Steps 5-7 only run with [`PruneMode::Orphans`]. With `dry_run` nothing is
//! put, deleted or persisted.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use tally_core::{is_reserved_key, ConfigError, ItemId, ItemKind, ItemSet, Metadata};
use tally_store::ObjectStore;

use crate::checksum_index::ChecksumIndex;
use crate::error::SyncError;
use crate::fingerprint::{Fingerprinter, Sha256Fingerprinter};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// What to do with stored objects that are no longer in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneMode {
    /// The snapshot is complete: delete typed orphans and prune the index.
    #[default]
    Orphans,
    /// The snapshot is partial (e.g. one host): keep everything else.
    Retain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleOptions {
    pub prune: PruneMode,
    pub dry_run: bool,
}

impl CycleOptions {
    pub fn snapshot(dry_run: bool) -> Self {
        Self {
            prune: PruneMode::Orphans,
            dry_run,
        }
    }

    pub fn partial(dry_run: bool) -> Self {
        Self {
            prune: PruneMode::Retain,
            dry_run,
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Cycle step a [`SyncError`] was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    LoadingIndex,
    DiffingItems,
    WritingChanges,
    PruningOrphans,
    PersistingIndex,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePhase::LoadingIndex => "loading-index",
            CyclePhase::DiffingItems => "diffing-items",
            CyclePhase::WritingChanges => "writing-changes",
            CyclePhase::PruningOrphans => "pruning-orphans",
            CyclePhase::PersistingIndex => "persisting-index",
        };
        f.write_str(name)
    }
}

/// Outcome for one item of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// New or changed; stored and indexed.
    Written,
    /// Fingerprint matches the index; nothing written.
    Unchanged,
    /// Could not be fingerprinted; neither written nor pruned.
    Skipped { reason: String },
    /// Dry run: would have been written.
    WouldWrite,
}

/// Outcome for one orphaned stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PruneOutcome {
    Deleted,
    DeleteFailed { error: String },
    WouldDelete,
}

/// Everything one cycle decided, for callers and tests to inspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub items: BTreeMap<ItemId, ItemOutcome>,
    pub pruned: BTreeMap<String, PruneOutcome>,
    /// Index entries dropped because their id left the snapshot.
    pub dropped_from_index: Vec<ItemId>,
    pub index_len: usize,
    pub prune_mode: PruneMode,
    pub dry_run: bool,
    pub duration_ms: u64,
}

impl CycleReport {
    fn new(options: CycleOptions) -> Self {
        Self {
            items: BTreeMap::new(),
            pruned: BTreeMap::new(),
            dropped_from_index: Vec::new(),
            index_len: 0,
            prune_mode: options.prune,
            dry_run: options.dry_run,
            duration_ms: 0,
        }
    }

    fn count_items(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.values().filter(|o| pred(o)).count()
    }

    fn count_pruned(&self, pred: impl Fn(&PruneOutcome) -> bool) -> usize {
        self.pruned.values().filter(|o| pred(o)).count()
    }

    pub fn written(&self) -> usize {
        self.count_items(|o| matches!(o, ItemOutcome::Written))
    }

    pub fn would_write(&self) -> usize {
        self.count_items(|o| matches!(o, ItemOutcome::WouldWrite))
    }

    pub fn unchanged(&self) -> usize {
        self.count_items(|o| matches!(o, ItemOutcome::Unchanged))
    }

    pub fn skipped(&self) -> usize {
        self.count_items(|o| matches!(o, ItemOutcome::Skipped { .. }))
    }

    pub fn deleted(&self) -> usize {
        self.count_pruned(|o| matches!(o, PruneOutcome::Deleted))
    }

    pub fn would_delete(&self) -> usize {
        self.count_pruned(|o| matches!(o, PruneOutcome::WouldDelete))
    }

    pub fn delete_failures(&self) -> usize {
        self.count_pruned(|o| matches!(o, PruneOutcome::DeleteFailed { .. }))
    }

    pub fn outcome(&self, id: &str) -> Option<&ItemOutcome> {
        self.items.get(id)
    }

    /// `true` when the cycle changed nothing in the store besides the index.
    pub fn is_noop(&self) -> bool {
        self.written() == 0 && self.deleted() == 0 && self.delete_failures() == 0
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Applies snapshots to one namespace store.
pub struct Reconciler<'a, S: ObjectStore + ?Sized, F = Sha256Fingerprinter> {
    store: &'a S,
    fingerprinter: F,
    options: CycleOptions,
}

impl<'a, S: ObjectStore + ?Sized> Reconciler<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            fingerprinter: Sha256Fingerprinter,
            options: CycleOptions::default(),
        }
    }
}

impl<'a, S: ObjectStore + ?Sized, F: Fingerprinter> Reconciler<'a, S, F> {
    pub fn with_options(mut self, options: CycleOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_fingerprinter<G: Fingerprinter>(self, fingerprinter: G) -> Reconciler<'a, S, G> {
        Reconciler {
            store: self.store,
            fingerprinter,
            options: self.options,
        }
    }

    pub fn options(&self) -> CycleOptions {
        self.options
    }

    pub fn load_index(&self) -> Result<ChecksumIndex, SyncError> {
        ChecksumIndex::load(self.store)
    }

    /// Apply `items` to the store and `index`, then persist the index.
    pub fn run(&self, items: &ItemSet, index: ChecksumIndex) -> Result<CycleReport, SyncError> {
        let started = Instant::now();
        let (mut index, mut report) = self.apply(items, index)?;
        if !self.options.dry_run {
            self.persist(&mut index)?;
        }
        report.duration_ms = elapsed_ms(started);
        tracing::info!(
            "cycle done in {}ms: {} written, {} unchanged, {} skipped, {} deleted, {} delete failure(s)",
            report.duration_ms,
            report.written(),
            report.unchanged(),
            report.skipped(),
            report.deleted(),
            report.delete_failures()
        );
        Ok(report)
    }

    /// Everything up to (not including) persisting the index.
    ///
    /// The returned index reflects every successful write and, with
    /// [`PruneMode::Orphans`], no longer contains ids absent from `items`.
    pub fn apply(
        &self,
        items: &ItemSet,
        mut index: ChecksumIndex,
    ) -> Result<(ChecksumIndex, CycleReport), SyncError> {
        let started = Instant::now();
        let mut report = CycleReport::new(self.options);

        let validated = validate(items)?;

        for (id, payload, kind) in validated {
            let outcome = self.apply_item(id, payload, kind, &mut index)?;
            report.items.insert(id.clone(), outcome);
        }

        if self.options.prune == PruneMode::Orphans {
            for key in self.orphans(items)? {
                let outcome = self.delete_orphan(&key);
                report.pruned.insert(key, outcome);
            }
            // An orphan whose delete failed still leaves the index so the
            // next cycle does not treat it as known.
            report.dropped_from_index = index.prune(items.keys());
        }

        report.index_len = index.len();
        report.duration_ms = elapsed_ms(started);
        Ok((index, report))
    }

    /// Stamp and store the index.
    pub fn persist(&self, index: &mut ChecksumIndex) -> Result<(), SyncError> {
        index.mark_synced(Utc::now());
        index.persist(self.store)?;
        tracing::debug!("persisted index with {} entries", index.len());
        Ok(())
    }

    fn apply_item(
        &self,
        id: &ItemId,
        payload: &[u8],
        kind: Option<ItemKind>,
        index: &mut ChecksumIndex,
    ) -> Result<ItemOutcome, SyncError> {
        let digest = match self.fingerprinter.fingerprint(payload) {
            Ok(digest) => digest,
            Err(err) => {
                tracing::warn!("skipping {id}: {err}");
                return Ok(ItemOutcome::Skipped {
                    reason: err.to_string(),
                });
            }
        };

        if index.get(id) == Some(digest.as_str()) {
            tracing::debug!("unchanged: {id}");
            return Ok(ItemOutcome::Unchanged);
        }

        if self.options.dry_run {
            tracing::info!("[dry-run] would write: {id}");
            return Ok(ItemOutcome::WouldWrite);
        }

        let metadata = kind.map(|k| k.to_metadata()).unwrap_or_else(Metadata::new);
        self.store
            .put(id.as_str(), payload, &metadata)
            .map_err(|source| SyncError::Write {
                id: id.to_string(),
                source,
            })?;
        index.set(id.clone(), digest);
        tracing::info!("wrote: {id}");
        Ok(ItemOutcome::Written)
    }

    /// Keys of typed stored objects that are not in `items`.
    ///
    /// Listing completes before anything is deleted.
    fn orphans(&self, items: &ItemSet) -> Result<Vec<String>, SyncError> {
        let mut orphans = Vec::new();
        for entry in self.store.list().map_err(SyncError::List)? {
            let object = entry.map_err(SyncError::List)?;
            if is_reserved_key(&object.key) || ItemKind::from_metadata(&object.metadata).is_none() {
                continue;
            }
            if !items.contains_key(object.key.as_str()) {
                orphans.push(object.key);
            }
        }
        Ok(orphans)
    }

    fn delete_orphan(&self, key: &str) -> PruneOutcome {
        if self.options.dry_run {
            tracing::info!("[dry-run] would delete: {key}");
            return PruneOutcome::WouldDelete;
        }
        match self.store.delete(key) {
            Ok(()) => {
                tracing::info!("deleted: {key}");
                PruneOutcome::Deleted
            }
            Err(err) if err.is_not_found() => {
                tracing::debug!("already gone: {key}");
                PruneOutcome::Deleted
            }
            Err(err) => {
                tracing::warn!("cannot delete {key}: {err}");
                PruneOutcome::DeleteFailed {
                    error: err.to_string(),
                }
            }
        }
    }
}

/// Validate every item up front so a bad one prevents all writes.
fn validate(items: &ItemSet) -> Result<Vec<(&ItemId, &[u8], Option<ItemKind>)>, ConfigError> {
    items
        .iter()
        .map(|(id, item)| {
            if is_reserved_key(id.as_str()) {
                return Err(ConfigError::ReservedIdentifier { id: id.to_string() });
            }
            Ok((id, item.payload.as_slice(), item.kind(id)?))
        })
        .collect()
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
