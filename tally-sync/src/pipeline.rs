//! Shared cycle entrypoint used by CLI and daemon.
//!
//! Order of one cycle: `config.json` → checksum index → source query →
//! reconcile. Configuration and index problems therefore surface before the
//! source is ever contacted.

use std::path::Path;

use serde::Serialize;

use tally_core::{ItemSource, NamespaceName, SourceConfig, CONFIG_OBJECT};
use tally_sources::NetscanHost;
use tally_store::{FsStore, ObjectStore};

use crate::error::SyncError;
use crate::reconciler::{CycleOptions, CycleReport, Reconciler};
use crate::trigger::Trigger;

/// Outcome of one triggered cycle.
#[derive(Debug, Clone, Serialize)]
pub struct SyncNamespaceResult {
    pub namespace: NamespaceName,
    /// `snapshot` or `host`.
    pub variant: &'static str,
    /// Kind of the source that produced the items.
    pub source: String,
    pub report: CycleReport,
}

/// Read the namespace's source configuration. It must exist.
pub fn load_config<S: ObjectStore + ?Sized>(store: &S) -> Result<SourceConfig, SyncError> {
    let bytes = store.get(CONFIG_OBJECT).map_err(SyncError::ConfigLoad)?;
    serde_json::from_slice(&bytes).map_err(SyncError::ConfigDecode)
}

/// Replace the namespace's source configuration.
pub fn save_config<S: ObjectStore + ?Sized>(
    store: &S,
    config: &SourceConfig,
) -> Result<(), SyncError> {
    let json = serde_json::to_vec_pretty(config).map_err(SyncError::ConfigDecode)?;
    store
        .put(CONFIG_OBJECT, &json, &tally_core::Metadata::new())
        .map_err(|source| SyncError::Write {
            id: CONFIG_OBJECT.to_owned(),
            source,
        })
}

/// Run one cycle of `source` against the namespace behind `store`.
pub fn sync_namespace<S: ObjectStore + ?Sized>(
    store: &S,
    source: &dyn ItemSource,
    options: CycleOptions,
) -> Result<CycleReport, SyncError> {
    let config = load_config(store)?;
    let reconciler = Reconciler::new(store).with_options(options);
    let index = reconciler.load_index()?;
    tracing::debug!("index has {} entries before query", index.len());

    let items = source.query(&config)?;
    tracing::info!("{}: {} item(s) queried", source.kind(), items.len());
    reconciler.run(&items, index)
}

/// Run a single-host cycle: the one host is written if changed, nothing is
/// pruned, and the rest of the index is kept.
pub fn sync_host<S: ObjectStore + ?Sized>(
    store: &S,
    payload: &[u8],
    dry_run: bool,
) -> Result<CycleReport, SyncError> {
    let source = NetscanHost::new(payload);
    sync_namespace(store, &source, CycleOptions::partial(dry_run))
}

/// Run the cycle a trigger asks for, with namespaces rooted at `root`.
///
/// Snapshot triggers query `snapshot_source`; host triggers always carry
/// their own single item.
pub fn run(
    root: &Path,
    trigger: &Trigger,
    snapshot_source: &dyn ItemSource,
    dry_run: bool,
) -> Result<SyncNamespaceResult, SyncError> {
    let namespace = trigger.namespace().clone();
    let store = FsStore::open(root, &namespace);
    tracing::info!("{} cycle for {namespace}", trigger.variant());

    let (source, report) = match trigger {
        Trigger::Snapshot { .. } => (
            snapshot_source.kind().to_owned(),
            sync_namespace(&store, snapshot_source, CycleOptions::snapshot(dry_run))?,
        ),
        Trigger::Host { payload, .. } => ("netscan".to_owned(), sync_host(&store, payload, dry_run)?),
    };

    Ok(SyncNamespaceResult {
        namespace,
        variant: trigger.variant(),
        source,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_store::MemoryStore;

    #[test]
    fn missing_config_is_fatal() {
        let store = MemoryStore::new();
        let err = load_config(&store).unwrap_err();
        match err {
            SyncError::ConfigLoad(inner) => assert!(inner.is_not_found()),
            other => panic!("expected config load error, got {other:?}"),
        }
    }

    #[test]
    fn config_must_be_a_string_map() {
        let store = MemoryStore::new();
        store
            .put(CONFIG_OBJECT, br#"{"project": 7}"#, &tally_core::Metadata::new())
            .unwrap();
        assert!(matches!(
            load_config(&store).unwrap_err(),
            SyncError::ConfigDecode(_)
        ));
    }

    #[test]
    fn save_then_load_config() {
        let store = MemoryStore::new();
        let config = SourceConfig::from([("zone".to_owned(), "us-west1-a".to_owned())]);
        save_config(&store, &config).unwrap();
        assert_eq!(load_config(&store).unwrap(), config);
    }
}
