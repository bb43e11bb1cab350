//! Namespace health: how the checksum index lines up with stored objects.
//!
//! Signal precedence:
//! 1. `NeverSynced` (no index, or an empty index without a timestamp)
//! 2. `Drifted` (typed objects not indexed, or indexed ids with no object)
//! 3. `Current`

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use tally_core::{is_reserved_key, ItemId, ItemKind, CONFIG_OBJECT};
use tally_store::ObjectStore;

use crate::checksum_index::ChecksumIndex;
use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum NamespaceSignal {
    NeverSynced,
    Current,
    Drifted {
        /// Typed objects the index does not know about.
        untracked: Vec<String>,
        /// Indexed ids whose object is gone.
        missing: Vec<ItemId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceStatus {
    pub has_config: bool,
    pub index_len: usize,
    pub synced_at: Option<DateTime<Utc>>,
    /// Stored item objects per type tag.
    pub objects_by_type: BTreeMap<String, usize>,
    pub untyped_objects: usize,
    pub signal: NamespaceSignal,
}

/// Inspect the namespace behind `store` without modifying it.
pub fn check<S: ObjectStore + ?Sized>(store: &S) -> Result<NamespaceStatus, SyncError> {
    let index = ChecksumIndex::load(store)?;

    let mut has_config = false;
    let mut objects_by_type = BTreeMap::new();
    let mut untyped_objects = 0;
    let mut stored = BTreeSet::new();
    let mut untracked = Vec::new();

    for entry in store.list().map_err(SyncError::List)? {
        let object = entry.map_err(SyncError::List)?;
        if object.key == CONFIG_OBJECT {
            has_config = true;
        }
        if is_reserved_key(&object.key) {
            continue;
        }
        match ItemKind::from_metadata(&object.metadata) {
            Some(kind) => {
                *objects_by_type.entry(kind.type_tag).or_insert(0) += 1;
                if !index.contains(&ItemId::from(object.key.as_str())) {
                    untracked.push(object.key.clone());
                }
            }
            None => untyped_objects += 1,
        }
        stored.insert(object.key);
    }

    let missing: Vec<ItemId> = index
        .iter()
        .filter(|(id, _)| !stored.contains(id.as_str()))
        .map(|(id, _)| id.clone())
        .collect();

    let signal = if index.is_empty() && index.synced_at().is_none() {
        NamespaceSignal::NeverSynced
    } else if !untracked.is_empty() || !missing.is_empty() {
        untracked.sort();
        NamespaceSignal::Drifted { untracked, missing }
    } else {
        NamespaceSignal::Current
    };

    Ok(NamespaceStatus {
        has_config,
        index_len: index.len(),
        synced_at: index.synced_at(),
        objects_by_type,
        untyped_objects,
        signal,
    })
}

/// Format age from a chrono timestamp (index `synced_at`).
pub fn format_datetime_age(timestamp: DateTime<Utc>) -> String {
    let age = Utc::now().signed_duration_since(timestamp).num_seconds().max(0) as u64;
    format_seconds(age)
}

fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
