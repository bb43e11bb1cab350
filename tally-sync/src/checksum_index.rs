//! Checksum index: the remembered fingerprint of every item already written.
//!
//! Persisted as the namespace's `state.json` object:
//!
//! ```json
//! { "synced_at": "2026-10-14T09:30:00Z", "checksums": { "<id>": "<sha256>" } }
//! ```
//!
//! A bare `{ "<id>": "<sha256>" }` map is accepted on load and rewritten in
//! the structured form on the next persist.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_core::{ItemId, Metadata, STATE_OBJECT};
use tally_store::{ObjectStore, StoreError};

use crate::error::SyncError;

/// On-store index payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChecksumIndex {
    synced_at: Option<DateTime<Utc>>,
    checksums: BTreeMap<ItemId, String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IndexCompat {
    Structured(IndexStructuredCompat),
    Legacy(BTreeMap<ItemId, String>),
}

#[derive(Debug, Deserialize)]
struct IndexStructuredCompat {
    #[serde(default)]
    synced_at: Option<DateTime<Utc>>,
    checksums: BTreeMap<ItemId, String>,
}

impl ChecksumIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the index of the namespace behind `store`.
    ///
    /// A missing `state.json` is a first run and yields an empty index.
    pub fn load<S: ObjectStore + ?Sized>(store: &S) -> Result<Self, SyncError> {
        let bytes = match store.get(STATE_OBJECT) {
            Ok(bytes) => bytes,
            Err(err) if err.is_not_found() => {
                tracing::debug!("no {STATE_OBJECT}; starting from an empty index");
                return Ok(Self::new());
            }
            Err(err) => return Err(SyncError::IndexLoad(err)),
        };
        Self::decode(&bytes)
    }

    /// Decode a persisted index document.
    pub fn decode(bytes: &[u8]) -> Result<Self, SyncError> {
        let doc: serde_json::Value = serde_json::from_slice(bytes).map_err(SyncError::IndexDecode)?;
        match serde_json::from_value::<IndexCompat>(doc).map_err(SyncError::IndexDecode)? {
            IndexCompat::Structured(index) => Ok(Self {
                synced_at: index.synced_at,
                checksums: index.checksums,
            }),
            IndexCompat::Legacy(checksums) => Ok(Self {
                synced_at: None,
                checksums,
            }),
        }
    }

    /// Replace the namespace's `state.json` with this index.
    ///
    /// A single `put`; the index carries no type metadata so it is never a
    /// prune candidate.
    pub fn persist<S: ObjectStore + ?Sized>(&self, store: &S) -> Result<(), SyncError> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| SyncError::IndexPersist(StoreError::Backend(e.to_string())))?;
        store
            .put(STATE_OBJECT, &json, &Metadata::new())
            .map_err(SyncError::IndexPersist)
    }

    pub fn get(&self, id: &ItemId) -> Option<&str> {
        self.checksums.get(id).map(String::as_str)
    }

    pub fn set(&mut self, id: ItemId, fingerprint: String) {
        self.checksums.insert(id, fingerprint);
    }

    pub fn remove(&mut self, id: &ItemId) -> Option<String> {
        self.checksums.remove(id)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.checksums.contains_key(id)
    }

    /// Drop every entry whose id is not in `current`. Returns the dropped ids.
    pub fn prune<'a, I>(&mut self, current: I) -> Vec<ItemId>
    where
        I: IntoIterator<Item = &'a ItemId>,
    {
        let keep: BTreeSet<&ItemId> = current.into_iter().collect();
        let removed: Vec<ItemId> = self
            .checksums
            .keys()
            .filter(|id| !keep.contains(id))
            .cloned()
            .collect();
        for id in &removed {
            self.checksums.remove(id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.checksums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checksums.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ItemId, &str)> {
        self.checksums.iter().map(|(id, h)| (id, h.as_str()))
    }

    /// When the index was last persisted by a completed cycle.
    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.synced_at
    }

    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        self.synced_at = Some(at);
    }
}
