//! In-memory implementation of the ObjectStore trait.
//!
//! Same semantics as [`FsStore`](crate::FsStore) but nothing survives the
//! value being dropped. Thread-safe via `RwLock`.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use tally_core::Metadata;

use crate::error::StoreError;
use crate::traits::{ObjectIter, ObjectStore, StoredObject};

#[derive(Debug, Clone, PartialEq, Eq)]
struct MemoryObject {
    data: Vec<u8>,
    metadata: Metadata,
}

/// In-memory store for one namespace.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, MemoryObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored, in order.
    pub fn keys(&self) -> Vec<String> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        objects.keys().cloned().collect()
    }

    /// Metadata of `key`, if the object exists.
    pub fn metadata(&self, key: &str) -> Option<Metadata> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        objects.get(key).map(|o| o.metadata.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        objects.contains_key(key)
    }

    pub fn len(&self) -> usize {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_owned(),
            })
    }

    fn put(&self, key: &str, data: &[u8], metadata: &Metadata) -> Result<(), StoreError> {
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        objects.insert(
            key.to_owned(),
            MemoryObject {
                data: data.to_vec(),
                metadata: metadata.clone(),
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_owned(),
            })
    }

    fn list(&self) -> Result<ObjectIter<'_>, StoreError> {
        // Snapshot so callers may mutate the store while iterating.
        let snapshot: Vec<StoredObject> = {
            let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
            objects
                .iter()
                .map(|(key, o)| StoredObject {
                    key: key.clone(),
                    metadata: o.metadata.clone(),
                })
                .collect()
        };
        Ok(Box::new(snapshot.into_iter().map(Ok::<_, StoreError>)))
    }
}
