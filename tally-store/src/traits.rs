//! ObjectStore trait: the storage seam consumed by the reconciler.

use tally_core::Metadata;

use crate::error::StoreError;

/// One entry of a namespace listing: the key plus its metadata, no payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub metadata: Metadata,
}

/// Lazy enumeration returned by [`ObjectStore::list`].
pub type ObjectIter<'a> = Box<dyn Iterator<Item = Result<StoredObject, StoreError>> + 'a>;

/// Key/blob storage scoped to a single namespace.
///
/// Implementations only promise read-after-write visibility within one
/// process; timeouts and retries are their own business.
pub trait ObjectStore: Send + Sync {
    /// Read an object's payload. Missing objects yield [`StoreError::NotFound`].
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Create or replace an object. Empty `metadata` clears any previous metadata.
    fn put(&self, key: &str, data: &[u8], metadata: &Metadata) -> Result<(), StoreError>;

    /// Remove an object. Missing objects yield [`StoreError::NotFound`].
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Enumerate every object in the namespace. Each call starts a fresh,
    /// finite enumeration.
    fn list(&self) -> Result<ObjectIter<'_>, StoreError>;
}
