//! Directory-backed object store.
//!
//! # Layout
//!
//! ```text
//! <root>/<namespace>/
//!   <key>                   (payload)
//!   .metadata/<key>.json    (metadata sidecar, only when non-empty)
//!   .<key>.<random>.tally.tmp  (in-flight write, renamed over <key>)
//! ```
//!
//! Payload writes use a uniquely named `.tmp` sibling + rename so a crash
//! never leaves a half-written object under its real name, and concurrent
//! puts of one key never share a temp file (the last rename wins). Dot-entries are never listed,
//! which is why keys may not start with `.`.

use std::fs::{self, DirEntry};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tally_core::{Metadata, NamespaceName};

use crate::error::{io_err, StoreError};
use crate::traits::{ObjectIter, ObjectStore, StoredObject};

const METADATA_DIR: &str = ".metadata";

/// Object store rooted at one namespace directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    /// Store whose objects live directly in `dir`. The directory is created
    /// on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<root>/<namespace>/`
    pub fn open(root: &Path, namespace: &NamespaceName) -> Self {
        Self::new(root.join(namespace.as_str()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the payload file for `key`.
    pub fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.dir.join(key))
    }

    fn metadata_path(&self, key: &str) -> PathBuf {
        self.dir.join(METADATA_DIR).join(format!("{key}.json"))
    }

    fn read_metadata(&self, key: &str) -> Result<Metadata, StoreError> {
        let path = self.metadata_path(key);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|source| StoreError::Metadata { path, source }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Metadata::new()),
            Err(err) => Err(io_err(path, err)),
        }
    }

    fn write_metadata(&self, key: &str, metadata: &Metadata) -> Result<(), StoreError> {
        let path = self.metadata_path(key);
        if metadata.is_empty() {
            return remove_if_present(&path);
        }
        let json = serde_json::to_vec_pretty(metadata).map_err(|source| StoreError::Metadata {
            path: path.clone(),
            source,
        })?;
        let meta_dir = self.dir.join(METADATA_DIR);
        write_atomic(&path, &meta_dir, &format!(".{key}.json."), &json)
    }

    fn listed_object(
        &self,
        entry: std::io::Result<DirEntry>,
    ) -> Result<Option<StoredObject>, StoreError> {
        let entry = entry.map_err(|e| io_err(&self.dir, e))?;
        let name = entry.file_name();
        let Some(key) = name.to_str() else {
            tracing::warn!("skipping non UTF-8 object name in {}", self.dir.display());
            return Ok(None);
        };
        if key.starts_with('.') {
            return Ok(None);
        }
        let file_type = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
        if !file_type.is_file() {
            return Ok(None);
        }
        let metadata = self.read_metadata(key)?;
        Ok(Some(StoredObject {
            key: key.to_owned(),
            metadata,
        }))
    }
}

impl ObjectStore for FsStore {
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                key: key.to_owned(),
            }),
            Err(err) => Err(io_err(path, err)),
        }
    }

    fn put(&self, key: &str, data: &[u8], metadata: &Metadata) -> Result<(), StoreError> {
        let path = self.object_path(key)?;
        fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        if !metadata.is_empty() {
            let meta_dir = self.dir.join(METADATA_DIR);
            fs::create_dir_all(&meta_dir).map_err(|e| io_err(&meta_dir, e))?;
        }

        // Metadata first: a payload is never visible with stale metadata
        // after a successful put.
        self.write_metadata(key, metadata)?;
        write_atomic(&path, &self.dir, &format!(".{key}."), data)?;
        tracing::debug!("stored {}", path.display());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    key: key.to_owned(),
                })
            }
            Err(err) => return Err(io_err(path, err)),
        }
        remove_if_present(&self.metadata_path(key))
    }

    fn list(&self) -> Result<ObjectIter<'_>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(Box::new(std::iter::empty::<Result<StoredObject, StoreError>>()))
            }
            Err(err) => return Err(io_err(&self.dir, err)),
        };
        Ok(Box::new(
            entries.filter_map(move |entry| self.listed_object(entry).transpose()),
        ))
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    let invalid = |reason| StoreError::InvalidKey {
        key: key.to_owned(),
        reason,
    };
    if key.is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.starts_with('.') {
        return Err(invalid("key must not start with '.'"));
    }
    if key.contains(['/', '\\', '\0']) {
        return Err(invalid("key must not contain path separators or NUL"));
    }
    Ok(())
}

fn write_atomic(path: &Path, dir: &Path, prefix: &str, data: &[u8]) -> Result<(), StoreError> {
    let mut tmp = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".tally.tmp")
        .tempfile_in(dir)
        .map_err(|e| io_err(dir, e))?;
    tmp.write_all(data).map_err(|e| io_err(tmp.path(), e))?;
    tmp.flush().map_err(|e| io_err(tmp.path(), e))?;
    // A failed persist drops the temp file, which removes it.
    tmp.persist(path).map_err(|e| io_err(path, e.error))?;
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(path, err)),
    }
}
