//! # tally-store
//!
//! Durable key/blob storage for one namespace, behind the [`ObjectStore`]
//! trait. [`FsStore`] keeps each namespace in a directory; [`MemoryStore`]
//! keeps everything in a map for tests and dry tooling.

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use error::StoreError;
pub use fs::FsStore;
pub use memory::MemoryStore;
pub use traits::{ObjectIter, ObjectStore, StoredObject};
