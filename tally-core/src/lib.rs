//! Tally core library: inventory domain types, source capability, errors.
//!
//! - [`types`]: newtypes, [`Item`] and its Type/Version pairing
//! - [`source`]: the [`ItemSource`] capability every connector implements
//! - [`error`]: [`ConfigError`] and [`SourceError`]

pub mod error;
pub mod source;
pub mod types;

pub use error::{ConfigError, SourceError};
pub use source::{require_key, ItemSet, ItemSource, SourceConfig};
pub use types::{
    is_reserved_key, Item, ItemId, ItemKind, Metadata, NamespaceName, CONFIG_OBJECT,
    META_TYPE, META_TYPE_VERSION, NAMESPACE_PREFIX, STATE_OBJECT,
};
