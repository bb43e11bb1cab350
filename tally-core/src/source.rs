//! The item-source capability.
//!
//! Each connector (cloud compute listing, network scan, local file) is one
//! implementation of [`ItemSource`]; the reconciler only sees this trait.

use std::collections::BTreeMap;

use crate::error::{ConfigError, SourceError};
use crate::types::{Item, ItemId};

/// Flat string configuration read from a namespace's `config.json`.
pub type SourceConfig = BTreeMap<String, String>;

/// The full current snapshot produced by one query.
pub type ItemSet = BTreeMap<ItemId, Item>;

/// A provider of current inventory for one namespace.
pub trait ItemSource: Send + Sync {
    /// Short label used in logs and reports, e.g. `gcp`.
    fn kind(&self) -> &str;

    /// Produce the complete current item set.
    ///
    /// Fails with [`SourceError::Config`] when required keys are missing and
    /// with [`SourceError::Upstream`] when the upstream query fails.
    fn query(&self, config: &SourceConfig) -> Result<ItemSet, SourceError>;
}

/// Look up a required, non-empty configuration value.
pub fn require_key<'a>(config: &'a SourceConfig, key: &str) -> Result<&'a str, ConfigError> {
    config
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingKey {
            key: key.to_owned(),
        })
}
