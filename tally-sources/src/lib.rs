//! # tally-sources
//!
//! [`ItemSource`](tally_core::ItemSource) implementations, one per kind of
//! inventory feed:
//!
//! - [`gcp::GcpInstances`] : compute instances of one GCP project/zone
//! - [`netscan::NetscanHost`] : a single host reported by a network scan
//! - [`file::JsonFileSource`] : a JSON document of records on local disk

pub mod file;
pub mod gcp;
pub mod netscan;

use std::fmt;
use std::str::FromStr;

use tally_core::ItemSource;

pub use file::JsonFileSource;
pub use gcp::{ComputeClient, GcpInstances, HttpComputeClient};
pub use netscan::NetscanHost;

/// Snapshot source kinds selectable by name (`--source`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Gcp,
    JsonFile,
}

impl SourceKind {
    pub fn all() -> &'static [SourceKind] {
        &[SourceKind::Gcp, SourceKind::JsonFile]
    }

    /// Build the default source for this kind.
    pub fn build(self) -> Box<dyn ItemSource> {
        match self {
            SourceKind::Gcp => Box::new(GcpInstances::new(HttpComputeClient::default())),
            SourceKind::JsonFile => Box::new(JsonFileSource),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Gcp => write!(f, "gcp"),
            SourceKind::JsonFile => write!(f, "json-file"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gcp" => Ok(SourceKind::Gcp),
            "json-file" | "file" => Ok(SourceKind::JsonFile),
            other => Err(format!(
                "unknown source kind '{other}'; expected: gcp, json-file"
            )),
        }
    }
}
