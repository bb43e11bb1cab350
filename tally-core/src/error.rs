//! Error types for tally-core.

use std::path::PathBuf;

use thiserror::Error;

/// Configuration problems. Every variant is fatal to a cycle and is raised
/// before anything is written.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required key is absent (or empty) in the namespace `config.json`.
    #[error("source configuration must specify '{key}'")]
    MissingKey { key: String },

    /// The namespace identifier from a trigger does not satisfy the naming rules.
    #[error("invalid namespace '{name}': {reason}")]
    InvalidNamespace { name: String, reason: String },

    /// Exactly one of type and version was supplied for an item.
    #[error(
        "both, or neither, type and version must be specified for item {id} \
         (type is {type_tag:?} and version is {version:?})"
    )]
    KindMismatch {
        id: String,
        type_tag: Option<String>,
        version: Option<String>,
    },

    /// An item tried to claim one of the reserved namespace objects.
    #[error("item identifier '{id}' is reserved for namespace bookkeeping")]
    ReservedIdentifier { id: String },
}

/// Errors raised by an [`ItemSource`](crate::ItemSource) while querying.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The upstream API could not be reached or answered with an error.
    #[error("{source_kind} query failed: {message}")]
    Upstream {
        source_kind: String,
        message: String,
    },

    /// A payload handed to the source is not usable as an item.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SourceError {
    /// Convenience constructor for [`SourceError::Upstream`].
    pub fn upstream(source_kind: impl Into<String>, message: impl ToString) -> Self {
        SourceError::Upstream {
            source_kind: source_kind.into(),
            message: message.to_string(),
        }
    }
}
