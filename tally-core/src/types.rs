//! Domain types for inventory reconciliation.
//!
//! Identifiers are newtypes over `String`; item payloads are opaque bytes.
//! Object metadata is a flat `BTreeMap<String, String>` so that it serializes
//! deterministically.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Namespace object holding the flat source configuration.
pub const CONFIG_OBJECT: &str = "config.json";

/// Namespace object holding the persisted checksum index.
pub const STATE_OBJECT: &str = "state.json";

/// Metadata key carrying an item's type tag.
pub const META_TYPE: &str = "type";

/// Metadata key carrying an item's schema version.
pub const META_TYPE_VERSION: &str = "type-version";

/// Every namespace identifier must start with this prefix.
pub const NAMESPACE_PREFIX: &str = "source-";

/// Object metadata as stored next to a payload.
pub type Metadata = BTreeMap<String, String>;

/// `true` for the bookkeeping objects that are never inventory items.
pub fn is_reserved_key(key: &str) -> bool {
    key == CONFIG_OBJECT || key == STATE_OBJECT
}

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of an item, unique within one namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl std::borrow::Borrow<str> for ItemId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A validated namespace identifier (one storage scope per source instance).
///
/// Construct with [`NamespaceName::parse`]; the inner string is private so an
/// unvalidated name can never reach a store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NamespaceName(String);

impl NamespaceName {
    /// Validate `raw` against the naming rules.
    ///
    /// The name must start with [`NAMESPACE_PREFIX`], have a non-empty suffix,
    /// and must not contain path separators, `..`, or control characters.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidNamespace {
            name: raw.to_owned(),
            reason: reason.to_owned(),
        };

        let Some(rest) = raw.strip_prefix(NAMESPACE_PREFIX) else {
            return Err(invalid("must start with 'source-'"));
        };
        if rest.is_empty() {
            return Err(invalid("name after 'source-' is empty"));
        }
        if raw.contains(['/', '\\']) || raw.contains("..") {
            return Err(invalid("must not contain path separators or '..'"));
        }
        if raw.chars().any(char::is_control) {
            return Err(invalid("must not contain control characters"));
        }
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NamespaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for NamespaceName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for NamespaceName {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// A validated type tag / schema version pair, e.g. `gcp-instance` `1.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKind {
    pub type_tag: String,
    pub version: String,
}

impl ItemKind {
    pub fn new(type_tag: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            version: version.into(),
        }
    }

    /// Metadata written alongside the payload.
    pub fn to_metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(META_TYPE.to_owned(), self.type_tag.clone());
        metadata.insert(META_TYPE_VERSION.to_owned(), self.version.clone());
        metadata
    }

    /// Recover the kind from stored metadata.
    ///
    /// Returns `None` unless both keys are present and non-empty; the
    /// bookkeeping objects always fall in that case.
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        let type_tag = metadata.get(META_TYPE).filter(|v| !v.is_empty())?;
        let version = metadata.get(META_TYPE_VERSION).filter(|v| !v.is_empty())?;
        Some(Self::new(type_tag.clone(), version.clone()))
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.type_tag, self.version)
    }
}

/// One unit of inventory data as produced by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub type_tag: Option<String>,
    pub version: Option<String>,
    pub payload: Vec<u8>,
}

impl Item {
    /// An item with a type tag and version.
    pub fn typed(kind: ItemKind, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            type_tag: Some(kind.type_tag),
            version: Some(kind.version),
            payload: payload.into(),
        }
    }

    /// An item without type metadata. Such items are written but never
    /// recognised as prune candidates afterwards.
    pub fn untyped(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            type_tag: None,
            version: None,
            payload: payload.into(),
        }
    }

    /// Validate the Type/Version pairing. Empty strings count as absent.
    pub fn kind(&self, id: &ItemId) -> Result<Option<ItemKind>, ConfigError> {
        let type_tag = self.type_tag.as_deref().filter(|v| !v.is_empty());
        let version = self.version.as_deref().filter(|v| !v.is_empty());
        match (type_tag, version) {
            (Some(t), Some(v)) => Ok(Some(ItemKind::new(t, v))),
            (None, None) => Ok(None),
            _ => Err(ConfigError::KindMismatch {
                id: id.0.clone(),
                type_tag: self.type_tag.clone(),
                version: self.version.clone(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(ItemId::from("i-01").to_string(), "i-01");
        assert_eq!(
            NamespaceName::parse("source-gcp").unwrap().to_string(),
            "source-gcp"
        );
    }

    #[test]
    fn kind_metadata_roundtrip() {
        let kind = ItemKind::new("gcp-instance", "1.0");
        let metadata = kind.to_metadata();
        assert_eq!(metadata.get(META_TYPE).map(String::as_str), Some("gcp-instance"));
        assert_eq!(ItemKind::from_metadata(&metadata), Some(kind));
    }

    #[test]
    fn kind_from_metadata_requires_both_non_empty_keys() {
        let mut metadata = Metadata::new();
        assert_eq!(ItemKind::from_metadata(&metadata), None);
        metadata.insert(META_TYPE.to_owned(), "gcp-instance".to_owned());
        assert_eq!(ItemKind::from_metadata(&metadata), None);
        metadata.insert(META_TYPE_VERSION.to_owned(), String::new());
        assert_eq!(ItemKind::from_metadata(&metadata), None);
    }

    #[test]
    fn item_with_only_type_is_a_mismatch() {
        let item = Item {
            type_tag: Some("gcp-instance".to_owned()),
            version: None,
            payload: vec![],
        };
        let err = item.kind(&ItemId::from("a")).unwrap_err();
        assert!(matches!(err, ConfigError::KindMismatch { .. }));
    }

    #[test]
    fn empty_strings_count_as_absent() {
        let item = Item {
            type_tag: Some(String::new()),
            version: Some(String::new()),
            payload: vec![],
        };
        assert_eq!(item.kind(&ItemId::from("a")).unwrap(), None);
    }

    #[test]
    fn reserved_keys() {
        assert!(is_reserved_key("config.json"));
        assert!(is_reserved_key("state.json"));
        assert!(!is_reserved_key("1234"));
    }

    #[test]
    fn namespace_deserialize_validates() {
        let ok: NamespaceName = serde_json::from_str(r#""source-lab""#).expect("valid");
        assert_eq!(ok.as_str(), "source-lab");
        assert!(serde_json::from_str::<NamespaceName>(r#""lab""#).is_err());
    }
}
