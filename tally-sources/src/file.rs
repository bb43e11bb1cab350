//! Records from a JSON document on local disk.
//!
//! Required configuration: `path` (a JSON object mapping id to record).
//! Optional: `type` and `version`, defaulting to `json-record` / `1.0`.

use std::path::Path;

use serde_json::{Map, Value};

use tally_core::{require_key, Item, ItemId, ItemSet, ItemSource, SourceConfig, SourceError};

pub const DEFAULT_TYPE: &str = "json-record";
pub const DEFAULT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFileSource;

impl ItemSource for JsonFileSource {
    fn kind(&self) -> &str {
        "json-file"
    }

    fn query(&self, config: &SourceConfig) -> Result<ItemSet, SourceError> {
        let path = Path::new(require_key(config, "path")?);
        let type_tag = config.get("type").map(String::as_str).unwrap_or(DEFAULT_TYPE);
        let version = config
            .get("version")
            .map(String::as_str)
            .unwrap_or(DEFAULT_VERSION);

        let contents = std::fs::read(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let records: Map<String, Value> = serde_json::from_slice(&contents)?;

        // Type/version are passed through unvalidated; the reconciler rejects
        // a half-configured pair for the whole cycle.
        let mut items = ItemSet::new();
        for (id, record) in records {
            let payload = serde_json::to_vec(&record)?;
            let item = Item {
                type_tag: Some(type_tag.to_owned()),
                version: Some(version.to_owned()),
                payload,
            };
            items.insert(ItemId::from(id), item);
        }
        tracing::info!("json-file: {} record(s) from {}", items.len(), path.display());
        Ok(items)
    }
}
