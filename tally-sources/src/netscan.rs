//! A single host reported by a network scanner.
//!
//! The trigger carries one small JSON document, e.g.
//! `{"name":"10.16.118.74","privateIPv4":"10.16.118.74","privateIPv6":""}`.
//! Its `name` becomes the item id and the raw bytes are stored unchanged.

use serde_json::Value;

use tally_core::{Item, ItemId, ItemKind, ItemSet, ItemSource, SourceConfig, SourceError};

pub const HOST_TYPE: &str = "netscan-instance";
pub const HOST_VERSION: &str = "1.0";

/// One-item source built from a scanner message payload.
#[derive(Debug, Clone)]
pub struct NetscanHost {
    payload: Vec<u8>,
}

impl NetscanHost {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// The host's identifier, read from the payload's `name` field.
    pub fn host_id(&self) -> Result<ItemId, SourceError> {
        let doc: Value = serde_json::from_slice(&self.payload)?;
        match doc.get("name").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => Ok(ItemId::from(name)),
            _ => Err(SourceError::InvalidPayload(
                "host message must be a JSON object with a non-empty 'name'".to_owned(),
            )),
        }
    }
}

impl ItemSource for NetscanHost {
    fn kind(&self) -> &str {
        "netscan"
    }

    fn query(&self, _config: &SourceConfig) -> Result<ItemSet, SourceError> {
        let id = self.host_id()?;
        let item = Item::typed(ItemKind::new(HOST_TYPE, HOST_VERSION), self.payload.clone());
        Ok(ItemSet::from([(id, item)]))
    }
}
