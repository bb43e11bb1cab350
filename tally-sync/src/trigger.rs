//! Cycle triggers.
//!
//! A [`TriggerMessage`] is what arrives from outside (the daemon socket, the
//! CLI). It names a namespace one of two ways:
//!
//! - snapshot: `data` is the namespace name; the configured source is queried
//! - host: `attributes["deviceId"]` is the namespace; `data` is one host document

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use tally_core::{ConfigError, NamespaceName};

/// Attribute naming the namespace of a single-host message.
pub const DEVICE_ID_ATTRIBUTE: &str = "deviceId";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerMessage {
    #[serde(default)]
    pub data: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl TriggerMessage {
    pub fn snapshot(namespace: impl Into<String>) -> Self {
        Self {
            data: namespace.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn host(namespace: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            data: payload.into(),
            attributes: BTreeMap::from([(DEVICE_ID_ATTRIBUTE.to_owned(), namespace.into())]),
        }
    }
}

/// A validated trigger, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Snapshot {
        namespace: NamespaceName,
    },
    Host {
        namespace: NamespaceName,
        payload: Vec<u8>,
    },
}

impl Trigger {
    /// Validate a message. The namespace is checked here, so an invalid one
    /// never reaches a store.
    pub fn parse(message: &TriggerMessage) -> Result<Self, ConfigError> {
        match message.attributes.get(DEVICE_ID_ATTRIBUTE) {
            Some(device) => Ok(Trigger::Host {
                namespace: NamespaceName::parse(device.trim())?,
                payload: message.data.clone().into_bytes(),
            }),
            None => Ok(Trigger::Snapshot {
                namespace: NamespaceName::parse(message.data.trim())?,
            }),
        }
    }

    pub fn namespace(&self) -> &NamespaceName {
        match self {
            Trigger::Snapshot { namespace } | Trigger::Host { namespace, .. } => namespace,
        }
    }

    /// `snapshot` or `host`.
    pub fn variant(&self) -> &'static str {
        match self {
            Trigger::Snapshot { .. } => "snapshot",
            Trigger::Host { .. } => "host",
        }
    }
}

impl TryFrom<&TriggerMessage> for Trigger {
    type Error = ConfigError;

    fn try_from(message: &TriggerMessage) -> Result<Self, Self::Error> {
        Trigger::parse(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_data_is_a_snapshot_trigger() {
        let trigger = Trigger::parse(&TriggerMessage::snapshot("source-gcp-prod\n")).unwrap();
        assert_eq!(trigger.variant(), "snapshot");
        assert_eq!(trigger.namespace().as_str(), "source-gcp-prod");
    }

    #[test]
    fn device_id_attribute_makes_a_host_trigger() {
        let message = TriggerMessage::host("source-netscan", r#"{"name":"10.0.0.1"}"#);
        match Trigger::parse(&message).unwrap() {
            Trigger::Host { namespace, payload } => {
                assert_eq!(namespace.as_str(), "source-netscan");
                assert_eq!(payload, br#"{"name":"10.0.0.1"}"#.to_vec());
            }
            other => panic!("expected host trigger, got {other:?}"),
        }
    }

    #[test]
    fn bad_namespace_is_rejected() {
        let err = Trigger::parse(&TriggerMessage::snapshot("gcp-prod")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNamespace { .. }));
        let err = Trigger::parse(&TriggerMessage::host("netscan", "{}")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNamespace { .. }));
    }

    #[test]
    fn message_decodes_without_attributes() {
        let message: TriggerMessage = serde_json::from_str(r#"{"data":"source-a"}"#).unwrap();
        assert!(message.attributes.is_empty());
        assert_eq!(message, TriggerMessage::snapshot("source-a"));
    }
}
