//! GCP compute instances of one project/zone.
//!
//! Required configuration: `project`, `zone`. Optional: `access_token`
//! (otherwise `$GOOGLE_OAUTH_ACCESS_TOKEN`). Every instance becomes one
//! `gcp-instance` `1.0` item keyed by its numeric id, with the instance JSON
//! as payload.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use tally_core::{require_key, Item, ItemId, ItemKind, ItemSet, ItemSource, SourceConfig, SourceError};

pub const INSTANCE_TYPE: &str = "gcp-instance";
pub const INSTANCE_VERSION: &str = "1.0";
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

const DEFAULT_BASE_URL: &str = "https://compute.googleapis.com/compute/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BODY_LIMIT: usize = 512;

/// Parameters of one `instances.list` page request.
#[derive(Debug, Clone, Copy)]
pub struct InstanceListRequest<'a> {
    pub project: &'a str,
    pub zone: &'a str,
    pub access_token: Option<&'a str>,
    pub page_token: Option<&'a str>,
}

/// One page of the `instances.list` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstancePage {
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Seam over the Compute API so the source can be exercised offline.
pub trait ComputeClient: Send + Sync {
    fn list_instances(&self, request: &InstanceListRequest<'_>) -> Result<InstancePage, SourceError>;
}

/// Compute REST client backed by `ureq`.
#[derive(Debug, Clone)]
pub struct HttpComputeClient {
    base_url: String,
    timeout: Duration,
}

impl Default for HttpComputeClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }
}

impl HttpComputeClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }
}

impl ComputeClient for HttpComputeClient {
    fn list_instances(&self, request: &InstanceListRequest<'_>) -> Result<InstancePage, SourceError> {
        let url = format!(
            "{}/projects/{}/zones/{}/instances",
            self.base_url.trim_end_matches('/'),
            request.project,
            request.zone
        );
        let mut call = ureq::get(&url).timeout(self.timeout);
        if let Some(token) = request.access_token {
            call = call.set("Authorization", &format!("Bearer {token}"));
        }
        if let Some(page) = request.page_token {
            call = call.query("pageToken", page);
        }

        let response = call.call().map_err(describe_ureq_error)?;
        response
            .into_json::<InstancePage>()
            .map_err(|e| SourceError::upstream("gcp", format!("cannot decode instance list: {e}")))
    }
}

fn describe_ureq_error(err: ureq::Error) -> SourceError {
    match err {
        ureq::Error::Status(code, response) => {
            let mut body = response.into_string().unwrap_or_default();
            body.truncate(ERROR_BODY_LIMIT);
            SourceError::upstream("gcp", format!("HTTP {code}: {body}"))
        }
        ureq::Error::Transport(transport) => SourceError::upstream("gcp", transport),
    }
}

/// Source listing every compute instance in `project`/`zone`.
#[derive(Debug, Clone)]
pub struct GcpInstances<C> {
    client: C,
}

impl<C: ComputeClient> GcpInstances<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C: ComputeClient> ItemSource for GcpInstances<C> {
    fn kind(&self) -> &str {
        "gcp"
    }

    fn query(&self, config: &SourceConfig) -> Result<ItemSet, SourceError> {
        let project = require_key(config, "project")?;
        let zone = require_key(config, "zone")?;
        let access_token = config
            .get("access_token")
            .filter(|t| !t.is_empty())
            .cloned()
            .or_else(|| std::env::var(ACCESS_TOKEN_ENV).ok().filter(|t| !t.is_empty()));

        let mut items = ItemSet::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.client.list_instances(&InstanceListRequest {
                project,
                zone,
                access_token: access_token.as_deref(),
                page_token: page_token.as_deref(),
            })?;

            for instance in page.items {
                let id = instance_id(&instance)?;
                let payload = serde_json::to_vec(&instance)?;
                items.insert(
                    id,
                    Item::typed(ItemKind::new(INSTANCE_TYPE, INSTANCE_VERSION), payload),
                );
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) if page_token.as_deref() == Some(next.as_str()) => {
                    return Err(SourceError::upstream(
                        "gcp",
                        format!("instance listing repeated page token '{next}'"),
                    ));
                }
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        tracing::info!("gcp: {} instance(s) in {project}/{zone}", items.len());
        Ok(items)
    }
}

/// Instance ids are uint64; the REST API renders them as strings.
fn instance_id(instance: &Value) -> Result<ItemId, SourceError> {
    match instance.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(ItemId::from(id.as_str())),
        Some(Value::Number(id)) if id.is_u64() => Ok(ItemId::from(id.to_string())),
        _ => Err(SourceError::InvalidPayload(format!(
            "compute instance without an id: {}",
            instance.get("name").and_then(Value::as_str).unwrap_or("<unnamed>")
        ))),
    }
}
