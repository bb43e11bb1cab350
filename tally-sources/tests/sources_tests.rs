use std::sync::Mutex;

use rstest::rstest;
use serde_json::json;
use tally_core::{ConfigError, ItemId, ItemKind, ItemSource, SourceConfig, SourceError};
use tally_sources::gcp::{InstanceListRequest, InstancePage};
use tally_sources::{ComputeClient, GcpInstances, JsonFileSource, NetscanHost};
use tempfile::TempDir;

/// Serves canned pages in order and records the page tokens it was asked for.
struct FakeCompute {
    pages: Vec<InstancePage>,
    seen_tokens: Mutex<Vec<Option<String>>>,
    seen_auth: Mutex<Vec<Option<String>>>,
}

impl FakeCompute {
    fn new(pages: Vec<InstancePage>) -> Self {
        Self {
            pages,
            seen_tokens: Mutex::new(Vec::new()),
            seen_auth: Mutex::new(Vec::new()),
        }
    }
}

impl ComputeClient for FakeCompute {
    fn list_instances(&self, request: &InstanceListRequest<'_>) -> Result<InstancePage, SourceError> {
        let mut tokens = self.seen_tokens.lock().unwrap();
        let index = tokens.len();
        tokens.push(request.page_token.map(str::to_owned));
        self.seen_auth
            .lock()
            .unwrap()
            .push(request.access_token.map(str::to_owned));
        self.pages
            .get(index)
            .cloned()
            .ok_or_else(|| SourceError::upstream("gcp", "no more pages"))
    }
}

struct FailingCompute;

impl ComputeClient for FailingCompute {
    fn list_instances(&self, _request: &InstanceListRequest<'_>) -> Result<InstancePage, SourceError> {
        Err(SourceError::upstream("gcp", "HTTP 403: permission denied"))
    }
}

fn gcp_config() -> SourceConfig {
    SourceConfig::from([
        ("project".to_owned(), "acme-prod".to_owned()),
        ("zone".to_owned(), "us-west1-a".to_owned()),
        ("access_token".to_owned(), "tok".to_owned()),
    ])
}

// ---------------------------------------------------------------------------
// gcp
// ---------------------------------------------------------------------------

#[rstest]
#[case("project")]
#[case("zone")]
fn gcp_requires_project_and_zone(#[case] missing: &str) {
    let mut config = gcp_config();
    config.remove(missing);
    let source = GcpInstances::new(FakeCompute::new(vec![]));
    let err = source.query(&config).unwrap_err();
    match err {
        SourceError::Config(ConfigError::MissingKey { key }) => assert_eq!(key, missing),
        other => panic!("expected missing key, got {other:?}"),
    }
}

#[test]
fn gcp_follows_pages_and_types_every_instance() {
    let pages = vec![
        InstancePage {
            items: vec![json!({"id": "101", "name": "web-1"}), json!({"id": "102", "name": "web-2"})],
            next_page_token: Some("p2".to_owned()),
        },
        InstancePage {
            items: vec![json!({"id": "103", "name": "db-1"})],
            next_page_token: None,
        },
    ];
    let client = FakeCompute::new(pages);
    let source = GcpInstances::new(client);

    let items = source.query(&gcp_config()).expect("query");
    assert_eq!(items.len(), 3);
    let item = &items[&ItemId::from("103")];
    assert_eq!(
        item.kind(&ItemId::from("103")).unwrap(),
        Some(ItemKind::new("gcp-instance", "1.0"))
    );
    let payload: serde_json::Value = serde_json::from_slice(&item.payload).unwrap();
    assert_eq!(payload["name"], "db-1");
}

#[test]
fn gcp_passes_page_tokens_and_access_token_to_client() {
    let pages = vec![
        InstancePage {
            items: vec![],
            next_page_token: Some("p2".to_owned()),
        },
        InstancePage::default(),
    ];
    let source = GcpInstances::new(FakeCompute::new(pages));
    source.query(&gcp_config()).expect("query");

    let probe = source.client();
    assert_eq!(
        *probe.seen_tokens.lock().unwrap(),
        vec![None, Some("p2".to_owned())]
    );
    assert_eq!(
        *probe.seen_auth.lock().unwrap(),
        vec![Some("tok".to_owned()), Some("tok".to_owned())]
    );
}

#[test]
fn gcp_repeated_page_token_is_an_error() {
    let looping = InstancePage {
        items: vec![],
        next_page_token: Some("same".to_owned()),
    };
    let source = GcpInstances::new(FakeCompute::new(vec![looping.clone(), looping]));
    let err = source.query(&gcp_config()).unwrap_err();
    assert!(err.to_string().contains("repeated page token"), "got: {err}");
}

#[test]
fn gcp_upstream_failure_is_surfaced() {
    let source = GcpInstances::new(FailingCompute);
    let err = source.query(&gcp_config()).unwrap_err();
    assert!(matches!(err, SourceError::Upstream { .. }));
    assert!(err.to_string().contains("permission denied"));
}

#[test]
fn gcp_instance_without_id_fails_the_query() {
    let source = GcpInstances::new(FakeCompute::new(vec![InstancePage {
        items: vec![json!({"name": "orphan"})],
        next_page_token: None,
    }]));
    let err = source.query(&gcp_config()).unwrap_err();
    assert!(matches!(err, SourceError::InvalidPayload(_)), "got: {err:?}");
}

// ---------------------------------------------------------------------------
// netscan
// ---------------------------------------------------------------------------

#[test]
fn netscan_host_uses_name_as_id_and_keeps_raw_payload() {
    let raw = br#"{"name":"10.16.118.74","privateIPv4":"10.16.118.74","privateIPv6":""}"#;
    let source = NetscanHost::new(raw.to_vec());
    let items = source.query(&SourceConfig::new()).expect("query");

    assert_eq!(items.len(), 1);
    let (id, item) = items.iter().next().unwrap();
    assert_eq!(id.as_str(), "10.16.118.74");
    assert_eq!(item.payload, raw.to_vec());
    assert_eq!(
        item.kind(id).unwrap(),
        Some(ItemKind::new("netscan-instance", "1.0"))
    );
}

#[rstest]
#[case(br#"{"privateIPv4":"10.0.0.1"}"#.as_slice())]
#[case(br#"{"name":""}"#.as_slice())]
#[case(br#"{"name":42}"#.as_slice())]
fn netscan_host_without_usable_name_is_invalid(#[case] raw: &[u8]) {
    let err = NetscanHost::new(raw.to_vec()).host_id().unwrap_err();
    assert!(matches!(err, SourceError::InvalidPayload(_)), "got: {err:?}");
}

#[test]
fn netscan_host_rejects_non_json() {
    let err = NetscanHost::new(b"10.0.0.1".to_vec()).host_id().unwrap_err();
    assert!(matches!(err, SourceError::Json(_)), "got: {err:?}");
}

// ---------------------------------------------------------------------------
// json-file
// ---------------------------------------------------------------------------

#[test]
fn json_file_reads_records_with_default_kind() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("hosts.json");
    std::fs::write(&path, r#"{"a":{"ip":"10.0.0.1"},"b":{"ip":"10.0.0.2"}}"#).unwrap();
    let config = SourceConfig::from([("path".to_owned(), path.display().to_string())]);

    let items = JsonFileSource.query(&config).expect("query");
    assert_eq!(items.len(), 2);
    let a = &items[&ItemId::from("a")];
    assert_eq!(a.payload, br#"{"ip":"10.0.0.1"}"#.to_vec());
    assert_eq!(
        a.kind(&ItemId::from("a")).unwrap(),
        Some(ItemKind::new("json-record", "1.0"))
    );
}

#[test]
fn json_file_missing_file_is_io_error() {
    let tmp = TempDir::new().unwrap();
    let config = SourceConfig::from([(
        "path".to_owned(),
        tmp.path().join("absent.json").display().to_string(),
    )]);
    let err = JsonFileSource.query(&config).unwrap_err();
    assert!(matches!(err, SourceError::Io { .. }), "got: {err:?}");
}

#[test]
fn json_file_requires_path() {
    let err = JsonFileSource.query(&SourceConfig::new()).unwrap_err();
    assert!(matches!(
        err,
        SourceError::Config(ConfigError::MissingKey { .. })
    ));
}
