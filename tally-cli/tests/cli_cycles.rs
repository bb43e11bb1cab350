use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use serde_json::{json, Value};
use tempfile::TempDir;

fn tally_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tally"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("RUST_LOG");
    cmd
}

fn namespace_dir(home: &Path, namespace: &str) -> PathBuf {
    home.join(".tally").join("namespaces").join(namespace)
}

fn write_inventory(path: &Path, records: Value) {
    fs::write(path, serde_json::to_vec_pretty(&records).expect("json")).expect("inventory");
}

fn configure_json_file(home: &Path, namespace: &str, inventory: &Path) {
    tally_cmd(home)
        .args(["config", namespace, "--set"])
        .arg(format!("path={}", inventory.display()))
        .assert()
        .success()
        .stdout(contains("\"path\""));
}

fn status_json(home: &Path, namespace: &str) -> Value {
    let output = tally_cmd(home)
        .args(["status", namespace, "--json"])
        .output()
        .expect("run status");
    assert!(output.status.success(), "status failed: {output:?}");
    serde_json::from_slice(&output.stdout).expect("status JSON")
}

#[test]
fn snapshot_cycles_write_skip_and_prune() {
    let home = TempDir::new().expect("home");
    let inventory = home.path().join("inventory.json");
    write_inventory(
        &inventory,
        json!({ "vm-1": { "zone": "a" }, "vm-2": { "zone": "b" } }),
    );
    configure_json_file(home.path(), "source-lab", &inventory);

    tally_cmd(home.path())
        .args(["sync", "source-lab", "--source", "json-file"])
        .assert()
        .success()
        .stdout(contains("2 written"));

    let ns = namespace_dir(home.path(), "source-lab");
    assert!(ns.join("vm-1").exists());
    assert!(ns.join("vm-2").exists());
    assert!(ns.join("state.json").exists());

    tally_cmd(home.path())
        .args(["sync", "source-lab", "--source", "json-file"])
        .assert()
        .success()
        .stdout(contains("nothing to do (2 unchanged)"));

    let status = status_json(home.path(), "source-lab");
    assert_eq!(status["status"], json!("current"));
    assert_eq!(status["index_len"], json!(2));
    assert_eq!(status["objects_by_type"]["json-record"], json!(2));
    assert_eq!(status["has_config"], json!(true));

    write_inventory(&inventory, json!({ "vm-1": { "zone": "a" } }));
    tally_cmd(home.path())
        .args(["sync", "source-lab", "--source", "json-file"])
        .assert()
        .success()
        .stdout(contains("1 deleted"))
        .stdout(contains("✗  vm-2"));
    assert!(!ns.join("vm-2").exists());
    assert!(ns.join("config.json").exists());
}

#[test]
fn dry_run_leaves_the_namespace_untouched() {
    let home = TempDir::new().expect("home");
    let inventory = home.path().join("inventory.json");
    write_inventory(&inventory, json!({ "vm-1": { "zone": "a" } }));
    configure_json_file(home.path(), "source-lab", &inventory);

    tally_cmd(home.path())
        .args(["sync", "source-lab", "--source", "json-file", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("[dry-run]"))
        .stdout(contains("~  vm-1"));

    let ns = namespace_dir(home.path(), "source-lab");
    assert!(!ns.join("vm-1").exists());
    assert!(!ns.join("state.json").exists());
    assert_eq!(
        status_json(home.path(), "source-lab")["status"],
        json!("never_synced")
    );
}

#[test]
fn sync_json_output_carries_the_report() {
    let home = TempDir::new().expect("home");
    let inventory = home.path().join("inventory.json");
    write_inventory(&inventory, json!({ "vm-1": {} }));
    configure_json_file(home.path(), "source-lab", &inventory);

    let output = tally_cmd(home.path())
        .args(["sync", "source-lab", "--source", "json-file", "--json"])
        .output()
        .expect("run sync");
    assert!(output.status.success());
    let result: Value = serde_json::from_slice(&output.stdout).expect("report JSON");
    assert_eq!(result["namespace"], json!("source-lab"));
    assert_eq!(result["variant"], json!("snapshot"));
    assert_eq!(result["source"], json!("json-file"));
    assert_eq!(result["report"]["items"]["vm-1"]["outcome"], json!("written"));
}

#[test]
fn host_cycles_keep_other_hosts() {
    let home = TempDir::new().expect("home");
    tally_cmd(home.path())
        .args(["config", "source-netscan", "--set", "scanner=lab"])
        .assert()
        .success();

    for host in ["10.0.0.1", "10.0.0.2"] {
        tally_cmd(home.path())
            .args(["host", "source-netscan", "--data"])
            .arg(json!({ "name": host, "privateIPv4": host }).to_string())
            .assert()
            .success()
            .stdout(contains("1 written"));
    }

    let ns = namespace_dir(home.path(), "source-netscan");
    assert!(ns.join("10.0.0.1").exists());
    assert!(ns.join("10.0.0.2").exists());
    let status = status_json(home.path(), "source-netscan");
    assert_eq!(status["objects_by_type"]["netscan-instance"], json!(2));
    assert_eq!(status["index_len"], json!(2));
    assert_eq!(status["status"], json!("current"));
}

#[test]
fn invalid_namespace_is_rejected() {
    let home = TempDir::new().expect("home");
    tally_cmd(home.path())
        .args(["sync", "lab", "--source", "json-file"])
        .assert()
        .failure()
        .stderr(contains("must start with 'source-'"));
    assert!(!home.path().join(".tally").exists());
}

#[test]
fn missing_config_aborts_the_cycle() {
    let home = TempDir::new().expect("home");
    tally_cmd(home.path())
        .args(["sync", "source-lab", "--source", "json-file"])
        .assert()
        .failure()
        .stderr(contains("cannot load namespace configuration"));
    assert!(!namespace_dir(home.path(), "source-lab").join("state.json").exists());
}

#[test]
fn root_flag_overrides_home_layout() {
    let home = TempDir::new().expect("home");
    let root = TempDir::new().expect("root");
    let inventory = home.path().join("inventory.json");
    write_inventory(&inventory, json!({ "vm-1": {} }));

    tally_cmd(home.path())
        .arg("--root")
        .arg(root.path())
        .args(["config", "source-lab", "--set"])
        .arg(format!("path={}", inventory.display()))
        .assert()
        .success();
    tally_cmd(home.path())
        .arg("--root")
        .arg(root.path())
        .args(["sync", "source-lab", "--source", "json-file"])
        .assert()
        .success();

    assert!(root.path().join("source-lab").join("vm-1").exists());
    assert!(!namespace_dir(home.path(), "source-lab").exists());
}

#[test]
fn config_edits_merge_and_unset() {
    let home = TempDir::new().expect("home");
    tally_cmd(home.path())
        .args(["config", "source-gcp", "--set", "project=demo", "--set", "zone=us-east1-b"])
        .assert()
        .success();
    let output = tally_cmd(home.path())
        .args(["config", "source-gcp", "--unset", "zone", "--set", "project=prod"])
        .output()
        .expect("run config");
    assert!(output.status.success());
    let config: Value = serde_json::from_slice(&output.stdout).expect("config JSON");
    assert_eq!(config, json!({ "project": "prod" }));
}

#[test]
fn daemon_status_without_daemon() {
    let home = TempDir::new().expect("home");
    let output = tally_cmd(home.path())
        .args(["daemon", "status"])
        .output()
        .expect("run daemon status");
    assert!(output.status.success());
    let status: Value = serde_json::from_slice(&output.stdout).expect("status JSON");
    assert_eq!(status["running"], json!(false));

    tally_cmd(home.path())
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stdout(contains("daemon is not running"));
}
