pub mod config;
pub mod daemon;
pub mod host;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use tally_core::NamespaceName;
use tally_store::FsStore;
use tally_sync::CycleReport;
use tally_sync::{ItemOutcome, PruneOutcome};

/// `RUST_LOG`-driven stderr logging, `warn` unless overridden.
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// `--root` if given, otherwise `~/.tally/namespaces`.
pub fn resolve_root(root: Option<PathBuf>) -> Result<PathBuf> {
    match root {
        Some(root) => Ok(root),
        None => Ok(tally_daemon::paths::namespaces_root(&home_dir()?)),
    }
}

pub fn open_namespace(root: &Path, name: &str) -> Result<(NamespaceName, FsStore)> {
    let namespace =
        NamespaceName::parse(name).with_context(|| format!("invalid namespace '{name}'"))?;
    let store = FsStore::open(root, &namespace);
    Ok((namespace, store))
}

/// Parse `key=value`; the value may itself contain `=`.
pub fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_owned(), value.to_owned()))
        }
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

pub fn print_report(namespace: &str, report: &CycleReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    let written = report.written() + report.would_write();
    let deleted = report.deleted() + report.would_delete();

    if written == 0 && deleted == 0 && report.delete_failures() == 0 {
        println!(
            "{prefix}✓ '{namespace}': nothing to do ({} unchanged)",
            report.unchanged()
        );
    } else {
        println!(
            "{prefix}✓ '{namespace}' synced ({written} written, {} unchanged, {deleted} deleted) in {}ms",
            report.unchanged(),
            report.duration_ms,
        );
    }

    for (id, outcome) in &report.items {
        match outcome {
            ItemOutcome::Written => println!("  ✎  {id}"),
            ItemOutcome::WouldWrite => println!("  ~  {id}"),
            ItemOutcome::Unchanged => {}
            ItemOutcome::Skipped { reason } => println!("  !  {id} skipped: {reason}"),
        }
    }
    for (key, outcome) in &report.pruned {
        match outcome {
            PruneOutcome::Deleted => println!("  ✗  {key}"),
            PruneOutcome::WouldDelete => println!("  -  {key}"),
            PruneOutcome::DeleteFailed { error } => {
                println!("  !  {key} not deleted: {error}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_pairs() {
        assert_eq!(
            parse_key_value("project=demo").unwrap(),
            ("project".to_owned(), "demo".to_owned())
        );
        assert_eq!(
            parse_key_value("filter=a=b").unwrap(),
            ("filter".to_owned(), "a=b".to_owned())
        );
        assert!(parse_key_value("=x").is_err());
        assert!(parse_key_value("nothing").is_err());
    }
}
