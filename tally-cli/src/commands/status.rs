//! `tally status`: index and object health of one namespace.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use tally_sync::status::{check, format_datetime_age, NamespaceSignal, NamespaceStatus};

use super::{open_namespace, resolve_root};

/// Arguments for `tally status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Namespace to inspect (`source-<name>`).
    pub namespace: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, root: Option<PathBuf>) -> Result<()> {
        let root = resolve_root(root)?;
        let (namespace, store) = open_namespace(&root, &self.namespace)?;

        let status = check(&store)
            .with_context(|| format!("status check failed for '{namespace}'"))?;
        if self.json {
            print_json(namespace.as_str(), status)?;
            return Ok(());
        }

        print_table(namespace.as_str(), status);
        Ok(())
    }
}

#[derive(Serialize)]
struct NamespaceStatusJson {
    namespace: String,
    status: String,
    detail: String,
    last_sync_age: String,
    #[serde(flatten)]
    inner: NamespaceStatus,
}

#[derive(Tabled)]
struct ObjectTableRow {
    #[tabled(rename = "type")]
    type_tag: String,
    #[tabled(rename = "objects")]
    objects: usize,
}

fn print_json(namespace: &str, status: NamespaceStatus) -> Result<()> {
    let payload = NamespaceStatusJson {
        namespace: namespace.to_owned(),
        status: signal_key(&status.signal).to_string(),
        detail: signal_detail(&status),
        last_sync_age: last_sync_age(&status),
        inner: status,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(namespace: &str, status: NamespaceStatus) {
    println!(
        "Tally v{} | {} | {} {} | {} indexed | last sync {}",
        env!("CARGO_PKG_VERSION"),
        namespace.bold(),
        signal_indicator(&status.signal),
        signal_label(&status.signal),
        status.index_len,
        last_sync_age(&status),
    );
    println!("{}", signal_detail(&status));
    if !status.has_config {
        println!(
            "{} no config.json; run 'tally config {namespace} --set key=value'",
            "!".yellow().bold()
        );
    }

    let mut rows: Vec<ObjectTableRow> = status
        .objects_by_type
        .iter()
        .map(|(type_tag, objects)| ObjectTableRow {
            type_tag: type_tag.clone(),
            objects: *objects,
        })
        .collect();
    if status.untyped_objects > 0 {
        rows.push(ObjectTableRow {
            type_tag: "(untyped)".to_string(),
            objects: status.untyped_objects,
        });
    }
    if rows.is_empty() {
        println!("No stored objects.");
        return;
    }

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if !matches!(status.signal, NamespaceSignal::Current) {
        println!("Run 'tally sync {namespace}' to reconcile.");
    }
}

fn last_sync_age(status: &NamespaceStatus) -> String {
    match status.synced_at {
        Some(at) => format_datetime_age(at),
        None => "never".to_string(),
    }
}

fn signal_key(signal: &NamespaceSignal) -> &'static str {
    match signal {
        NamespaceSignal::NeverSynced => "never_synced",
        NamespaceSignal::Current => "current",
        NamespaceSignal::Drifted { .. } => "drifted",
    }
}

fn signal_label(signal: &NamespaceSignal) -> &'static str {
    match signal {
        NamespaceSignal::NeverSynced => "NEVER SYNCED",
        NamespaceSignal::Current => "CURRENT",
        NamespaceSignal::Drifted { .. } => "DRIFTED",
    }
}

fn signal_indicator(signal: &NamespaceSignal) -> String {
    match signal {
        NamespaceSignal::NeverSynced => "■".bright_black().bold().to_string(),
        NamespaceSignal::Current => "■".green().bold().to_string(),
        NamespaceSignal::Drifted { .. } => "■".red().bold().to_string(),
    }
}

fn signal_detail(status: &NamespaceStatus) -> String {
    match &status.signal {
        NamespaceSignal::NeverSynced => "no checksum index yet".to_string(),
        NamespaceSignal::Current => "index matches stored objects".to_string(),
        NamespaceSignal::Drifted { untracked, missing } => {
            let mut parts = Vec::new();
            if !untracked.is_empty() {
                parts.push(format!("{} untracked", summarize(untracked)));
            }
            if !missing.is_empty() {
                let missing: Vec<String> = missing.iter().map(|id| id.to_string()).collect();
                parts.push(format!("{} missing", summarize(&missing)));
            }
            parts.join("; ")
        }
    }
}

fn summarize(keys: &[String]) -> String {
    let mut names: Vec<String> = keys.iter().take(2).cloned().collect();
    if keys.len() > names.len() {
        names.push(format!("+{} more", keys.len() - names.len()));
    }
    names.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_lists_are_abbreviated() {
        let keys: Vec<String> = ["a", "b", "c", "d"].iter().map(|k| k.to_string()).collect();
        assert_eq!(summarize(&keys), "a, b, +2 more");
        assert_eq!(summarize(&keys[..1]), "a");
    }
}
