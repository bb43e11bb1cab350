//! `tally sync`: one snapshot cycle for a namespace.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use tally_sources::SourceKind;
use tally_sync::{Trigger, TriggerMessage};

use super::{print_report, resolve_root};

/// Arguments for `tally sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Namespace to sync (`source-<name>`).
    pub namespace: String,

    /// Inventory source to query.
    #[arg(long, default_value_t = SourceKind::Gcp)]
    pub source: SourceKind,

    /// Show what would be written or deleted without touching the store.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the full cycle report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self, root: Option<PathBuf>) -> Result<()> {
        let root = resolve_root(root)?;
        let trigger = Trigger::parse(&TriggerMessage::snapshot(&self.namespace))
            .with_context(|| format!("invalid namespace '{}'", self.namespace))?;

        let source = self.source.build();
        let result = tally_sync::run(&root, &trigger, source.as_ref(), self.dry_run)
            .with_context(|| format!("sync failed for '{}'", self.namespace))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&result).context("failed to serialize cycle report")?
            );
        } else {
            print_report(result.namespace.as_str(), &result.report);
        }
        Ok(())
    }
}
