//! `tally host`: record one scanned host.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::{open_namespace, print_report, resolve_root};

/// Arguments for `tally host`.
#[derive(Args, Debug)]
pub struct HostArgs {
    /// Namespace the host belongs to (`source-<name>`).
    pub namespace: String,

    /// Host document, a JSON object with at least a `name`.
    #[arg(long)]
    pub data: String,

    /// Show what would be written without touching the store.
    #[arg(long)]
    pub dry_run: bool,
}

impl HostArgs {
    pub fn run(self, root: Option<PathBuf>) -> Result<()> {
        let root = resolve_root(root)?;
        let (namespace, store) = open_namespace(&root, &self.namespace)?;

        let report = tally_sync::sync_host(&store, self.data.as_bytes(), self.dry_run)
            .with_context(|| format!("host cycle failed for '{namespace}'"))?;
        print_report(namespace.as_str(), &report);
        Ok(())
    }
}
