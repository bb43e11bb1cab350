//! `tally config`: show or edit a namespace's `config.json`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use tally_core::SourceConfig;
use tally_sync::SyncError;

use super::{open_namespace, parse_key_value, resolve_root};

/// Arguments for `tally config`.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Namespace to configure (`source-<name>`).
    pub namespace: String,

    /// Set a configuration key (repeatable).
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub set: Vec<(String, String)>,

    /// Remove a configuration key (repeatable).
    #[arg(long = "unset", value_name = "KEY")]
    pub unset: Vec<String>,
}

impl ConfigArgs {
    pub fn run(self, root: Option<PathBuf>) -> Result<()> {
        let root = resolve_root(root)?;
        let (namespace, store) = open_namespace(&root, &self.namespace)?;

        let mut config = match tally_sync::load_config(&store) {
            Ok(config) => config,
            Err(SyncError::ConfigLoad(err)) if err.is_not_found() => SourceConfig::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read config for '{namespace}'"))
            }
        };

        let editing = !self.set.is_empty() || !self.unset.is_empty();
        for key in &self.unset {
            config.remove(key);
        }
        config.extend(self.set);

        if editing {
            tally_sync::save_config(&store, &config)
                .with_context(|| format!("failed to write config for '{namespace}'"))?;
        } else if config.is_empty() {
            println!("'{namespace}' has no configuration. Use --set key=value to add some.");
            return Ok(());
        }

        println!(
            "{}",
            serde_json::to_string_pretty(&config).context("failed to render config JSON")?
        );
        Ok(())
    }
}
