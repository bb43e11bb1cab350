//! `tally daemon`: background cycle runner lifecycle and triggers.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use tally_daemon::paths::socket_path;
use tally_daemon::{
    request_status, request_stop, request_trigger, start_blocking, DaemonConfig, DaemonError,
};
use tally_sources::SourceKind;
use tally_sync::TriggerMessage;

use super::{home_dir, parse_key_value};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (cycle queue + socket server).
    Start(DaemonStartArgs),
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Query daemon runtime status over the Unix socket.
    Status,
    /// Send one trigger message and wait for the cycle summary.
    Trigger(DaemonTriggerArgs),
}

#[derive(Args, Debug)]
pub struct DaemonStartArgs {
    /// Inventory source answering snapshot triggers.
    #[arg(long, default_value_t = SourceKind::Gcp)]
    pub source: SourceKind,
}

#[derive(Args, Debug)]
pub struct DaemonTriggerArgs {
    /// Message data: a namespace name, or a host document with `--attr deviceId=...`.
    pub data: String,

    /// Message attribute (repeatable).
    #[arg(long = "attr", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub attributes: Vec<(String, String)>,
}

pub fn run(command: DaemonCommand, root: Option<PathBuf>) -> Result<()> {
    let home = home_dir()?;
    let socket = socket_path(&home);

    match command {
        DaemonCommand::Start(args) => {
            let mut config = DaemonConfig::for_home(&home, args.source);
            if let Some(root) = root {
                config.root = root;
            }
            start_blocking(config).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&socket) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(&socket) {
            Ok(status) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket.display().to_string(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
        DaemonCommand::Trigger(args) => {
            let message = TriggerMessage {
                data: args.data,
                attributes: args.attributes.into_iter().collect(),
            };
            let summary = request_trigger(&socket, message).context("trigger failed")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&summary)
                    .context("failed to render cycle summary JSON")?
            );
        }
    }

    Ok(())
}
