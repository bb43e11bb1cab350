//! Tally: checksum-gated inventory sync CLI.
//!
//! # Usage
//!
//! ```text
//! tally [--root DIR] sync <namespace> [--source gcp|json-file] [--dry-run] [--json]
//! tally [--root DIR] host <namespace> --data <json> [--dry-run]
//! tally [--root DIR] config <namespace> [--set key=value]... [--unset key]...
//! tally [--root DIR] status <namespace> [--json]
//! tally daemon start [--source ...] | stop | status | trigger <data> [--attr k=v]...
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigArgs, daemon::DaemonCommand, host::HostArgs, status::StatusArgs,
    sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "tally",
    version,
    about = "Mirror inventory sources into namespaced object stores",
    long_about = None,
)]
struct Cli {
    /// Directory holding one sub-directory per namespace
    /// (default: ~/.tally/namespaces).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one snapshot cycle for a namespace.
    Sync(SyncArgs),

    /// Record a single scanned host without pruning the namespace.
    Host(HostArgs),

    /// Show or edit a namespace's source configuration.
    Config(ConfigArgs),

    /// Show how a namespace's checksum index lines up with its objects.
    Status(StatusArgs),

    /// Run or talk to the background cycle runner.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Sync(args) => {
            commands::init_logging();
            args.run(cli.root)
        }
        Commands::Host(args) => {
            commands::init_logging();
            args.run(cli.root)
        }
        Commands::Config(args) => args.run(cli.root),
        Commands::Status(args) => args.run(cli.root),
        Commands::Daemon { command } => commands::daemon::run(command, cli.root),
    }
}
