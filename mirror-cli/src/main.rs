//! Mirror: one-way periodic directory synchronization.
//!
//! # Usage
//!
//! ```text
//! mirror sync <source> <replica> [--checksum] [--dry-run] [--json]
//! mirror diff <source> <replica> [--checksum]
//! mirror run [<source> <replica>] [--interval N] [--unit seconds|minutes|hours]
//!            [--log-file PATH] [--log-format text|json] [--config FILE]
//!            [--checksum] [--dry-run] [--max-passes N] [--quiet]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{diff::DiffArgs, run::RunArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "mirror",
    version,
    about = "Keep a replica directory identical to a source directory",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single sync pass and report what changed.
    Sync(SyncArgs),

    /// Show what a sync pass would change, without touching the replica.
    Diff(DiffArgs),

    /// Sync on a fixed interval until interrupted.
    Run(RunArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Run(args) => args.run(),
    }
}
