//! `mirror sync`: one pass from source to replica.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use mirror_core::{CompareMode, MirrorConfig};
use mirror_daemon::{logging, run_pass, LogOptions};
use mirror_sync::{CancelFlag, SyncPassResult};

/// Arguments for `mirror sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Directory to copy from. Never modified.
    pub source: PathBuf,

    /// Directory to make identical to the source. Created if missing.
    pub replica: PathBuf,

    /// Compare file contents (SHA-256) instead of size and mtime.
    #[arg(long)]
    pub checksum: bool,

    /// Report what would change without touching the replica.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the pass summary as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let mut config = MirrorConfig::new(self.source, self.replica);
        if self.checksum {
            config.compare = CompareMode::Checksum;
        }
        config.dry_run = self.dry_run;
        config.validate().context("invalid sync job")?;

        logging::init(&LogOptions::default())?;

        let result = run_pass(&config, CancelFlag::new()).with_context(|| {
            format!(
                "sync failed for '{}' -> '{}'",
                config.source.display(),
                config.replica.display()
            )
        })?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&result.summary())?);
        } else {
            print_result(&result);
        }

        if !result.is_success() {
            bail!("{} item(s) could not be synced", result.errors.len());
        }
        Ok(())
    }
}

fn print_result(result: &SyncPassResult) {
    let prefix = if result.dry_run { "[dry-run] " } else { "" };
    let mark = if result.is_success() {
        "✓".green()
    } else {
        "✗".red()
    };

    if result.mutation_count() == 0 && result.is_success() {
        println!("{prefix}{mark} replica up to date, nothing to do");
    } else {
        println!(
            "{prefix}{mark} synced ({} created, {} updated, {} deleted) in {} ms",
            result.created,
            result.updated,
            result.deleted,
            result.duration.as_millis()
        );
    }
    if result.cancelled {
        println!("{prefix}pass cancelled before completion");
    }
    for err in &result.errors {
        eprintln!("  {} {err}", "✗".red());
    }
}
