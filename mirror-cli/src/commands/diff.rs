//! `mirror diff`: list the changes a sync pass would make.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use mirror_core::{CompareMode, EntryKind, MirrorConfig};
use mirror_sync::{run_once, Action, CancelFlag, PassOptions, SyncEvent};

/// Arguments for `mirror diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    pub source: PathBuf,

    pub replica: PathBuf,

    /// Compare file contents (SHA-256) instead of size and mtime.
    #[arg(long)]
    pub checksum: bool,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let config = MirrorConfig::new(&self.source, &self.replica);
        config.validate().context("invalid sync job")?;

        let options = PassOptions {
            compare: if self.checksum {
                CompareMode::Checksum
            } else {
                CompareMode::Shallow
            },
            dry_run: true,
            cancel: CancelFlag::new(),
        };
        let mut events: Vec<SyncEvent> = Vec::new();
        let result = run_once(&self.source, &self.replica, &options, &mut events)
            .with_context(|| format!("diff failed for '{}'", self.source.display()))?;

        if events.is_empty() {
            println!("No differences.");
            return Ok(());
        }

        for event in &events {
            let shown = match event.kind {
                Some(EntryKind::Directory) => format!("{}/", event.path),
                _ => event.path.to_string(),
            };
            match event.action {
                Action::Created => println!("{} {shown}", "+".green()),
                Action::Updated => println!("{} {shown}", "~".yellow()),
                Action::Deleted => println!("{} {shown}", "-".red()),
                Action::Failed => eprintln!("{} {shown}: {}", "!".red(), event.message),
            }
        }

        if !result.is_success() {
            bail!("{} item(s) could not be compared", result.errors.len());
        }
        Ok(())
    }
}
