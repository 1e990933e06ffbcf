//! `mirror run`: periodic sync until ctrl-c.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use mirror_core::{config, CompareMode, IntervalUnit, MirrorConfig};
use mirror_daemon::{start_blocking, LogFormat, LogOptions};

/// Arguments for `mirror run`. Flags override values from `--config`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Directory to copy from (optional with `--config`).
    #[arg(requires = "replica")]
    pub source: Option<PathBuf>,

    /// Directory to keep identical to the source.
    pub replica: Option<PathBuf>,

    /// YAML job file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Time between pass starts, in `--unit`s (default 10 seconds).
    #[arg(long, value_name = "N")]
    pub interval: Option<u64>,

    /// Unit of `--interval`: seconds, minutes or hours.
    #[arg(long)]
    pub unit: Option<IntervalUnit>,

    /// Also append log lines to this file.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Line format of the log file: text or json.
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,

    /// Compare file contents (SHA-256) instead of size and mtime.
    #[arg(long)]
    pub checksum: bool,

    /// Report what would change without touching the replica.
    #[arg(long)]
    pub dry_run: bool,

    /// Stop after this many passes.
    #[arg(long, value_name = "N")]
    pub max_passes: Option<u64>,

    /// Do not log to the terminal.
    #[arg(long)]
    pub quiet: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let log_format = self.log_format;
        let quiet = self.quiet;
        let config = self.into_config()?;
        config.validate().context("invalid sync job")?;

        let log = LogOptions {
            file: config.log_file.clone(),
            quiet,
            format: log_format,
        };
        let report = start_blocking(config, log).context("scheduler failed")?;

        let mark = if report.failed_passes == 0 {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "{mark} stopped after {} pass(es), {} failed",
            report.passes, report.failed_passes
        );
        Ok(())
    }

    fn into_config(self) -> Result<MirrorConfig> {
        let mut job = match (&self.config, &self.source, &self.replica) {
            (Some(path), _, _) => config::load_at(path)
                .with_context(|| format!("failed to load job file '{}'", path.display()))?,
            (None, Some(source), Some(replica)) => MirrorConfig::new(source, replica),
            _ => bail!("provide <SOURCE> <REPLICA> or --config FILE"),
        };

        if let Some(source) = self.source {
            job.source = source;
        }
        if let Some(replica) = self.replica {
            job.replica = replica;
        }
        if let Some(value) = self.interval {
            job.interval.value = value;
        }
        if let Some(unit) = self.unit {
            job.interval.unit = unit;
        }
        if self.log_file.is_some() {
            job.log_file = self.log_file;
        }
        if self.checksum {
            job.compare = CompareMode::Checksum;
        }
        if self.dry_run {
            job.dry_run = true;
        }
        if self.max_passes.is_some() {
            job.max_passes = self.max_passes;
        }
        Ok(job)
    }
}
