//! YAML job configuration.
//!
//! ```yaml
//! source: /srv/data
//! replica: /mnt/backup/data
//! interval:
//!   value: 10
//!   unit: seconds
//! log_file: /var/log/mirror.log
//! compare: shallow
//! ```
//!
//! Only `source` and `replica` are required. Command-line flags override
//! whatever the file sets.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{CompareMode, Interval};

/// One mirror job: which tree to copy where, and how often.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub source: PathBuf,
    pub replica: PathBuf,
    #[serde(default)]
    pub interval: Interval,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub compare: CompareMode,
    #[serde(default)]
    pub dry_run: bool,
    /// Stop the scheduler after this many passes; `None` runs until shutdown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_passes: Option<u64>,
}

impl MirrorConfig {
    pub fn new(source: impl Into<PathBuf>, replica: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            replica: replica.into(),
            interval: Interval::default(),
            log_file: None,
            compare: CompareMode::default(),
            dry_run: false,
            max_passes: None,
        }
    }

    /// Reject jobs that can never converge.
    ///
    /// Root existence is not checked here: a missing root is a per-pass
    /// failure, so a scheduler keeps retrying until it appears.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.value == 0 {
            return Err(ConfigError::Invalid("interval must be at least 1".into()));
        }
        if self.max_passes == Some(0) {
            return Err(ConfigError::Invalid("max_passes must be at least 1".into()));
        }

        let source = resolve(&self.source);
        let replica = resolve(&self.replica);
        if source == replica {
            return Err(ConfigError::Invalid(format!(
                "source and replica are the same directory: {}",
                source.display()
            )));
        }
        if replica.starts_with(&source) || source.starts_with(&replica) {
            return Err(ConfigError::Invalid(format!(
                "source {} and replica {} must not be nested",
                source.display(),
                replica.display()
            )));
        }
        Ok(())
    }
}

/// Absolute form of `path` with its longest existing prefix canonicalized,
/// so relative and symlinked spellings of the same location compare equal
/// even when the tail does not exist yet.
fn resolve(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = std::fs::canonicalize(existing) {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc, segment| acc.join(segment));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

/// Load a job config from `path`.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(path: &Path) -> Result<MirrorConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Atomically save a job config to `path`.
///
/// Write flow: serialize → `<name>.tmp` sibling → `rename`.
pub fn save_at(path: &Path, config: &MirrorConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mirror.yaml".to_string());
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
