//! Sync driver: one full pass, shared by the CLI and the scheduler.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use mirror_core::CompareMode;

use crate::cancel::CancelFlag;
use crate::error::{io_err, SyncError};
use crate::event::EventSink;
use crate::reconcile::Reconciler;

/// Knobs for a single pass.
#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    pub compare: CompareMode,
    /// Report what would change without touching the replica.
    pub dry_run: bool,
    pub cancel: CancelFlag,
}

/// Outcome of one [`run_once`] call.
#[derive(Debug)]
pub struct SyncPassResult {
    pub started_at: DateTime<Utc>,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Per-item failures; the pass continued past each of them.
    pub errors: Vec<SyncError>,
    pub duration: Duration,
    /// The pass stopped early on a cancellation request.
    pub cancelled: bool,
    pub dry_run: bool,
}

impl SyncPassResult {
    pub fn mutation_count(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    /// `true` when no item failed. A cancelled pass can still be successful.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn summary(&self) -> PassSummary {
        PassSummary {
            started_at: self.started_at,
            created: self.created,
            updated: self.updated,
            deleted: self.deleted,
            errors: self.errors.iter().map(ToString::to_string).collect(),
            duration_ms: self.duration.as_millis(),
            cancelled: self.cancelled,
            dry_run: self.dry_run,
        }
    }
}

/// Serializable view of a [`SyncPassResult`].
#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub started_at: DateTime<Utc>,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub errors: Vec<String>,
    pub duration_ms: u128,
    pub cancelled: bool,
    pub dry_run: bool,
}

/// Run one pass: make `replica` mirror `source`.
///
/// Both roots must exist and be directories; otherwise the call fails with
/// [`SyncError::NotFound`] / [`SyncError::NotADirectory`] and nothing is
/// touched. Every other failure is recorded in the result and the pass
/// carries on. Keeps no state between calls: running it twice with no
/// changes in between yields zero mutations the second time.
pub fn run_once(
    source: &Path,
    replica: &Path,
    options: &PassOptions,
    sink: &mut dyn EventSink,
) -> Result<SyncPassResult, SyncError> {
    let started_at = Utc::now();
    let started = Instant::now();

    check_root(source)?;
    check_root(replica)?;

    let tally = Reconciler::new(source, replica, options, sink).run()?;

    let result = SyncPassResult {
        started_at,
        created: tally.created,
        updated: tally.updated,
        deleted: tally.deleted,
        errors: tally.errors,
        duration: started.elapsed(),
        cancelled: tally.cancelled,
        dry_run: options.dry_run,
    };
    tracing::debug!(
        source = %source.display(),
        replica = %replica.display(),
        mutations = result.mutation_count(),
        errors = result.errors.len(),
        "pass finished",
    );
    Ok(result)
}

/// Create the replica root if it is missing.
///
/// Returns `true` when the directory was created. The core itself never
/// creates roots; callers opt in with this.
pub fn prepare_replica(replica: &Path) -> Result<bool, SyncError> {
    match fs::metadata(replica) {
        Ok(meta) if meta.is_dir() => Ok(false),
        Ok(_) => Err(SyncError::NotADirectory {
            path: replica.to_path_buf(),
        }),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            fs::create_dir_all(replica).map_err(|e| io_err(replica, e))?;
            tracing::info!(path = %replica.display(), "created replica root");
            Ok(true)
        }
        Err(err) => Err(io_err(replica, err)),
    }
}

fn check_root(root: &Path) -> Result<(), SyncError> {
    match fs::metadata(root) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(SyncError::NotADirectory {
            path: root.to_path_buf(),
        }),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(SyncError::NotFound {
            path: root.to_path_buf(),
        }),
        Err(err) => Err(SyncError::Access {
            path: root.to_path_buf(),
            source: err,
        }),
    }
}
