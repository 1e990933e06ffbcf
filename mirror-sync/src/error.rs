//! Error types for mirror-sync.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// All errors that can arise while walking or reconciling two trees.
///
/// Only [`SyncError::NotFound`] and [`SyncError::NotADirectory`] abort a pass;
/// the others are recorded per item and the pass continues with siblings.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A tree root does not exist.
    #[error("root not found: {path}")]
    NotFound { path: PathBuf },

    /// A tree root exists but is not a directory.
    #[error("root is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// A directory or entry could not be read; its subtree was skipped.
    #[error("cannot read {path}: {source}")]
    Access {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Copying or removing a single replica item failed.
    #[error("failed to reconcile {path}: {source}")]
    Reconcile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// The filesystem path the error is about.
    pub fn path(&self) -> &Path {
        match self {
            SyncError::NotFound { path }
            | SyncError::NotADirectory { path }
            | SyncError::Access { path, .. }
            | SyncError::Reconcile { path, .. }
            | SyncError::Io { path, .. } => path,
        }
    }

    /// `true` for errors that end the pass instead of skipping one item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::NotFound { .. } | SyncError::NotADirectory { .. }
        )
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`SyncError::Access`].
pub(crate) fn access_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Access {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`SyncError::Reconcile`].
pub(crate) fn reconcile_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Reconcile {
        path: path.into(),
        source,
    }
}
