//! Tree walker.
//!
//! Two views over the same tree:
//! - [`read_level`] lists the direct children of one directory; the
//!   reconciler uses it to compare trees one level at a time.
//! - [`walk`] / [`walk_from`] lazily yield every descendant, parents before
//!   children; used to copy whole subtrees and to snapshot a tree.
//!
//! Symlinks are listed as leaf entries carrying their target but never
//! followed, so walks cannot cycle. Sockets, FIFOs and device nodes are
//! skipped. An unreadable
//! directory produces a [`SyncError::Access`] and its subtree is skipped;
//! the rest of the walk continues.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use mirror_core::{DirectoryEntry, EntryKind, RelPath, Signature};

use crate::error::{access_err, io_err, SyncError};

// ---------------------------------------------------------------------------
// Single level
// ---------------------------------------------------------------------------

/// Direct children of one directory, sorted by name.
#[derive(Debug, Default)]
pub struct Listing {
    pub entries: Vec<DirectoryEntry>,
    /// Children that vanished or could not be stat'ed while listing.
    pub skipped: Vec<SyncError>,
}

/// List the direct children of `root/rel`.
///
/// Fails with [`SyncError::NotFound`] when `rel` is the root and it does not
/// exist, and with [`SyncError::Access`] when the directory cannot be read.
pub fn read_level(root: &Path, rel: &RelPath) -> Result<Listing, SyncError> {
    let dir = rel.under(root);
    let read = match fs::read_dir(&dir) {
        Ok(read) => read,
        Err(err) if err.kind() == ErrorKind::NotFound && rel.is_root() => {
            return Err(SyncError::NotFound { path: dir });
        }
        Err(err) => return Err(access_err(dir, err)),
    };

    let mut listing = Listing::default();
    for entry in read {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                listing.skipped.push(access_err(&dir, err));
                continue;
            }
        };
        let path = entry.path();
        // DirEntry::file_type / metadata do not traverse symlinks.
        let file_type = match entry.file_type() {
            Ok(ty) => ty,
            Err(err) => {
                listing.skipped.push(access_err(&path, err));
                continue;
            }
        };
        let Some(kind) = entry_kind(&file_type, &path) else {
            continue;
        };
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "entry vanished while listing");
                continue;
            }
            Err(err) => {
                listing.skipped.push(access_err(&path, err));
                continue;
            }
        };
        match leaf_entry(rel.join(entry.file_name()), kind, &meta, &path) {
            Ok(found) => listing.entries.push(found),
            Err(err) => listing.skipped.push(access_err(&path, err)),
        }
    }
    listing.entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(listing)
}

/// Build an entry from metadata obtained without following links.
fn leaf_entry(
    rel: RelPath,
    kind: EntryKind,
    meta: &fs::Metadata,
    path: &Path,
) -> std::io::Result<DirectoryEntry> {
    let signature = Signature::from_metadata(meta);
    match kind {
        EntryKind::Symlink => Ok(DirectoryEntry::symlink(rel, signature, fs::read_link(path)?)),
        _ => Ok(DirectoryEntry::new(rel, kind, signature)),
    }
}

fn entry_kind(file_type: &fs::FileType, path: &Path) -> Option<EntryKind> {
    if file_type.is_dir() {
        Some(EntryKind::Directory)
    } else if file_type.is_file() {
        Some(EntryKind::File)
    } else if file_type.is_symlink() {
        Some(EntryKind::Symlink)
    } else {
        tracing::debug!(path = %path.display(), "skipping special file");
        None
    }
}

// ---------------------------------------------------------------------------
// Recursive walk
// ---------------------------------------------------------------------------

/// Lazy depth-first walk; see [`walk_from`].
pub struct Walk {
    root: PathBuf,
    base: RelPath,
    inner: walkdir::IntoIter,
}

/// Walk every descendant of `root`.
pub fn walk(root: &Path) -> Walk {
    walk_from(root, &RelPath::root())
}

/// Walk every descendant of `root/start`, yielding paths relative to `root`.
///
/// Entries are sorted by name within each directory and a directory is
/// always yielded before its children. `start` itself is not yielded.
pub fn walk_from(root: &Path, start: &RelPath) -> Walk {
    let inner = walkdir::WalkDir::new(start.under(root))
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter();
    Walk {
        root: root.to_path_buf(),
        base: start.clone(),
        inner,
    }
}

impl Walk {
    fn relative(&self, path: &Path) -> RelPath {
        let start = self.base.under(&self.root);
        let tail = path.strip_prefix(&start).unwrap_or(path);
        tail.iter().fold(self.base.clone(), |acc, seg| acc.join(seg))
    }
}

impl Iterator for Walk {
    type Item = Result<DirectoryEntry, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(walk_error(err))),
            };
            let Some(kind) = entry_kind(&entry.file_type(), entry.path()) else {
                continue;
            };
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(err) => return Some(Err(walk_error(err))),
            };
            let rel = self.relative(entry.path());
            return Some(
                leaf_entry(rel, kind, &meta, entry.path())
                    .map_err(|err| access_err(entry.path(), err)),
            );
        }
    }
}

fn walk_error(err: walkdir::Error) -> SyncError {
    let depth = err.depth();
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
    if depth == 0 && source.kind() == ErrorKind::NotFound {
        SyncError::NotFound { path }
    } else {
        access_err(path, source)
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Every entry of a tree keyed by relative path, plus what could not be read.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub entries: BTreeMap<RelPath, DirectoryEntry>,
    pub errors: Vec<SyncError>,
}

impl Snapshot {
    pub fn get(&self, path: &str) -> Option<&DirectoryEntry> {
        self.entries.get(&RelPath::from(path))
    }

    pub fn paths(&self) -> Vec<String> {
        self.entries.keys().map(ToString::to_string).collect()
    }
}

/// Walk `root` completely.
pub fn snapshot(root: &Path) -> Result<Snapshot, SyncError> {
    match fs::metadata(root) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(SyncError::NotADirectory {
                path: root.to_path_buf(),
            })
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(SyncError::NotFound {
                path: root.to_path_buf(),
            })
        }
        Err(err) => return Err(io_err(root, err)),
    }

    let mut snap = Snapshot::default();
    for item in walk(root) {
        match item {
            Ok(entry) => {
                snap.entries.insert(entry.path.clone(), entry);
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => snap.errors.push(err),
        }
    }
    Ok(snap)
}
