//! Diff classifier for one directory level.
//!
//! Trees are compared a level at a time rather than as one flattened list:
//! when a name is a directory on one side and a file on the other, nothing
//! below it is comparable, and only a level-wise comparison avoids visiting
//! children that exist on one side only.
//!
//! Symlinks are compared by target only and never followed.
//!
//! File comparison policy ([`CompareMode::Shallow`]) is size, then mtime;
//! content is never read. Equal size and mtime with different content is
//! classified `identical` (a known false negative). Filesystems with coarse
//! mtime resolution can report a copied file as `differing` on every pass.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use mirror_core::{CompareMode, DirectoryEntry, EntryKind};

/// A name present on both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matched {
    pub source: DirectoryEntry,
    pub replica: DirectoryEntry,
}

impl Matched {
    pub fn is_dir(&self) -> bool {
        self.source.is_dir() && self.replica.is_dir()
    }
}

/// Five disjoint sets covering every name of one level on either side.
///
/// Every set is sorted by name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Classification {
    /// In source only.
    pub only_source: Vec<DirectoryEntry>,
    /// In replica only.
    pub only_replica: Vec<DirectoryEntry>,
    /// Files or symlinks on both sides whose comparison failed.
    pub differing: Vec<Matched>,
    /// Same kind on both sides and, for files, equal comparison.
    pub identical: Vec<Matched>,
    /// Different kinds on the two sides (file, directory or symlink).
    pub type_conflict: Vec<Matched>,
}

impl Classification {
    /// `true` when nothing at this level needs a replica change.
    pub fn is_clean(&self) -> bool {
        self.only_source.is_empty()
            && self.only_replica.is_empty()
            && self.differing.is_empty()
            && self.type_conflict.is_empty()
    }

    /// Total number of distinct names across both sides.
    pub fn len(&self) -> usize {
        self.only_source.len()
            + self.only_replica.len()
            + self.differing.len()
            + self.identical.len()
            + self.type_conflict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition one level's `source` and `replica` entries.
///
/// `same_file` decides whether two leaves present on both sides are equal;
/// it is only called for File/File and Symlink/Symlink pairs.
pub fn classify<F>(
    source: Vec<DirectoryEntry>,
    replica: Vec<DirectoryEntry>,
    mut same_file: F,
) -> Classification
where
    F: FnMut(&DirectoryEntry, &DirectoryEntry) -> bool,
{
    let mut remaining: BTreeMap<OsString, DirectoryEntry> = replica
        .into_iter()
        .map(|e| (e.name().to_os_string(), e))
        .collect();

    let mut out = Classification::default();
    for src in source {
        let Some(rep) = remaining.remove(src.name()) else {
            out.only_source.push(src);
            continue;
        };
        let pair = Matched {
            source: src,
            replica: rep,
        };
        match (pair.source.kind, pair.replica.kind) {
            (EntryKind::Directory, EntryKind::Directory) => out.identical.push(pair),
            (EntryKind::File, EntryKind::File) | (EntryKind::Symlink, EntryKind::Symlink) => {
                if same_file(&pair.source, &pair.replica) {
                    out.identical.push(pair);
                } else {
                    out.differing.push(pair);
                }
            }
            _ => out.type_conflict.push(pair),
        }
    }
    out.only_replica = remaining.into_values().collect();

    out.only_source.sort_by(|a, b| a.path.cmp(&b.path));
    for set in [&mut out.differing, &mut out.identical, &mut out.type_conflict] {
        set.sort_by(|a, b| a.source.path.cmp(&b.source.path));
    }
    out
}

/// File equality under a [`CompareMode`], resolving contents against the two
/// tree roots when the mode needs them.
#[derive(Debug, Clone, Copy)]
pub struct FileComparator<'a> {
    pub mode: CompareMode,
    pub source_root: &'a Path,
    pub replica_root: &'a Path,
}

impl<'a> FileComparator<'a> {
    pub fn new(mode: CompareMode, source_root: &'a Path, replica_root: &'a Path) -> Self {
        Self {
            mode,
            source_root,
            replica_root,
        }
    }

    pub fn same(&self, source: &DirectoryEntry, replica: &DirectoryEntry) -> bool {
        if source.is_symlink() || replica.is_symlink() {
            return source.kind == replica.kind && source.link_target == replica.link_target;
        }
        match self.mode {
            CompareMode::Shallow => source.signature == replica.signature,
            CompareMode::Checksum => {
                if source.signature.size != replica.signature.size {
                    return false;
                }
                let src = source.path.under(self.source_root);
                let rep = replica.path.under(self.replica_root);
                match (file_digest(&src), file_digest(&rep)) {
                    (Ok(a), Ok(b)) => a == b,
                    (Err(err), _) | (_, Err(err)) => {
                        // Unreadable content counts as different so the copy is retried.
                        tracing::debug!(path = %source.path, error = %err, "checksum failed");
                        false
                    }
                }
            }
        }
    }
}

/// Hex SHA-256 of a file's content.
pub fn file_digest(path: &Path) -> std::io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
