//! Reconciler: apply one level's [`Classification`](crate::classify::Classification) to the
//! replica, then recurse into directories present on both sides.
//!
//! Order within a level:
//! 1. `only_source` and `differing`, by name: copy / overwrite.
//! 2. `only_replica`: remove (recursively for directories).
//! 3. `type_conflict`: remove the replica side, then create the source side
//!    in the same pass.
//! 4. `identical` directories: recurse.
//!
//! A failed item is recorded and its siblings still run. Cancellation is
//! checked before every item; a single file copy or removal is never left
//! half-applied. Files are copied to a uniquely named temporary sibling and
//! renamed into place, so an interrupted copy never leaves a truncated
//! replica file. Symlinks are recreated with the source's target and never
//! written through; a replica link where the source has a directory is a
//! type conflict.

use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::Path;

use filetime::FileTime;

use mirror_core::{DirectoryEntry, EntryKind, RelPath};

use crate::cancel::CancelFlag;
use crate::classify::{classify, FileComparator, Matched};
use crate::error::{reconcile_err, SyncError};
use crate::event::{Action, EventSink, Severity, SyncEvent};
use crate::pipeline::PassOptions;
use crate::walker;

/// Name prefix of in-flight copies inside the replica.
pub const STAGING_PREFIX: &str = ".mirror-";

// ---------------------------------------------------------------------------
// Tally
// ---------------------------------------------------------------------------

/// Running counts for one pass.
#[derive(Debug, Default)]
pub struct Tally {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub errors: Vec<SyncError>,
    pub cancelled: bool,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Mutates `replica_root` towards `source_root`, one level at a time.
pub struct Reconciler<'a> {
    source_root: &'a Path,
    replica_root: &'a Path,
    comparator: FileComparator<'a>,
    dry_run: bool,
    cancel: CancelFlag,
    sink: &'a mut dyn EventSink,
    tally: Tally,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        source_root: &'a Path,
        replica_root: &'a Path,
        options: &PassOptions,
        sink: &'a mut dyn EventSink,
    ) -> Self {
        Self {
            source_root,
            replica_root,
            comparator: FileComparator::new(options.compare, source_root, replica_root),
            dry_run: options.dry_run,
            cancel: options.cancel.clone(),
            sink,
            tally: Tally::default(),
        }
    }

    /// Reconcile the whole tree below the roots.
    pub fn run(mut self) -> Result<Tally, SyncError> {
        // Root listing failures are fatal; anything deeper is per-item.
        let source = walker::read_level(self.source_root, &RelPath::root())?;
        let replica = walker::read_level(self.replica_root, &RelPath::root())?;
        self.reconcile_listings(source, replica);
        Ok(self.tally)
    }

    fn stop_requested(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            if !self.tally.cancelled {
                tracing::info!("pass cancelled; remaining items left for the next pass");
            }
            self.tally.cancelled = true;
        }
        self.tally.cancelled
    }

    /// Reconcile `rel`, a directory present on both sides.
    fn reconcile_dir(&mut self, rel: &RelPath) {
        let source = match walker::read_level(self.source_root, rel) {
            Ok(listing) => listing,
            Err(err) => return self.fail(err, rel, Some(EntryKind::Directory), Severity::Warn),
        };
        let replica = match walker::read_level(self.replica_root, rel) {
            Ok(listing) => listing,
            Err(err) => return self.fail(err, rel, Some(EntryKind::Directory), Severity::Warn),
        };
        self.reconcile_listings(source, replica);
    }

    fn reconcile_listings(&mut self, source: walker::Listing, replica: walker::Listing) {
        // A child that could not be stat'ed is left alone rather than treated
        // as missing, so a flaky source never causes a replica deletion.
        let unreadable: Vec<RelPath> = source
            .skipped
            .iter()
            .chain(replica.skipped.iter())
            .filter_map(|err| self.relative_of(err.path()))
            .collect();
        for err in source.skipped.into_iter().chain(replica.skipped) {
            let rel = self.relative_of(err.path()).unwrap_or_default();
            self.fail(err, &rel, None, Severity::Warn);
        }

        let comparator = self.comparator;
        let mut level = classify(source.entries, replica.entries, |s, r| comparator.same(s, r));
        if !unreadable.is_empty() {
            level.only_replica.retain(|e| !unreadable.contains(&e.path));
        }

        // 1. copy / overwrite, interleaved by name.
        let mut copies: Vec<(DirectoryEntry, bool)> = level
            .only_source
            .into_iter()
            .map(|e| (e, false))
            .chain(level.differing.into_iter().map(|m| (m.source, true)))
            .collect();
        copies.sort_by(|a, b| a.0.path.cmp(&b.0.path));
        for (entry, overwrite) in copies {
            if self.stop_requested() {
                return;
            }
            if overwrite {
                self.update(&entry);
            } else {
                self.create(&entry);
            }
        }

        // 2. remove replica-only entries.
        for entry in level.only_replica {
            if self.stop_requested() {
                return;
            }
            self.remove(&entry);
        }

        // 3. replace entries whose kind changed.
        for Matched { source, replica } in level.type_conflict {
            if self.stop_requested() {
                return;
            }
            if self.remove(&replica) {
                self.create(&source);
            }
        }

        // 4. descend.
        for pair in level.identical {
            if !pair.is_dir() {
                continue;
            }
            if self.stop_requested() {
                return;
            }
            self.reconcile_dir(&pair.source.path);
        }
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    fn create(&mut self, entry: &DirectoryEntry) {
        match entry.kind {
            EntryKind::File => {
                if self.copy_file(&entry.path) {
                    self.record(Action::Created, &entry.path, EntryKind::File);
                }
            }
            EntryKind::Directory => self.copy_tree(&entry.path),
            EntryKind::Symlink => {
                if self.place_link(entry, false) {
                    self.record(Action::Created, &entry.path, EntryKind::Symlink);
                }
            }
        }
    }

    fn update(&mut self, entry: &DirectoryEntry) {
        let done = match entry.kind {
            EntryKind::Symlink => self.place_link(entry, true),
            _ => self.copy_file(&entry.path),
        };
        if done {
            self.record(Action::Updated, &entry.path, entry.kind);
        }
    }

    /// Recreate the source directory `rel` and everything below it.
    fn copy_tree(&mut self, rel: &RelPath) {
        if !self.make_dir(rel) {
            return;
        }
        self.record(Action::Created, rel, EntryKind::Directory);

        let mut failed_dirs: Vec<RelPath> = Vec::new();
        for item in walker::walk_from(self.source_root, rel) {
            if self.stop_requested() {
                return;
            }
            let entry = match item {
                Ok(entry) => entry,
                Err(err) => {
                    let at = self.relative_of(err.path()).unwrap_or_else(|| rel.clone());
                    self.fail(err, &at, None, Severity::Warn);
                    continue;
                }
            };
            if failed_dirs
                .iter()
                .any(|dir| entry.path.as_path().starts_with(dir.as_path()))
            {
                continue;
            }
            match entry.kind {
                EntryKind::Directory => {
                    if self.make_dir(&entry.path) {
                        self.record(Action::Created, &entry.path, EntryKind::Directory);
                    } else {
                        failed_dirs.push(entry.path);
                    }
                }
                EntryKind::File => {
                    if self.copy_file(&entry.path) {
                        self.record(Action::Created, &entry.path, EntryKind::File);
                    }
                }
                EntryKind::Symlink => {
                    if self.place_link(&entry, false) {
                        self.record(Action::Created, &entry.path, EntryKind::Symlink);
                    }
                }
            }
        }
    }

    fn make_dir(&mut self, rel: &RelPath) -> bool {
        if self.dry_run {
            return true;
        }
        let target = rel.under(self.replica_root);
        match fs::create_dir(&target) {
            Ok(()) => true,
            // A link to a directory does not count: children would land outside the replica.
            Err(err) if err.kind() == ErrorKind::AlreadyExists && is_real_dir(&target) => true,
            Err(err) => {
                self.fail(
                    reconcile_err(target, err),
                    rel,
                    Some(EntryKind::Directory),
                    Severity::Error,
                );
                false
            }
        }
    }

    /// Copy content and mtime of source file `rel` over the replica path.
    fn copy_file(&mut self, rel: &RelPath) -> bool {
        if self.dry_run {
            return true;
        }
        let from = rel.under(self.source_root);
        let to = rel.under(self.replica_root);
        match copy_file_atomic(&from, &to) {
            Ok(()) => true,
            Err(err) => {
                self.fail(err, rel, Some(EntryKind::File), Severity::Error);
                false
            }
        }
    }

    /// Point replica path `entry.path` at the source link's target,
    /// replacing an existing link when `replace` is set.
    fn place_link(&mut self, entry: &DirectoryEntry, replace: bool) -> bool {
        if self.dry_run {
            return true;
        }
        let at = entry.path.under(self.replica_root);
        let target = entry.link_target.clone().unwrap_or_default();
        let placed = if replace {
            remove_link(&at).and_then(|()| make_symlink(&target, &at))
        } else {
            make_symlink(&target, &at)
        };
        match placed {
            Ok(()) => true,
            Err(err) => {
                self.fail(
                    reconcile_err(at, err),
                    &entry.path,
                    Some(EntryKind::Symlink),
                    Severity::Error,
                );
                false
            }
        }
    }

    /// Remove a replica entry; returns `true` when the path is gone.
    fn remove(&mut self, entry: &DirectoryEntry) -> bool {
        if !self.dry_run {
            let target = entry.path.under(self.replica_root);
            let result = match entry.kind {
                EntryKind::Directory => fs::remove_dir_all(&target),
                EntryKind::File | EntryKind::Symlink => fs::remove_file(&target),
            };
            match result {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    tracing::debug!(path = %entry.path, "already removed");
                    return true;
                }
                Err(err) => {
                    self.fail(
                        reconcile_err(target, err),
                        &entry.path,
                        Some(entry.kind),
                        Severity::Error,
                    );
                    return false;
                }
            }
        }
        self.record(Action::Deleted, &entry.path, entry.kind);
        true
    }

    // -----------------------------------------------------------------------
    // Bookkeeping
    // -----------------------------------------------------------------------

    fn record(&mut self, action: Action, rel: &RelPath, kind: EntryKind) {
        match action {
            Action::Created => self.tally.created += 1,
            Action::Updated => self.tally.updated += 1,
            Action::Deleted => self.tally.deleted += 1,
            Action::Failed => {}
        }
        self.sink
            .emit(SyncEvent::mutation(action, rel.clone(), kind, self.dry_run));
    }

    fn fail(&mut self, err: SyncError, rel: &RelPath, kind: Option<EntryKind>, severity: Severity) {
        self.sink.emit(SyncEvent::failure(
            severity,
            rel.clone(),
            kind,
            err.to_string(),
            self.dry_run,
        ));
        self.tally.errors.push(err);
    }

    /// Map an absolute path under either root back to a [`RelPath`].
    fn relative_of(&self, path: &Path) -> Option<RelPath> {
        let tail = path
            .strip_prefix(self.source_root)
            .or_else(|_| path.strip_prefix(self.replica_root))
            .ok()?;
        Some(tail.iter().fold(RelPath::root(), |acc, seg| acc.join(seg)))
    }
}

// ---------------------------------------------------------------------------
// File copy
// ---------------------------------------------------------------------------

fn is_real_dir(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_dir())
        .unwrap_or(false)
}

fn remove_link(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, at: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, at)
}

#[cfg(not(unix))]
fn make_symlink(_target: &Path, _at: &Path) -> io::Result<()> {
    Err(io::Error::new(
        ErrorKind::Unsupported,
        "symlinks are only mirrored on unix",
    ))
}

/// Copy `from` to `to` through a temporary sibling, carrying permissions and
/// timestamps over.
///
/// The parent of `to` must already be a directory; it is never created here,
/// so a copy cannot be routed through a link. On failure the temporary file
/// is removed and `to` is left as it was.
pub(crate) fn copy_file_atomic(from: &Path, to: &Path) -> Result<(), SyncError> {
    let parent = to.parent().ok_or_else(|| {
        reconcile_err(to, io::Error::new(ErrorKind::InvalidInput, "no parent directory"))
    })?;
    let meta = fs::metadata(from).map_err(|e| reconcile_err(from, e))?;
    let mut reader = File::open(from).map_err(|e| reconcile_err(from, e))?;

    let mut staged = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| reconcile_err(to, e))?;
    io::copy(&mut reader, staged.as_file_mut())
        .and_then(|_| staged.as_file().set_permissions(meta.permissions()))
        .and_then(|()| {
            filetime::set_file_times(
                staged.path(),
                FileTime::from_last_access_time(&meta),
                FileTime::from_last_modification_time(&meta),
            )
        })
        .map_err(|e| reconcile_err(to, e))?;

    staged.persist(to).map_err(|e| reconcile_err(to, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn copy_preserves_content_and_mtime() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let from = src.path().join("a.txt");
        fs::write(&from, b"payload").unwrap();
        let old = FileTime::from_unix_time(1_600_000_000, 123_000_000);
        filetime::set_file_mtime(&from, old).unwrap();

        let to = dst.path().join("a.txt");
        copy_file_atomic(&from, &to).unwrap();

        assert_eq!(fs::read(&to).unwrap(), b"payload");
        let copied = FileTime::from_last_modification_time(&fs::metadata(&to).unwrap());
        assert_eq!(copied, old);
        assert_eq!(names_in(dst.path()), ["a.txt"], "staging file must be renamed away");
    }

    #[test]
    fn copy_overwrites_existing_file() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let from = src.path().join("a.txt");
        let to = dst.path().join("a.txt");
        fs::write(&from, b"new content").unwrap();
        fs::write(&to, b"old").unwrap();

        copy_file_atomic(&from, &to).unwrap();
        assert_eq!(fs::read(&to).unwrap(), b"new content");
    }

    #[test]
    fn copy_never_touches_similarly_named_siblings() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("a"), b"real").unwrap();
        fs::write(dst.path().join(".a.mirror.tmp"), b"user data").unwrap();

        copy_file_atomic(&src.path().join("a"), &dst.path().join("a")).unwrap();

        assert_eq!(fs::read(dst.path().join(".a.mirror.tmp")).unwrap(), b"user data");
        assert_eq!(names_in(dst.path()), [".a.mirror.tmp", "a"]);
    }

    #[test]
    fn copy_into_missing_parent_fails_without_creating_it() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("a.txt"), b"x").unwrap();

        let to = dst.path().join("missing").join("a.txt");
        let err = copy_file_atomic(&src.path().join("a.txt"), &to).unwrap_err();
        assert!(matches!(err, SyncError::Reconcile { .. }), "got: {err}");
        assert!(!dst.path().join("missing").exists());
    }

    #[test]
    fn failed_copy_leaves_target_and_no_staging_file() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let to = dst.path().join("a.txt");
        fs::write(&to, b"original").unwrap();

        let err = copy_file_atomic(&src.path().join("missing"), &to).unwrap_err();
        assert!(matches!(err, SyncError::Reconcile { .. }), "got: {err}");
        assert_eq!(fs::read(&to).unwrap(), b"original");
        assert_eq!(names_in(dst.path()), ["a.txt"]);
    }

    #[test]
    #[cfg(unix)]
    fn link_to_directory_is_not_a_real_dir() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("real")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("real"), tmp.path().join("link")).unwrap();

        assert!(is_real_dir(&tmp.path().join("real")));
        assert!(!is_real_dir(&tmp.path().join("link")));
        assert!(!is_real_dir(&tmp.path().join("absent")));
    }
}
