//! Domain types shared by the walker, classifier, reconciler and scheduler.
//!
//! Relative paths are always [`RelPath`]; absolute paths are only built at the
//! edge by joining a [`RelPath`] onto a tree root.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Path of an entry relative to its tree root, as an ordered list of segments.
///
/// The empty path denotes the root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelPath(PathBuf);

impl RelPath {
    /// The tree root.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.as_os_str().is_empty()
    }

    /// Child path `self/name`.
    pub fn join(&self, name: impl AsRef<OsStr>) -> Self {
        Self(self.0.join(name.as_ref()))
    }

    /// Last segment, or `None` for the root.
    pub fn name(&self) -> Option<&OsStr> {
        self.0.file_name()
    }

    /// Path segments from the root, in order.
    pub fn segments(&self) -> impl Iterator<Item = &OsStr> {
        self.0.components().filter_map(|c| match c {
            Component::Normal(s) => Some(s),
            _ => None,
        })
    }

    /// Number of segments; the root has depth 0.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Absolute location of this entry under `root`.
    pub fn under(&self, root: &Path) -> PathBuf {
        if self.is_root() {
            root.to_path_buf()
        } else {
            root.join(&self.0)
        }
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        let mut first = true;
        for segment in self.segments() {
            if !first {
                f.write_str("/")?;
            }
            first = false;
            f.write_str(&segment.to_string_lossy())?;
        }
        Ok(())
    }
}

impl From<&str> for RelPath {
    fn from(s: &str) -> Self {
        s.split('/')
            .filter(|seg| !seg.is_empty() && *seg != ".")
            .fold(Self::root(), |acc, seg| acc.join(seg))
    }
}

impl From<OsString> for RelPath {
    fn from(name: OsString) -> Self {
        Self::root().join(name)
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Kind of a synchronized filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    /// Listed but never followed; compared by link target.
    Symlink,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Directory => write!(f, "directory"),
            EntryKind::Symlink => write!(f, "symlink"),
        }
    }
}

/// Shallow comparison fingerprint: size, then modification time.
///
/// `modified` is `None` on platforms that do not report an mtime; two missing
/// mtimes compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl Signature {
    pub fn new(size: u64, modified: Option<SystemTime>) -> Self {
        Self { size, modified }
    }

    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        Self {
            size: meta.len(),
            modified: meta.modified().ok(),
        }
    }
}

/// One filesystem object discovered during a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub path: RelPath,
    pub kind: EntryKind,
    pub signature: Signature,
    /// Where a [`EntryKind::Symlink`] points; `None` for other kinds.
    pub link_target: Option<PathBuf>,
}

impl DirectoryEntry {
    pub fn new(path: RelPath, kind: EntryKind, signature: Signature) -> Self {
        Self {
            path,
            kind,
            signature,
            link_target: None,
        }
    }

    pub fn symlink(path: RelPath, signature: Signature, target: PathBuf) -> Self {
        Self {
            path,
            kind: EntryKind::Symlink,
            signature,
            link_target: Some(target),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }

    /// Last path segment (the name at its level).
    pub fn name(&self) -> &OsStr {
        self.path.name().unwrap_or_else(|| OsStr::new(""))
    }
}

// ---------------------------------------------------------------------------
// Comparison policy
// ---------------------------------------------------------------------------

/// How two files present on both sides are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareMode {
    /// Size then mtime; content is never read.
    #[default]
    Shallow,
    /// Size then SHA-256 of the content; mtime is ignored.
    Checksum,
}

impl fmt::Display for CompareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareMode::Shallow => write!(f, "shallow"),
            CompareMode::Checksum => write!(f, "checksum"),
        }
    }
}

impl FromStr for CompareMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "shallow" => Ok(Self::Shallow),
            "checksum" => Ok(Self::Checksum),
            other => Err(format!(
                "unknown compare mode '{other}'; expected: shallow, checksum"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

/// Unit of the pass interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    #[default]
    Seconds,
    Minutes,
    Hours,
}

impl fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntervalUnit::Seconds => write!(f, "seconds"),
            IntervalUnit::Minutes => write!(f, "minutes"),
            IntervalUnit::Hours => write!(f, "hours"),
        }
    }
}

impl FromStr for IntervalUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => Ok(Self::Seconds),
            "m" | "min" | "mins" | "minute" | "minutes" => Ok(Self::Minutes),
            "h" | "hour" | "hours" => Ok(Self::Hours),
            other => Err(format!(
                "unknown interval unit '{other}'; expected: seconds, minutes, hours"
            )),
        }
    }
}

/// Delay between the start of one pass and the start of the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub value: u64,
    #[serde(default)]
    pub unit: IntervalUnit,
}

impl Interval {
    pub const DEFAULT_SECONDS: u64 = 10;

    pub fn new(value: u64, unit: IntervalUnit) -> Self {
        Self { value, unit }
    }

    pub fn as_duration(&self) -> Duration {
        let secs = match self.unit {
            IntervalUnit::Seconds => self.value,
            IntervalUnit::Minutes => self.value.saturating_mul(60),
            IntervalUnit::Hours => self.value.saturating_mul(60 * 60),
        };
        Duration::from_secs(secs)
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SECONDS, IntervalUnit::Seconds)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rel_path_display_uses_forward_slashes() {
        let p = RelPath::root().join("dir").join("b.txt");
        assert_eq!(p.to_string(), "dir/b.txt");
        assert_eq!(RelPath::root().to_string(), ".");
    }

    #[test]
    fn rel_path_from_str_skips_empty_segments() {
        let p = RelPath::from("./dir//b.txt");
        assert_eq!(p, RelPath::root().join("dir").join("b.txt"));
        assert_eq!(p.depth(), 2);
        assert_eq!(p.name(), Some(OsStr::new("b.txt")));
    }

    #[test]
    fn rel_path_under_root_is_root() {
        let root = Path::new("/tmp/replica");
        assert_eq!(RelPath::root().under(root), root);
        assert_eq!(RelPath::from("a/b").under(root), root.join("a").join("b"));
    }

    #[test]
    fn interval_converts_units() {
        assert_eq!(
            Interval::new(2, IntervalUnit::Minutes).as_duration(),
            Duration::from_secs(120)
        );
        assert_eq!(
            Interval::new(1, IntervalUnit::Hours).as_duration(),
            Duration::from_secs(3600)
        );
        assert_eq!(Interval::default().as_duration(), Duration::from_secs(10));
    }

    #[test]
    fn compare_mode_parses_case_insensitively() {
        assert_eq!("Checksum".parse::<CompareMode>(), Ok(CompareMode::Checksum));
        assert!("deep".parse::<CompareMode>().is_err());
    }

    #[test]
    fn interval_unit_accepts_short_forms() {
        assert_eq!("h".parse::<IntervalUnit>(), Ok(IntervalUnit::Hours));
        assert_eq!("mins".parse::<IntervalUnit>(), Ok(IntervalUnit::Minutes));
    }
}
