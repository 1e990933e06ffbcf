//! Size-based rotation for the mirror log file.
//!
//! Called once per process, before the file is opened for appending, so a
//! running writer never holds a handle to a file that has been renamed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Maximum log file size before rotation (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated backup files to keep.
pub const MAX_ROTATED_FILES: usize = 5;

/// Rotate `log_path` once it has grown to `max_bytes`.
///
/// Backups occupy slots 1 (newest) to `max_files` (oldest); whatever sits in
/// the oldest slot is discarded. A missing log is not an error. Returns
/// whether a rotation happened.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if max_files == 0 || size < max_bytes {
        return Ok(false);
    }

    let slots: Vec<PathBuf> = (1..=max_files)
        .map(|n| numbered_path(log_path, n))
        .collect();
    match fs::remove_file(&slots[max_files - 1]) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err),
        _ => {}
    }
    for pair in slots.windows(2).rev() {
        if pair[0].exists() {
            fs::rename(&pair[0], &pair[1])?;
        }
    }
    fs::rename(log_path, &slots[0])?;
    Ok(true)
}

/// Backup slot `n` of `base`: the file name with `.{n}` appended.
pub fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let mut name = base
        .file_name()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "mirror.log".into());
    name.push(format!(".{n}"));
    base.with_file_name(name)
}
