//! fsync helpers.
//!
//! Creating or renaming a file changes its directory entry, so the directory
//! must be synced as well as the file for the change to survive power loss.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Flushes a file's contents and metadata to disk.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Flushes a directory's entries to disk.
///
/// Only call with directory paths.
///
/// # Errors
///
/// Returns the I/O error if the directory cannot be opened or synced.
///
/// # Note
///
/// Opening a directory read-only works on Linux and macOS. Windows needs
/// `FILE_FLAG_BACKUP_SEMANTICS`, which the relay does not target.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}
