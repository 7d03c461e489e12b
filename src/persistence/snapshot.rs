//! Snapshot file for consumer-side subscription mirrors.
//!
//! # File Format
//!
//! A single pretty-printed JSON document:
//!
//! ```text
//! { "schema_version": 1, "saved_at": "...", "mirrors": [ SubscriptionData, ... ] }
//! ```
//!
//! # Atomic Writes
//!
//! 1. Write to `<path>.tmp`
//! 2. fsync the file
//! 3. Rename to `<path>`
//! 4. fsync the directory

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::fsync::{fsync_dir, fsync_file};
use crate::types::SubscriptionData;

/// Current schema version. Increment on breaking changes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema version mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: u32, got: u32 },
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Persisted consumer state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorSnapshot {
    pub schema_version: u32,
    pub saved_at: DateTime<Utc>,
    /// Sorted by local id.
    pub mirrors: Vec<SubscriptionData>,
}

impl MirrorSnapshot {
    pub fn new(mut mirrors: Vec<SubscriptionData>) -> Self {
        mirrors.sort_by_key(|m| m.id);
        MirrorSnapshot {
            schema_version: SCHEMA_VERSION,
            saved_at: Utc::now(),
            mirrors,
        }
    }
}

/// Saves a snapshot atomically, creating parent directories as needed.
///
/// 1. Write to `<path>.json.tmp`
/// 2. fsync the temp file
/// 3. Rename over `path`
/// 4. fsync the parent directory
///
/// A crash at any point leaves either the old snapshot or the new one at
/// `path`, never a partial write.
///
/// # Errors
///
/// Returns [`SnapshotError::Io`] if any filesystem step fails and
/// [`SnapshotError::Json`] if the snapshot cannot be serialized. A failure
/// before the rename leaves the previous snapshot in place.
pub fn save_snapshot_atomic(path: &Path, snapshot: &MirrorSnapshot) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(snapshot)?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(&bytes)?;
        fsync_file(&file)?;
    }

    std::fs::rename(&tmp_path, path)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fsync_dir(parent)?;
    }

    Ok(())
}

/// Loads a snapshot, rejecting other schema versions.
///
/// # Errors
///
/// [`SnapshotError::SchemaMismatch`] if the file was written by another
/// schema version.
pub fn load_snapshot(path: &Path) -> Result<MirrorSnapshot> {
    let bytes = std::fs::read(path)?;
    let snapshot: MirrorSnapshot = serde_json::from_slice(&bytes)?;

    if snapshot.schema_version != SCHEMA_VERSION {
        return Err(SnapshotError::SchemaMismatch {
            expected: SCHEMA_VERSION,
            got: snapshot.schema_version,
        });
    }

    Ok(snapshot)
}

/// Like [`load_snapshot`], but a missing file is `Ok(None)`.
pub fn try_load_snapshot(path: &Path) -> Result<Option<MirrorSnapshot>> {
    match load_snapshot(path) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(SnapshotError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
