//! Durable storage for consumer-side subscription mirrors.
//!
//! The consumer's `eventsReceived` positions must survive restarts, otherwise
//! a restarted relay would re-dispatch events it already forwarded. State is
//! kept as a single JSON snapshot file rewritten after every update.
//!
//! # Crash Safety
//!
//! Snapshots are written with write-to-temp, fsync, rename, fsync-directory.
//! A reader sees either the previous or the new snapshot, never a partial one.

pub mod fsync;
pub mod snapshot;

pub use fsync::{fsync_dir, fsync_file};
pub use snapshot::{
    MirrorSnapshot, SCHEMA_VERSION, SnapshotError, load_snapshot, save_snapshot_atomic,
    try_load_snapshot,
};
