//! Consumer-side storage of subscription mirrors.
//!
//! Two implementations share the same map operations:
//!
//! - [`InMemoryDataStore`] keeps everything in memory
//! - [`JsonFileDataStore`] additionally rewrites a snapshot file after every
//!   mutation, and only commits the mutation in memory once the file is durable

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, info};

use crate::persistence::{MirrorSnapshot, SnapshotError, save_snapshot_atomic, try_load_snapshot};
use crate::types::{SubscriptionData, SubscriptionId};

#[derive(Debug, Error)]
pub enum DataStoreError {
    #[error("subscription not tracked: {0}")]
    NotFound(SubscriptionId),

    #[error("subscription already tracked: {0}")]
    AlreadyTracked(SubscriptionId),

    #[error("remote subscription already tracked: {0}")]
    DuplicateRemote(String),

    #[error("failed to persist mirrors: {0}")]
    Snapshot(#[from] SnapshotError),
}

pub type Result<T> = std::result::Result<T, DataStoreError>;

/// Read/write contract the reconciler needs from the consumer's registry.
pub trait SubscriptionDataStore: Send + Sync {
    fn get(&self, id: SubscriptionId) -> Option<SubscriptionData>;

    /// Looks up a mirror by the source-assigned id (`subscriptionRef`).
    fn find_by_remote(&self, remote_id: &str) -> Option<SubscriptionData>;

    /// Snapshot of all mirrors, ordered by id.
    fn list(&self) -> Vec<SubscriptionData>;

    fn insert(&self, data: SubscriptionData) -> Result<()>;

    /// Replaces the stored mirror with the same id.
    fn update(&self, data: &SubscriptionData) -> Result<()>;

    fn remove(&self, id: SubscriptionId) -> Result<SubscriptionData>;
}

type Mirrors = BTreeMap<SubscriptionId, SubscriptionData>;

fn insert_into(mirrors: &mut Mirrors, data: SubscriptionData) -> Result<()> {
    if mirrors.contains_key(&data.id) {
        return Err(DataStoreError::AlreadyTracked(data.id));
    }
    if mirrors.values().any(|m| m.remote_id == data.remote_id) {
        return Err(DataStoreError::DuplicateRemote(data.remote_id));
    }
    mirrors.insert(data.id, data);
    Ok(())
}

fn update_in(mirrors: &mut Mirrors, data: &SubscriptionData) -> Result<()> {
    let slot = mirrors
        .get_mut(&data.id)
        .ok_or(DataStoreError::NotFound(data.id))?;
    *slot = data.clone();
    Ok(())
}

fn remove_from(mirrors: &mut Mirrors, id: SubscriptionId) -> Result<SubscriptionData> {
    mirrors.remove(&id).ok_or(DataStoreError::NotFound(id))
}

fn find_remote<'a>(mirrors: &'a Mirrors, remote_id: &str) -> Option<&'a SubscriptionData> {
    mirrors.values().find(|m| m.remote_id == remote_id)
}

// ─── In memory ───

#[derive(Default)]
pub struct InMemoryDataStore {
    mirrors: Mutex<Mirrors>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Mirrors> {
        self.mirrors.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SubscriptionDataStore for InMemoryDataStore {
    fn get(&self, id: SubscriptionId) -> Option<SubscriptionData> {
        self.lock().get(&id).cloned()
    }

    fn find_by_remote(&self, remote_id: &str) -> Option<SubscriptionData> {
        find_remote(&self.lock(), remote_id).cloned()
    }

    fn list(&self) -> Vec<SubscriptionData> {
        self.lock().values().cloned().collect()
    }

    fn insert(&self, data: SubscriptionData) -> Result<()> {
        insert_into(&mut self.lock(), data)
    }

    fn update(&self, data: &SubscriptionData) -> Result<()> {
        update_in(&mut self.lock(), data)
    }

    fn remove(&self, id: SubscriptionId) -> Result<SubscriptionData> {
        remove_from(&mut self.lock(), id)
    }
}

// ─── JSON file ───

/// Mirror store backed by an atomically rewritten JSON snapshot.
pub struct JsonFileDataStore {
    path: PathBuf,
    mirrors: Mutex<Mirrors>,
}

impl JsonFileDataStore {
    /// Opens the store at `path`, loading existing mirrors if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mirrors: Mirrors = match try_load_snapshot(&path)? {
            Some(snapshot) => snapshot.mirrors.into_iter().map(|m| (m.id, m)).collect(),
            None => BTreeMap::new(),
        };
        info!(path = %path.display(), mirrors = mirrors.len(), "opened mirror store");
        Ok(JsonFileDataStore {
            path,
            mirrors: Mutex::new(mirrors),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Mirrors> {
        self.mirrors.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Applies `f` to a copy, persists the copy, then swaps it in.
    ///
    /// On any failure the in-memory state is unchanged.
    fn mutate<T>(&self, f: impl FnOnce(&mut Mirrors) -> Result<T>) -> Result<T> {
        let mut current = self.lock();
        let mut next = current.clone();
        let out = f(&mut next)?;

        let snapshot = MirrorSnapshot::new(next.values().cloned().collect());
        save_snapshot_atomic(&self.path, &snapshot)?;
        debug!(path = %self.path.display(), mirrors = next.len(), "persisted mirrors");

        *current = next;
        Ok(out)
    }
}

impl SubscriptionDataStore for JsonFileDataStore {
    fn get(&self, id: SubscriptionId) -> Option<SubscriptionData> {
        self.lock().get(&id).cloned()
    }

    fn find_by_remote(&self, remote_id: &str) -> Option<SubscriptionData> {
        find_remote(&self.lock(), remote_id).cloned()
    }

    fn list(&self) -> Vec<SubscriptionData> {
        self.lock().values().cloned().collect()
    }

    fn insert(&self, data: SubscriptionData) -> Result<()> {
        self.mutate(|mirrors| insert_into(mirrors, data))
    }

    fn update(&self, data: &SubscriptionData) -> Result<()> {
        self.mutate(|mirrors| update_in(mirrors, data))
    }

    fn remove(&self, id: SubscriptionId) -> Result<SubscriptionData> {
        self.mutate(|mirrors| remove_from(mirrors, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventNumber, TopicDescriptor, TriggerOperation};
    use tempfile::tempdir;

    fn mirror(id: u64, remote: &str) -> SubscriptionData {
        SubscriptionData::new(
            SubscriptionId(id),
            remote,
            "http://source",
            TopicDescriptor::new("Patient", TriggerOperation::Create),
            60,
        )
    }

    #[test]
    fn in_memory_crud() {
        let store = InMemoryDataStore::new();
        store.insert(mirror(1, "r1")).unwrap();

        let mut data = store.get(SubscriptionId(1)).unwrap();
        data.events_received = EventNumber(4);
        store.update(&data).unwrap();

        assert_eq!(store.find_by_remote("r1").unwrap().events_received, EventNumber(4));
        assert!(store.find_by_remote("r2").is_none());

        store.remove(SubscriptionId(1)).unwrap();
        assert!(store.list().is_empty());
        assert!(matches!(
            store.update(&data),
            Err(DataStoreError::NotFound(SubscriptionId(1)))
        ));
    }

    #[test]
    fn duplicate_id_or_remote_is_rejected() {
        let store = InMemoryDataStore::new();
        store.insert(mirror(1, "r1")).unwrap();

        assert!(matches!(
            store.insert(mirror(1, "r9")),
            Err(DataStoreError::AlreadyTracked(_))
        ));
        assert!(matches!(
            store.insert(mirror(2, "r1")),
            Err(DataStoreError::DuplicateRemote(_))
        ));
    }

    #[test]
    fn json_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mirrors.json");

        {
            let store = JsonFileDataStore::open(&path).unwrap();
            store.insert(mirror(1, "r1")).unwrap();
            store.insert(mirror(2, "r2")).unwrap();
            let mut data = store.get(SubscriptionId(2)).unwrap();
            data.events_received = EventNumber(8);
            store.update(&data).unwrap();
            store.remove(SubscriptionId(1)).unwrap();
        }

        let reopened = JsonFileDataStore::open(&path).unwrap();
        let all = reopened.list();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, SubscriptionId(2));
        assert_eq!(all[0].events_received, EventNumber(8));
    }

    #[test]
    fn json_store_failed_mutation_leaves_state() {
        let dir = tempdir().unwrap();
        let store = JsonFileDataStore::open(dir.path().join("mirrors.json")).unwrap();
        store.insert(mirror(1, "r1")).unwrap();

        assert!(store.insert(mirror(1, "r1")).is_err());
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn json_store_starts_empty_without_file() {
        let dir = tempdir().unwrap();
        let store = JsonFileDataStore::open(dir.path().join("nested").join("mirrors.json")).unwrap();
        assert!(store.list().is_empty());
    }
}
