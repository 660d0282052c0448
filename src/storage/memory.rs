//! In-memory storage backend.
//!
//! Thread-safe implementations of the storage traits for embedded usage,
//! tests and direct-mode merges that do not need durability.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::bundle::{EntryCollection, ProfileDocument};
use crate::entry::Entry;
use crate::staging::{StageId, StagedRecord};
use crate::storage::traits::{CollectionStore, RecordStore, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::Backend(format!("poisoned lock: {context}"))
}

/// In-memory staged record store.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<StageId, StagedRecord>>,
}

impl InMemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn insert_if_absent(&self, record: &StagedRecord) -> Result<bool, StorageError> {
        let mut records = self.records.write().map_err(|_| lock_err("records.insert"))?;
        if records.contains_key(&record.id) {
            return Ok(false);
        }
        records.insert(record.id.clone(), record.clone());
        Ok(true)
    }

    fn get(&self, id: &StageId) -> Result<Option<StagedRecord>, StorageError> {
        let records = self.records.read().map_err(|_| lock_err("records.get"))?;
        Ok(records.get(id).cloned())
    }

    fn put(&self, record: &StagedRecord) -> Result<(), StorageError> {
        let mut records = self.records.write().map_err(|_| lock_err("records.put"))?;
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn remove(&self, id: &StageId) -> Result<bool, StorageError> {
        let mut records = self.records.write().map_err(|_| lock_err("records.remove"))?;
        Ok(records.remove(id).is_some())
    }

    fn list(&self) -> Result<Vec<StagedRecord>, StorageError> {
        let records = self.records.read().map_err(|_| lock_err("records.list"))?;
        Ok(records.values().cloned().collect())
    }
}

#[derive(Debug, Default)]
struct CollectionState {
    profile: Option<ProfileDocument>,
    entries: HashMap<EntryCollection, Vec<Entry>>,
}

/// In-memory canonical collections.
#[derive(Debug, Default)]
pub struct InMemoryCollectionStore {
    state: RwLock<CollectionState>,
}

impl InMemoryCollectionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CollectionStore for InMemoryCollectionStore {
    fn load_profile(&self) -> Result<Option<ProfileDocument>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("profile.load"))?;
        Ok(state.profile.clone())
    }

    fn store_profile(&self, profile: &ProfileDocument) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("profile.store"))?;
        state.profile = Some(profile.clone());
        Ok(())
    }

    fn load_entries(&self, collection: EntryCollection) -> Result<Option<Vec<Entry>>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("entries.load"))?;
        Ok(state.entries.get(&collection).cloned())
    }

    fn store_entries(&self, collection: EntryCollection, entries: &[Entry]) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("entries.store"))?;
        state.entries.insert(collection, entries.to_vec());
        Ok(())
    }
}
