//! File-per-object store implementations.
//!
//! Layout under the data directory:
//!
//! ```text
//! <data_dir>/.lock
//! <data_dir>/staging/<id>.json
//! <data_dir>/knowledge_base/{profile,projects,patents,certifications}.json
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use crate::bundle::{CanonicalCollection, EntryCollection, ProfileDocument};
use crate::entry::Entry;
use crate::staging::{StageId, StagedRecord};
use crate::storage::traits::{CollectionStore, RecordStore, StorageError};

use super::atomic::{is_temp_file, replace_file, sweep_temp_files};
use super::file_lock::DirectoryLock;
use super::PersistentConfig;

/// Subdirectory holding staged records.
pub const STAGING_DIR: &str = "staging";

/// Subdirectory holding the canonical collections.
pub const KNOWLEDGE_DIR: &str = "knowledge_base";

fn lock_err(context: &'static str) -> StorageError {
    StorageError::Backend(format!("poisoned lock: {context}"))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let mut bytes =
        serde_json::to_vec_pretty(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::Io(e)),
    }
}

fn corrupt(path: &Path, reason: impl ToString) -> StorageError {
    StorageError::Corrupt {
        location: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Staged records, one JSON file per id.
#[derive(Debug)]
pub struct FileRecordStore {
    dir: PathBuf,
    sync_on_write: bool,
    write_guard: Mutex<()>,
}

impl FileRecordStore {
    /// Opens (creating if needed) a record directory.
    pub fn open(dir: impl Into<PathBuf>, sync_on_write: bool) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let swept = sweep_temp_files(&dir)?;
        if swept > 0 {
            debug!(dir = %dir.display(), swept, "removed stale temp files");
        }
        Ok(Self {
            dir,
            sync_on_write,
            write_guard: Mutex::new(()),
        })
    }

    /// Directory holding the record files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // Ids that could escape the directory are never mapped to a path.
    fn path_for(&self, id: &StageId) -> Option<PathBuf> {
        id.is_well_formed().then(|| self.dir.join(format!("{id}.json")))
    }

    fn read_record(path: &Path) -> Result<Option<StagedRecord>, StorageError> {
        let Some(bytes) = read_optional(path)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| corrupt(path, e))
    }
}

impl RecordStore for FileRecordStore {
    fn insert_if_absent(&self, record: &StagedRecord) -> Result<bool, StorageError> {
        let path = self
            .path_for(&record.id)
            .ok_or_else(|| StorageError::Backend(format!("malformed stage id: {}", record.id)))?;
        let _guard = self.write_guard.lock().map_err(|_| lock_err("records.insert"))?;
        if path.exists() {
            return Ok(false);
        }
        replace_file(&path, &encode(record)?, self.sync_on_write)?;
        Ok(true)
    }

    fn get(&self, id: &StageId) -> Result<Option<StagedRecord>, StorageError> {
        match self.path_for(id) {
            Some(path) => Self::read_record(&path),
            None => Ok(None),
        }
    }

    fn put(&self, record: &StagedRecord) -> Result<(), StorageError> {
        let path = self
            .path_for(&record.id)
            .ok_or_else(|| StorageError::Backend(format!("malformed stage id: {}", record.id)))?;
        let _guard = self.write_guard.lock().map_err(|_| lock_err("records.put"))?;
        replace_file(&path, &encode(record)?, self.sync_on_write)?;
        Ok(())
    }

    fn remove(&self, id: &StageId) -> Result<bool, StorageError> {
        let Some(path) = self.path_for(id) else {
            return Ok(false);
        };
        let _guard = self.write_guard.lock().map_err(|_| lock_err("records.remove"))?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn list(&self) -> Result<Vec<StagedRecord>, StorageError> {
        let mut records = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            if is_temp_file(&path) || path.extension().map_or(true, |e| e != "json") {
                continue;
            }
            match Self::read_record(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable staged record"),
            }
        }
        Ok(records)
    }
}

/// The canonical collections, one JSON document per collection.
#[derive(Debug)]
pub struct FileCollectionStore {
    dir: PathBuf,
    sync_on_write: bool,
}

impl FileCollectionStore {
    /// Opens (creating if needed) a knowledge directory.
    pub fn open(dir: impl Into<PathBuf>, sync_on_write: bool) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        sweep_temp_files(&dir)?;
        Ok(Self { dir, sync_on_write })
    }

    /// Path of the file backing `collection`.
    #[must_use]
    pub fn path_of(&self, collection: CanonicalCollection) -> PathBuf {
        self.dir.join(format!("{}.json", collection.name()))
    }
}

impl CollectionStore for FileCollectionStore {
    fn load_profile(&self) -> Result<Option<ProfileDocument>, StorageError> {
        let path = self.path_of(CanonicalCollection::Profile);
        let Some(bytes) = read_optional(&path)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| corrupt(&path, e))
    }

    fn store_profile(&self, profile: &ProfileDocument) -> Result<(), StorageError> {
        let path = self.path_of(CanonicalCollection::Profile);
        replace_file(&path, &encode(profile)?, self.sync_on_write)?;
        Ok(())
    }

    fn load_entries(&self, collection: EntryCollection) -> Result<Option<Vec<Entry>>, StorageError> {
        let path = self.path_of(collection.canonical());
        let Some(bytes) = read_optional(&path)? else {
            return Ok(None);
        };
        let mut doc: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(&path, e))?;
        let Some(doc) = doc.as_object_mut() else {
            return Err(corrupt(&path, "expected a JSON object"));
        };
        match doc.remove(collection.name()) {
            None => Ok(Some(Vec::new())),
            Some(list) => serde_json::from_value(list)
                .map(Some)
                .map_err(|e| corrupt(&path, e)),
        }
    }

    fn store_entries(&self, collection: EntryCollection, entries: &[Entry]) -> Result<(), StorageError> {
        let path = self.path_of(collection.canonical());
        let mut doc = serde_json::Map::new();
        doc.insert(
            collection.name().to_string(),
            serde_json::to_value(entries).map_err(|e| StorageError::Serialization(e.to_string()))?,
        );
        replace_file(&path, &encode(&doc)?, self.sync_on_write)?;
        Ok(())
    }

    fn quarantine(&self, collection: CanonicalCollection) -> Result<(), StorageError> {
        let path = self.path_of(collection);
        if !path.exists() {
            return Ok(());
        }
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let target = self.dir.join(format!("{}.json.corrupt-{stamp}", collection.name()));
        fs::rename(&path, &target)?;
        warn!(
            collection = collection.name(),
            moved_to = %target.display(),
            "quarantined corrupt collection file"
        );
        Ok(())
    }
}

/// Both file stores for one data directory, plus the directory lock.
///
/// This is the store handle the rest of the crate is given; it is opened
/// once at process start and dropping it releases the lock.
pub struct PersistentStores {
    /// The data directory.
    pub dir: PathBuf,
    /// Staged proposals.
    pub records: Arc<FileRecordStore>,
    /// Canonical collections.
    pub collections: Arc<FileCollectionStore>,
    _lock: DirectoryLock,
}

impl PersistentStores {
    /// Opens or creates the stores under `dir`.
    ///
    /// # Errors
    /// - `StorageError::Locked` if another process holds the directory
    /// - `StorageError::Io` if the directories cannot be created
    pub fn open(dir: &Path, config: &PersistentConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;
        let lock = DirectoryLock::acquire(dir).map_err(|e| {
            if e.kind() == ErrorKind::WouldBlock {
                StorageError::Locked(format!("{}: {e}", dir.display()))
            } else {
                StorageError::Io(e)
            }
        })?;

        let records = FileRecordStore::open(dir.join(STAGING_DIR), config.sync_on_write)?;
        let collections = FileCollectionStore::open(dir.join(KNOWLEDGE_DIR), config.sync_on_write)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            records: Arc::new(records),
            collections: Arc::new(collections),
            _lock: lock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{ContentBundle, SourceInfo};
    use crate::staging::StageStatus;
    use tempfile::tempdir;

    fn record(id: &str) -> StagedRecord {
        let now = Utc::now();
        StagedRecord {
            id: StageId::from(id),
            content: ContentBundle {
                projects: vec![Entry::new().with("title", "Compiler")],
                ..ContentBundle::default()
            },
            source_info: SourceInfo::from_files(["cv.pdf"]),
            created_at: now,
            status: StageStatus::Pending,
            status_changed_at: now,
            status_reason: None,
        }
    }

    #[test]
    fn test_record_roundtrip_through_disk() {
        let dir = tempdir().unwrap();
        let store = FileRecordStore::open(dir.path(), false).unwrap();
        let r = record("0123456789ab");
        assert!(store.insert_if_absent(&r).unwrap());
        assert!(dir.path().join("0123456789ab.json").exists());

        let reopened = FileRecordStore::open(dir.path(), false).unwrap();
        assert_eq!(reopened.get(&r.id).unwrap().unwrap(), r);
        assert_eq!(reopened.list().unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_ids_never_touch_disk() {
        let dir = tempdir().unwrap();
        let store = FileRecordStore::open(dir.path(), false).unwrap();
        let id = StageId::from("../escape");
        assert!(store.get(&id).unwrap().is_none());
        assert!(!store.remove(&id).unwrap());
        assert!(store.insert_if_absent(&record("../escape")).is_err());
    }

    #[test]
    fn test_list_skips_unreadable_records() {
        let dir = tempdir().unwrap();
        let store = FileRecordStore::open(dir.path(), false).unwrap();
        store.insert_if_absent(&record("0123456789ab")).unwrap();
        fs::write(dir.path().join("ffffffffffff.json"), b"{ not json").unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
        assert!(store.get(&StageId::from("ffffffffffff")).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_collection_document_shape() {
        let dir = tempdir().unwrap();
        let store = FileCollectionStore::open(dir.path(), false).unwrap();
        store
            .store_entries(EntryCollection::Patents, &[Entry::new().with("title", "Widget")])
            .unwrap();
        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(dir.path().join("patents.json")).unwrap()).unwrap();
        assert_eq!(raw["patents"][0]["title"], "Widget");
    }

    #[test]
    fn test_missing_collection_key_is_empty() {
        let dir = tempdir().unwrap();
        let store = FileCollectionStore::open(dir.path(), false).unwrap();
        fs::write(dir.path().join("projects.json"), b"{}").unwrap();
        assert_eq!(store.load_entries(EntryCollection::Projects).unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_quarantine_moves_corrupt_file() {
        let dir = tempdir().unwrap();
        let store = FileCollectionStore::open(dir.path(), false).unwrap();
        fs::write(dir.path().join("patents.json"), b"[[[").unwrap();
        assert!(store.load_entries(EntryCollection::Patents).unwrap_err().is_corrupt());

        store.quarantine(CanonicalCollection::Patents).unwrap();
        assert!(store.load_entries(EntryCollection::Patents).unwrap().is_none());
        let moved = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .any(|e| e.file_name().to_string_lossy().starts_with("patents.json.corrupt-"));
        assert!(moved);
    }

    #[test]
    fn test_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _first = PersistentStores::open(dir.path(), &PersistentConfig::default()).unwrap();
        let second = PersistentStores::open(dir.path(), &PersistentConfig::default());
        assert!(matches!(second, Err(StorageError::Locked(_))));
    }
}
