//! Abstract storage traits for Dossier.
//!
//! Two contracts back the subsystem: a [`RecordStore`] holding staged
//! proposals and a [`CollectionStore`] holding the canonical collections.
//! Both must make each single write all-or-nothing.

use thiserror::Error;

use crate::bundle::{CanonicalCollection, EntryCollection, ProfileDocument};
use crate::entry::Entry;
use crate::staging::{StageId, StagedRecord};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A persisted object exists but could not be decoded.
    #[error("Corrupt store at {location}: {reason}")]
    Corrupt {
        /// File or key that failed to decode.
        location: String,
        /// Decoder message.
        reason: String,
    },

    /// Another process holds the store.
    #[error("Store is locked: {0}")]
    Locked(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Returns true if this error reports undecodable persisted data.
    #[must_use]
    pub const fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

/// Storage trait for staged proposals.
///
/// One record per id. Implementations must replace a record atomically in
/// [`put`](RecordStore::put); there is no partial update.
pub trait RecordStore: Send + Sync {
    /// Inserts `record` unless its id is already present.
    ///
    /// Returns `true` if the record was written, `false` if an existing
    /// record was left untouched.
    fn insert_if_absent(&self, record: &StagedRecord) -> Result<bool, StorageError>;

    /// Get a record by id.
    fn get(&self, id: &StageId) -> Result<Option<StagedRecord>, StorageError>;

    /// Replace an existing record.
    fn put(&self, record: &StagedRecord) -> Result<(), StorageError>;

    /// Permanently delete a record. Returns `false` if it did not exist.
    fn remove(&self, id: &StageId) -> Result<bool, StorageError>;

    /// All records, in no particular order.
    fn list(&self) -> Result<Vec<StagedRecord>, StorageError>;
}

/// Storage trait for the canonical collections.
///
/// `Ok(None)` from a load means the collection has never been written.
/// Undecodable data is reported as [`StorageError::Corrupt`].
pub trait CollectionStore: Send + Sync {
    /// Load the profile document.
    fn load_profile(&self) -> Result<Option<ProfileDocument>, StorageError>;

    /// Replace the profile document.
    fn store_profile(&self, profile: &ProfileDocument) -> Result<(), StorageError>;

    /// Load one list collection.
    fn load_entries(&self, collection: EntryCollection) -> Result<Option<Vec<Entry>>, StorageError>;

    /// Replace one list collection.
    fn store_entries(&self, collection: EntryCollection, entries: &[Entry]) -> Result<(), StorageError>;

    /// Move unreadable data for `collection` aside so a following store
    /// does not destroy it.
    ///
    /// The default does nothing; backends without an on-disk form have
    /// nothing to preserve.
    fn quarantine(&self, collection: CanonicalCollection) -> Result<(), StorageError> {
        let _ = collection;
        Ok(())
    }
}
