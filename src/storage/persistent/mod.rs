//! Persistent storage backend for Dossier.
//!
//! Durable, crash-safe storage with:
//! - One JSON document per object, replaced through temp-then-rename
//! - An advisory lock for single-process ownership of a data directory
//! - Corrupt-file detection and quarantine
//!
//! # Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               PersistentStores               │
//! ├──────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌──────────────────┐   │
//! │  │ FileRecordStore │  │ FileCollection-  │   │
//! │  │  staging/*.json │  │ Store            │   │
//! │  └────────┬────────┘  └────────┬─────────┘   │
//! │           └──────────┬─────────┘             │
//! │                      ↓                       │
//! │          ┌───────────────────────┐           │
//! │          │ DirectoryLock (flock) │           │
//! │          └───────────────────────┘           │
//! └──────────────────────────────────────────────┘
//! ```

mod atomic;
mod file_lock;
mod stores;

pub use atomic::{replace_file, AtomicWrite};
pub use file_lock::DirectoryLock;
pub use stores::{FileCollectionStore, FileRecordStore, PersistentStores, KNOWLEDGE_DIR, STAGING_DIR};

use std::path::Path;

use crate::storage::traits::StorageError;

/// Configuration for persistent storage.
#[derive(Debug, Clone)]
pub struct PersistentConfig {
    /// Whether to fsync every replaced file before renaming it.
    pub sync_on_write: bool,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self { sync_on_write: true }
    }
}

/// Open or create a persistent store at the given directory.
///
/// # Errors
/// - If the directory cannot be created or accessed
/// - If another process holds the lock
///
/// # Example
/// ```rust,ignore
/// use dossier::storage::persistent::{open_store, PersistentConfig};
///
/// let stores = open_store("./data", None)?;
/// let merger = KnowledgeStoreMerger::new(stores.collections.clone(), resolver);
/// ```
pub fn open_store(
    path: impl AsRef<Path>,
    config: Option<PersistentConfig>,
) -> Result<PersistentStores, StorageError> {
    let cfg = config.unwrap_or_default();
    PersistentStores::open(path.as_ref(), &cfg)
}
