//! Storage for staged proposals and the canonical collections.
//!
//! The traits define the contract; `memory` provides thread-safe in-memory
//! backends and `persistent` the file-per-object backends.

pub mod memory;
pub mod persistent;
mod traits;

pub use memory::{InMemoryCollectionStore, InMemoryRecordStore};
pub use persistent::{open_store, FileCollectionStore, FileRecordStore, PersistentConfig, PersistentStores};
pub use traits::{CollectionStore, RecordStore, StorageError};
