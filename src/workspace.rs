//! Wiring of stores, merger and staging for one data directory.

use std::sync::Arc;

use chrono::Duration;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::DossierResult;
use crate::ingest::{Extractor, Ingestor};
use crate::merge::KnowledgeStoreMerger;
use crate::staging::StagingStore;
use crate::storage::{
    open_store, CollectionStore, InMemoryCollectionStore, InMemoryRecordStore, PersistentStores, RecordStore,
};

/// An opened set of components sharing one store handle.
///
/// For a file-backed workspace the data directory stays locked until the
/// workspace is dropped.
pub struct Workspace {
    staging: Arc<StagingStore>,
    retention: Duration,
    _stores: Option<PersistentStores>,
}

impl Workspace {
    /// Opens the file-backed store under `config.storage.data_dir`.
    ///
    /// # Errors
    ///
    /// Returns a config error for invalid settings and a storage error if
    /// the directory cannot be opened or is locked by another process.
    pub fn open(config: &Config) -> DossierResult<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Like [`open`](Self::open) with an explicit time source.
    ///
    /// # Errors
    ///
    /// As [`open`](Self::open).
    pub fn open_with_clock(config: &Config, clock: Arc<dyn Clock>) -> DossierResult<Self> {
        config.validate()?;
        let stores = open_store(&config.storage.data_dir, Some(config.persistent()))?;
        let records: Arc<dyn RecordStore> = stores.records.clone();
        let collections: Arc<dyn CollectionStore> = stores.collections.clone();
        Self::assemble(config, records, collections, clock, Some(stores))
    }

    /// A workspace over in-memory stores.
    ///
    /// # Errors
    ///
    /// Returns a config error for invalid settings.
    pub fn in_memory(config: &Config, clock: Arc<dyn Clock>) -> DossierResult<Self> {
        config.validate()?;
        Self::assemble(
            config,
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(InMemoryCollectionStore::new()),
            clock,
            None,
        )
    }

    fn assemble(
        config: &Config,
        records: Arc<dyn RecordStore>,
        collections: Arc<dyn CollectionStore>,
        clock: Arc<dyn Clock>,
        stores: Option<PersistentStores>,
    ) -> DossierResult<Self> {
        let merger = Arc::new(KnowledgeStoreMerger::new(collections, config.resolver()?));
        let staging = StagingStore::new(records, merger)
            .with_clock(clock)
            .with_id_length(config.staging.id_length)?;
        Ok(Self {
            staging: Arc::new(staging),
            retention: config.retention(),
            _stores: stores,
        })
    }

    /// The staging area.
    #[must_use]
    pub fn staging(&self) -> &Arc<StagingStore> {
        &self.staging
    }

    /// The canonical store merger.
    #[must_use]
    pub fn merger(&self) -> &Arc<KnowledgeStoreMerger> {
        self.staging.merger()
    }

    /// Configured default `max_age` for [`StagingStore::cleanup`].
    #[must_use]
    pub const fn retention(&self) -> Duration {
        self.retention
    }

    /// An ingestor feeding this workspace.
    #[must_use]
    pub fn ingestor(&self, extractor: Arc<dyn Extractor>) -> Ingestor {
        Ingestor::new(self.staging.clone(), extractor)
    }
}
