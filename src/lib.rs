//! # Dossier - Deduplicating staging for personal knowledge records
//!
//! Dossier takes structured entries extracted from résumés, patent filings
//! and profile exports, holds them for review, and merges approved bundles
//! into a canonical knowledge store without letting duplicates in.
//!
//! ## Core Concepts
//!
//! - **Entry**: One structured record as a field-value mapping
//! - **ContentBundle**: The four collections plus summary produced by one ingestion
//! - **Fingerprint**: Canonical digest of an entry, used for exact matching
//! - **StagingStore**: Pending-review holding area with a one-way lifecycle
//! - **KnowledgeStoreMerger**: Applies approved bundles to the canonical store
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use dossier::storage::{InMemoryCollectionStore, InMemoryRecordStore};
//! use dossier::{ContentBundle, DuplicateResolver, Entry, KnowledgeStoreMerger, SourceInfo, StagingStore};
//!
//! let merger = Arc::new(KnowledgeStoreMerger::new(
//!     Arc::new(InMemoryCollectionStore::new()),
//!     DuplicateResolver::default(),
//! ));
//! let staging = StagingStore::new(Arc::new(InMemoryRecordStore::new()), merger);
//!
//! let bundle = ContentBundle {
//!     projects: vec![Entry::new().with("title", "Compiler")],
//!     ..ContentBundle::default()
//! };
//! let id = staging.propose(bundle, SourceInfo::from_files(["cv.pdf"]))?;
//! let approval = staging.approve(&id)?;
//! assert_eq!(approval.merge_summary.projects_added, 1);
//! # Ok::<(), dossier::DossierError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Data model
pub mod bundle;
pub mod entry;
pub mod error;

// Matching and merging
pub mod dedup;
pub mod hash;
pub mod merge;
pub mod similarity;

// Lifecycle and persistence
pub mod clock;
pub mod config;
pub mod ingest;
pub mod staging;
pub mod storage;
pub mod workspace;

pub use bundle::{CanonicalCollection, ContentBundle, EntryCollection, ProfileDocument, SourceInfo};
pub use dedup::{DedupOutcome, DedupReport, DuplicateMatch, DuplicateResolver, MatchKind};
pub use entry::{Entry, FieldValue};
pub use error::{ConfigError, DossierError, DossierResult, ExtractionFailure, LifecycleError};
pub use hash::{ContentHasher, Fingerprint};
pub use merge::{
    CollectionFailure, InvariantViolation, KnowledgeSnapshot, KnowledgeStoreMerger, MergePreview, MergeSummary,
};
pub use similarity::SimilarityScorer;
pub use staging::{ApprovalResult, RejectionResult, StageId, StageStatus, StagedRecord, StagedSummary, StagingStore};
pub use storage::StorageError;
pub use workspace::Workspace;

pub use ingest::{Extractor, IngestMode, IngestOutcome, IngestRequest, Ingestor, JsonBundleExtractor, ProfileFetcher};
pub use config::Config;
