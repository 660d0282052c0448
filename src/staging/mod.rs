//! Staging lifecycle.
//!
//! Proposed bundles wait here, keyed by a content-derived id, until a
//! reviewer approves (merging them into the canonical store) or rejects
//! them.

pub mod store;
pub mod types;

pub use store::{StagingStore, DEFAULT_ID_LENGTH};
pub use types::{ApprovalResult, RejectionResult, StageId, StageStatus, StagedRecord, StagedSummary};
