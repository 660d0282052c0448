//! The staging store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::bundle::{ContentBundle, SourceInfo};
use crate::clock::{Clock, SystemClock};
use crate::error::{ConfigError, DossierResult, LifecycleError};
use crate::hash::{ContentHasher, MAX_ID_LENGTH, MIN_ID_LENGTH};
use crate::merge::{KnowledgeStoreMerger, MergePreview, MergeSummary};
use crate::storage::{RecordStore, StorageError};

use super::types::{ApprovalResult, RejectionResult, StageId, StageStatus, StagedRecord, StagedSummary};

/// Hex characters kept from the content digest when deriving an id.
pub const DEFAULT_ID_LENGTH: usize = 12;

// The digest input for a new proposal. Field names are part of the id
// derivation and must not change.
#[derive(Serialize)]
struct ProposalDigest<'a> {
    content: &'a ContentBundle,
    metadata: ProposalMetadata<'a>,
}

#[derive(Serialize)]
struct ProposalMetadata<'a> {
    created_at: DateTime<Utc>,
    source_info: &'a SourceInfo,
    status: StageStatus,
}

fn lock_err(context: &'static str) -> StorageError {
    StorageError::Backend(format!("poisoned lock: {context}"))
}

/// Holds proposed bundles through review.
///
/// Status transitions for one id are serialized by a per-id mutex and the
/// record is re-read under that mutex, so two concurrent approvals of the
/// same id merge once and the second fails with `InvalidState`.
pub struct StagingStore {
    records: Arc<dyn RecordStore>,
    merger: Arc<KnowledgeStoreMerger>,
    clock: Arc<dyn Clock>,
    id_length: usize,
    id_locks: Mutex<HashMap<StageId, Arc<Mutex<()>>>>,
}

impl StagingStore {
    /// Creates a staging store using the system clock.
    #[must_use]
    pub fn new(records: Arc<dyn RecordStore>, merger: Arc<KnowledgeStoreMerger>) -> Self {
        Self {
            records,
            merger,
            clock: Arc::new(SystemClock),
            id_length: DEFAULT_ID_LENGTH,
            id_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets how many hex characters a derived id keeps.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` unless the length is within 8..=64.
    pub fn with_id_length(mut self, id_length: usize) -> Result<Self, ConfigError> {
        if !(MIN_ID_LENGTH..=MAX_ID_LENGTH).contains(&id_length) {
            return Err(ConfigError::Invalid {
                field: "staging.id_length",
                reason: format!("must be within {MIN_ID_LENGTH}..={MAX_ID_LENGTH} (got {id_length})"),
            });
        }
        self.id_length = id_length;
        Ok(self)
    }

    /// The merger approvals are applied through.
    #[must_use]
    pub fn merger(&self) -> &Arc<KnowledgeStoreMerger> {
        &self.merger
    }

    /// Stages `content` for review and returns its id.
    ///
    /// The id is a digest of the bundle together with its creation time,
    /// source info and initial status. If a record with that id already
    /// exists it is left untouched and its id is returned.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record cannot be written.
    pub fn propose(&self, content: ContentBundle, source_info: SourceInfo) -> DossierResult<StageId> {
        let created_at = self.clock.now();
        let digest = ProposalDigest {
            content: &content,
            metadata: ProposalMetadata {
                created_at,
                source_info: &source_info,
                status: StageStatus::Pending,
            },
        };
        let id = StageId::from(
            ContentHasher::content_id(&digest, self.id_length)
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
        );

        let entries = content.entry_count();
        let record = StagedRecord {
            id: id.clone(),
            content,
            source_info,
            created_at,
            status: StageStatus::Pending,
            status_changed_at: created_at,
            status_reason: None,
        };

        if self.records.insert_if_absent(&record)? {
            info!(stage_id = %id, entries, "staged bundle for review");
        } else {
            debug!(stage_id = %id, "bundle already staged");
        }
        Ok(id)
    }

    /// Looks up a record.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record exists but cannot be read.
    pub fn get(&self, id: &StageId) -> DossierResult<Option<StagedRecord>> {
        Ok(self.records.get(id)?)
    }

    /// All records, optionally filtered by status, newest first.
    ///
    /// Records created at the same instant are ordered by id.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the records cannot be listed.
    pub fn list(&self, status: Option<StageStatus>) -> DossierResult<Vec<StagedSummary>> {
        let mut rows: Vec<StagedSummary> = self
            .records
            .list()?
            .iter()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .map(StagedRecord::summary)
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }

    /// What approving `id` would route to each canonical collection.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `id` is unknown.
    pub fn preview(&self, id: &StageId) -> DossierResult<MergePreview> {
        let record = self.require(id)?;
        Ok(KnowledgeStoreMerger::preview(&record.content))
    }

    /// Approves a pending record and merges its content.
    ///
    /// The status change is persisted before the merge runs. Per-collection
    /// merge failures are reported in the returned summary; the record stays
    /// approved and [`retry_merge`](Self::retry_merge) can re-apply it.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `id` is unknown
    /// - `InvalidState` if the record is already approved or rejected
    pub fn approve(&self, id: &StageId) -> DossierResult<ApprovalResult> {
        self.with_id_lock(id, "staging.approve", || {
            let mut record = self.require_pending(id, "approve")?;
            let approved_at = self.clock.now();
            record.status = StageStatus::Approved;
            record.status_changed_at = approved_at;
            self.records.put(&record)?;
            info!(stage_id = %id, "approved staged bundle");

            let merge_summary = self
                .merger
                .merge(&record.content, record.source_info.name_hint.as_deref());

            Ok(ApprovalResult {
                id: record.id,
                approved_at,
                merge_summary,
            })
        })
    }

    /// Rejects a pending record, keeping its content for audit.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `id` is unknown
    /// - `InvalidState` if the record is already approved or rejected
    pub fn reject(&self, id: &StageId, reason: impl Into<String>) -> DossierResult<RejectionResult> {
        let reason = reason.into();
        self.with_id_lock(id, "staging.reject", || {
            let mut record = self.require_pending(id, "reject")?;
            let rejected_at = self.clock.now();
            record.status = StageStatus::Rejected;
            record.status_changed_at = rejected_at;
            record.status_reason = Some(reason.clone());
            self.records.put(&record)?;
            info!(stage_id = %id, reason = %reason, "rejected staged bundle");

            Ok(RejectionResult {
                id: record.id,
                rejected_at,
                reason,
            })
        })
    }

    /// Re-runs the merge for an approved record.
    ///
    /// Merging is duplicate-safe, so applying the same record again adds
    /// nothing that is already present.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `id` is unknown
    /// - `InvalidState` if the record is not approved
    pub fn retry_merge(&self, id: &StageId) -> DossierResult<MergeSummary> {
        self.with_id_lock(id, "staging.retry_merge", || {
            let record = self.require(id)?;
            if record.status != StageStatus::Approved {
                return Err(LifecycleError::InvalidState {
                    id: id.clone(),
                    status: record.status,
                    attempted: "retry merge",
                }
                .into());
            }
            info!(stage_id = %id, "retrying merge");
            Ok(self
                .merger
                .merge(&record.content, record.source_info.name_hint.as_deref()))
        })
    }

    /// Deletes approved and rejected records whose status changed more than
    /// `max_age` ago. Pending records are never removed.
    ///
    /// Returns the number of records deleted.
    ///
    /// # Errors
    ///
    /// Returns a storage error if listing or deleting fails.
    pub fn cleanup(&self, max_age: Duration) -> DossierResult<usize> {
        let Some(cutoff) = self.clock.now().checked_sub_signed(max_age) else {
            return Ok(0);
        };

        let mut removed = 0;
        for candidate in self.records.list()? {
            if !Self::expired(&candidate, cutoff) {
                continue;
            }
            // The record may have changed since it was listed.
            let deleted = self.with_id_lock(&candidate.id, "staging.cleanup", || {
                let still_expired = self
                    .records
                    .get(&candidate.id)?
                    .is_some_and(|r| Self::expired(&r, cutoff));
                Ok(still_expired && self.records.remove(&candidate.id)?)
            })?;
            if deleted {
                debug!(stage_id = %candidate.id, status = %candidate.status, "removed expired record");
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "cleaned up staged records");
        }
        Ok(removed)
    }

    fn expired(record: &StagedRecord, cutoff: DateTime<Utc>) -> bool {
        record.status.is_terminal() && record.status_changed_at < cutoff
    }

    // Runs `op` while holding the lock for `id`. The map entry is dropped
    // once no other caller holds or waits on it; handles are only cloned
    // under the map lock, so the count check cannot race a new waiter.
    fn with_id_lock<T>(
        &self,
        id: &StageId,
        context: &'static str,
        op: impl FnOnce() -> DossierResult<T>,
    ) -> DossierResult<T> {
        let lock = {
            let mut locks = self.id_locks.lock().map_err(|_| lock_err("staging.id_locks"))?;
            Arc::clone(locks.entry(id.clone()).or_default())
        };
        let result = match lock.lock() {
            Ok(_guard) => op(),
            Err(_) => Err(lock_err(context).into()),
        };
        drop(lock);

        if let Ok(mut locks) = self.id_locks.lock() {
            if locks.get(id).is_some_and(|l| Arc::strong_count(l) == 1) {
                locks.remove(id);
            }
        }
        result
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.id_locks.lock().map_or(0, |locks| locks.len())
    }

    fn require(&self, id: &StageId) -> DossierResult<StagedRecord> {
        self.records
            .get(id)?
            .ok_or_else(|| LifecycleError::NotFound { id: id.clone() }.into())
    }

    fn require_pending(&self, id: &StageId, attempted: &'static str) -> DossierResult<StagedRecord> {
        let record = self.require(id)?;
        if record.status.is_terminal() {
            return Err(LifecycleError::InvalidState {
                id: id.clone(),
                status: record.status,
                attempted,
            }
            .into());
        }
        Ok(record)
    }
}
