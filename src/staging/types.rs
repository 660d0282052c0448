//! Staging record types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bundle::{ContentBundle, SourceInfo};
use crate::merge::MergeSummary;

/// Content-derived identifier of a staged record.
///
/// Identical proposals (same bundle, same metadata, same instant) derive
/// the same id.
///
/// # Examples
///
/// ```
/// use dossier::StageId;
///
/// let id = StageId::from("3f2a9c01b7de");
/// assert!(id.is_well_formed());
/// assert!(!StageId::from("../etc").is_well_formed());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(String);

impl StageId {
    /// Longest id accepted by [`is_well_formed`](Self::is_well_formed).
    pub const MAX_LEN: usize = 64;

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the id is non-empty, at most [`MAX_LEN`](Self::MAX_LEN)
    /// characters, and made only of ASCII alphanumerics, `_` and `-`.
    ///
    /// Ids from user input are checked with this before they reach a
    /// storage backend.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= Self::MAX_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Review status of a staged record.
///
/// `Pending` moves to exactly one of the terminal states and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Awaiting review.
    Pending,
    /// Approved and handed to the merger.
    Approved,
    /// Rejected; retained for audit, never merged.
    Rejected,
}

impl StageStatus {
    /// Returns true for `Approved` and `Rejected`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Lowercase name, as persisted.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown status '{other}' (expected pending, approved or rejected)")),
        }
    }
}

/// One proposed bundle and its review state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedRecord {
    /// Content-derived identifier.
    pub id: StageId,
    /// The proposed bundle, kept after review.
    pub content: ContentBundle,
    /// Where the bundle came from.
    pub source_info: SourceInfo,
    /// When the bundle was proposed.
    pub created_at: DateTime<Utc>,
    /// Review state.
    pub status: StageStatus,
    /// When `status` last changed; equals `created_at` while pending.
    pub status_changed_at: DateTime<Utc>,
    /// Rejection reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
}

impl StagedRecord {
    /// Listing view of this record.
    #[must_use]
    pub fn summary(&self) -> StagedSummary {
        StagedSummary {
            id: self.id.clone(),
            created_at: self.created_at,
            source_info: self.source_info.clone(),
            status: self.status,
        }
    }
}

/// Row returned by [`StagingStore::list`](super::StagingStore::list).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedSummary {
    /// Record id.
    pub id: StageId,
    /// When the bundle was proposed.
    pub created_at: DateTime<Utc>,
    /// Where the bundle came from.
    pub source_info: SourceInfo,
    /// Review state.
    pub status: StageStatus,
}

/// Result of a successful approval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovalResult {
    /// The approved record.
    pub id: StageId,
    /// When the status changed.
    pub approved_at: DateTime<Utc>,
    /// What the merge changed.
    pub merge_summary: MergeSummary,
}

/// Result of a successful rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectionResult {
    /// The rejected record.
    pub id: StageId,
    /// When the status changed.
    pub rejected_at: DateTime<Utc>,
    /// Reviewer-supplied reason.
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&StageStatus::Rejected).unwrap();
        assert_eq!(json, "\"rejected\"");
        assert_eq!("Approved".parse::<StageStatus>().unwrap(), StageStatus::Approved);
        assert!("done".parse::<StageStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!StageStatus::Pending.is_terminal());
        assert!(StageStatus::Approved.is_terminal());
        assert!(StageStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_id_shape() {
        assert!(StageId::from("a1b2c3d4e5f6").is_well_formed());
        assert!(!StageId::from("").is_well_formed());
        assert!(!StageId::from("a/b").is_well_formed());
        assert!(!StageId::from("x".repeat(65)).is_well_formed());
    }
}
