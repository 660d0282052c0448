//! Error types for Dossier.
//!
//! Errors are strongly typed using thiserror so callers can match on
//! lifecycle violations separately from storage failures.

use serde::Serialize;
use thiserror::Error;

use crate::staging::{StageId, StageStatus};
use crate::storage::StorageError;

/// Violations of the staging lifecycle.
///
/// These are surfaced synchronously and never leave a record partially
/// mutated.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The id does not name a staged record.
    #[error("No staged entry found with ID: {id}")]
    NotFound {
        /// The requested id.
        id: StageId,
    },

    /// The record is not in a state that allows the operation.
    #[error("Staged entry {id} is {status}; cannot {attempted}")]
    InvalidState {
        /// The record id.
        id: StageId,
        /// Its current status.
        status: StageStatus,
        /// The operation that was refused.
        attempted: &'static str,
    },
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// Path of the config file.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`Config`](crate::Config).
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        /// Path of the config file.
        path: String,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("Invalid config value for '{field}': {reason}")]
    Invalid {
        /// Dotted key of the offending value.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// A document the extraction collaborator could not turn into a bundle.
///
/// Extraction failures are attached to an ingestion result as warnings;
/// they never abort the batch.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("Failed to extract {source_name}: {reason}")]
pub struct ExtractionFailure {
    /// File path or URL of the failing source.
    pub source_name: String,
    /// Human-readable cause.
    pub reason: String,
}

impl ExtractionFailure {
    /// Creates a failure for the named source.
    #[must_use]
    pub fn new(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

/// Top-level error type for Dossier.
#[derive(Debug, Error)]
pub enum DossierError {
    /// Staging lifecycle violation.
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Bad configuration.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// An invariant the crate relies on did not hold.
    #[error("Internal error: {message}")]
    Internal {
        /// What went wrong.
        message: String,
    },
}

impl DossierError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is an unknown-id error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Lifecycle(LifecycleError::NotFound { .. }))
    }

    /// Returns true if this is a terminal-state violation.
    #[must_use]
    pub const fn is_invalid_state(&self) -> bool {
        matches!(self, Self::Lifecycle(LifecycleError::InvalidState { .. }))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Lifecycle(_) | Self::Config(_) | Self::Internal { .. } => false,
            Self::Storage(e) => matches!(e, StorageError::Io(_) | StorageError::Locked(_)),
        }
    }
}

/// Result type alias for Dossier operations.
pub type DossierResult<T> = Result<T, DossierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = LifecycleError::NotFound {
            id: StageId::from("abc123def456"),
        };
        let msg = format!("{err}");
        assert!(msg.contains("abc123def456"));
    }

    #[test]
    fn test_invalid_state_message() {
        let err = LifecycleError::InvalidState {
            id: StageId::from("abc123def456"),
            status: StageStatus::Approved,
            attempted: "approve",
        };
        let msg = format!("{err}");
        assert!(msg.contains("approved"));
        assert!(msg.contains("approve"));
    }

    #[test]
    fn test_predicates() {
        let err: DossierError = LifecycleError::NotFound {
            id: StageId::from("x"),
        }
        .into();
        assert!(err.is_not_found());
        assert!(!err.is_invalid_state());
        assert!(!err.is_retryable());

        let err: DossierError = StorageError::Locked("held".to_string()).into();
        assert!(err.is_storage());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_extraction_failure_display() {
        let failure = ExtractionFailure::new("resume.pdf", "unsupported encoding");
        assert_eq!(
            failure.to_string(),
            "Failed to extract resume.pdf: unsupported encoding"
        );
    }
}
