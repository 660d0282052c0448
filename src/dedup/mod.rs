//! Duplicate detection and conflict resolution.
//!
//! Detection runs in two passes: an exact fingerprint comparison, then a
//! fuzzy comparison of a fixed set of descriptive fields. Duplicates are
//! merged field by field by [`DuplicateResolver::resolve_conflicts`].

mod policy;
mod resolver;

pub use policy::parse_timestamp;
pub use resolver::{
    DedupOutcome, DedupReport, DuplicateMatch, DuplicateResolver, MatchKind,
    COMPARISON_FIELDS, DEFAULT_SIMILARITY_THRESHOLD,
};
