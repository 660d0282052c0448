//! The duplicate resolver.

use serde::Serialize;
use tracing::debug;

use crate::entry::{Entry, FieldValue};
use crate::error::ConfigError;
use crate::hash::{ContentHasher, Fingerprint};
use crate::similarity::similarity;

use super::policy;

/// Default mean-similarity threshold above which two entries are duplicates.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Fields compared by the fuzzy pass, when present in both entries.
pub const COMPARISON_FIELDS: [&str; 5] = ["title", "description", "summary", "role", "company"];

/// How a duplicate was recognized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchKind {
    /// Fingerprints are equal.
    Exact,
    /// Mean similarity over the shared comparison fields exceeded the threshold.
    Fuzzy {
        /// The mean similarity.
        score: f64,
        /// Number of comparison fields both entries carried.
        fields_compared: usize,
    },
}

/// A positive duplicate decision.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateMatch<'a> {
    /// Position of the matched entry in the searched sequence.
    pub index: usize,
    /// The matched entry.
    pub entry: &'a Entry,
    /// Which pass matched.
    pub kind: MatchKind,
}

/// What happened to one input entry during [`DuplicateResolver::deduplicate_with_report`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DedupOutcome {
    /// The entry started a new cluster at `index` of the output.
    Appended {
        /// Output position.
        index: usize,
    },
    /// The entry was merged into the cluster at `index` of the output.
    Merged {
        /// Output position.
        index: usize,
        /// How the duplicate was recognized.
        kind: MatchKind,
    },
}

impl DedupOutcome {
    /// Returns true if the entry started a new cluster.
    #[must_use]
    pub const fn is_appended(&self) -> bool {
        matches!(self, Self::Appended { .. })
    }

    /// Output position of the cluster the entry ended up in.
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::Appended { index } | Self::Merged { index, .. } => *index,
        }
    }
}

/// Deduplicated entries plus one outcome per input entry, in input order.
#[derive(Debug, Clone, Default)]
pub struct DedupReport {
    /// One entry per distinct cluster, in order of first appearance.
    pub entries: Vec<Entry>,
    /// Outcome for each input entry.
    pub outcomes: Vec<DedupOutcome>,
}

impl DedupReport {
    /// Number of input entries that were merged into an earlier cluster.
    #[must_use]
    pub fn merged_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_appended()).count()
    }
}

fn comparable_text(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Null => None,
        other => Some(other.to_string()),
    }
}

/// Decides whether entries duplicate each other and merges those that do.
///
/// The resolver is pure: every method is a total function of its inputs and
/// the configured threshold.
///
/// # Examples
///
/// ```
/// use dossier::{DuplicateResolver, Entry};
///
/// let resolver = DuplicateResolver::default();
/// let a = Entry::new().with("title", "Senior Software Engineer").with("company", "Tech Corp");
/// let b = Entry::new().with("title", "Sr. Software Engineer").with("company", "Tech Corp");
///
/// assert!(resolver.is_duplicate(&a, std::slice::from_ref(&b)).is_some());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplicateResolver {
    similarity_threshold: f64,
}

impl Default for DuplicateResolver {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl DuplicateResolver {
    /// Creates a resolver with a custom threshold.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` unless `0.0 < threshold < 1.0`.
    pub fn new(similarity_threshold: f64) -> Result<Self, ConfigError> {
        if !(similarity_threshold > 0.0 && similarity_threshold < 1.0) {
            return Err(ConfigError::Invalid {
                field: "similarity_threshold",
                reason: format!("must be in (0, 1), got {similarity_threshold}"),
            });
        }
        Ok(Self {
            similarity_threshold,
        })
    }

    /// The configured threshold.
    #[must_use]
    pub const fn similarity_threshold(&self) -> f64 {
        self.similarity_threshold
    }

    /// Mean similarity over the comparison fields present (and non-null) in
    /// both entries, with the number of fields compared. `None` if no field
    /// is shared.
    #[must_use]
    pub fn field_similarity(a: &Entry, b: &Entry) -> Option<(f64, usize)> {
        let mut total = 0.0;
        let mut compared = 0usize;
        for field in COMPARISON_FIELDS {
            let (Some(left), Some(right)) = (
                a.get(field).and_then(comparable_text),
                b.get(field).and_then(comparable_text),
            ) else {
                continue;
            };
            total += similarity(&left, &right);
            compared += 1;
        }
        if compared == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = total / compared as f64;
        Some((mean, compared))
    }

    fn fuzzy_match(&self, a: &Entry, b: &Entry) -> Option<MatchKind> {
        let (score, fields_compared) = Self::field_similarity(a, b)?;
        (score > self.similarity_threshold).then_some(MatchKind::Fuzzy {
            score,
            fields_compared,
        })
    }

    fn find_match<'a>(
        &self,
        candidate: &Entry,
        candidate_fp: Fingerprint,
        existing: &'a [Entry],
        existing_fps: &[Fingerprint],
    ) -> Option<DuplicateMatch<'a>> {
        if let Some(index) = existing_fps.iter().position(|fp| *fp == candidate_fp) {
            return Some(DuplicateMatch {
                index,
                entry: &existing[index],
                kind: MatchKind::Exact,
            });
        }

        existing.iter().enumerate().find_map(|(index, entry)| {
            self.fuzzy_match(candidate, entry).map(|kind| DuplicateMatch {
                index,
                entry,
                kind,
            })
        })
    }

    /// Checks `candidate` against `existing`.
    ///
    /// An exact fingerprint match anywhere in `existing` wins first. Failing
    /// that, the first entry whose mean comparison-field similarity exceeds
    /// the threshold is returned, so the order of `existing` breaks ties.
    /// Entries that share no comparison field never match fuzzily.
    #[must_use]
    pub fn is_duplicate<'a>(&self, candidate: &Entry, existing: &'a [Entry]) -> Option<DuplicateMatch<'a>> {
        let fps: Vec<Fingerprint> = existing.iter().map(ContentHasher::fingerprint).collect();
        self.find_match(candidate, ContentHasher::fingerprint(candidate), existing, &fps)
    }

    /// Merges two duplicates into a new entry.
    ///
    /// The entry with the later `timestamp` becomes the base (ties and
    /// missing timestamps keep `existing`). The incoming entry is then
    /// overlaid: list fields become the sorted union, text fields are
    /// replaced only by strictly longer incoming text, and fields the base
    /// lacks are added. `timestamp` follows the same text rule.
    #[must_use]
    pub fn resolve_conflicts(&self, incoming: &Entry, existing: &Entry) -> Entry {
        policy::resolve(incoming, existing)
    }

    /// Collapses duplicates in `entries`, keeping first-appearance order.
    ///
    /// This is a left fold: each entry is checked against the clusters built
    /// so far and merged pairwise into the one it matches. Because a merge
    /// only sees the pair involved, feeding the same entries in a different
    /// order can produce different merged text when three or more collide.
    /// A merged entry is not re-checked against later clusters, so one pass
    /// can leave a widened entry that now matches another cluster; callers
    /// that need a duplicate-free result repeat the pass until nothing merges.
    #[must_use]
    pub fn deduplicate(&self, entries: Vec<Entry>) -> Vec<Entry> {
        self.deduplicate_with_report(entries).entries
    }

    /// Like [`deduplicate`](Self::deduplicate), also reporting what happened
    /// to each input entry.
    #[must_use]
    pub fn deduplicate_with_report(&self, entries: Vec<Entry>) -> DedupReport {
        let mut report = DedupReport {
            entries: Vec::with_capacity(entries.len()),
            outcomes: Vec::with_capacity(entries.len()),
        };
        let mut fps: Vec<Fingerprint> = Vec::with_capacity(entries.len());

        for entry in entries {
            let fp = ContentHasher::fingerprint(&entry);
            let found = self
                .find_match(&entry, fp, &report.entries, &fps)
                .map(|m| (m.index, m.kind));

            match found {
                Some((index, kind)) => {
                    let merged = self.resolve_conflicts(&entry, &report.entries[index]);
                    debug!(index, ?kind, "merged duplicate entry");
                    fps[index] = ContentHasher::fingerprint(&merged);
                    report.entries[index] = merged;
                    report.outcomes.push(DedupOutcome::Merged { index, kind });
                }
                None => {
                    let index = report.entries.len();
                    report.entries.push(entry);
                    fps.push(fp);
                    report.outcomes.push(DedupOutcome::Appended { index });
                }
            }
        }

        report
    }

    /// Returns every pair `(i, j)`, `i < j`, that this resolver would
    /// classify as duplicates.
    ///
    /// A collection on which [`deduplicate`](Self::deduplicate) merges
    /// nothing yields no pairs.
    #[must_use]
    pub fn find_violations(&self, entries: &[Entry]) -> Vec<(usize, usize)> {
        let fps: Vec<Fingerprint> = entries.iter().map(ContentHasher::fingerprint).collect();
        let mut pairs = Vec::new();
        for j in 1..entries.len() {
            for i in 0..j {
                if fps[i] == fps[j] || self.fuzzy_match(&entries[j], &entries[i]).is_some() {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pairs: &[(&str, &str)]) -> Entry {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        assert!(DuplicateResolver::new(0.0).is_err());
        assert!(DuplicateResolver::new(1.0).is_err());
        assert!(DuplicateResolver::new(f64::NAN).is_err());
        assert!(DuplicateResolver::new(0.5).is_ok());
    }

    #[test]
    fn test_exact_match_short_circuits() {
        let resolver = DuplicateResolver::default();
        let a = entry(&[("title", "Software Engineer"), ("company", "Tech Corp")]);
        let existing = vec![
            entry(&[("title", "Software Engineers"), ("company", "Tech Corp")]),
            a.clone(),
        ];
        let m = resolver.is_duplicate(&a, &existing).unwrap();
        // The fuzzy candidate at index 0 is skipped in favour of the exact one.
        assert_eq!(m.index, 1);
        assert_eq!(m.kind, MatchKind::Exact);
    }

    #[test]
    fn test_first_fuzzy_match_wins() {
        let resolver = DuplicateResolver::default();
        let candidate = entry(&[("title", "Sr. Software Engineer")]);
        let existing = vec![
            entry(&[("title", "Product Manager")]),
            entry(&[("title", "Senior Software Engineer")]),
            entry(&[("title", "Software Engineer")]),
        ];
        let m = resolver.is_duplicate(&candidate, &existing).unwrap();
        assert_eq!(m.index, 1);
        assert!(matches!(m.kind, MatchKind::Fuzzy { fields_compared: 1, .. }));
    }

    #[test]
    fn test_no_shared_fields_never_fuzzy() {
        let resolver = DuplicateResolver::default();
        let a = entry(&[("title", "Engineer")]);
        let b = entry(&[("company", "Tech Corp")]);
        assert!(resolver.is_duplicate(&a, &[b]).is_none());
    }

    #[test]
    fn test_non_comparison_fields_ignored_by_fuzzy_pass() {
        let resolver = DuplicateResolver::default();
        let a = entry(&[("title", "Engineer"), ("location", "Berlin")]);
        let b = entry(&[("title", "Engineer"), ("location", "Tokyo")]);
        assert!(matches!(
            resolver.is_duplicate(&a, &[b]).map(|m| m.kind),
            Some(MatchKind::Fuzzy { .. })
        ));
    }

    #[test]
    fn test_null_fields_are_skipped() {
        let resolver = DuplicateResolver::default();
        let a = Entry::new().with("title", FieldValue::Null).with("company", "Tech Corp");
        let b = Entry::new().with("title", "Something Else").with("company", "Tech Corp");
        assert_eq!(DuplicateResolver::field_similarity(&a, &b), Some((1.0, 1)));
        assert!(resolver.is_duplicate(&a, &[b]).is_some());
        assert!(resolver.is_duplicate(&a, &[]).is_none());
    }

    #[test]
    fn test_threshold_is_strict() {
        let strict = DuplicateResolver::new(0.99).unwrap();
        let a = entry(&[("title", "Software Engineer")]);
        let b = entry(&[("title", "Sr. Software Engineer")]);
        assert!(strict.is_duplicate(&a, std::slice::from_ref(&b)).is_none());
        assert!(DuplicateResolver::default().is_duplicate(&a, &[b]).is_some());
    }

    #[test]
    fn test_report_outcomes() {
        let resolver = DuplicateResolver::default();
        let report = resolver.deduplicate_with_report(vec![
            entry(&[("title", "Software Engineer")]),
            entry(&[("title", "Product Manager")]),
            entry(&[("title", "Sr. Software Engineer")]),
        ]);
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.merged_count(), 1);
        assert_eq!(report.outcomes[0], DedupOutcome::Appended { index: 0 });
        assert_eq!(report.outcomes[1], DedupOutcome::Appended { index: 1 });
        assert!(matches!(report.outcomes[2], DedupOutcome::Merged { index: 0, .. }));
    }

    #[test]
    fn test_find_violations() {
        let resolver = DuplicateResolver::default();
        let entries = vec![
            entry(&[("title", "Software Engineer")]),
            entry(&[("title", "Product Manager")]),
            entry(&[("title", "Software Engineer")]),
        ];
        assert_eq!(resolver.find_violations(&entries), vec![(0, 2)]);
        let clean = resolver.deduplicate(entries);
        assert!(resolver.find_violations(&clean).is_empty());
    }
}
