//! Applying approved bundles to the canonical store.
//!
//! Each of the four canonical collections is loaded, merged and stored on
//! its own. A failure in one collection is recorded in the
//! [`MergeSummary`] and the remaining collections still merge.
//!
//! Every merge runs [`DuplicateResolver::deduplicate`] over
//! `existing ++ incoming` and repeats the pass until nothing folds, so the
//! stored collection holds no pair the resolver would call duplicates.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bundle::{CanonicalCollection, ContentBundle, EntryCollection, ProfileDocument};
use crate::dedup::DuplicateResolver;
use crate::entry::{Entry, FieldValue};
use crate::storage::{CollectionStore, StorageError};

/// What each canonical collection would receive from a bundle.
///
/// Always carries all four keys, empty lists included.
pub type MergePreview = BTreeMap<CanonicalCollection, Vec<Entry>>;

/// Counts reported by one merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    /// Experience entries that became new profile entries.
    pub cv_added: usize,
    /// New project entries.
    pub projects_added: usize,
    /// New patent entries.
    pub patents_added: usize,
    /// New certification entries.
    pub certs_added: usize,
    /// Incoming entries folded into an entry already in the store.
    pub duplicates_merged: usize,
    /// Collections that could not be merged.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<CollectionFailure>,
}

impl MergeSummary {
    /// Total new entries across all collections.
    #[must_use]
    pub fn total_added(&self) -> usize {
        self.cv_added + self.projects_added + self.patents_added + self.certs_added
    }

    /// Returns true if every touched collection merged.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn record_added(&mut self, collection: CanonicalCollection, added: usize) {
        match collection {
            CanonicalCollection::Profile => self.cv_added += added,
            CanonicalCollection::Projects => self.projects_added += added,
            CanonicalCollection::Patents => self.patents_added += added,
            CanonicalCollection::Certifications => self.certs_added += added,
        }
    }
}

/// One collection's merge failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionFailure {
    /// The collection that failed.
    pub collection: CanonicalCollection,
    /// Rendered storage error.
    pub error: String,
}

/// Two entries of one collection that the resolver classifies as duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvariantViolation {
    /// Collection holding the pair.
    pub collection: CanonicalCollection,
    /// Position of the earlier entry.
    pub first: usize,
    /// Position of the later entry.
    pub second: usize,
    /// The earlier entry.
    pub first_entry: Entry,
    /// The later entry.
    pub second_entry: Entry,
}

/// Read-only view of the canonical store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KnowledgeSnapshot {
    /// Name, summary and experience.
    pub profile: ProfileDocument,
    /// Stored projects.
    pub projects: Vec<Entry>,
    /// Stored patents.
    pub patents: Vec<Entry>,
    /// Stored certifications.
    pub certifications: Vec<Entry>,
}

struct Merged {
    entries: Vec<Entry>,
    added: usize,
    folded: usize,
}

/// Merges bundles into a [`CollectionStore`].
///
/// Read-modify-write of one collection is serialized by a per-collection
/// mutex; different collections merge independently.
pub struct KnowledgeStoreMerger {
    store: Arc<dyn CollectionStore>,
    resolver: DuplicateResolver,
    locks: [Mutex<()>; 4],
}

impl KnowledgeStoreMerger {
    /// Creates a merger over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn CollectionStore>, resolver: DuplicateResolver) -> Self {
        Self {
            store,
            resolver,
            locks: Default::default(),
        }
    }

    /// The resolver used for canonical-side deduplication.
    #[must_use]
    pub const fn resolver(&self) -> &DuplicateResolver {
        &self.resolver
    }

    /// Merges `bundle` into the canonical store.
    ///
    /// Only collections the bundle has content for are loaded and written.
    /// `name_hint` sets the profile name if none is recorded yet. Absent
    /// collections start empty; corrupt ones are quarantined and then
    /// treated as empty.
    pub fn merge(&self, bundle: &ContentBundle, name_hint: Option<&str>) -> MergeSummary {
        let mut summary = MergeSummary::default();

        if !bundle.experience.is_empty() || bundle.summary().is_some() {
            let result = self.merge_profile(bundle, name_hint);
            self.settle(CanonicalCollection::Profile, result, &mut summary);
        }

        for collection in EntryCollection::ALL {
            let incoming = Self::normalized(bundle, collection);
            if incoming.is_empty() {
                continue;
            }
            let result = self.merge_collection(collection, incoming);
            self.settle(collection.canonical(), result, &mut summary);
        }

        info!(
            cv_added = summary.cv_added,
            projects_added = summary.projects_added,
            patents_added = summary.patents_added,
            certs_added = summary.certs_added,
            duplicates_merged = summary.duplicates_merged,
            failures = summary.failures.len(),
            "merged bundle into knowledge store"
        );
        summary
    }

    /// What each canonical collection would receive from `bundle`.
    ///
    /// Experience and the summary (as a synthetic `{summary}` entry) route
    /// to the profile; patents and certifications are shown normalized.
    #[must_use]
    pub fn preview(bundle: &ContentBundle) -> MergePreview {
        let mut profile = bundle.experience.clone();
        if let Some(text) = bundle.summary() {
            profile.push(Entry::new().with("summary", text));
        }

        let mut preview = MergePreview::new();
        preview.insert(CanonicalCollection::Profile, profile);
        for collection in EntryCollection::ALL {
            preview.insert(collection.canonical(), Self::normalized(bundle, collection));
        }
        preview
    }

    /// Pairs in the canonical store that violate the no-duplicates
    /// invariant.
    ///
    /// Merges leave no such pairs behind; they indicate edits made outside
    /// the merger.
    ///
    /// # Errors
    ///
    /// Returns the storage error of the first collection that cannot be
    /// read. Nothing is quarantined.
    pub fn audit(&self) -> Result<Vec<InvariantViolation>, StorageError> {
        let snapshot = self.snapshot()?;
        let collections = [
            (CanonicalCollection::Profile, &snapshot.profile.experience),
            (CanonicalCollection::Projects, &snapshot.projects),
            (CanonicalCollection::Patents, &snapshot.patents),
            (CanonicalCollection::Certifications, &snapshot.certifications),
        ];

        let mut violations = Vec::new();
        for (collection, entries) in collections {
            for (first, second) in self.resolver.find_violations(entries) {
                violations.push(InvariantViolation {
                    collection,
                    first,
                    second,
                    first_entry: entries[first].clone(),
                    second_entry: entries[second].clone(),
                });
            }
        }
        if !violations.is_empty() {
            warn!(count = violations.len(), "canonical store holds duplicate entries");
        }
        Ok(violations)
    }

    /// Reads all four collections.
    ///
    /// # Errors
    ///
    /// Returns the storage error of the first collection that cannot be read.
    pub fn snapshot(&self) -> Result<KnowledgeSnapshot, StorageError> {
        let load = |c: EntryCollection| self.store.load_entries(c).map(Option::unwrap_or_default);
        Ok(KnowledgeSnapshot {
            profile: self.store.load_profile()?.unwrap_or_default(),
            projects: load(EntryCollection::Projects)?,
            patents: load(EntryCollection::Patents)?,
            certifications: load(EntryCollection::Certifications)?,
        })
    }

    fn settle(
        &self,
        collection: CanonicalCollection,
        result: Result<Merged, StorageError>,
        summary: &mut MergeSummary,
    ) {
        match result {
            Ok(merged) => {
                debug!(
                    collection = collection.name(),
                    added = merged.added,
                    folded = merged.folded,
                    total = merged.entries.len(),
                    "collection merged"
                );
                summary.record_added(collection, merged.added);
                summary.duplicates_merged += merged.folded;
            }
            Err(e) => {
                warn!(collection = collection.name(), error = %e, "collection merge failed");
                summary.failures.push(CollectionFailure {
                    collection,
                    error: e.to_string(),
                });
            }
        }
    }

    fn lock(&self, collection: CanonicalCollection) -> Result<std::sync::MutexGuard<'_, ()>, StorageError> {
        self.locks[collection as usize]
            .lock()
            .map_err(|_| StorageError::Backend(format!("poisoned lock: merge.{collection}")))
    }

    fn recover<T>(
        &self,
        collection: CanonicalCollection,
        loaded: Result<Option<T>, StorageError>,
    ) -> Result<Option<T>, StorageError> {
        match loaded {
            Err(e) if e.is_corrupt() => {
                warn!(collection = collection.name(), error = %e, "corrupt collection treated as empty");
                self.store.quarantine(collection)?;
                Ok(None)
            }
            other => other,
        }
    }

    // Folding can widen a cluster until it matches another one, so passes
    // repeat until one merges nothing. Each repeat shrinks the list, which
    // bounds the loop. `from_store` marks clusters holding a stored entry.
    fn dedup_into(&self, existing: Vec<Entry>, incoming: Vec<Entry>) -> Merged {
        let incoming_len = incoming.len();
        let mut from_store = vec![true; existing.len()];
        from_store.resize(existing.len() + incoming_len, false);
        let mut entries = existing;
        entries.extend(incoming);

        let mut passes = 0usize;
        loop {
            let report = self.resolver.deduplicate_with_report(entries);
            passes += 1;
            let settled = report.merged_count() == 0;
            let mut clusters = vec![false; report.entries.len()];
            for (outcome, stored) in report.outcomes.iter().zip(&from_store) {
                clusters[outcome.index()] |= *stored;
            }
            entries = report.entries;
            from_store = clusters;
            if settled {
                break;
            }
        }
        if passes > 2 {
            debug!(passes, "widened clusters folded across passes");
        }

        let added = from_store.iter().filter(|stored| !**stored).count();
        Merged {
            entries,
            added,
            folded: incoming_len - added,
        }
    }

    fn merge_profile(&self, bundle: &ContentBundle, name_hint: Option<&str>) -> Result<Merged, StorageError> {
        let _guard = self.lock(CanonicalCollection::Profile)?;
        let mut profile = self
            .recover(CanonicalCollection::Profile, self.store.load_profile())?
            .unwrap_or_default();

        if profile.name.trim().is_empty() {
            if let Some(hint) = name_hint.map(str::trim).filter(|h| !h.is_empty()) {
                profile.name = hint.to_string();
            }
        }

        if let Some(incoming) = bundle.summary() {
            let longer = profile
                .summary
                .as_deref()
                .map_or(true, |current| incoming.chars().count() > current.chars().count());
            if longer {
                profile.summary = Some(incoming.to_string());
            }
        }

        let existing = std::mem::take(&mut profile.experience);
        let merged = self.dedup_into(existing, bundle.experience.clone());
        profile.experience = merged.entries;
        self.store.store_profile(&profile)?;

        Ok(Merged {
            entries: profile.experience,
            added: merged.added,
            folded: merged.folded,
        })
    }

    fn merge_collection(&self, collection: EntryCollection, incoming: Vec<Entry>) -> Result<Merged, StorageError> {
        let _guard = self.lock(collection.canonical())?;
        let existing = self
            .recover(collection.canonical(), self.store.load_entries(collection))?
            .unwrap_or_default();

        let merged = self.dedup_into(existing, incoming);
        self.store.store_entries(collection, &merged.entries)?;
        Ok(merged)
    }

    fn normalized(bundle: &ContentBundle, collection: EntryCollection) -> Vec<Entry> {
        match collection {
            EntryCollection::Projects => bundle.projects.clone(),
            EntryCollection::Patents => bundle.patents.iter().map(normalize_patent).collect(),
            EntryCollection::Certifications => {
                bundle.certifications.iter().map(normalize_certification).collect()
            }
        }
    }
}

/// Reduces a patent to `{title, description, year}`.
///
/// `description` defaults to the empty string and `year` to null. An entry
/// without a `title` becomes `{title}` built from all of its text.
#[must_use]
pub fn normalize_patent(entry: &Entry) -> Entry {
    match entry.get("title").filter(|v| !v.is_null()) {
        Some(title) => Entry::new()
            .with("title", title.clone())
            .with(
                "description",
                entry.get("description").cloned().unwrap_or_else(|| FieldValue::from("")),
            )
            .with("year", entry.get("year").cloned().unwrap_or(FieldValue::Null)),
        None => Entry::new().with("title", entry.display_text()),
    }
}

/// Reduces a certification to `{name}`, taken from `title`, then `name`,
/// then all of the entry's text.
#[must_use]
pub fn normalize_certification(entry: &Entry) -> Entry {
    let name = ["title", "name"]
        .iter()
        .find_map(|key| entry.get(key).filter(|v| !v.is_null()).cloned())
        .unwrap_or_else(|| FieldValue::from(entry.display_text()));
    Entry::new().with("name", name)
}
