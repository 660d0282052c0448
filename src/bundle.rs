//! Content bundles and the canonical collections they are routed into.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entry::Entry;

/// One ingestion's output: four entry collections plus an optional summary.
///
/// A bundle is owned by whichever stage currently holds it (extraction,
/// staging, merge) and is moved between them rather than shared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBundle {
    /// Work history, merged into the profile.
    #[serde(default)]
    pub experience: Vec<Entry>,

    /// Projects.
    #[serde(default)]
    pub projects: Vec<Entry>,

    /// Patents, normalized on merge.
    #[serde(default)]
    pub patents: Vec<Entry>,

    /// Certifications, normalized on merge.
    #[serde(default)]
    pub certifications: Vec<Entry>,

    /// Free-text profile summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ContentBundle {
    /// Creates an empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the summary if it is present and not blank.
    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Returns true if the bundle carries no entries and no summary.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experience.is_empty()
            && self.projects.is_empty()
            && self.patents.is_empty()
            && self.certifications.is_empty()
            && self.summary().is_none()
    }

    /// Total number of entries across the four collections.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.experience.len() + self.projects.len() + self.patents.len() + self.certifications.len()
    }

    /// Folds another bundle into this one.
    ///
    /// Collections are extended in arrival order; a non-blank summary from
    /// `other` replaces the current one.
    pub fn absorb(&mut self, other: ContentBundle) {
        let has_summary = other.summary().is_some();
        self.experience.extend(other.experience);
        self.projects.extend(other.projects);
        self.patents.extend(other.patents);
        self.certifications.extend(other.certifications);
        if has_summary {
            self.summary = other.summary;
        }
    }
}

/// Where a bundle came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Source file identifiers, in the order they were ingested.
    #[serde(default)]
    pub files: Vec<String>,

    /// External profile page the bundle was enriched from.
    #[serde(default)]
    pub profile_url: Option<String>,

    /// Display name to record on the profile if none is set yet.
    #[serde(default)]
    pub name_hint: Option<String>,
}

impl SourceInfo {
    /// Source info for a list of files.
    #[must_use]
    pub fn from_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Persisted shape of the profile collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDocument {
    /// Display name; set once from a name hint and never overwritten.
    #[serde(default)]
    pub name: String,

    /// Longest summary seen so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Deduplicated work history.
    #[serde(default)]
    pub experience: Vec<Entry>,
}

/// The four independently persisted collections of the canonical store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalCollection {
    /// Name, summary and work experience.
    Profile,
    /// Project entries.
    Projects,
    /// Patents reduced to `{title, description, year}`.
    Patents,
    /// Certifications reduced to `{name}`.
    Certifications,
}

impl CanonicalCollection {
    /// All collections, in merge order.
    pub const ALL: [Self; 4] = [Self::Profile, Self::Projects, Self::Patents, Self::Certifications];

    /// Stable name used for file names and summaries.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Projects => "projects",
            Self::Patents => "patents",
            Self::Certifications => "certifications",
        }
    }
}

impl fmt::Display for CanonicalCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Canonical collections that are a plain list of entries.
///
/// The profile collection carries extra document fields and is handled
/// separately by the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryCollection {
    /// Project entries.
    Projects,
    /// Patent entries.
    Patents,
    /// Certification entries.
    Certifications,
}

impl EntryCollection {
    /// All list collections.
    pub const ALL: [Self; 3] = [Self::Projects, Self::Patents, Self::Certifications];

    /// Stable name used for file names and summaries.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.canonical().name()
    }

    /// The canonical collection this list is stored as.
    #[must_use]
    pub const fn canonical(self) -> CanonicalCollection {
        match self {
            Self::Projects => CanonicalCollection::Projects,
            Self::Patents => CanonicalCollection::Patents,
            Self::Certifications => CanonicalCollection::Certifications,
        }
    }
}

impl fmt::Display for EntryCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
