//! Ingestion facade.
//!
//! Turning documents into entries is the job of an [`Extractor`]; this
//! module only aggregates what extractors produce, enriches it from an
//! optional external profile, and hands the result to staging or straight
//! to the merger.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bundle::{ContentBundle, SourceInfo};
use crate::entry::Entry;
use crate::error::{DossierResult, ExtractionFailure};
use crate::merge::MergeSummary;
use crate::staging::{StageId, StagingStore};

/// Produces a bundle from one source document.
pub trait Extractor: Send + Sync {
    /// Extracts `path`.
    ///
    /// # Errors
    ///
    /// Returns an [`ExtractionFailure`] naming the document if it cannot be
    /// read or parsed.
    fn extract(&self, path: &Path) -> Result<ContentBundle, ExtractionFailure>;
}

/// Fields taken from an external profile page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalProfile {
    /// One-line role description.
    #[serde(default)]
    pub headline: Option<String>,
    /// Free-text biography.
    #[serde(default)]
    pub about: Option<String>,
}

/// Fetches an external profile.
pub trait ProfileFetcher: Send + Sync {
    /// Fetches the profile at `url`.
    ///
    /// # Errors
    ///
    /// Returns an [`ExtractionFailure`] naming the URL on any failure.
    fn fetch(&self, url: &str) -> Result<ExternalProfile, ExtractionFailure>;
}

/// Reads a [`ContentBundle`] serialized as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBundleExtractor;

impl Extractor for JsonBundleExtractor {
    fn extract(&self, path: &Path) -> Result<ContentBundle, ExtractionFailure> {
        let name = path.display().to_string();
        let raw = fs::read_to_string(path).map_err(|e| ExtractionFailure::new(&name, e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| ExtractionFailure::new(name, e.to_string()))
    }
}

/// Where an ingested bundle goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    /// Propose for review.
    #[default]
    Staged,
    /// Merge immediately, skipping review.
    Direct,
}

/// One ingestion call.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    /// Documents to extract, in order.
    pub files: Vec<PathBuf>,
    /// External profile page to enrich the bundle from.
    pub profile_url: Option<String>,
    /// Display name for the profile.
    pub name_hint: Option<String>,
    /// Stage for review or merge directly.
    pub mode: IngestMode,
}

/// Result of an ingestion.
///
/// Exactly one of `stage_id` and `merge_summary` is set, matching the
/// request mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    /// Set in staged mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<StageId>,
    /// Set in direct mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_summary: Option<MergeSummary>,
    /// Entries in the aggregated bundle.
    pub entries: usize,
    /// Sources that could not be extracted or fetched.
    pub warnings: Vec<ExtractionFailure>,
}

/// Runs extraction over a batch of files and routes the result.
pub struct Ingestor {
    staging: Arc<StagingStore>,
    extractor: Arc<dyn Extractor>,
    fetcher: Option<Arc<dyn ProfileFetcher>>,
}

impl Ingestor {
    /// Creates an ingestor without a profile fetcher.
    #[must_use]
    pub fn new(staging: Arc<StagingStore>, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            staging,
            extractor,
            fetcher: None,
        }
    }

    /// Enables external profile enrichment.
    #[must_use]
    pub fn with_profile_fetcher(mut self, fetcher: Arc<dyn ProfileFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Extracts every file, enriches from the profile URL and stages or
    /// merges the aggregate.
    ///
    /// A file that fails to extract is reported as a warning and the rest
    /// of the batch continues. Without a fetcher a profile URL is recorded
    /// in the source info only.
    ///
    /// # Errors
    ///
    /// Returns a storage error if staging the bundle fails.
    pub fn ingest(&self, request: IngestRequest) -> DossierResult<IngestOutcome> {
        let mut bundle = ContentBundle::new();
        let mut warnings = Vec::new();

        for path in &request.files {
            match self.extractor.extract(path) {
                Ok(extracted) => bundle.absorb(extracted),
                Err(failure) => {
                    warn!(source = %failure.source_name, reason = %failure.reason, "extraction failed");
                    warnings.push(failure);
                }
            }
        }

        if let (Some(url), Some(fetcher)) = (request.profile_url.as_deref(), self.fetcher.as_ref()) {
            match fetcher.fetch(url) {
                Ok(profile) => enrich(&mut bundle, profile),
                Err(failure) => {
                    warn!(source = %failure.source_name, reason = %failure.reason, "profile fetch failed");
                    warnings.push(failure);
                }
            }
        }

        let entries = bundle.entry_count();
        let source_info = SourceInfo {
            files: request.files.iter().map(|p| p.display().to_string()).collect(),
            profile_url: request.profile_url,
            name_hint: request.name_hint,
        };

        let outcome = match request.mode {
            IngestMode::Staged => IngestOutcome {
                stage_id: Some(self.staging.propose(bundle, source_info)?),
                merge_summary: None,
                entries,
                warnings,
            },
            IngestMode::Direct => IngestOutcome {
                stage_id: None,
                merge_summary: Some(
                    self.staging
                        .merger()
                        .merge(&bundle, source_info.name_hint.as_deref()),
                ),
                entries,
                warnings,
            },
        };

        info!(
            files = request.files.len(),
            entries,
            warnings = outcome.warnings.len(),
            mode = ?request.mode,
            "ingestion finished"
        );
        Ok(outcome)
    }
}

// `about` fills a missing summary; `headline` stands in for experience
// only when none was extracted.
fn enrich(bundle: &mut ContentBundle, profile: ExternalProfile) {
    let non_blank = |s: Option<String>| s.filter(|v| !v.trim().is_empty());

    if bundle.summary().is_none() {
        if let Some(about) = non_blank(profile.about) {
            bundle.summary = Some(about);
        }
    }
    if bundle.experience.is_empty() {
        if let Some(headline) = non_blank(profile.headline) {
            bundle.experience.push(Entry::new().with("title", headline));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrich_fills_only_gaps() {
        let mut bundle = ContentBundle {
            summary: Some("Own summary".to_string()),
            ..ContentBundle::default()
        };
        enrich(
            &mut bundle,
            ExternalProfile {
                headline: Some("Staff Engineer".to_string()),
                about: Some("Profile about text".to_string()),
            },
        );
        assert_eq!(bundle.summary(), Some("Own summary"));
        assert_eq!(bundle.experience, vec![Entry::new().with("title", "Staff Engineer")]);
    }

    #[test]
    fn test_enrich_keeps_extracted_experience() {
        let mut bundle = ContentBundle {
            experience: vec![Entry::new().with("title", "Engineer")],
            ..ContentBundle::default()
        };
        enrich(
            &mut bundle,
            ExternalProfile {
                headline: Some("Staff Engineer".to_string()),
                about: None,
            },
        );
        assert_eq!(bundle.experience.len(), 1);
        assert_eq!(bundle.experience[0].text("title"), Some("Engineer"));
        assert!(bundle.summary().is_none());
    }

    #[test]
    fn test_json_extractor_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ nope").unwrap();
        let failure = JsonBundleExtractor.extract(&path).unwrap_err();
        assert!(failure.source_name.ends_with("broken.json"));
    }
}
