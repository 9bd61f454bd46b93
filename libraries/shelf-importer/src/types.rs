//! Common types for the importer

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::choice::Choice;
use crate::copy::FileOperation;
use crate::distance::DistanceWeights;
use crate::duplicates::{DuplicateKeys, Resolution};
use crate::path_template::LibraryLayout;
use crate::ranker::RecommendationThresholds;
use crate::scanner::DEFAULT_IGNORE;
use crate::{ImportError, Result};

/// Configuration for import sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Managed library folder; without one, files stay where they are
    pub library_dir: Option<PathBuf>,

    /// Destination path templates inside the library
    pub layout: LibraryLayout,

    /// How files reach the library
    pub operation: FileOperation,

    /// Delete the source after a successful copy
    pub delete: bool,

    /// Write resolved metadata back into the files
    pub write: bool,

    /// Look up candidates and ask for choices; off means as-is imports
    pub autotag: bool,

    /// Import individual files instead of albums
    pub singletons: bool,

    /// Split album groups by album artist and album before choosing
    pub group_albums: bool,

    /// Report what would be imported without changing anything
    pub pretend: bool,

    /// Skip groups finished by an interrupted earlier run
    pub resume: bool,

    /// Skip groups whose content was imported before
    pub incremental: bool,

    /// Do not remember skipped groups in incremental mode
    pub incremental_skip_later: bool,

    /// Run pipeline stages concurrently
    pub threaded: bool,

    /// Concurrent lookups in threaded mode
    pub lookup_workers: usize,

    /// Capacity of the queues between stages
    pub queue_size: usize,

    /// Clear existing tags before applying a candidate
    pub from_scratch: bool,

    /// Choice for tasks without a strong recommendation in non-interactive runs
    pub quiet_fallback: Choice,

    /// Resolution for duplicates in non-interactive runs
    pub duplicate_action: Resolution,

    pub duplicate_keys: DuplicateKeys,

    /// Album artist used for compilations
    pub va_name: String,

    /// Share of tracks an artist must exceed to count as the album artist
    pub single_artist_ratio: f64,

    /// Fields set on every imported item, `$field` expands item values
    pub set_fields: BTreeMap<String, String>,

    /// Shell-style patterns for names to skip while scanning
    pub ignore: Vec<String>,

    pub follow_links: bool,

    /// Resume and incremental state; kept in memory when unset
    pub state_file: Option<PathBuf>,

    /// Plain-text import log
    pub log_path: Option<PathBuf>,

    pub weights: DistanceWeights,

    pub thresholds: RecommendationThresholds,

    /// Restrict lookups to these external ids
    pub search_ids: Vec<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            library_dir: None,
            layout: LibraryLayout::default(),
            operation: FileOperation::Copy,
            delete: false,
            write: true,
            autotag: true,
            singletons: false,
            group_albums: false,
            pretend: false,
            resume: true,
            incremental: false,
            incremental_skip_later: false,
            threaded: true,
            lookup_workers: 4,
            queue_size: 16,
            from_scratch: false,
            quiet_fallback: Choice::Skip,
            duplicate_action: Resolution::Skip,
            duplicate_keys: DuplicateKeys::default(),
            va_name: "Various Artists".to_string(),
            single_artist_ratio: 0.5,
            set_fields: BTreeMap::new(),
            ignore: DEFAULT_IGNORE.iter().map(ToString::to_string).collect(),
            follow_links: false,
            state_file: None,
            log_path: None,
            weights: DistanceWeights::default(),
            thresholds: RecommendationThresholds::default(),
            search_ids: Vec::new(),
        }
    }
}

impl ImportConfig {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.lookup_workers == 0 {
            return Err(ImportError::Config("lookup_workers must be at least 1".into()));
        }
        if self.queue_size == 0 {
            return Err(ImportError::Config("queue_size must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.single_artist_ratio) {
            return Err(ImportError::Config(
                "single_artist_ratio must be in [0, 1)".into(),
            ));
        }
        if self.library_dir.is_none() && self.operation != FileOperation::None {
            return Err(ImportError::Config(format!(
                "operation '{}' needs a library_dir",
                self.operation.name()
            )));
        }
        if matches!(self.quiet_fallback, Choice::Candidate(_)) {
            return Err(ImportError::Config(
                "quiet_fallback cannot name a candidate".into(),
            ));
        }
        Ok(())
    }
}

/// Summary of an import run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub albums_imported: usize,
    pub items_imported: usize,
    /// Tasks skipped by choice or as duplicates
    pub skipped: usize,
    pub duplicates_resolved: usize,
    /// Report lines (pretend output and notices)
    pub messages: Vec<String>,
}

impl ImportSummary {
    pub fn summary_text(&self) -> String {
        format!(
            "Import complete: {} albums, {} items, {} skipped, {} duplicates resolved",
            self.albums_imported, self.items_imported, self.skipped, self.duplicates_resolved
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_need_library_for_copy() {
        let config = ImportConfig::default();
        assert!(matches!(config.validate(), Err(ImportError::Config(_))));

        let config = ImportConfig {
            library_dir: Some("/library".into()),
            ..ImportConfig::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ImportConfig =
            serde_json::from_str(r#"{"operation": "move", "duplicate_action": "merge"}"#).unwrap();

        assert_eq!(config.operation, FileOperation::Move);
        assert_eq!(config.duplicate_action, Resolution::Merge);
        assert!(config.resume);
        assert_eq!(config.va_name, "Various Artists");
    }

    #[test]
    fn test_ratio_bounds() {
        let config = ImportConfig {
            operation: FileOperation::None,
            single_artist_ratio: 1.0,
            ..ImportConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
