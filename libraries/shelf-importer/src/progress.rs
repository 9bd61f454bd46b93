//! Resume progress and incremental import history
//!
//! Both live in one JSON state file. Progress maps a top-level path to the
//! groups already handled under it, keyed relative to the scan root so that
//! archive contents keep stable keys across extractions. History records a
//! content fingerprint for every committed group.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shelf_core::types::{AlbumId, ItemId};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::copy::compute_file_hash;
use crate::Result;

/// Catalog entity committed for a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum HistoryEntity {
    Album(AlbumId),
    Item(ItemId),
}

/// One committed group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub fingerprint: String,
    pub entity: Option<HistoryEntity>,
    /// Identity key of the entity when it was committed
    pub identity: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StateData {
    tagprogress: BTreeMap<String, BTreeSet<String>>,
    taghistory: Vec<HistoryEntry>,
}

/// Persistent import state
#[derive(Debug, Default)]
pub struct StateStore {
    path: Option<PathBuf>,
    data: StateData,
}

impl StateStore {
    /// State that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load state from `path`
    ///
    /// A missing or unreadable file yields empty state.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "Ignoring unreadable state file: {}", e);
                StateData::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StateData::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), "Could not read state file: {}", e);
                StateData::default()
            }
        };

        Self {
            path: Some(path),
            data,
        }
    }

    /// Write state atomically (temp file + rename)
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&self.data)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Mark `keys` as done under `toppath`
    pub fn progress_add(&mut self, toppath: &Path, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        self.data
            .tagprogress
            .entry(toppath_key(toppath))
            .or_default()
            .extend(keys.iter().cloned());
    }

    /// Whether every one of `keys` is done under `toppath`
    pub fn progress_has(&self, toppath: &Path, keys: &[String]) -> bool {
        if keys.is_empty() {
            return false;
        }
        self.data
            .tagprogress
            .get(&toppath_key(toppath))
            .is_some_and(|done| keys.iter().all(|k| done.contains(k)))
    }

    /// Whether an earlier run left progress for `toppath`
    pub fn is_resuming(&self, toppath: &Path) -> bool {
        self.data
            .tagprogress
            .get(&toppath_key(toppath))
            .is_some_and(|done| !done.is_empty())
    }

    /// Keys already done under `toppath`
    pub fn progress_done(&self, toppath: &Path) -> BTreeSet<String> {
        self.data
            .tagprogress
            .get(&toppath_key(toppath))
            .cloned()
            .unwrap_or_default()
    }

    pub fn progress_reset(&mut self, toppath: &Path) {
        self.data.tagprogress.remove(&toppath_key(toppath));
    }

    pub fn history_add(&mut self, entry: HistoryEntry) {
        self.data.taghistory.push(entry);
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.data.taghistory
    }
}

fn toppath_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Key for `path` relative to `root`, with `/` separators
///
/// `root` itself maps to `.`.
pub fn progress_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Content fingerprint of a group of files
///
/// Combines each file's root-relative key with its content hash, in sorted
/// order, so the result does not depend on where the group was unpacked.
pub fn fingerprint(root: &Path, files: &[PathBuf]) -> Result<String> {
    let mut entries = Vec::with_capacity(files.len());
    for file in files {
        entries.push((progress_key(root, file), compute_file_hash(file)?));
    }
    entries.sort();

    let mut hasher = Sha256::new();
    for (key, hash) in entries {
        hasher.update(key.as_bytes());
        hasher.update([0]);
        hasher.update(hash.as_bytes());
        hasher.update([0]);
    }
    Ok(hex::encode(hasher.finalize()))
}
