//! Duplicate detection and resolution
//!
//! A task collides with catalog entries that agree with it on every
//! configured key field. Entries the task is re-importing (same source
//! paths) are replacements, not duplicates.

use serde::{Deserialize, Serialize};
use shelf_core::types::{Album, AlbumId, Item};
use shelf_core::Catalog;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::copy::remove_library_file;
use crate::task::ImportTask;
use crate::{ImportError, Result};

/// How to handle a task that collides with catalog entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Drop the incoming task
    #[default]
    Skip,
    /// Store the incoming task next to the existing entries
    KeepBoth,
    /// Delete the existing entries and their library files first
    Remove,
    /// Fold everything into a single entry
    Merge,
}

impl Resolution {
    pub fn name(self) -> &'static str {
        match self {
            Resolution::Skip => "skip",
            Resolution::KeepBoth => "keep_both",
            Resolution::Remove => "remove",
            Resolution::Merge => "merge",
        }
    }
}

impl FromStr for Resolution {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        [
            Resolution::Skip,
            Resolution::KeepBoth,
            Resolution::Remove,
            Resolution::Merge,
        ]
        .into_iter()
        .find(|r| r.name() == s)
        .ok_or_else(|| ImportError::Config(format!("unknown duplicate action '{s}'")))
    }
}

/// Fields that make two entries duplicates, per entity kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateKeys {
    pub album: Vec<String>,
    pub item: Vec<String>,
}

impl Default for DuplicateKeys {
    fn default() -> Self {
        Self {
            album: vec!["albumartist".to_string(), "album".to_string()],
            item: vec!["artist".to_string(), "title".to_string()],
        }
    }
}

/// Catalog entries colliding with a task
#[derive(Debug, Clone, PartialEq)]
pub enum Duplicates {
    Albums(Vec<Album>),
    Items(Vec<Item>),
}

impl Duplicates {
    pub fn len(&self) -> usize {
        match self {
            Duplicates::Albums(albums) => albums.len(),
            Duplicates::Items(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Look up catalog entries that collide with `task`
///
/// Albums whose items all come from the task's own source files, and items
/// at those paths, are skipped.
pub async fn find_duplicates(
    catalog: &dyn Catalog,
    task: &ImportTask,
    keys: &DuplicateKeys,
) -> Result<Option<Duplicates>> {
    let Some(query) = task.duplicate_query(keys) else {
        return Ok(None);
    };
    let own_paths: HashSet<&Path> = task.items.iter().map(Item::path).collect();

    let duplicates = if task.is_album() {
        let mut found = Vec::new();
        for album in catalog.find_albums(&query).await? {
            let Some(id) = album.id else { continue };
            let album_items = catalog.album_items(id).await?;
            let reimport = !album_items.is_empty()
                && album_items.iter().all(|i| own_paths.contains(i.path()));
            if !reimport {
                found.push(album);
            }
        }
        Duplicates::Albums(found)
    } else {
        let found = catalog
            .find_items(&query)
            .await?
            .into_iter()
            .filter(|i| !own_paths.contains(i.path()))
            .collect();
        Duplicates::Items(found)
    };

    if duplicates.is_empty() {
        Ok(None)
    } else {
        tracing::info!(count = duplicates.len(), paths = ?task.paths(), "Found duplicates");
        Ok(Some(duplicates))
    }
}

/// Remove duplicate entries from the catalog
///
/// Their files are deleted too when they live inside `library_dir`, unless
/// they are listed in `keep`.
pub async fn remove_duplicates(
    catalog: &dyn Catalog,
    duplicates: &Duplicates,
    library_dir: Option<&Path>,
    keep: &[PathBuf],
) -> Result<()> {
    let mut files = Vec::new();

    match duplicates {
        Duplicates::Albums(albums) => {
            for id in albums.iter().filter_map(|a| a.id) {
                files.extend(catalog.album_items(id).await?.into_iter().map(|i| i.path));
                catalog.remove_album(id).await?;
                tracing::debug!(album_id = id, "Removed duplicate album");
            }
        }
        Duplicates::Items(items) => {
            for item in items {
                if let Some(id) = item.id {
                    catalog.remove_item(id).await?;
                    files.push(item.path.clone());
                    tracing::debug!(item_id = id, "Removed duplicate item");
                }
            }
        }
    }

    if let Some(library_dir) = library_dir {
        for file in files.iter().filter(|f| !keep.contains(f)) {
            remove_library_file(file, library_dir)?;
        }
    }
    Ok(())
}

/// Merge incoming album items into the first duplicate album
///
/// Items of the remaining duplicates move into that album as well, so one
/// entry is left for the key. Returns the surviving album id.
pub async fn merge_into_album(
    catalog: &dyn Catalog,
    duplicates: &[Album],
    incoming: &Album,
    items: &[Item],
) -> Result<Option<AlbumId>> {
    let Some((target, others)) = duplicates.split_first() else {
        return Ok(None);
    };
    let Some(target_id) = target.id else {
        return Ok(None);
    };

    for other in others {
        let Some(other_id) = other.id else { continue };
        let moved: Vec<Item> = catalog
            .album_items(other_id)
            .await?
            .into_iter()
            .map(|mut item| {
                item.id = None;
                item
            })
            .collect();
        catalog.remove_album(other_id).await?;
        catalog.add_items_to_album(target_id, &moved).await?;
    }

    catalog.add_items_to_album(target_id, items).await?;

    let mut merged = incoming.clone();
    carry_over_album(&mut merged, target);
    merged.id = Some(target_id);
    catalog.update_album(&merged).await?;

    tracing::info!(album_id = target_id, merged = others.len(), "Merged into existing album");
    Ok(Some(target_id))
}

/// Keep `added` and flexible attributes of a replaced item
pub fn carry_over_item(new: &mut Item, old: &Item) {
    if old.added.is_some() {
        new.added = old.added;
    }
    for (key, value) in &old.meta.extra {
        new.meta
            .extra
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}

/// Keep `added` and flexible attributes of a replaced album
pub fn carry_over_album(new: &mut Album, old: &Album) {
    if old.added.is_some() {
        new.added = old.added;
    }
    for (key, value) in &old.extra {
        new.extra.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shelf_core::types::ItemMetadata;

    #[test]
    fn test_carry_over_keeps_added_and_unset_flex() {
        let added = Utc.with_ymd_and_hms(2020, 5, 1, 12, 0, 0).unwrap();

        let mut old = Item::new("/lib/a.mp3".into(), ItemMetadata::default());
        old.added = Some(added);
        old.meta.extra.insert("rating".into(), "5".into());
        old.meta.extra.insert("mood".into(), "calm".into());

        let mut new = Item::new("/lib/a.mp3".into(), ItemMetadata::default());
        new.meta.extra.insert("mood".into(), "loud".into());
        carry_over_item(&mut new, &old);

        assert_eq!(new.added, Some(added));
        assert_eq!(new.meta.extra["rating"], "5");
        assert_eq!(new.meta.extra["mood"], "loud");
    }

    #[test]
    fn test_default_keys() {
        let keys = DuplicateKeys::default();
        assert_eq!(keys.album, vec!["albumartist", "album"]);
        assert_eq!(keys.item, vec!["artist", "title"]);
    }

    #[test]
    fn test_resolution_from_config_names() {
        let parsed: Resolution = serde_json::from_str("\"keep_both\"").unwrap();
        assert_eq!(parsed, Resolution::KeepBoth);
        assert_eq!(Resolution::default(), Resolution::Skip);
    }
}
