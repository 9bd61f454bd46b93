//! Item types
//!
//! An item is one audio file together with the tag snapshot read from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::AlbumId;

pub type ItemId = i64;

/// Tag snapshot of an audio file
///
/// Named fields cover what the importer reasons about. Anything else read
/// from the file, or attached later through `set_fields`, lives in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub album_artists: Vec<String>,
    pub track_number: Option<u32>,
    pub track_total: Option<u32>,
    pub disc_number: Option<u32>,
    pub disc_total: Option<u32>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub compilation: bool,
    pub length_seconds: Option<f64>,
    pub bitrate: Option<u32>,
    pub format: Option<String>,
    pub media: Option<String>,
    pub mb_track_id: Option<String>,
    pub mb_album_id: Option<String>,
    pub mb_artist_id: Option<String>,
    pub mb_album_artist_id: Option<String>,
    pub data_source: Option<String>,

    /// Flexible attributes
    pub extra: BTreeMap<String, String>,
}

/// Field names understood by [`ItemMetadata::get_field`] besides flexible ones
pub const ITEM_FIELDS: &[&str] = &[
    "title",
    "artist",
    "album",
    "albumartist",
    "track",
    "tracktotal",
    "disc",
    "disctotal",
    "year",
    "genre",
    "comp",
    "length",
    "bitrate",
    "format",
    "media",
    "mb_trackid",
    "mb_albumid",
    "mb_artistid",
    "mb_albumartistid",
    "data_source",
];

impl ItemMetadata {
    /// Read a field by its query name
    ///
    /// Unknown names fall through to flexible attributes.
    pub fn get_field(&self, name: &str) -> Option<String> {
        match name {
            "title" => self.title.clone(),
            "artist" => self.artist.clone(),
            "album" => self.album.clone(),
            "albumartist" => self.album_artist.clone(),
            "track" => self.track_number.map(|n| n.to_string()),
            "tracktotal" => self.track_total.map(|n| n.to_string()),
            "disc" => self.disc_number.map(|n| n.to_string()),
            "disctotal" => self.disc_total.map(|n| n.to_string()),
            "year" => self.year.map(|n| n.to_string()),
            "genre" => self.genre.clone(),
            "comp" => Some(self.compilation.to_string()),
            "length" => self.length_seconds.map(|n| format!("{n:.2}")),
            "bitrate" => self.bitrate.map(|n| n.to_string()),
            "format" => self.format.clone(),
            "media" => self.media.clone(),
            "mb_trackid" => self.mb_track_id.clone(),
            "mb_albumid" => self.mb_album_id.clone(),
            "mb_artistid" => self.mb_artist_id.clone(),
            "mb_albumartistid" => self.mb_album_artist_id.clone(),
            "data_source" => self.data_source.clone(),
            other => self.extra.get(other).cloned(),
        }
    }

    /// Write a field by its query name
    ///
    /// Numeric fields that fail to parse are cleared. Empty strings clear
    /// optional fields.
    pub fn set_field(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let text = if value.is_empty() { None } else { Some(value.clone()) };
        match name {
            "title" => self.title = text,
            "artist" => self.artist = text,
            "album" => self.album = text,
            "albumartist" => self.album_artist = text,
            "track" => self.track_number = value.trim().parse().ok(),
            "tracktotal" => self.track_total = value.trim().parse().ok(),
            "disc" => self.disc_number = value.trim().parse().ok(),
            "disctotal" => self.disc_total = value.trim().parse().ok(),
            "year" => self.year = value.trim().parse().ok(),
            "genre" => self.genre = text,
            "comp" => self.compilation = parse_flag(&value),
            "length" => self.length_seconds = value.trim().parse().ok(),
            "bitrate" => self.bitrate = value.trim().parse().ok(),
            "format" => self.format = text,
            "media" => self.media = text,
            "mb_trackid" => self.mb_track_id = text,
            "mb_albumid" => self.mb_album_id = text,
            "mb_artistid" => self.mb_artist_id = text,
            "mb_albumartistid" => self.mb_album_artist_id = text,
            "data_source" => self.data_source = text,
            other => {
                self.extra.insert(other.to_string(), value);
            }
        }
    }

    /// Album artist if tagged, otherwise the track artist
    pub fn effective_album_artist(&self) -> Option<&str> {
        self.album_artist
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.artist.as_deref().filter(|s| !s.is_empty()))
    }
}

pub(crate) fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

/// An audio file known to the importer or stored in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Catalog identifier, `None` until stored
    pub id: Option<ItemId>,
    pub album_id: Option<AlbumId>,
    pub path: PathBuf,
    /// When the item first entered the catalog
    pub added: Option<DateTime<Utc>>,
    pub meta: ItemMetadata,
}

impl Item {
    /// Create an unsaved item
    pub fn new(path: PathBuf, meta: ItemMetadata) -> Self {
        Self {
            id: None,
            album_id: None,
            path,
            added: None,
            meta,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Identity used to tell whether a previously imported singleton is
    /// still the same entry
    pub fn identity_key(&self) -> String {
        format!(
            "{}\u{1f}{}",
            self.meta.artist.as_deref().unwrap_or_default(),
            self.meta.title.as_deref().unwrap_or_default()
        )
    }

    /// Read a field, including the `path` pseudo-field
    pub fn get_field(&self, name: &str) -> Option<String> {
        match name {
            "path" => Some(self.path.to_string_lossy().into_owned()),
            other => self.meta.get_field(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_fields_round_through_strings() {
        let mut meta = ItemMetadata::default();
        meta.set_field("year", "1999");
        meta.set_field("comp", "1");
        meta.set_field("albumartist", "Tag Artist");

        assert_eq!(meta.year, Some(1999));
        assert!(meta.compilation);
        assert_eq!(meta.get_field("albumartist").as_deref(), Some("Tag Artist"));
    }

    #[test]
    fn test_unknown_fields_are_flexible() {
        let mut meta = ItemMetadata::default();
        meta.set_field("mood", "calm");

        assert_eq!(meta.extra.get("mood").map(String::as_str), Some("calm"));
        assert_eq!(meta.get_field("mood").as_deref(), Some("calm"));
        assert_eq!(meta.get_field("missing"), None);
    }

    #[test]
    fn test_bad_number_clears_field() {
        let mut meta = ItemMetadata::default();
        meta.track_number = Some(3);
        meta.set_field("track", "three");
        assert_eq!(meta.track_number, None);
    }

    #[test]
    fn test_effective_album_artist() {
        let mut meta = ItemMetadata::default();
        assert_eq!(meta.effective_album_artist(), None);

        meta.artist = Some("Track Artist".into());
        assert_eq!(meta.effective_album_artist(), Some("Track Artist"));

        meta.album_artist = Some(String::new());
        assert_eq!(meta.effective_album_artist(), Some("Track Artist"));

        meta.album_artist = Some("Album Artist".into());
        assert_eq!(meta.effective_album_artist(), Some("Album Artist"));
    }
}
