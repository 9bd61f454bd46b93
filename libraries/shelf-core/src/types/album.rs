//! Album types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::item::parse_flag;

pub type AlbumId = i64;

/// An album entry in the catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Album {
    pub id: Option<AlbumId>,
    pub album: String,
    pub album_artist: String,
    pub album_artists: Vec<String>,
    pub mb_album_id: Option<String>,
    pub mb_album_artist_id: Option<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub compilation: bool,
    pub data_source: Option<String>,
    pub added: Option<DateTime<Utc>>,
    pub extra: BTreeMap<String, String>,
}

impl Album {
    /// Read a field by its query name
    pub fn get_field(&self, name: &str) -> Option<String> {
        match name {
            "album" => Some(self.album.clone()),
            "albumartist" => Some(self.album_artist.clone()),
            "mb_albumid" => self.mb_album_id.clone(),
            "mb_albumartistid" => self.mb_album_artist_id.clone(),
            "year" => self.year.map(|n| n.to_string()),
            "genre" => self.genre.clone(),
            "comp" => Some(self.compilation.to_string()),
            "data_source" => self.data_source.clone(),
            other => self.extra.get(other).cloned(),
        }
    }

    /// Write a field by its query name
    pub fn set_field(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let text = if value.is_empty() { None } else { Some(value.clone()) };
        match name {
            "album" => self.album = value,
            "albumartist" => self.album_artist = value,
            "mb_albumid" => self.mb_album_id = text,
            "mb_albumartistid" => self.mb_album_artist_id = text,
            "year" => self.year = value.trim().parse().ok(),
            "genre" => self.genre = text,
            "comp" => self.compilation = parse_flag(&value),
            "data_source" => self.data_source = text,
            other => {
                self.extra.insert(other.to_string(), value);
            }
        }
    }

    /// Identity used to tell whether a previously imported album is still
    /// the same entry
    pub fn identity_key(&self) -> String {
        format!("{}\u{1f}{}", self.album_artist, self.album)
    }
}
