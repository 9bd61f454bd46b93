//! Candidate records returned by metadata sources

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata for one track of a release, or a standalone recording
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackInfo {
    pub track_id: Option<String>,
    pub title: String,
    pub artist: Option<String>,
    pub artist_id: Option<String>,
    pub length_seconds: Option<f64>,
    /// Position across the whole release
    pub index: Option<u32>,
    pub medium: Option<u32>,
    /// Position within the medium
    pub medium_index: Option<u32>,
    pub medium_total: Option<u32>,
    pub data_source: Option<String>,
}

/// Metadata for a release
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlbumInfo {
    pub album_id: Option<String>,
    pub album: String,
    pub artist: String,
    pub artist_id: Option<String>,
    pub artists: Vec<String>,
    pub year: Option<i32>,
    pub media: Option<String>,
    pub mediums: Option<u32>,
    /// Various-artists release
    pub va: bool,
    pub genre: Option<String>,
    pub data_source: Option<String>,
    pub tracks: Vec<TrackInfo>,
    pub extra: BTreeMap<String, String>,
}
