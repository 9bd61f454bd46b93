//! Weighted distance between local items and candidate metadata
//!
//! A [`Distance`] is a list of named penalties. Each penalty carries a raw
//! value in `[0, 1]` and the weight of its term; zero means an exact match.

use serde::{Deserialize, Serialize};
use shelf_core::types::{AlbumInfo, Item, ItemMetadata, TrackInfo};
use unicode_normalization::UnicodeNormalization;

/// Leading words moved to the end before comparing strings
const ARTICLES: &[&str] = &["the", "a", "an"];

/// Per-term weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceWeights {
    pub artist: f64,
    pub album: f64,
    pub year: f64,
    pub media: f64,
    pub mediums: f64,
    pub album_id: f64,
    pub tracks: f64,
    pub missing_tracks: f64,
    pub unmatched_tracks: f64,
    pub track_title: f64,
    pub track_artist: f64,
    pub track_index: f64,
    pub track_length: f64,
    pub track_id: f64,
    /// Length difference (seconds) tolerated without penalty
    pub track_length_grace: f64,
    /// Length difference (seconds) beyond the grace that counts as a full miss
    pub track_length_max: f64,
}

impl Default for DistanceWeights {
    fn default() -> Self {
        Self {
            artist: 3.0,
            album: 3.0,
            year: 1.0,
            media: 1.0,
            mediums: 1.0,
            album_id: 5.0,
            tracks: 2.0,
            missing_tracks: 0.9,
            unmatched_tracks: 0.6,
            track_title: 3.0,
            track_artist: 2.0,
            track_index: 1.0,
            track_length: 2.0,
            track_id: 5.0,
            track_length_grace: 10.0,
            track_length_max: 30.0,
        }
    }
}

/// One weighted term of a [`Distance`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Penalty {
    pub name: &'static str,
    pub weight: f64,
    /// Unweighted value in `[0, 1]`
    pub raw: f64,
}

impl Penalty {
    pub fn value(&self) -> f64 {
        self.weight * self.raw
    }
}

/// Named, weighted penalties between local data and a candidate
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Distance {
    penalties: Vec<Penalty>,
}

impl Distance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &'static str, weight: f64, raw: f64) {
        self.penalties.push(Penalty {
            name,
            weight,
            raw: raw.clamp(0.0, 1.0),
        });
    }

    /// Compare two strings; a missing side compares as empty
    pub fn add_string(&mut self, name: &'static str, weight: f64, got: Option<&str>, want: &str) {
        self.add(name, weight, string_dist(got.unwrap_or_default(), want));
    }

    /// Penalize only when both sides are known and differ
    pub fn add_expected<T: PartialEq>(
        &mut self,
        name: &'static str,
        weight: f64,
        got: Option<T>,
        want: Option<T>,
    ) {
        if let (Some(got), Some(want)) = (got, want) {
            self.add(name, weight, if got == want { 0.0 } else { 1.0 });
        }
    }

    /// Sum of weighted penalties
    pub fn total(&self) -> f64 {
        self.penalties.iter().map(Penalty::value).sum()
    }

    /// Largest possible total for the terms present
    pub fn max_total(&self) -> f64 {
        self.penalties.iter().map(|p| p.weight).sum()
    }

    /// Total scaled into `[0, 1]`
    pub fn normalized(&self) -> f64 {
        let max = self.max_total();
        if max > 0.0 {
            self.total() / max
        } else {
            0.0
        }
    }

    pub fn penalties(&self) -> &[Penalty] {
        &self.penalties
    }

    /// Non-zero penalties, worst first
    pub fn worst(&self) -> Vec<&Penalty> {
        let mut worst: Vec<&Penalty> = self.penalties.iter().filter(|p| p.raw > 0.0).collect();
        worst.sort_by(|a, b| b.value().total_cmp(&a.value()));
        worst
    }
}

/// Normalize a string for comparison
///
/// Accents are stripped, case is folded, punctuation dropped, and a leading
/// article is moved to the end ("The Band" compares like "Band, The").
pub fn normalize_for_match(s: &str) -> String {
    let folded: String = s
        .nfkd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut words: Vec<&str> = folded.split_whitespace().collect();
    if words.len() > 1 && ARTICLES.contains(&words[0]) {
        let article = words.remove(0);
        words.push(article);
    }
    words.join(" ")
}

/// String distance in `[0, 1]` based on normalized Levenshtein similarity
pub fn string_dist(a: &str, b: &str) -> f64 {
    let a = normalize_for_match(a);
    let b = normalize_for_match(b);
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 0.0,
        (true, false) | (false, true) => 1.0,
        _ => 1.0 - strsim::normalized_levenshtein(&a, &b),
    }
}

/// Most common value, ties going to the earliest
pub fn plurality<T, I>(values: I) -> Option<(T, usize)>
where
    T: PartialEq,
    I: IntoIterator<Item = T>,
{
    let mut counts: Vec<(T, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value, 1)),
        }
    }

    let mut best: Option<(T, usize)> = None;
    for (value, count) in counts {
        let better = match &best {
            Some((_, best_count)) => count > *best_count,
            None => true,
        };
        if better {
            best = Some((value, count));
        }
    }
    best
}

/// Distance between an item's tags and a candidate track
pub fn track_distance(
    meta: &ItemMetadata,
    track: &TrackInfo,
    include_artist: bool,
    weights: &DistanceWeights,
) -> Distance {
    let mut dist = Distance::new();

    dist.add_string(
        "track_title",
        weights.track_title,
        meta.title.as_deref(),
        &track.title,
    );

    if include_artist {
        if let Some(artist) = track.artist.as_deref() {
            dist.add_string(
                "track_artist",
                weights.track_artist,
                meta.artist.as_deref(),
                artist,
            );
        }
    }

    if let (Some(got), Some(want)) = (meta.length_seconds, track.length_seconds) {
        let over = (got - want).abs() - weights.track_length_grace;
        let raw = if weights.track_length_max > 0.0 {
            over / weights.track_length_max
        } else if over > 0.0 {
            1.0
        } else {
            0.0
        };
        dist.add("track_length", weights.track_length, raw);
    }

    if let Some(number) = meta.track_number {
        if track.index.is_some() || track.medium_index.is_some() {
            let hit = track.index == Some(number) || track.medium_index == Some(number);
            dist.add("track_index", weights.track_index, if hit { 0.0 } else { 1.0 });
        }
    }

    dist.add_expected(
        "track_id",
        weights.track_id,
        meta.mb_track_id.as_deref(),
        track.track_id.as_deref(),
    );

    dist
}

/// Distance between a group of items and a candidate release
///
/// `mapping` pairs item indexes with track indexes of `info`.
pub fn album_distance(
    items: &[Item],
    info: &AlbumInfo,
    mapping: &[(usize, usize)],
    weights: &DistanceWeights,
) -> Distance {
    let mut dist = Distance::new();
    let metas = || items.iter().map(|item| &item.meta);

    if !info.va {
        let artist = plurality(metas().filter_map(|m| m.effective_album_artist())).map(|(a, _)| a);
        dist.add_string("artist", weights.artist, artist, &info.artist);
    }

    let album = plurality(metas().filter_map(|m| m.album.as_deref())).map(|(a, _)| a);
    dist.add_string("album", weights.album, album, &info.album);

    dist.add_expected(
        "year",
        weights.year,
        plurality(metas().filter_map(|m| m.year)).map(|(y, _)| y),
        info.year,
    );
    dist.add_expected(
        "mediums",
        weights.mediums,
        plurality(metas().filter_map(|m| m.disc_total)).map(|(n, _)| n),
        info.mediums,
    );
    dist.add_expected(
        "media",
        weights.media,
        plurality(metas().filter_map(|m| m.media.as_deref())).map(|(m, _)| m),
        info.media.as_deref(),
    );
    dist.add_expected(
        "album_id",
        weights.album_id,
        plurality(metas().filter_map(|m| m.mb_album_id.as_deref())).map(|(id, _)| id),
        info.album_id.as_deref(),
    );

    for &(item_idx, track_idx) in mapping {
        let track = track_distance(
            &items[item_idx].meta,
            &info.tracks[track_idx],
            info.va,
            weights,
        );
        dist.add("tracks", weights.tracks, track.normalized());
    }

    for _ in mapping.len()..info.tracks.len() {
        dist.add("missing_tracks", weights.missing_tracks, 1.0);
    }
    for _ in mapping.len()..items.len() {
        dist.add("unmatched_tracks", weights.unmatched_tracks, 1.0);
    }

    dist
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_for_match() {
        assert_eq!(normalize_for_match("  The  Beatles "), "beatles the");
        assert_eq!(normalize_for_match("Björk"), "bjork");
        assert_eq!(normalize_for_match("AC/DC"), "ac dc");
        assert_eq!(normalize_for_match("The"), "the");
    }

    #[test]
    fn test_string_dist_bounds() {
        assert_eq!(string_dist("Some Title", "some title!"), 0.0);
        assert_eq!(string_dist("", ""), 0.0);
        assert_eq!(string_dist("", "x"), 1.0);
        let d = string_dist("Kitten", "Sitting");
        assert!(d > 0.0 && d < 1.0);
    }

    #[test]
    fn test_distance_totals() {
        let mut dist = Distance::new();
        dist.add("a", 2.0, 0.5);
        dist.add("b", 1.0, 0.0);
        dist.add("c", 1.0, 3.0);

        assert_eq!(dist.total(), 2.0);
        assert_eq!(dist.max_total(), 4.0);
        assert_eq!(dist.normalized(), 0.5);
        assert_eq!(dist.worst()[0].name, "a");
        assert_eq!(dist.worst().len(), 2);
    }

    #[test]
    fn test_expected_only_when_both_known() {
        let mut dist = Distance::new();
        dist.add_expected("year", 1.0, Some(1999), None);
        dist.add_expected("year", 1.0, None, Some(1999));
        assert!(dist.penalties().is_empty());

        dist.add_expected("year", 1.0, Some(1999), Some(2000));
        assert_eq!(dist.total(), 1.0);
    }

    #[test]
    fn test_plurality_prefers_first_on_tie() {
        assert_eq!(plurality(vec!["a", "b", "b", "a"]), Some(("a", 2)));
        assert_eq!(plurality(vec!["a", "b", "b"]), Some(("b", 2)));
        assert_eq!(plurality(Vec::<&str>::new()), None);
    }

    #[test]
    fn test_track_length_grace() {
        let weights = DistanceWeights::default();
        let mut meta = ItemMetadata::default();
        meta.title = Some("Song".into());
        meta.length_seconds = Some(200.0);

        let track = TrackInfo {
            title: "Song".into(),
            length_seconds: Some(205.0),
            ..TrackInfo::default()
        };
        assert_eq!(track_distance(&meta, &track, false, &weights).total(), 0.0);

        let far = TrackInfo {
            length_seconds: Some(300.0),
            ..track
        };
        let dist = track_distance(&meta, &far, false, &weights);
        assert_eq!(dist.total(), weights.track_length);
    }

    #[test]
    fn test_exact_album_match_is_zero() {
        let weights = DistanceWeights::default();
        let mut meta = ItemMetadata::default();
        meta.title = Some("One".into());
        meta.artist = Some("Artist".into());
        meta.album = Some("Album".into());
        let items = vec![Item::new("/a/1.mp3".into(), meta)];

        let info = AlbumInfo {
            album: "Album".into(),
            artist: "Artist".into(),
            tracks: vec![TrackInfo {
                title: "One".into(),
                ..TrackInfo::default()
            }],
            ..AlbumInfo::default()
        };

        let dist = album_distance(&items, &info, &[(0, 0)], &weights);
        assert_eq!(dist.total(), 0.0);

        let unmatched = album_distance(&items, &info, &[], &weights);
        let names: Vec<_> = unmatched.worst().iter().map(|p| p.name).collect();
        assert!(names.contains(&"missing_tracks"));
        assert!(names.contains(&"unmatched_tracks"));
    }
}
