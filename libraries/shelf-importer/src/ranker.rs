//! Candidate scoring and ranking
//!
//! Candidates from a metadata source are scored against the local items
//! with [`crate::distance`], de-duplicated by external id, and kept in
//! ascending distance order. Ties keep their original order.

use serde::{Deserialize, Serialize};
use shelf_core::types::{AlbumInfo, Item, TrackInfo};

use crate::distance::{album_distance, track_distance, Distance, DistanceWeights};

/// Metadata proposed for a task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CandidateInfo {
    Album(AlbumInfo),
    Track(TrackInfo),
}

/// A scored match proposal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub info: CandidateInfo,
    pub distance: Distance,
    /// `(item index, track index)` pairs, sorted by item index
    pub mapping: Vec<(usize, usize)>,
    /// Items with no matching track
    pub extra_items: Vec<usize>,
    /// Tracks with no matching item
    pub extra_tracks: Vec<usize>,
}

impl Candidate {
    /// External identifier, used for de-duplication
    pub fn id(&self) -> Option<&str> {
        match &self.info {
            CandidateInfo::Album(info) => info.album_id.as_deref(),
            CandidateInfo::Track(info) => info.track_id.as_deref(),
        }
    }

    pub fn total(&self) -> f64 {
        self.distance.total()
    }

    pub fn is_album(&self) -> bool {
        matches!(self.info, CandidateInfo::Album(_))
    }

    pub fn album_info(&self) -> Option<&AlbumInfo> {
        match &self.info {
            CandidateInfo::Album(info) => Some(info),
            CandidateInfo::Track(_) => None,
        }
    }

    pub fn track_info(&self) -> Option<&TrackInfo> {
        match &self.info {
            CandidateInfo::Track(info) => Some(info),
            CandidateInfo::Album(_) => None,
        }
    }

    /// Human-readable label, e.g. `Artist - Album`
    pub fn label(&self) -> String {
        match &self.info {
            CandidateInfo::Album(info) => format!("{} - {}", info.artist, info.album),
            CandidateInfo::Track(info) => match &info.artist {
                Some(artist) => format!("{} - {}", artist, info.title),
                None => info.title.clone(),
            },
        }
    }
}

/// Confidence in the best candidate, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    None,
    Low,
    Medium,
    Strong,
}

/// Normalized-distance thresholds for [`Recommendation`] levels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationThresholds {
    /// Best candidate below this is a strong match
    pub strong: f64,
    /// Best candidate at or below this is a medium match
    pub medium: f64,
    /// A lead this large over the runner-up also counts as medium
    pub gap: f64,
}

impl Default for RecommendationThresholds {
    fn default() -> Self {
        Self {
            strong: 0.04,
            medium: 0.25,
            gap: 0.25,
        }
    }
}

/// Scores candidates against local items
#[derive(Debug, Clone, Default)]
pub struct CandidateRanker {
    weights: DistanceWeights,
    thresholds: RecommendationThresholds,
}

impl CandidateRanker {
    pub fn new(weights: DistanceWeights, thresholds: RecommendationThresholds) -> Self {
        Self {
            weights,
            thresholds,
        }
    }

    pub fn weights(&self) -> &DistanceWeights {
        &self.weights
    }

    /// Score a release against a group of items
    pub fn score_album(&self, items: &[Item], info: AlbumInfo) -> Candidate {
        let (mapping, extra_items, extra_tracks) =
            assign_items(items, &info.tracks, info.va, &self.weights);
        let distance = album_distance(items, &info, &mapping, &self.weights);

        Candidate {
            info: CandidateInfo::Album(info),
            distance,
            mapping,
            extra_items,
            extra_tracks,
        }
    }

    /// Score a recording against a single item
    pub fn score_track(&self, item: &Item, info: TrackInfo) -> Candidate {
        let distance = track_distance(&item.meta, &info, true, &self.weights);

        Candidate {
            info: CandidateInfo::Track(info),
            distance,
            mapping: Vec::new(),
            extra_items: Vec::new(),
            extra_tracks: Vec::new(),
        }
    }

    /// Recommendation for a candidate list
    ///
    /// Levels are judged on normalized distances, which need not follow the
    /// raw-total order the list is kept in when candidates carry different
    /// penalty terms. The best and runner-up are the two lowest normalized
    /// distances.
    pub fn recommend(&self, candidates: &[Candidate]) -> Recommendation {
        let mut dists: Vec<f64> = candidates.iter().map(|c| c.distance.normalized()).collect();
        dists.sort_by(f64::total_cmp);

        let Some(&best_dist) = dists.first() else {
            return Recommendation::None;
        };

        if best_dist < self.thresholds.strong {
            Recommendation::Strong
        } else if best_dist <= self.thresholds.medium {
            Recommendation::Medium
        } else if let Some(&second_dist) = dists.get(1) {
            if second_dist - best_dist >= self.thresholds.gap {
                Recommendation::Medium
            } else {
                Recommendation::Low
            }
        } else {
            Recommendation::Low
        }
    }
}

/// Stable sort by ascending total distance
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| a.total().total_cmp(&b.total()));
}

/// Add `incoming` to `existing`, dropping any whose external id is already
/// present, then re-sort
pub fn merge_candidates(existing: &mut Vec<Candidate>, incoming: impl IntoIterator<Item = Candidate>) {
    for candidate in incoming {
        let seen = candidate
            .id()
            .is_some_and(|id| existing.iter().any(|c| c.id() == Some(id)));
        if seen {
            tracing::debug!(id = ?candidate.id(), "Dropping duplicate candidate");
            continue;
        }
        existing.push(candidate);
    }
    sort_candidates(existing);
}

/// Greedily pair items with tracks, closest pairs first
///
/// Returns the mapping sorted by item index plus the unpaired item and
/// track indexes.
pub fn assign_items(
    items: &[Item],
    tracks: &[TrackInfo],
    include_artist: bool,
    weights: &DistanceWeights,
) -> (Vec<(usize, usize)>, Vec<usize>, Vec<usize>) {
    let mut pairs: Vec<(f64, usize, usize)> = Vec::with_capacity(items.len() * tracks.len());
    for (i, item) in items.iter().enumerate() {
        for (t, track) in tracks.iter().enumerate() {
            let dist = track_distance(&item.meta, track, include_artist, weights).normalized();
            pairs.push((dist, i, t));
        }
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut item_taken = vec![false; items.len()];
    let mut track_taken = vec![false; tracks.len()];
    let mut mapping = Vec::new();

    for (_, i, t) in pairs {
        if !item_taken[i] && !track_taken[t] {
            item_taken[i] = true;
            track_taken[t] = true;
            mapping.push((i, t));
        }
    }
    mapping.sort_unstable();

    let extra_items = (0..items.len()).filter(|&i| !item_taken[i]).collect();
    let extra_tracks = (0..tracks.len()).filter(|&t| !track_taken[t]).collect();
    (mapping, extra_items, extra_tracks)
}
