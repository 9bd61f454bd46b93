//! Import tasks
//!
//! An [`ImportTask`] is the unit of work for one group of files: an album,
//! a singleton track, or an archive that is unpacked before its contents are
//! grouped. The three differ in only a few places (field alignment, the
//! duplicate key and temp-directory cleanup), so they share one type and a
//! [`TaskKind`] flag set instead of separate types.

use regex::Regex;
use serde::Serialize;
use shelf_core::types::{Album, AlbumInfo, FieldQuery, Item, ItemMetadata, TrackInfo};
use shelf_core::MetadataSource;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use tempfile::TempDir;

use crate::distance::plurality;
use crate::duplicates::{DuplicateKeys, Duplicates, Resolution};
use crate::progress::{progress_key, HistoryEntity};
use crate::ranker::{merge_candidates, Candidate, CandidateRanker, Recommendation};
use crate::{ImportError, Result};

/// Archive extensions that are unpacked before import
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "tar"];

/// Lifecycle of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Created,
    Chosen,
    DuplicateChecked,
    Manipulated,
    Stored,
    Finalized,
    Skipped,
    Aborted,
}

impl TaskState {
    /// Whether `self -> next` is a legal transition
    ///
    /// Finalizing is always allowed so that cleanup can run after a failure.
    pub fn can_advance_to(self, next: TaskState) -> bool {
        use TaskState::{
            Aborted, Chosen, Created, DuplicateChecked, Finalized, Manipulated, Skipped, Stored,
        };

        match (self, next) {
            (_, Finalized)
            | (Created, Chosen)
            | (Chosen, DuplicateChecked | Manipulated)
            | (DuplicateChecked, Manipulated)
            | (Manipulated, Stored)
            | (Created | Chosen | DuplicateChecked | Manipulated, Skipped | Aborted) => true,
            _ => false,
        }
    }
}

/// Capability flags distinguishing album, singleton and archive tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskKind {
    /// Holds several items and album-level fields
    pub multi_item: bool,
    /// Backed by an archive that must be unpacked first
    pub needs_extraction: bool,
}

impl TaskKind {
    pub const ALBUM: Self = Self {
        multi_item: true,
        needs_extraction: false,
    };

    pub const SINGLETON: Self = Self {
        multi_item: false,
        needs_extraction: false,
    };

    pub const ARCHIVE: Self = Self {
        multi_item: true,
        needs_extraction: true,
    };
}

/// What to do with a task
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Skip,
    /// Import with the metadata already in the files
    AsIs,
    /// Split an album into singletons
    Tracks,
    /// Re-group the items into several albums
    Albums,
    /// Apply a ranked candidate
    Apply(Box<Candidate>),
    /// Keep current tags but refresh album-level fields
    Retag,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Skip => "skip",
            Action::AsIs => "asis",
            Action::Tracks => "tracks",
            Action::Albums => "albums",
            Action::Apply(_) => "apply",
            Action::Retag => "retag",
        }
    }
}

/// One unit of import work
#[derive(Debug)]
pub struct ImportTask {
    kind: TaskKind,
    toppath: PathBuf,
    scan_root: PathBuf,
    paths: Vec<PathBuf>,
    state: TaskState,
    choice: Option<Action>,

    pub items: Vec<Item>,
    pub candidates: Vec<Candidate>,
    pub recommendation: Recommendation,

    /// Scan-root-relative keys recorded once this task is done
    pub(crate) progress_keys: Vec<String>,
    /// Files came out of an extracted archive
    pub(crate) from_archive: bool,
    pub(crate) fingerprint: Option<String>,
    pub(crate) duplicates: Option<Duplicates>,
    pub(crate) resolution: Option<Resolution>,
    /// Catalog entries sharing source paths with this task
    pub(crate) replaced: Vec<Item>,
    pub(crate) stored: Option<HistoryEntity>,

    /// Assignments applied to items, repeated on the album record
    set_fields: BTreeMap<String, String>,
    archive_dir: Option<TempDir>,
}

impl ImportTask {
    fn new(
        kind: TaskKind,
        toppath: PathBuf,
        scan_root: PathBuf,
        paths: Vec<PathBuf>,
        items: Vec<Item>,
    ) -> Self {
        let progress_keys = paths.iter().map(|p| progress_key(&scan_root, p)).collect();
        Self {
            kind,
            toppath,
            scan_root,
            paths,
            state: TaskState::Created,
            choice: None,
            items,
            candidates: Vec::new(),
            recommendation: Recommendation::None,
            progress_keys,
            from_archive: false,
            fingerprint: None,
            duplicates: None,
            resolution: None,
            replaced: Vec::new(),
            stored: None,
            set_fields: BTreeMap::new(),
            archive_dir: None,
        }
    }

    /// Album task for a group found under `scan_root`
    pub fn album(toppath: PathBuf, scan_root: PathBuf, paths: Vec<PathBuf>, items: Vec<Item>) -> Self {
        Self::new(TaskKind::ALBUM, toppath, scan_root, paths, items)
    }

    /// Singleton task for one file
    pub fn singleton(toppath: PathBuf, scan_root: PathBuf, item: Item) -> Self {
        let paths = vec![item.path.clone()];
        Self::new(TaskKind::SINGLETON, toppath, scan_root, paths, vec![item])
    }

    /// Archive task; its items come from the groups found after [`extract`](Self::extract)
    pub fn archive(archive_path: PathBuf) -> Self {
        let mut task = Self::new(
            TaskKind::ARCHIVE,
            archive_path.clone(),
            archive_path.clone(),
            vec![archive_path],
            Vec::new(),
        );
        task.progress_keys.clear();
        task
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn is_album(&self) -> bool {
        self.kind.multi_item
    }

    /// The path given by the user
    pub fn toppath(&self) -> &Path {
        &self.toppath
    }

    /// Directory the task's groups were found in (the extraction dir for archives)
    pub fn scan_root(&self) -> &Path {
        &self.scan_root
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn choice(&self) -> Option<&Action> {
        self.choice.as_ref()
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.choice, Some(Action::Skip)) || self.state == TaskState::Skipped
    }

    pub fn chosen_candidate(&self) -> Option<&Candidate> {
        match &self.choice {
            Some(Action::Apply(candidate)) => Some(candidate),
            _ => None,
        }
    }

    /// Temporary extraction directory, while it exists
    pub fn extraction_dir(&self) -> Option<&Path> {
        self.archive_dir.as_ref().map(TempDir::path)
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn advance(&mut self, next: TaskState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(ImportError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(from = ?self.state, to = ?next, "Task transition");
        self.state = next;
        Ok(())
    }

    /// Record the action for this task
    ///
    /// A choice can be set once; call [`clear_choice`](Self::clear_choice)
    /// to change it.
    pub fn set_choice(&mut self, action: Action) -> Result<()> {
        if let Some(existing) = &self.choice {
            return Err(ImportError::InvalidChoice(format!(
                "task already has choice '{}'",
                existing.name()
            )));
        }

        match &action {
            Action::Tracks | Action::Albums if !self.kind.multi_item => {
                return Err(ImportError::InvalidChoice(format!(
                    "'{}' only applies to album tasks",
                    action.name()
                )));
            }
            Action::Apply(candidate) if candidate.is_album() != self.kind.multi_item => {
                return Err(ImportError::InvalidChoice(format!(
                    "candidate '{}' does not fit this task",
                    candidate.label()
                )));
            }
            _ => {}
        }

        self.advance(TaskState::Chosen)?;
        tracing::debug!(action = action.name(), paths = ?self.paths, "Choice set");
        self.choice = Some(action);
        Ok(())
    }

    /// Choose the `rank`-th candidate (1-based) and apply it
    pub fn choose_candidate(&mut self, rank: usize) -> Result<()> {
        let candidate = rank
            .checked_sub(1)
            .and_then(|index| self.candidates.get(index))
            .cloned()
            .ok_or_else(|| {
                ImportError::InvalidChoice(format!(
                    "no candidate {rank} (have {})",
                    self.candidates.len()
                ))
            })?;
        self.set_choice(Action::Apply(Box::new(candidate)))
    }

    /// Forget the current choice
    pub fn clear_choice(&mut self) {
        if self.state == TaskState::Chosen {
            self.state = TaskState::Created;
        }
        self.choice = None;
    }

    /// Most common album artist (or artist) across the items
    pub fn cur_artist(&self) -> String {
        plurality(self.items.iter().filter_map(|i| i.meta.effective_album_artist()))
            .map(|(artist, _)| artist.to_string())
            .unwrap_or_default()
    }

    /// Most common album title across the items
    pub fn cur_album(&self) -> String {
        plurality(self.items.iter().filter_map(|i| i.meta.album.as_deref()))
            .map(|(album, _)| album.to_string())
            .unwrap_or_default()
    }

    /// Query `source` and merge scored results into the candidate list
    ///
    /// With `search_ids`, only those ids are fetched. Ids that resolve to
    /// nothing and failed lookups are logged and dropped.
    pub async fn lookup_candidates(
        &mut self,
        source: &dyn MetadataSource,
        ranker: &CandidateRanker,
        search_ids: &[String],
    ) {
        let mut found = Vec::new();

        if self.kind.multi_item {
            if search_ids.is_empty() {
                let (artist, album) = (self.cur_artist(), self.cur_album());
                match source.album_candidates(&self.items, &artist, &album).await {
                    Ok(infos) => found.extend(
                        infos
                            .into_iter()
                            .map(|info| ranker.score_album(&self.items, info)),
                    ),
                    Err(e) => tracing::warn!(%artist, %album, "Album search failed: {}", e),
                }
            }
            for id in search_ids {
                match source.album_for_id(id).await {
                    Ok(Some(info)) => found.push(ranker.score_album(&self.items, info)),
                    Ok(None) => tracing::warn!(id = %id, "No release found for id"),
                    Err(e) => tracing::warn!(id = %id, "Release lookup failed: {}", e),
                }
            }
        } else if let Some(item) = self.items.first() {
            if search_ids.is_empty() {
                let artist = item.meta.artist.clone().unwrap_or_default();
                let title = item.meta.title.clone().unwrap_or_default();
                match source.item_candidates(item, &artist, &title).await {
                    Ok(infos) => found.extend(
                        infos
                            .into_iter()
                            .map(|info| ranker.score_track(item, info)),
                    ),
                    Err(e) => tracing::warn!(%artist, %title, "Track search failed: {}", e),
                }
            }
            for id in search_ids {
                match source.track_for_id(id).await {
                    Ok(Some(info)) => found.push(ranker.score_track(item, info)),
                    Ok(None) => tracing::warn!(id = %id, "No recording found for id"),
                    Err(e) => tracing::warn!(id = %id, "Recording lookup failed: {}", e),
                }
            }
        }

        merge_candidates(&mut self.candidates, found);
        self.recommendation = ranker.recommend(&self.candidates);
        tracing::debug!(
            candidates = self.candidates.len(),
            recommendation = ?self.recommendation,
            "Lookup finished"
        );
    }

    /// Write the chosen candidate's metadata into the items
    ///
    /// For albums, items the candidate did not match are dropped from the
    /// task. Other actions leave the items alone.
    pub fn apply_metadata(&mut self, from_scratch: bool) {
        let Some(Action::Apply(candidate)) = &self.choice else {
            return;
        };

        if let Some(info) = candidate.album_info() {
            let mut slots: Vec<Option<Item>> =
                std::mem::take(&mut self.items).into_iter().map(Some).collect();
            let mut kept = Vec::with_capacity(candidate.mapping.len());

            for &(item_index, track_index) in &candidate.mapping {
                let item = slots.get_mut(item_index).and_then(Option::take);
                if let (Some(mut item), Some(track)) = (item, info.tracks.get(track_index)) {
                    apply_album_info(&mut item.meta, info, track, from_scratch);
                    kept.push(item);
                }
            }

            let unmatched = slots.iter().flatten().count();
            if unmatched > 0 {
                tracing::info!(unmatched, album = %info.album, "Leaving unmatched items out");
            }
            self.items = kept;
        } else if let Some(track) = candidate.track_info() {
            for item in &mut self.items {
                apply_track_info(&mut item.meta, track, from_scratch);
            }
        }
    }

    /// Derive album artist and compilation flag for album tasks
    ///
    /// As-is imports keep any tagged album artist. Without one, a shared or
    /// majority artist becomes the album artist; otherwise the album is
    /// marked as a compilation credited to `va_name`. `majority` is the
    /// share of tracks an artist must exceed.
    ///
    /// Applied and retagged albums only fill in album artist fields that
    /// are still empty, from the track artist.
    pub fn align_album_level_fields(&mut self, va_name: &str, majority: f64) {
        if !self.kind.multi_item || self.items.is_empty() {
            return;
        }

        match self.choice {
            Some(Action::AsIs) => self.align_as_is(va_name, majority),
            Some(Action::Apply(_) | Action::Retag) => {
                for item in &mut self.items {
                    let meta = &mut item.meta;
                    if meta.album_artist.as_deref().unwrap_or_default().is_empty() {
                        meta.album_artist.clone_from(&meta.artist);
                        meta.album_artists.clone_from(&meta.artists);
                        meta.mb_album_artist_id.clone_from(&meta.mb_artist_id);
                    }
                }
            }
            _ => {}
        }
    }

    fn align_as_is(&mut self, va_name: &str, majority: f64) {
        let tagged = plurality(
            self.items
                .iter()
                .filter_map(|i| i.meta.album_artist.as_deref())
                .filter(|a| !a.is_empty()),
        )
        .map(|(artist, _)| artist.to_string());

        if let Some(tagged) = tagged {
            // The tagged album artist wins; copy it onto untagged items.
            let Some(source) = self
                .items
                .iter()
                .find(|i| i.meta.album_artist.as_deref() == Some(tagged.as_str()))
                .map(|i| i.meta.clone())
            else {
                return;
            };
            for item in &mut self.items {
                if item.meta.album_artist.as_deref().unwrap_or_default().is_empty() {
                    item.meta.album_artist.clone_from(&source.album_artist);
                    item.meta.album_artists.clone_from(&source.album_artists);
                    item.meta.mb_album_artist_id.clone_from(&source.mb_album_artist_id);
                }
            }
            return;
        }

        let total = self.items.len();
        let (artist, count) = plurality(self.items.iter().map(|i| {
            i.meta
                .artist
                .clone()
                .unwrap_or_default()
        }))
        .unwrap_or_default();

        #[allow(clippy::cast_precision_loss)]
        let share = count as f64 / total as f64;
        let single = count == total || (count > 1 && share > majority);

        let (album_artist, compilation) = if single {
            (artist, false)
        } else {
            (va_name.to_string(), true)
        };
        tracing::debug!(%album_artist, compilation, "Aligned album-level fields");

        for item in &mut self.items {
            item.meta.album_artist = Some(album_artist.clone()).filter(|a| !a.is_empty());
            item.meta.compilation = compilation;
        }
    }

    /// Apply configured `field -> template` assignments to every item
    ///
    /// Templates may reference other fields of the same item as `$field`.
    pub fn apply_set_fields(&mut self, set_fields: &BTreeMap<String, String>) {
        self.set_fields.clone_from(set_fields);
        for item in &mut self.items {
            for (field, template) in set_fields {
                let value = substitute(template, |name| item.get_field(name));
                item.meta.set_field(field, value);
            }
        }
    }

    /// Album record built from the (aligned) items
    pub fn album_record(&self) -> Option<Album> {
        let first = &self.items.first()?.meta;
        let mut album = Album {
            album: first.album.clone().unwrap_or_default(),
            album_artist: first
                .effective_album_artist()
                .unwrap_or_default()
                .to_string(),
            album_artists: first.album_artists.clone(),
            mb_album_id: first.mb_album_id.clone(),
            mb_album_artist_id: first.mb_album_artist_id.clone(),
            year: first.year,
            genre: first.genre.clone(),
            compilation: first.compilation,
            data_source: first.data_source.clone(),
            ..Album::default()
        };
        for (field, template) in &self.set_fields {
            let value = substitute(template, |name| album.get_field(name));
            album.set_field(field, value);
        }
        Some(album)
    }

    /// Catalog query for entries colliding with this task
    pub fn duplicate_query(&self, keys: &DuplicateKeys) -> Option<FieldQuery> {
        if self.kind.multi_item {
            let album = self.album_record()?;
            Some(FieldQuery::from_fields(&keys.album, |f| album.get_field(f)))
        } else {
            let item = self.items.first()?;
            Some(FieldQuery::from_fields(&keys.item, |f| item.get_field(f)))
        }
    }

    /// Split an album task into one singleton task per item
    pub fn split_into_singletons(self) -> Vec<ImportTask> {
        let toppath = self.toppath.clone();
        let scan_root = self.scan_root.clone();
        let subtasks = self
            .items
            .into_iter()
            .map(|item| ImportTask::singleton(toppath.clone(), scan_root.clone(), item))
            .collect();
        hand_over(subtasks, self.progress_keys, self.fingerprint, self.from_archive)
    }

    /// Re-group the items into album tasks by album artist and album
    ///
    /// Groups keep the order in which their first item appears.
    pub fn group_albums(self) -> Vec<ImportTask> {
        let mut groups: Vec<((String, String), Vec<Item>)> = Vec::new();
        for item in self.items {
            let key = (
                item.meta
                    .effective_album_artist()
                    .unwrap_or_default()
                    .to_string(),
                item.meta.album.clone().unwrap_or_default(),
            );
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, items)) => items.push(item),
                None => groups.push((key, vec![item])),
            }
        }

        let subtasks = groups
            .into_iter()
            .map(|(_, items)| {
                let mut paths: Vec<PathBuf> = Vec::new();
                for item in &items {
                    if let Some(parent) = item.path.parent() {
                        if !paths.iter().any(|p| p == parent) {
                            paths.push(parent.to_path_buf());
                        }
                    }
                }
                ImportTask::album(self.toppath.clone(), self.scan_root.clone(), paths, items)
            })
            .collect();
        hand_over(subtasks, self.progress_keys, self.fingerprint, self.from_archive)
    }

    /// Unpack the archive into a fresh temporary directory
    ///
    /// The directory is owned by the task and removed by
    /// [`finalize`](Self::finalize), including when unpacking fails.
    pub fn extract(&mut self) -> Result<&Path> {
        if !self.kind.needs_extraction {
            return Err(ImportError::UnsupportedOperation(
                "only archive tasks can be extracted".to_string(),
            ));
        }

        let archive = self.toppath.clone();
        let dir = tempfile::Builder::new().prefix("shelf-import-").tempdir()?;
        let dest = dir.path().to_path_buf();
        self.archive_dir = Some(dir);

        tracing::info!(archive = %archive.display(), dest = %dest.display(), "Extracting archive");
        match archive_extension(&archive).as_deref() {
            Some("zip") => unpack_zip(&archive, &dest)?,
            Some("tar") => unpack_tar(&archive, &dest)?,
            _ => {
                return Err(ImportError::Archive(format!(
                    "unsupported archive: {}",
                    archive.display()
                )))
            }
        }

        self.scan_root = dest;
        Ok(&self.scan_root)
    }

    /// Release task resources; removes the extraction directory if any
    pub fn finalize(&mut self) {
        if let Some(dir) = self.archive_dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => tracing::debug!(path = %path.display(), "Removed extraction directory"),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    "Failed to remove extraction directory: {}",
                    e
                ),
            }
        }
        self.state = TaskState::Finalized;
    }
}

/// Give the parent's progress keys and fingerprint to the last subtask
/// only, so the parent counts as done once all of its subtasks are
fn hand_over(
    mut subtasks: Vec<ImportTask>,
    progress_keys: Vec<String>,
    fingerprint: Option<String>,
    from_archive: bool,
) -> Vec<ImportTask> {
    for task in &mut subtasks {
        task.from_archive = from_archive;
        task.progress_keys = Vec::new();
    }
    if let Some(last) = subtasks.last_mut() {
        last.progress_keys = progress_keys;
        last.fingerprint = fingerprint;
    }
    subtasks
}

fn set_field_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$(\w+)").expect("valid field pattern"))
}

/// Expand `$field` references in `template` using `lookup`
///
/// Unknown fields expand to the empty string.
pub(crate) fn substitute<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    set_field_pattern()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            lookup(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

/// Reset everything but technical properties and flexible attributes
fn clear_tags(meta: &mut ItemMetadata) {
    *meta = ItemMetadata {
        length_seconds: meta.length_seconds,
        bitrate: meta.bitrate,
        format: meta.format.take(),
        extra: std::mem::take(&mut meta.extra),
        ..ItemMetadata::default()
    };
}

fn apply_album_info(meta: &mut ItemMetadata, info: &AlbumInfo, track: &TrackInfo, from_scratch: bool) {
    let own_album_artist = meta.album_artist.take().filter(|a| !a.is_empty());
    let own_album_artists = std::mem::take(&mut meta.album_artists);
    let own_album_artist_id = meta.mb_album_artist_id.take();

    if from_scratch {
        clear_tags(meta);
    }

    meta.album = Some(info.album.clone());
    meta.album_artist = Some(info.artist.clone());
    meta.album_artists.clone_from(&info.artists);
    meta.mb_album_artist_id.clone_from(&info.artist_id);
    meta.mb_album_id.clone_from(&info.album_id);
    meta.compilation = info.va;
    if info.year.is_some() {
        meta.year = info.year;
    }
    if info.genre.is_some() {
        meta.genre.clone_from(&info.genre);
    }
    if info.media.is_some() {
        meta.media.clone_from(&info.media);
    }
    if info.mediums.is_some() {
        meta.disc_total = info.mediums;
    }
    meta.data_source = info.data_source.clone().or_else(|| meta.data_source.take());

    meta.title = Some(track.title.clone());
    meta.artist = Some(track.artist.clone().unwrap_or_else(|| info.artist.clone()));
    meta.mb_artist_id = track.artist_id.clone().or_else(|| info.artist_id.clone());
    meta.mb_track_id.clone_from(&track.track_id);
    if let Some(number) = track.medium_index.or(track.index) {
        meta.track_number = Some(number);
    }
    meta.track_total = track
        .medium_total
        .or_else(|| u32::try_from(info.tracks.len()).ok());
    if track.medium.is_some() {
        meta.disc_number = track.medium;
    }

    // Values already tagged on the item take precedence over the release.
    if !from_scratch {
        if own_album_artist.is_some() {
            meta.album_artist = own_album_artist;
        }
        if !own_album_artists.is_empty() {
            meta.album_artists = own_album_artists;
        }
        if own_album_artist_id.is_some() {
            meta.mb_album_artist_id = own_album_artist_id;
        }
    }
}

fn apply_track_info(meta: &mut ItemMetadata, track: &TrackInfo, from_scratch: bool) {
    if from_scratch {
        clear_tags(meta);
    }

    meta.title = Some(track.title.clone());
    if track.artist.is_some() {
        meta.artist.clone_from(&track.artist);
    }
    if track.artist_id.is_some() {
        meta.mb_artist_id.clone_from(&track.artist_id);
    }
    meta.mb_track_id.clone_from(&track.track_id);
    if track.data_source.is_some() {
        meta.data_source.clone_from(&track.data_source);
    }
}

fn archive_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Check if a path is an archive the importer can unpack
pub fn is_archive(path: &Path) -> bool {
    path.is_file()
        && archive_extension(path).is_some_and(|ext| ARCHIVE_EXTENSIONS.contains(&ext.as_str()))
}

/// Relative paths of the regular files in an archive, sorted, without unpacking
///
/// Entries that would land outside the extraction root are left out, as
/// [`ImportTask::extract`] skips them too.
pub fn archive_members(archive: &Path) -> Result<Vec<PathBuf>> {
    let file = fs::File::open(archive)?;
    let mut members = Vec::new();

    match archive_extension(archive).as_deref() {
        Some("zip") => {
            let mut zip = zip::ZipArchive::new(file)?;
            for index in 0..zip.len() {
                let entry = zip.by_index(index)?;
                if entry.is_dir() {
                    continue;
                }
                if let Some(relative) = entry.enclosed_name() {
                    members.push(relative);
                }
            }
        }
        Some("tar") => {
            let tar_err =
                |e: std::io::Error| ImportError::Archive(format!("{}: {e}", archive.display()));
            let mut tar = tar::Archive::new(file);
            for entry in tar.entries().map_err(tar_err)? {
                let entry = entry.map_err(tar_err)?;
                if !entry.header().entry_type().is_file() {
                    continue;
                }
                let path = entry.path().map_err(tar_err)?.into_owned();
                if path
                    .components()
                    .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
                {
                    members.push(path);
                }
            }
        }
        _ => {
            return Err(ImportError::Archive(format!(
                "unsupported archive: {}",
                archive.display()
            )))
        }
    }

    members.sort();
    Ok(members)
}

fn unpack_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(name = entry.name(), "Skipping archive entry outside extraction root");
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

fn unpack_tar(archive: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive)?;
    tar::Archive::new(file)
        .unpack(dest)
        .map_err(|e| ImportError::Archive(format!("{}: {e}", archive.display())))
}
