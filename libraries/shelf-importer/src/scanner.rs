//! Directory walking and album grouping
//!
//! A scan root is walked in pre-order with entries sorted case-insensitively
//! on their NFC form.
//! Each directory that holds audio files becomes one album group, except
//! that multi-disc releases are collapsed into a single group. Two layouts are recognised:
//!
//! - **Nested**: a directory with no audio files of its own whose
//!   subdirectories all share a disc-marker prefix (`CD 1`, `CD 2`, ...)
//! - **Flattened**: sibling directories whose names share a disc-marker
//!   prefix (`Album disc 1`, `Album disc 2`, ...)

use regex::Regex;
use std::collections::VecDeque;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;
use walkdir::WalkDir;

/// Supported audio file extensions
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "oga", "wav", "aac", "m4a", "opus", "aif", "aiff", "wma", "ape", "wv",
    "mpc", "alac", "dsf",
];

/// Names skipped while walking unless configured otherwise
pub const DEFAULT_IGNORE: &[&str] = &[".*", "*~", "System Volume Information", "lost+found"];

/// Disc markers, tried in order
const MULTIDISC_MARKERS: &[&str] = &["dis[ck]", "cd"];

/// A set of audio files believed to form one release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaGroup {
    /// Directories whose files make up the group
    pub roots: Vec<PathBuf>,
    /// Audio files in walk order
    pub files: Vec<PathBuf>,
}

/// Walks scan roots and groups audio files into album candidates
#[derive(Debug, Clone)]
pub struct AlbumGrouper {
    /// Whether to follow symbolic links
    follow_links: bool,

    /// Compiled ignore patterns, matched against entry names
    ignore: Vec<Regex>,
}

impl Default for AlbumGrouper {
    fn default() -> Self {
        Self {
            follow_links: false,
            ignore: compile_ignore(DEFAULT_IGNORE.iter().copied()),
        }
    }
}

impl AlbumGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to follow symbolic links
    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Replace the ignore list with shell-style patterns (`*` and `?`)
    pub fn ignore_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<S> = patterns.into_iter().collect();
        self.ignore = compile_ignore(patterns.iter().map(AsRef::as_ref));
        self
    }

    /// Check an entry name against the ignore list
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore.iter().any(|re| re.is_match(name))
    }

    /// Walk `root` in pre-order, one listing per directory
    pub fn walk(&self, root: &Path) -> SortedWalk {
        SortedWalk {
            grouper: self.clone(),
            pending: vec![root.to_path_buf()],
        }
    }

    /// Lazily group the audio files under `root` into album candidates
    ///
    /// Calling this again restarts the walk from scratch.
    pub fn albums_in_dir(&self, root: &Path) -> AlbumGroups {
        AlbumGroups {
            walk: self.walk(root),
            collapse: None,
            ready: VecDeque::new(),
        }
    }

    /// Every audio file under `root`, in walk order
    pub fn singletons_in_dir(&self, root: &Path) -> impl Iterator<Item = PathBuf> {
        self.walk(root).flat_map(|listing| listing.files)
    }

    /// List a single directory: sorted subdirectories and audio files
    fn list_dir(&self, dir: &Path) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let mut dirs = Vec::new();
        let mut files = Vec::new();

        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(self.follow_links)
            .sort_by(|a, b| {
                sort_key(a.file_name())
                    .cmp(&sort_key(b.file_name()))
                    .then_with(|| a.file_name().cmp(b.file_name()))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    continue;
                }
            };

            if self.is_ignored(&entry.file_name().to_string_lossy()) {
                continue;
            }

            if entry.file_type().is_dir() {
                dirs.push(entry.into_path());
            } else if is_audio_file(entry.path()) {
                files.push(entry.into_path());
            }
        }

        (dirs, files)
    }
}

/// One directory visited by [`SortedWalk`]
#[derive(Debug, Clone)]
pub struct DirListing {
    pub path: PathBuf,
    pub dirs: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
}

/// Pre-order directory walk, entries sorted case-insensitively
pub struct SortedWalk {
    grouper: AlbumGrouper,
    pending: Vec<PathBuf>,
}

impl Iterator for SortedWalk {
    type Item = DirListing;

    fn next(&mut self) -> Option<DirListing> {
        let path = self.pending.pop()?;
        let (dirs, files) = self.grouper.list_dir(&path);
        self.pending.extend(dirs.iter().rev().cloned());
        Some(DirListing { path, dirs, files })
    }
}

/// Multi-disc set being accumulated
struct Collapse {
    /// Directories whose descendants belong to the set
    anchors: Vec<PathBuf>,
    /// Sibling name pattern for flattened sets
    sibling: Option<Regex>,
    roots: Vec<PathBuf>,
    files: Vec<PathBuf>,
}

impl Collapse {
    fn accepts(&self, dir: &Path) -> bool {
        let below_anchor = self
            .anchors
            .iter()
            .any(|anchor| dir != anchor && dir.starts_with(anchor));

        below_anchor
            || self
                .sibling
                .as_ref()
                .is_some_and(|pat| pat.is_match(&dir_name(dir)))
    }

    fn into_group(self) -> Option<MediaGroup> {
        (!self.files.is_empty()).then_some(MediaGroup {
            roots: self.roots,
            files: self.files,
        })
    }
}

/// Iterator over album groups, see [`AlbumGrouper::albums_in_dir`]
pub struct AlbumGroups {
    walk: SortedWalk,
    collapse: Option<Collapse>,
    ready: VecDeque<MediaGroup>,
}

impl AlbumGroups {
    fn visit(&mut self, listing: DirListing) {
        let DirListing { path, dirs, files } = listing;

        if let Some(collapse) = self.collapse.as_mut() {
            if collapse.accepts(&path) {
                collapse.anchors.push(path.clone());
                // Only directories holding audio are roots
                if !files.is_empty() {
                    collapse.roots.push(path);
                    collapse.files.extend(files);
                }
                return;
            }
            if let Some(group) = self.collapse.take().and_then(Collapse::into_group) {
                self.ready.push_back(group);
            }
        }

        if files.is_empty() && !dirs.is_empty() {
            if nested_disc_dirs(&dirs) {
                self.collapse = Some(Collapse {
                    anchors: vec![path],
                    sibling: None,
                    roots: Vec::new(),
                    files: Vec::new(),
                });
                return;
            }
        } else if !files.is_empty() {
            if let Some(sibling) = disc_sibling_pattern(&dir_name(&path)) {
                self.collapse = Some(Collapse {
                    anchors: vec![path.clone()],
                    sibling: Some(sibling),
                    roots: vec![path],
                    files,
                });
                return;
            }
        }

        if !files.is_empty() {
            self.ready.push_back(MediaGroup {
                roots: vec![path],
                files,
            });
        }
    }
}

impl Iterator for AlbumGroups {
    type Item = MediaGroup;

    fn next(&mut self) -> Option<MediaGroup> {
        loop {
            if let Some(group) = self.ready.pop_front() {
                return Some(group);
            }

            match self.walk.next() {
                Some(listing) => self.visit(listing),
                None => return self.collapse.take().and_then(Collapse::into_group),
            }
        }
    }
}

/// Whether every subdirectory shares the disc-marker prefix of the first
fn nested_disc_dirs(dirs: &[PathBuf]) -> bool {
    let names: Vec<String> = dirs.iter().map(|d| dir_name(d)).collect();
    let Some(first) = names.first() else {
        return false;
    };

    MULTIDISC_MARKERS.iter().any(|marker| {
        marker_prefix_pattern(marker, first)
            .is_some_and(|pat| names.iter().all(|name| pat.is_match(name)))
    })
}

/// Pattern matching siblings of a flattened multi-disc directory
fn disc_sibling_pattern(name: &str) -> Option<Regex> {
    MULTIDISC_MARKERS
        .iter()
        .find_map(|marker| marker_prefix_pattern(marker, name))
}

/// If `name` looks like `<prefix><marker><separators><digit>`, build a
/// pattern matching any name with the same prefix followed by a digit
fn marker_prefix_pattern(marker: &str, name: &str) -> Option<Regex> {
    let marker_re = Regex::new(&format!(r"(?i)^(.*{marker}[\W_]*)\d")).ok()?;
    let prefix = marker_re.captures(name)?.get(1)?.as_str();
    Regex::new(&format!(r"(?i)^{}\d", regex::escape(prefix))).ok()
}

/// Case-folded NFC form of an entry name, so that canonically equivalent
/// names sort together
fn sort_key(name: &OsStr) -> String {
    name.to_string_lossy().nfc().collect::<String>().to_lowercase()
}

/// NFC-normalized final path component
fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().nfc().collect())
        .unwrap_or_default()
}

fn compile_ignore<'a>(patterns: impl Iterator<Item = &'a str>) -> Vec<Regex> {
    patterns
        .filter_map(|pattern| match glob_to_regex(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!("Invalid ignore pattern {:?}: {}", pattern, e);
                None
            }
        })
        .collect()
}

fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re)
}

/// Check if a file is a supported audio file
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"audio").unwrap();
        path
    }

    fn rel_roots(base: &Path, group: &MediaGroup) -> Vec<String> {
        group
            .roots
            .iter()
            .map(|r| r.strip_prefix(base).unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("test.mp3")));
        assert!(is_audio_file(Path::new("test.MP3")));
        assert!(is_audio_file(Path::new("test.flac")));
        assert!(!is_audio_file(Path::new("test.txt")));
        assert!(!is_audio_file(Path::new("test")));
    }

    #[test]
    fn test_one_group_per_directory() {
        let temp = TempDir::new().unwrap();
        let base = temp.path();
        touch(base, "a/1.mp3");
        touch(base, "a/2.mp3");
        touch(base, "b/1.mp3");
        touch(base, "b/cover.jpg");
        fs::create_dir_all(base.join("empty")).unwrap();

        let groups: Vec<_> = AlbumGrouper::new().albums_in_dir(base).collect();

        assert_eq!(groups.len(), 2);
        assert_eq!(rel_roots(base, &groups[0]), vec!["a"]);
        assert_eq!(groups[0].files.len(), 2);
        assert_eq!(rel_roots(base, &groups[1]), vec!["b"]);
        assert_eq!(groups[1].files.len(), 1);
    }

    #[test]
    fn test_multidisc_layouts() {
        let temp = TempDir::new().unwrap();
        let base = temp.path();
        touch(base, "ABCD1234/cd 1/song1.mp3");
        touch(base, "ABCD1234/cd 3 - bonus/song2.mp3");
        touch(base, "album/cd _ 1/song3.mp3");
        touch(base, "artist [CD5]/CAT disc 1/song4.mp3");
        touch(base, "artist [CD5]/CAt disc 2/song5.mp3");
        touch(base, "artist [CD5]/CATS/song6.mp3");

        let groups: Vec<_> = AlbumGrouper::new().albums_in_dir(base).collect();
        let roots: Vec<_> = groups.iter().map(|g| rel_roots(base, g)).collect();

        assert_eq!(
            roots,
            vec![
                vec!["ABCD1234/cd 1", "ABCD1234/cd 3 - bonus"],
                vec!["album/cd _ 1"],
                vec!["artist [CD5]/CAT disc 1", "artist [CD5]/CAt disc 2"],
                vec!["artist [CD5]/CATS"],
            ]
        );
        assert_eq!(groups[0].files.len(), 2);
        assert_eq!(groups[2].files.len(), 2);
    }

    #[test]
    fn test_multidisc_unicode_names() {
        let temp = TempDir::new().unwrap();
        let base = temp.path();
        touch(base, "C\u{00C1}T disc 1/song1.mp3");
        touch(base, "C\u{00C1}t disc 2/song2.mp3");

        let groups: Vec<_> = AlbumGrouper::new().albums_in_dir(base).collect();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].files.len(), 2);
    }

    #[test]
    fn test_multidisc_decomposed_names() {
        let temp = TempDir::new().unwrap();
        let base = temp.path();
        // Composed and decomposed spellings of the same name
        touch(base, "C\u{00C1}T disc 1/song1.mp3");
        touch(base, "CA\u{0301}T disc 2/song2.mp3");
        // Sorts between the two by raw bytes
        touch(base, "Cb/song3.mp3");

        let groups: Vec<_> = AlbumGrouper::new().albums_in_dir(base).collect();
        let roots: Vec<_> = groups.iter().map(|g| rel_roots(base, g)).collect();

        assert_eq!(groups.len(), 2);
        assert_eq!(
            roots,
            vec![
                vec!["Cb".to_string()],
                vec![
                    "C\u{00C1}T disc 1".to_string(),
                    "CA\u{0301}T disc 2".to_string()
                ],
            ]
        );
        assert_eq!(groups[1].files.len(), 2);
    }

    #[test]
    fn test_nested_subdirs_of_disc_are_collapsed() {
        let temp = TempDir::new().unwrap();
        let base = temp.path();
        touch(base, "box/disc 1/a.mp3");
        touch(base, "box/disc 1/extras/b.mp3");
        touch(base, "box/disc 2/c.mp3");

        let groups: Vec<_> = AlbumGrouper::new().albums_in_dir(base).collect();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].files.len(), 3);
        assert!(!groups[0].roots.contains(&base.join("box")));
    }

    #[test]
    fn test_disc_roots_are_directories_with_audio() {
        let temp = TempDir::new().unwrap();
        let base = temp.path();
        touch(base, "box/cd 1/sub/a.mp3");
        touch(base, "box/cd 2/b.mp3");

        let groups: Vec<_> = AlbumGrouper::new().albums_in_dir(base).collect();

        assert_eq!(groups.len(), 1);
        assert_eq!(rel_roots(base, &groups[0]), vec!["box/cd 1/sub", "box/cd 2"]);
        assert_eq!(groups[0].files.len(), 2);
    }

    #[test]
    fn test_ignored_names_are_skipped() {
        let temp = TempDir::new().unwrap();
        let base = temp.path();
        touch(base, "album/1.mp3");
        touch(base, "album/.hidden.mp3");
        touch(base, "album/backup.mp3~");
        touch(base, ".trash/2.mp3");

        let groups: Vec<_> = AlbumGrouper::new().albums_in_dir(base).collect();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].files, vec![base.join("album/1.mp3")]);

        let everything: Vec<_> = AlbumGrouper::new()
            .ignore_patterns(Vec::<String>::new())
            .albums_in_dir(base)
            .collect();
        assert_eq!(everything.len(), 2);
    }

    #[test]
    fn test_walk_is_restartable() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "x/1.mp3");
        let grouper = AlbumGrouper::new();

        let first: Vec<_> = grouper.albums_in_dir(temp.path()).collect();
        let second: Vec<_> = grouper.albums_in_dir(temp.path()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_singletons_follow_walk_order() {
        let temp = TempDir::new().unwrap();
        let base = temp.path();
        touch(base, "top.mp3");
        touch(base, "a/2.mp3");
        touch(base, "a/1.mp3");
        touch(base, "b/3.mp3");

        let files: Vec<_> = AlbumGrouper::new().singletons_in_dir(base).collect();
        assert_eq!(
            files,
            vec![
                base.join("top.mp3"),
                base.join("a/1.mp3"),
                base.join("a/2.mp3"),
                base.join("b/3.mp3"),
            ]
        );
    }

    #[test]
    fn test_empty_or_missing_root_yields_nothing() {
        let temp = TempDir::new().unwrap();
        assert_eq!(AlbumGrouper::new().albums_in_dir(temp.path()).count(), 0);
        assert_eq!(
            AlbumGrouper::new()
                .albums_in_dir(&temp.path().join("missing"))
                .count(),
            0
        );
    }
}
