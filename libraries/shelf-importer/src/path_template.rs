//! Library path templates
//!
//! Supports templates like `{AlbumArtist}/{Album}/{TrackNo} - {Title}`
//! with automatic fallbacks and sanitization for filesystem safety.
//!
//! # Available Placeholders
//!
//! | Placeholder | Description | Fallback |
//! |-------------|-------------|----------|
//! | `{Artist}` | Track artist | "Unknown Artist" |
//! | `{AlbumArtist}` | Album artist | Falls back to `{Artist}` |
//! | `{Album}` | Album title | "Unknown Album" |
//! | `{Title}` | Track title | Filename without extension |
//! | `{TrackNo}` | Track number (zero-padded) | "00" |
//! | `{DiscNo}` | Disc number | "1" |
//! | `{Year}` | Release year | "0000" |
//! | `{Genre}` | Genre | "Unknown" |

use serde::{Deserialize, Serialize};
use shelf_core::types::ItemMetadata;
use std::path::{Path, PathBuf};

/// Template for album tracks
pub const DEFAULT_TEMPLATE: &str = "{AlbumArtist}/{Album}/{TrackNo} - {Title}";

/// Template for singleton tracks
pub const SINGLETON_TEMPLATE: &str = "Non-Album/{Artist}/{Title}";

/// Template for compilation tracks
pub const COMP_TEMPLATE: &str = "Compilations/{Album}/{TrackNo} - {Title}";

/// Path template parser and resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    template: String,
    /// Whether to add disc subfolder for multi-disc albums
    add_disc_folder: bool,
}

impl Default for PathTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

impl PathTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            add_disc_folder: true,
        }
    }

    /// Set whether to add disc subfolder for multi-disc albums
    pub fn with_disc_folder(mut self, add_disc_folder: bool) -> Self {
        self.add_disc_folder = add_disc_folder;
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Resolve the template to a path relative to the library root
    ///
    /// `source_path` supplies the extension and the title fallback.
    pub fn resolve(&self, meta: &ItemMetadata, source_path: &Path) -> PathBuf {
        let extension = source_path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("mp3");

        let mut resolved = self.template.clone();
        resolved = resolve_placeholder(&resolved, "AlbumArtist", || {
            meta.effective_album_artist()
                .unwrap_or("Unknown Artist")
                .to_string()
        });
        resolved = resolve_placeholder(&resolved, "Artist", || {
            text_or(meta.artist.as_deref(), "Unknown Artist")
        });
        resolved = resolve_placeholder(&resolved, "Album", || {
            text_or(meta.album.as_deref(), "Unknown Album")
        });
        resolved = resolve_placeholder(&resolved, "Title", || {
            let stem = source_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("Unknown");
            text_or(meta.title.as_deref(), stem)
        });
        resolved = resolve_placeholder(&resolved, "TrackNo", || {
            meta.track_number
                .map_or_else(|| "00".to_string(), |n| format!("{n:02}"))
        });
        resolved = resolve_placeholder(&resolved, "DiscNo", || {
            meta.disc_number.unwrap_or(1).to_string()
        });
        resolved = resolve_placeholder(&resolved, "Year", || {
            meta.year.map_or_else(|| "0000".to_string(), |y| y.to_string())
        });
        resolved = resolve_placeholder(&resolved, "Genre", || {
            text_or(meta.genre.as_deref(), "Unknown")
        });

        let multi_disc = meta.disc_total.is_some_and(|total| total > 1);
        if self.add_disc_folder && multi_disc {
            resolved = insert_disc_folder(&resolved, meta.disc_number.unwrap_or(1));
        }

        sanitize_path(&format!("{resolved}.{extension}"))
    }
}

/// Templates used to place imported items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryLayout {
    pub default: String,
    pub singleton: String,
    pub comp: String,
}

impl Default for LibraryLayout {
    fn default() -> Self {
        Self {
            default: DEFAULT_TEMPLATE.to_string(),
            singleton: SINGLETON_TEMPLATE.to_string(),
            comp: COMP_TEMPLATE.to_string(),
        }
    }
}

impl LibraryLayout {
    /// Destination of an item under `library_dir`
    pub fn destination(
        &self,
        library_dir: &Path,
        meta: &ItemMetadata,
        source_path: &Path,
        singleton: bool,
    ) -> PathBuf {
        let template = if singleton {
            &self.singleton
        } else if meta.compilation {
            &self.comp
        } else {
            &self.default
        };
        library_dir.join(PathTemplate::new(template.as_str()).resolve(meta, source_path))
    }
}

fn text_or(value: Option<&str>, fallback: &str) -> String {
    value
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(fallback)
        .to_string()
}

fn resolve_placeholder<F>(template: &str, name: &str, value_fn: F) -> String
where
    F: FnOnce() -> String,
{
    let placeholder = format!("{{{name}}}");
    if template.contains(&placeholder) {
        // Separators inside values must not create directories
        template.replace(&placeholder, &value_fn().replace(['/', '\\'], "_"))
    } else {
        template.to_string()
    }
}

fn insert_disc_folder(path: &str, disc: u32) -> String {
    match path.rfind('/') {
        Some(last_sep) => {
            let (dir, file) = path.split_at(last_sep);
            format!("{dir}/Disc {disc}{file}")
        }
        None => format!("Disc {disc}/{path}"),
    }
}

fn sanitize_path(path: &str) -> PathBuf {
    path.split('/')
        .filter(|component| !component.is_empty())
        .map(sanitize_path_component)
        .collect()
}

/// Sanitize a single path component for filesystem safety
///
/// Removes/replaces characters that are invalid on common filesystems
pub fn sanitize_path_component(s: &str) -> String {
    let sanitized: String = s
        .chars()
        .map(|c| match c {
            // Invalid on Windows: < > : " / \ | ? *
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    // Windows doesn't like trailing dots
    let trimmed = sanitized.trim().trim_end_matches('.');

    let reserved = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];

    let upper = trimmed.to_uppercase();
    if reserved.contains(&upper.as_str()) {
        format!("_{trimmed}")
    } else if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_metadata() -> ItemMetadata {
        ItemMetadata {
            title: Some("Bohemian Rhapsody".to_string()),
            artist: Some("Queen".to_string()),
            album: Some("A Night at the Opera".to_string()),
            album_artist: Some("Queen".to_string()),
            track_number: Some(11),
            disc_number: Some(1),
            year: Some(1975),
            genre: Some("Rock".to_string()),
            ..ItemMetadata::default()
        }
    }

    #[test]
    fn test_default_template() {
        let path = PathTemplate::default().resolve(&test_metadata(), Path::new("/in/song.flac"));

        assert_eq!(
            path,
            PathBuf::from("Queen/A Night at the Opera/11 - Bohemian Rhapsody.flac")
        );
    }

    #[test]
    fn test_custom_template() {
        let template = PathTemplate::new("{Genre}/{Year} - {Album}/{DiscNo}-{TrackNo}");
        let path = template.resolve(&test_metadata(), Path::new("/in/song.flac"));

        assert_eq!(path, PathBuf::from("Rock/1975 - A Night at the Opera/1-11.flac"));
    }

    #[test]
    fn test_fallback_values() {
        let template = PathTemplate::new("{AlbumArtist}/{Year} - {Album}/{TrackNo} - {Title}");
        let path = template.resolve(&ItemMetadata::default(), Path::new("/in/original_song.mp3"));

        assert_eq!(
            path,
            PathBuf::from("Unknown Artist/0000 - Unknown Album/00 - original_song.mp3")
        );
    }

    #[test]
    fn test_album_artist_fallback() {
        let mut meta = test_metadata();
        meta.album_artist = None;
        let path = PathTemplate::default().resolve(&meta, Path::new("/in/song.flac"));

        let first = path.components().next().unwrap();
        assert_eq!(first.as_os_str().to_string_lossy(), "Queen");
    }

    #[test]
    fn test_multi_disc_album() {
        let mut meta = test_metadata();
        meta.disc_number = Some(2);
        meta.disc_total = Some(2);

        let path = PathTemplate::default().resolve(&meta, Path::new("/in/song.flac"));
        assert!(path.to_string_lossy().contains("Disc 2"));

        let flat = PathTemplate::default()
            .with_disc_folder(false)
            .resolve(&meta, Path::new("/in/song.flac"));
        assert!(!flat.to_string_lossy().contains("Disc"));
    }

    #[test]
    fn test_slash_in_value_stays_in_one_component() {
        let mut meta = test_metadata();
        meta.album_artist = Some("AC/DC".to_string());
        let path = PathTemplate::default().resolve(&meta, Path::new("/in/song.flac"));

        assert_eq!(path.components().count(), 3);
        assert!(path.starts_with("AC_DC"));
    }

    #[test]
    fn test_layout_picks_template() {
        let layout = LibraryLayout::default();
        let library = Path::new("/library");
        let source = Path::new("/in/song.mp3");

        let mut meta = test_metadata();
        assert!(layout
            .destination(library, &meta, source, true)
            .starts_with("/library/Non-Album/Queen"));

        meta.compilation = true;
        assert!(layout
            .destination(library, &meta, source, false)
            .starts_with("/library/Compilations/A Night at the Opera"));
    }

    #[test]
    fn test_sanitize_path_component() {
        assert_eq!(sanitize_path_component("Valid Name"), "Valid Name");
        assert_eq!(sanitize_path_component("Artist/Album"), "Artist_Album");
        assert_eq!(sanitize_path_component("Song: The Remix"), "Song_ The Remix");
        assert_eq!(sanitize_path_component("  Trimmed  "), "Trimmed");
        assert_eq!(sanitize_path_component("trailing..."), "trailing");
        assert_eq!(sanitize_path_component("CON"), "_CON");
        assert_eq!(sanitize_path_component(""), "_");
    }
}
