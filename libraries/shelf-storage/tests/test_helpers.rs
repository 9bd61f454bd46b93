//! Test helpers and fixtures for catalog integration tests
//!
//! Databases are REAL SQLite files in a temp dir (NOT in-memory), so every
//! pooled connection sees the same schema and rows.

use shelf_core::types::*;
use shelf_storage::SqliteCatalog;
use std::path::PathBuf;
use tempfile::TempDir;

/// Test catalog wrapper that cleans up on drop
pub struct TestDb {
    pub catalog: SqliteCatalog,
    _temp_dir: TempDir,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let db_url = format!("sqlite://{}", db_path.display());

        let catalog = SqliteCatalog::open(&db_url)
            .await
            .expect("Failed to open catalog");

        Self {
            catalog,
            _temp_dir: temp_dir,
        }
    }
}

/// Test fixture: an unsaved item with the common tags filled in
pub fn make_item(path: &str, artist: &str, album: &str, title: &str) -> Item {
    let mut meta = ItemMetadata::default();
    meta.artist = Some(artist.to_string());
    meta.album = Some(album.to_string());
    meta.title = Some(title.to_string());
    Item::new(PathBuf::from(path), meta)
}

/// Test fixture: an unsaved album record
pub fn make_album(album_artist: &str, album: &str) -> Album {
    Album {
        album: album.to_string(),
        album_artist: album_artist.to_string(),
        ..Album::default()
    }
}
