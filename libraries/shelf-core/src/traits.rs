/// Core traits for Shelf
use crate::error::Result;
use crate::types::{Album, AlbumId, AlbumInfo, FieldQuery, Item, ItemId, ItemMetadata, TrackInfo};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Tag reader/writer
///
/// Implementers translate between on-disk audio tags and `ItemMetadata`.
pub trait TagCodec: Send + Sync {
    /// Read the tag snapshot of an audio file
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or parsed
    fn read(&self, path: &Path) -> Result<ItemMetadata>;

    /// Write `meta` into the file's tags
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or saved
    fn write(&self, path: &Path, meta: &ItemMetadata) -> Result<()>;
}

/// External metadata source queried for match candidates
///
/// Failures are not fatal to an import: callers log them and continue
/// with whatever candidates they already have.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Search for releases matching a group of items
    async fn album_candidates(
        &self,
        items: &[Item],
        artist: &str,
        album: &str,
    ) -> Result<Vec<AlbumInfo>>;

    /// Search for recordings matching a single item
    async fn item_candidates(&self, item: &Item, artist: &str, title: &str)
        -> Result<Vec<TrackInfo>>;

    /// Fetch a release by its external identifier
    async fn album_for_id(&self, id: &str) -> Result<Option<AlbumInfo>>;

    /// Fetch a recording by its external identifier
    async fn track_for_id(&self, id: &str) -> Result<Option<TrackInfo>>;
}

/// Persistent library catalog
///
/// Every mutating call is atomic: either all of its rows are written or
/// none are.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Store an album and its items, returning the new album id
    ///
    /// Items get their `id` and `album_id` assigned by the catalog.
    async fn add_album(&self, album: &Album, items: &[Item]) -> Result<AlbumId>;

    /// Store a singleton item
    async fn add_item(&self, item: &Item) -> Result<ItemId>;

    /// Attach more items to an existing album
    async fn add_items_to_album(&self, album_id: AlbumId, items: &[Item]) -> Result<()>;

    /// Overwrite the stored fields of an album
    async fn update_album(&self, album: &Album) -> Result<()>;

    async fn get_album(&self, id: AlbumId) -> Result<Option<Album>>;

    async fn get_item(&self, id: ItemId) -> Result<Option<Item>>;

    async fn albums(&self) -> Result<Vec<Album>>;

    async fn items(&self) -> Result<Vec<Item>>;

    async fn album_items(&self, id: AlbumId) -> Result<Vec<Item>>;

    /// Items whose stored path is one of `paths`
    async fn items_by_paths(&self, paths: &[PathBuf]) -> Result<Vec<Item>>;

    /// Remove an album together with its items (files are untouched)
    async fn remove_album(&self, id: AlbumId) -> Result<()>;

    /// Remove an item; an album left empty is removed with it
    async fn remove_item(&self, id: ItemId) -> Result<()>;

    async fn find_albums(&self, query: &FieldQuery) -> Result<Vec<Album>>;

    async fn find_items(&self, query: &FieldQuery) -> Result<Vec<Item>>;
}
