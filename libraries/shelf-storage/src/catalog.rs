use crate::{albums, items, StorageError};
use async_trait::async_trait;
use shelf_core::{error::Result, traits::Catalog, types::*};
use sqlx::SqlitePool;
use std::path::PathBuf;

/// Library catalog backed by `SQLite`
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) and migrate the database at `database_url`
    pub async fn open(database_url: &str) -> std::result::Result<Self, StorageError> {
        let pool = crate::create_pool(database_url).await?;
        crate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn add_album(&self, album: &Album, album_items: &[Item]) -> Result<AlbumId> {
        let mut tx = self.pool.begin().await?;

        let album_id = albums::insert(&mut tx, album).await?;
        for item in album_items {
            items::insert(&mut tx, item, Some(album_id)).await?;
        }

        tx.commit().await?;
        tracing::debug!(album_id, items = album_items.len(), "Stored album");
        Ok(album_id)
    }

    async fn add_item(&self, item: &Item) -> Result<ItemId> {
        let mut conn = self.pool.acquire().await?;
        let id = items::insert(&mut conn, item, None).await?;
        tracing::debug!(item_id = id, "Stored singleton");
        Ok(id)
    }

    async fn add_items_to_album(&self, album_id: AlbumId, album_items: &[Item]) -> Result<()> {
        if albums::get_by_id(&self.pool, album_id).await?.is_none() {
            return Err(StorageError::not_found("Album", album_id.to_string()).into());
        }

        let mut tx = self.pool.begin().await?;
        for item in album_items {
            items::insert(&mut tx, item, Some(album_id)).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_album(&self, album: &Album) -> Result<()> {
        let id = album
            .id
            .ok_or_else(|| shelf_core::ShelfError::invalid_input("album has no id"))?;

        let mut conn = self.pool.acquire().await?;
        if !albums::update(&mut conn, id, album).await? {
            return Err(StorageError::not_found("Album", id.to_string()).into());
        }
        Ok(())
    }

    async fn get_album(&self, id: AlbumId) -> Result<Option<Album>> {
        albums::get_by_id(&self.pool, id).await
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<Item>> {
        items::get_by_id(&self.pool, id).await
    }

    async fn albums(&self) -> Result<Vec<Album>> {
        albums::get_all(&self.pool).await
    }

    async fn items(&self) -> Result<Vec<Item>> {
        items::get_all(&self.pool).await
    }

    async fn album_items(&self, id: AlbumId) -> Result<Vec<Item>> {
        items::get_by_album(&self.pool, id).await
    }

    async fn items_by_paths(&self, paths: &[PathBuf]) -> Result<Vec<Item>> {
        let mut found = Vec::new();
        for path in paths {
            found.extend(items::get_by_path(&self.pool, path).await?);
        }
        Ok(found)
    }

    async fn remove_album(&self, id: AlbumId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        items::delete_by_album(&mut tx, id).await?;
        if !albums::delete(&mut tx, id).await? {
            return Err(StorageError::not_found("Album", id.to_string()).into());
        }
        tx.commit().await?;
        Ok(())
    }

    async fn remove_item(&self, id: ItemId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let album_id = items::album_of(&mut tx, id).await?;
        if !items::delete(&mut tx, id).await? {
            return Err(StorageError::not_found("Item", id.to_string()).into());
        }
        if let Some(album_id) = album_id {
            if items::count_by_album(&mut tx, album_id).await? == 0 {
                albums::delete(&mut tx, album_id).await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_albums(&self, query: &FieldQuery) -> Result<Vec<Album>> {
        albums::find(&self.pool, query).await
    }

    async fn find_items(&self, query: &FieldQuery) -> Result<Vec<Item>> {
        items::find(&self.pool, query).await
    }
}
