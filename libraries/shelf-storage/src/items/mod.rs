use chrono::Utc;
use shelf_core::{error::Result, types::*};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::path::{Path, PathBuf};

use crate::parse_timestamp;

const SELECT_ITEMS: &str = "SELECT id, album_id, path, added, metadata FROM items";

fn from_row(row: &SqliteRow) -> Result<Item> {
    let metadata: String = row.get("metadata");
    let path: String = row.get("path");
    let added: String = row.get("added");

    Ok(Item {
        id: Some(row.get("id")),
        album_id: row.get("album_id"),
        path: PathBuf::from(path),
        added: parse_timestamp(&added),
        meta: serde_json::from_str(&metadata)?,
    })
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub async fn get_all(pool: &SqlitePool) -> Result<Vec<Item>> {
    let rows = sqlx::query(&format!("{SELECT_ITEMS} ORDER BY id"))
        .fetch_all(pool)
        .await?;

    rows.iter().map(from_row).collect()
}

pub async fn get_by_id(pool: &SqlitePool, id: ItemId) -> Result<Option<Item>> {
    let row = sqlx::query(&format!("{SELECT_ITEMS} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(from_row).transpose()
}

pub async fn get_by_album(pool: &SqlitePool, album_id: AlbumId) -> Result<Vec<Item>> {
    let rows = sqlx::query(&format!("{SELECT_ITEMS} WHERE album_id = ? ORDER BY id"))
        .bind(album_id)
        .fetch_all(pool)
        .await?;

    rows.iter().map(from_row).collect()
}

pub async fn get_by_path(pool: &SqlitePool, path: &Path) -> Result<Vec<Item>> {
    let rows = sqlx::query(&format!("{SELECT_ITEMS} WHERE path = ? ORDER BY id"))
        .bind(path_text(path))
        .fetch_all(pool)
        .await?;

    rows.iter().map(from_row).collect()
}

pub async fn find(pool: &SqlitePool, query: &FieldQuery) -> Result<Vec<Item>> {
    Ok(get_all(pool)
        .await?
        .into_iter()
        .filter(|item| query.matches(|field| item.get_field(field)))
        .collect())
}

pub async fn insert(
    conn: &mut SqliteConnection,
    item: &Item,
    album_id: Option<AlbumId>,
) -> Result<ItemId> {
    let added = item.added.unwrap_or_else(Utc::now);
    let metadata = serde_json::to_string(&item.meta)?;

    let result = sqlx::query(
        "INSERT INTO items (album_id, path, added, title, artist, metadata)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(album_id)
    .bind(path_text(&item.path))
    .bind(added.to_rfc3339())
    .bind(&item.meta.title)
    .bind(&item.meta.artist)
    .bind(metadata)
    .execute(conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn delete(conn: &mut SqliteConnection, id: ItemId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM items WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete_by_album(conn: &mut SqliteConnection, album_id: AlbumId) -> Result<u64> {
    let result = sqlx::query("DELETE FROM items WHERE album_id = ?")
        .bind(album_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

pub async fn album_of(conn: &mut SqliteConnection, id: ItemId) -> Result<Option<AlbumId>> {
    let row = sqlx::query("SELECT album_id FROM items WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?;

    Ok(row.and_then(|row| row.get("album_id")))
}

pub async fn count_by_album(conn: &mut SqliteConnection, album_id: AlbumId) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM items WHERE album_id = ?")
        .bind(album_id)
        .fetch_one(conn)
        .await?;

    Ok(row.get("count"))
}
