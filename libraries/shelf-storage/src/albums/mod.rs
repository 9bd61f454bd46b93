use chrono::Utc;
use shelf_core::{error::Result, types::*};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::parse_timestamp;

fn from_row(row: &SqliteRow) -> Result<Album> {
    let data: String = row.get("data");
    let added: String = row.get("added");

    let mut album: Album = serde_json::from_str(&data)?;
    album.id = Some(row.get("id"));
    album.added = parse_timestamp(&added);
    Ok(album)
}

pub async fn get_all(pool: &SqlitePool) -> Result<Vec<Album>> {
    let rows = sqlx::query("SELECT id, added, data FROM albums ORDER BY id")
        .fetch_all(pool)
        .await?;

    rows.iter().map(from_row).collect()
}

pub async fn get_by_id(pool: &SqlitePool, id: AlbumId) -> Result<Option<Album>> {
    let row = sqlx::query("SELECT id, added, data FROM albums WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(from_row).transpose()
}

/// Albums matching every term of `query`
///
/// Flexible attributes live in the JSON column, so matching happens here
/// rather than in SQL.
pub async fn find(pool: &SqlitePool, query: &FieldQuery) -> Result<Vec<Album>> {
    Ok(get_all(pool)
        .await?
        .into_iter()
        .filter(|album| query.matches(|field| album.get_field(field)))
        .collect())
}

pub async fn insert(conn: &mut SqliteConnection, album: &Album) -> Result<AlbumId> {
    let added = album.added.unwrap_or_else(Utc::now);
    let data = serde_json::to_string(album)?;

    let result = sqlx::query(
        "INSERT INTO albums (album, albumartist, added, data)
         VALUES (?, ?, ?, ?)",
    )
    .bind(&album.album)
    .bind(&album.album_artist)
    .bind(added.to_rfc3339())
    .bind(data)
    .execute(conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn update(conn: &mut SqliteConnection, id: AlbumId, album: &Album) -> Result<bool> {
    let data = serde_json::to_string(album)?;

    let result = match album.added {
        Some(added) => {
            sqlx::query(
                "UPDATE albums SET album = ?, albumartist = ?, added = ?, data = ? WHERE id = ?",
            )
            .bind(&album.album)
            .bind(&album.album_artist)
            .bind(added.to_rfc3339())
            .bind(data)
            .bind(id)
            .execute(conn)
            .await?
        }
        None => {
            sqlx::query("UPDATE albums SET album = ?, albumartist = ?, data = ? WHERE id = ?")
                .bind(&album.album)
                .bind(&album.album_artist)
                .bind(data)
                .bind(id)
                .execute(conn)
                .await?
        }
    };

    Ok(result.rows_affected() > 0)
}

pub async fn delete(conn: &mut SqliteConnection, id: AlbumId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM albums WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected() > 0)
}
