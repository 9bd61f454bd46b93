//! Integration tests for the SQLite catalog
//!
//! Covers:
//! - Storing albums with their items in one call
//! - Singletons and album membership
//! - Field queries over flexible attributes
//! - Removal semantics (empty albums disappear with their last item)

mod test_helpers;

use chrono::{TimeZone, Utc};
use shelf_core::types::*;
use shelf_core::Catalog;
use std::path::PathBuf;
use test_helpers::*;

#[tokio::test]
async fn test_add_album_with_items() {
    let db = TestDb::new().await;

    let album = make_album("The Artist", "The Album");
    let items = vec![
        make_item("/lib/a/1.mp3", "The Artist", "The Album", "One"),
        make_item("/lib/a/2.mp3", "The Artist", "The Album", "Two"),
    ];

    let album_id = db.catalog.add_album(&album, &items).await.unwrap();

    let stored = db.catalog.get_album(album_id).await.unwrap().unwrap();
    assert_eq!(stored.id, Some(album_id));
    assert_eq!(stored.album, "The Album");
    assert!(stored.added.is_some());

    let stored_items = db.catalog.album_items(album_id).await.unwrap();
    assert_eq!(stored_items.len(), 2);
    assert!(stored_items.iter().all(|i| i.album_id == Some(album_id)));
    assert_eq!(stored_items[0].meta.title.as_deref(), Some("One"));
}

#[tokio::test]
async fn test_singleton_has_no_album() {
    let db = TestDb::new().await;

    let id = db
        .catalog
        .add_item(&make_item("/lib/s.mp3", "Artist", "", "Single"))
        .await
        .unwrap();

    let item = db.catalog.get_item(id).await.unwrap().unwrap();
    assert_eq!(item.album_id, None);
    assert!(db.catalog.albums().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_added_timestamp_is_preserved() {
    let db = TestDb::new().await;
    let added = Utc.with_ymd_and_hms(2020, 5, 17, 12, 0, 0).unwrap();

    let mut item = make_item("/lib/old.mp3", "Artist", "", "Old");
    item.added = Some(added);
    let id = db.catalog.add_item(&item).await.unwrap();

    let stored = db.catalog.get_item(id).await.unwrap().unwrap();
    assert_eq!(stored.added, Some(added));
}

#[tokio::test]
async fn test_find_albums_by_flexible_field() {
    let db = TestDb::new().await;

    let mut flagged = make_album("Artist", "Album");
    flagged.set_field("flex", "one");
    db.catalog.add_album(&flagged, &[]).await.unwrap();
    db.catalog
        .add_album(&make_album("Artist", "Album"), &[])
        .await
        .unwrap();

    let query = FieldQuery::new(vec![
        ("albumartist".into(), "Artist".into()),
        ("album".into(), "Album".into()),
    ]);
    assert_eq!(db.catalog.find_albums(&query).await.unwrap().len(), 2);

    let mut with_flex = query.clone();
    with_flex.terms.push(("flex".into(), "one".into()));
    assert_eq!(db.catalog.find_albums(&with_flex).await.unwrap().len(), 1);

    // Missing flexible values match the empty string
    let mut without_flex = query;
    without_flex.terms.push(("flex".into(), String::new()));
    assert_eq!(db.catalog.find_albums(&without_flex).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_find_items_and_paths() {
    let db = TestDb::new().await;

    db.catalog
        .add_item(&make_item("/lib/x.mp3", "Artist", "", "Title"))
        .await
        .unwrap();
    db.catalog
        .add_item(&make_item("/lib/y.mp3", "Artist", "", "Other"))
        .await
        .unwrap();

    let query = FieldQuery::new(vec![
        ("artist".into(), "Artist".into()),
        ("title".into(), "Title".into()),
    ]);
    let found = db.catalog.find_items(&query).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].path, PathBuf::from("/lib/x.mp3"));

    let by_path = db
        .catalog
        .items_by_paths(&[PathBuf::from("/lib/y.mp3"), PathBuf::from("/nope.mp3")])
        .await
        .unwrap();
    assert_eq!(by_path.len(), 1);
    assert_eq!(by_path[0].meta.title.as_deref(), Some("Other"));
}

#[tokio::test]
async fn test_removing_last_item_removes_album() {
    let db = TestDb::new().await;

    let album_id = db
        .catalog
        .add_album(
            &make_album("Artist", "Album"),
            &[make_item("/lib/1.mp3", "Artist", "Album", "One")],
        )
        .await
        .unwrap();
    let item_id = db.catalog.album_items(album_id).await.unwrap()[0]
        .id
        .unwrap();

    db.catalog.remove_item(item_id).await.unwrap();

    assert!(db.catalog.get_album(album_id).await.unwrap().is_none());
    assert!(db.catalog.items().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_album_removes_items() {
    let db = TestDb::new().await;

    let album_id = db
        .catalog
        .add_album(
            &make_album("Artist", "Album"),
            &[
                make_item("/lib/1.mp3", "Artist", "Album", "One"),
                make_item("/lib/2.mp3", "Artist", "Album", "Two"),
            ],
        )
        .await
        .unwrap();

    db.catalog.remove_album(album_id).await.unwrap();

    assert!(db.catalog.albums().await.unwrap().is_empty());
    assert!(db.catalog.items().await.unwrap().is_empty());
    assert!(db.catalog.remove_album(album_id).await.is_err());
}

#[tokio::test]
async fn test_merge_items_and_update_album() {
    let db = TestDb::new().await;

    let album_id = db
        .catalog
        .add_album(
            &make_album("Artist", "Album"),
            &[make_item("/lib/1.mp3", "Artist", "Album", "One")],
        )
        .await
        .unwrap();

    db.catalog
        .add_items_to_album(album_id, &[make_item("/lib/2.mp3", "Artist", "Album", "Two")])
        .await
        .unwrap();

    let mut album = db.catalog.get_album(album_id).await.unwrap().unwrap();
    album.year = Some(2001);
    db.catalog.update_album(&album).await.unwrap();

    let stored = db.catalog.get_album(album_id).await.unwrap().unwrap();
    assert_eq!(stored.year, Some(2001));
    assert_eq!(db.catalog.album_items(album_id).await.unwrap().len(), 2);

    assert!(db.catalog.add_items_to_album(album_id + 100, &[]).await.is_err());
}
