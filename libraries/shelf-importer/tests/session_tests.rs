//! End-to-end import sessions against a real catalog


use async_trait::async_trait;
use shelf_core::types::{Item, ItemMetadata};
use shelf_core::Catalog;
use shelf_importer::copy::FileOperation;
use shelf_importer::{
    Choice, ChoiceSource, Duplicates, ImportConfig, ImportEvent, ImportObserver, ImportTask,
    Resolution, ScriptedChoices,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use test_helpers::*;

fn as_is() -> Box<ScriptedChoices> {
    Box::new(ScriptedChoices::new(Choice::AsIs))
}

fn read_tags(path: &std::path::Path) -> ItemMetadata {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

/// Records the candidate ids it was offered, then applies the best
#[derive(Clone, Default)]
struct Inspecting {
    seen: Arc<Mutex<Vec<Vec<String>>>>,
}

#[async_trait]
impl ChoiceSource for Inspecting {
    async fn choose_album(&mut self, task: &ImportTask) -> Choice {
        let ids = task
            .candidates
            .iter()
            .filter_map(|c| c.id().map(ToString::to_string))
            .collect();
        self.seen.lock().unwrap().push(ids);
        Choice::Apply
    }

    async fn choose_item(&mut self, _task: &ImportTask) -> Choice {
        Choice::AsIs
    }

    async fn resolve_duplicate(&mut self, _task: &ImportTask, _dups: &Duplicates) -> Resolution {
        Resolution::Skip
    }
}

/// Records album names in the order they reach the catalog
#[derive(Default)]
struct AlbumOrder {
    albums: Mutex<Vec<String>>,
}

impl ImportObserver for AlbumOrder {
    fn on_event(&self, event: &ImportEvent) -> shelf_core::Result<()> {
        if let ImportEvent::AlbumImported { album, .. } = event {
            self.albums.lock().unwrap().push(album.album.clone());
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_as_is_album_is_copied_into_library() {
    let ws = Workspace::new();
    let db = TestDb::new().await;
    let sources = write_album(&ws.source.join("album"), "Artist", "Record", &["One", "Two"]);

    let mut session = session(&db, ws.config(), FakeSource::default()).with_choices(as_is());
    let summary = session.run(&[ws.source.clone()]).await.unwrap();

    assert_eq!(summary.albums_imported, 1);
    assert_eq!(summary.items_imported, 2);
    assert_eq!(summary.skipped, 0);

    let albums = db.catalog.albums().await.unwrap();
    assert_eq!(albums.len(), 1);
    assert_eq!(albums[0].album, "Record");
    assert_eq!(albums[0].album_artist, "Artist");
    assert!(!albums[0].compilation);

    let items = db.catalog.album_items(albums[0].id.unwrap()).await.unwrap();
    let expected = ws.library.join("Artist").join("Record").join("01 - One.mp3");
    assert!(items.iter().any(|i| i.path == expected));
    assert!(expected.exists());
    assert!(ws.library.join("Artist/Record/02 - Two.mp3").exists());

    // Copies leave the sources alone
    assert!(sources.iter().all(|p| p.exists()));
}

#[tokio::test]
async fn test_mixed_artists_become_compilation() {
    let ws = Workspace::new();
    let db = TestDb::new().await;
    let dir = ws.source.join("mix");
    write_track(&dir, "01.mp3", &track("Alpha", "Summer Mix", "Sun", 1));
    write_track(&dir, "02.mp3", &track("Beta", "Summer Mix", "Sea", 2));
    write_track(&dir, "03.mp3", &track("Gamma", "Summer Mix", "Sand", 3));

    let mut session = session(&db, ws.config(), FakeSource::default()).with_choices(as_is());
    session.run(&[ws.source.clone()]).await.unwrap();

    let albums = db.catalog.albums().await.unwrap();
    assert_eq!(albums[0].album_artist, "Various Artists");
    assert!(albums[0].compilation);
    assert!(ws
        .library
        .join("Compilations/Summer Mix/02 - Sea.mp3")
        .exists());
}

#[tokio::test]
async fn test_tagged_album_artist_is_shared() {
    let ws = Workspace::new();
    let db = TestDb::new().await;
    let dir = ws.source.join("mix");
    let mut first = track("Alpha", "Picks", "Sun", 1);
    first.album_artist = Some("Curator".to_string());
    write_track(&dir, "01.mp3", &first);
    write_track(&dir, "02.mp3", &track("Beta", "Picks", "Sea", 2));

    let mut session = session(&db, ws.config(), FakeSource::default()).with_choices(as_is());
    session.run(&[ws.source.clone()]).await.unwrap();

    let items = db.catalog.items().await.unwrap();
    assert_eq!(items.len(), 2);
    assert!(items
        .iter()
        .all(|i| i.meta.album_artist.as_deref() == Some("Curator")));
    assert!(ws.library.join("Curator/Picks/02 - Sea.mp3").exists());
}

#[tokio::test]
async fn test_applied_candidate_retags_items() {
    let ws = Workspace::new();
    let db = TestDb::new().await;
    write_album(&ws.source.join("album"), "artist", "record", &["First", "Second"]);

    let source = FakeSource::with_albums(vec![release(
        "rel-1",
        "Real Artist",
        "Real Record",
        &["First", "Second"],
    )]);
    let choices = ScriptedChoices::new(Choice::Apply);
    let mut session = session(&db, ws.config(), source).with_choices(Box::new(choices));
    session.run(&[ws.source.clone()]).await.unwrap();

    let albums = db.catalog.albums().await.unwrap();
    assert_eq!(albums[0].album, "Real Record");
    assert_eq!(albums[0].album_artist, "Real Artist");
    assert_eq!(albums[0].mb_album_id.as_deref(), Some("rel-1"));

    let dest = ws.library.join("Real Artist/Real Record/01 - First.mp3");
    let tags = read_tags(&dest);
    assert_eq!(tags.mb_track_id.as_deref(), Some("rel-1-0"));
    assert_eq!(tags.track_total, Some(2));
}

#[tokio::test]
async fn test_candidate_rank_selects_runner_up() {
    let ws = Workspace::new();
    let db = TestDb::new().await;
    write_album(&ws.source.join("album"), "Artist", "Record", &["First", "Second"]);

    let source = FakeSource::with_albums(vec![
        release("far", "Someone", "Elsewhere", &["Other", "Songs"]),
        release("near", "Artist", "Record", &["First", "Second"]),
    ]);
    let choices = ScriptedChoices::new(Choice::Candidate(2));
    let mut session = session(&db, ws.config(), source).with_choices(Box::new(choices));
    session.run(&[ws.source.clone()]).await.unwrap();

    let albums = db.catalog.albums().await.unwrap();
    assert_eq!(albums[0].mb_album_id.as_deref(), Some("far"));
    assert_eq!(albums[0].album, "Elsewhere");
}

#[tokio::test]
async fn test_search_ids_replace_text_search() {
    let ws = Workspace::new();
    let db = TestDb::new().await;
    write_album(&ws.source.join("album"), "Artist", "Record", &["First", "Second"]);

    let source = Arc::new(FakeSource::with_albums(vec![
        release("rel-1", "Artist", "Record", &["First", "Second"]),
        release("rel-2", "Artist", "Record (Deluxe)", &["First", "Second"]),
    ]));
    let config = ImportConfig {
        search_ids: vec!["rel-2".to_string(), "rel-2".to_string()],
        ..ws.config()
    };
    let inspecting = Inspecting::default();
    let mut session = shelf_importer::ImportSession::new(
        config,
        db.catalog.clone(),
        Arc::new(JsonCodec),
        source.clone(),
    )
    .unwrap()
    .with_choices(Box::new(inspecting.clone()));
    session.run(&[ws.source.clone()]).await.unwrap();

    assert_eq!(source.searches.load(Ordering::SeqCst), 0);
    assert_eq!(source.id_lookups.load(Ordering::SeqCst), 2);
    assert_eq!(
        *inspecting.seen.lock().unwrap(),
        vec![vec!["rel-2".to_string()]]
    );

    let albums = db.catalog.albums().await.unwrap();
    assert_eq!(albums[0].album, "Record (Deluxe)");
}

#[tokio::test]
async fn test_tracks_choice_imports_singletons() {
    let ws = Workspace::new();
    let db = TestDb::new().await;
    write_album(&ws.source.join("album"), "Artist", "Record", &["One", "Two"]);

    let choices = ScriptedChoices::new(Choice::AsIs).with_choices([Choice::Tracks]);
    let mut session =
        session(&db, ws.config(), FakeSource::default()).with_choices(Box::new(choices));
    let summary = session.run(&[ws.source.clone()]).await.unwrap();

    assert_eq!(summary.albums_imported, 0);
    assert_eq!(summary.items_imported, 2);
    assert!(db.catalog.albums().await.unwrap().is_empty());

    let items = db.catalog.items().await.unwrap();
    assert!(items.iter().all(|i| i.album_id.is_none()));
    assert!(ws.library.join("Non-Album/Artist/One.mp3").exists());
    assert!(ws.library.join("Non-Album/Artist/Two.mp3").exists());
}

fn write_two_albums_in_one_dir(ws: &Workspace) {
    let dir = ws.source.join("mixed");
    write_track(&dir, "01.mp3", &track("Artist", "First Record", "A", 1));
    write_track(&dir, "02.mp3", &track("Artist", "Second Record", "B", 1));
    write_track(&dir, "03.mp3", &track("Artist", "First Record", "C", 2));
}

#[tokio::test]
async fn test_albums_choice_regroups_items() {
    let ws = Workspace::new();
    let db = TestDb::new().await;
    write_two_albums_in_one_dir(&ws);

    let choices = ScriptedChoices::new(Choice::AsIs).with_choices([Choice::Albums]);
    let mut session =
        session(&db, ws.config(), FakeSource::default()).with_choices(Box::new(choices));
    let summary = session.run(&[ws.source.clone()]).await.unwrap();

    assert_eq!(summary.albums_imported, 2);
    let mut names: Vec<String> = db
        .catalog
        .albums()
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.album)
        .collect();
    names.sort();
    assert_eq!(names, vec!["First Record", "Second Record"]);
}

#[tokio::test]
async fn test_group_albums_option_splits_before_choosing() {
    let ws = Workspace::new();
    let db = TestDb::new().await;
    write_two_albums_in_one_dir(&ws);

    let config = ImportConfig {
        group_albums: true,
        ..ws.config()
    };
    let recorder = Arc::new(RecordingObserver::default());
    let mut session = session(&db, config, FakeSource::default())
        .with_choices(as_is())
        .with_observer(recorder.clone());
    let summary = session.run(&[ws.source.clone()]).await.unwrap();

    assert_eq!(summary.albums_imported, 2);
    let choices = recorder
        .names()
        .iter()
        .filter(|n| *n == "task_choice")
        .count();
    assert_eq!(choices, 2);
}

#[tokio::test]
async fn test_set_fields_reach_catalog_and_files() {
    let ws = Workspace::new();
    let db = TestDb::new().await;
    write_album(&ws.source.join("album"), "Artist", "Record", &["One"]);

    let config = ImportConfig {
        set_fields: BTreeMap::from([
            ("genre".to_string(), "Jazz".to_string()),
            ("source".to_string(), "from $artist".to_string()),
        ]),
        ..ws.config()
    };
    let mut session = session(&db, config, FakeSource::default()).with_choices(as_is());
    session.run(&[ws.source.clone()]).await.unwrap();

    let items = db.catalog.items().await.unwrap();
    assert_eq!(items[0].meta.genre.as_deref(), Some("Jazz"));
    assert_eq!(
        items[0].meta.extra.get("source").map(String::as_str),
        Some("from Artist")
    );
    assert_eq!(db.catalog.albums().await.unwrap()[0].genre.as_deref(), Some("Jazz"));

    let tags = read_tags(&items[0].path);
    assert_eq!(tags.genre.as_deref(), Some("Jazz"));
}

#[tokio::test]
async fn test_pretend_lists_albums_without_importing() {
    let ws = Workspace::new();
    let db = TestDb::new().await;
    let dir = ws.source.join("album");
    let files = write_album(&dir, "Artist", "Record", &["One", "Two"]);
    let empty = ws.source.join("nothing");
    fs::create_dir_all(&empty).unwrap();

    let config = ImportConfig {
        pretend: true,
        ..ws.config()
    };
    let mut session = session(&db, config, FakeSource::default());
    let summary = session.run(&[ws.source.clone(), empty.clone()]).await.unwrap();

    assert_eq!(
        summary.messages,
        vec![
            format!("Album: {}", dir.display()),
            format!("  {}", files[0].display()),
            format!("  {}", files[1].display()),
            format!("No files imported from {}", empty.display()),
        ]
    );
    assert!(db.catalog.items().await.unwrap().is_empty());
    assert_eq!(fs::read_dir(&ws.library).unwrap().count(), 0);
}

#[tokio::test]
async fn test_pretend_lists_singletons() {
    let ws = Workspace::new();
    let db = TestDb::new().await;
    let files = write_album(&ws.source.join("album"), "Artist", "Record", &["One", "Two"]);

    let config = ImportConfig {
        pretend: true,
        singletons: true,
        ..ws.config()
    };
    let mut session = session(&db, config, FakeSource::default());
    let summary = session.run(&[ws.source.clone()]).await.unwrap();

    assert_eq!(
        summary.messages,
        vec![
            format!("Singleton: {}", files[0].display()),
            format!("Singleton: {}", files[1].display()),
        ]
    );
}

#[tokio::test]
async fn test_pretend_lists_archive_members_without_unpacking() {
    let ws = Workspace::new();
    let db = TestDb::new().await;
    let archive = ws.source.join("music.zip");
    write_zip(
        &archive,
        &[
            ("album/02.mp3", track("Artist", "Packed", "Two", 2)),
            ("album/01.mp3", track("Artist", "Packed", "One", 1)),
            ("album/cover.jpg", track("Artist", "Packed", "Cover", 0)),
            ("loose.mp3", track("Artist", "Packed", "Loose", 3)),
        ],
    );

    let config = ImportConfig {
        pretend: true,
        ..ws.config()
    };
    let mut session = session(&db, config, FakeSource::default());
    let summary = session.run(&[archive.clone()]).await.unwrap();

    assert_eq!(
        summary.messages,
        vec![
            format!("Album: {}", archive.display()),
            format!("  {}", archive.join("loose.mp3").display()),
            format!("Album: {}", archive.join("album").display()),
            format!("  {}", archive.join("album/01.mp3").display()),
            format!("  {}", archive.join("album/02.mp3").display()),
        ]
    );
    assert!(db.catalog.items().await.unwrap().is_empty());
    let entries: Vec<_> = fs::read_dir(&ws.source).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn test_pretend_archive_singletons() {
    let ws = Workspace::new();
    let db = TestDb::new().await;
    let archive = ws.source.join("music.zip");
    write_zip(
        &archive,
        &[
            ("b.mp3", track("Artist", "Packed", "Two", 2)),
            ("a.mp3", track("Artist", "Packed", "One", 1)),
        ],
    );

    let config = ImportConfig {
        pretend: true,
        singletons: true,
        ..ws.config()
    };
    let mut session = session(&db, config, FakeSource::default());
    let summary = session.run(&[archive.clone()]).await.unwrap();

    assert_eq!(
        summary.messages,
        vec![
            format!("Singleton: {}", archive.join("a.mp3").display()),
            format!("Singleton: {}", archive.join("b.mp3").display()),
        ]
    );
}

#[tokio::test]
async fn test_empty_path_is_reported() {
    let ws = Workspace::new();
    let db = TestDb::new().await;

    let mut session = session(&db, ws.config(), FakeSource::default()).with_choices(as_is());
    let summary = session.run(&[ws.source.clone()]).await.unwrap();

    assert_eq!(
        summary.messages,
        vec![format!("No files imported from {}", ws.source.display())]
    );
    assert_eq!(summary.albums_imported, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_threaded_commits_keep_discovery_order() {
    let ws = Workspace::new();
    let db = TestDb::new().await;
    write_album(&ws.source.join("a"), "Artist", "Alpha", &["One"]);
    write_album(&ws.source.join("b"), "Artist", "Beta", &["One"]);
    write_album(&ws.source.join("c"), "Artist", "Gamma", &["One"]);

    let source = FakeSource {
        slow_albums: vec!["Alpha".to_string()],
        ..FakeSource::default()
    };
    let config = ImportConfig {
        threaded: true,
        lookup_workers: 3,
        queue_size: 1,
        ..ws.config()
    };
    let order = Arc::new(AlbumOrder::default());
    let mut session = session(&db, config, source)
        .with_choices(as_is())
        .with_observer(order.clone());
    let summary = session.run(&[ws.source.clone()]).await.unwrap();

    assert_eq!(summary.albums_imported, 3);
    assert_eq!(*order.albums.lock().unwrap(), vec!["Alpha", "Beta", "Gamma"]);
}

#[tokio::test]
async fn test_observer_sees_each_step() {
    let ws = Workspace::new();
    let db = TestDb::new().await;
    write_album(&ws.source.join("album"), "Artist", "Record", &["One", "Two"]);

    let recorder = Arc::new(RecordingObserver::default());
    let mut session = session(&db, ws.config(), FakeSource::default())
        .with_choices(as_is())
        .with_observer(recorder.clone());
    session.run(&[ws.source.clone()]).await.unwrap();

    assert_eq!(
        recorder.names(),
        vec![
            "task_choice",
            "file_transferred",
            "file_transferred",
            "album_imported"
        ]
    );
}

#[tokio::test]
async fn test_move_removes_sources_and_prunes() {
    let ws = Workspace::new();
    let db = TestDb::new().await;
    let sources = write_album(&ws.source.join("album"), "Artist", "Record", &["One", "Two"]);

    let config = ImportConfig {
        operation: FileOperation::Move,
        ..ws.config()
    };
    let mut session = session(&db, config, FakeSource::default()).with_choices(as_is());
    session.run(&[ws.source.clone()]).await.unwrap();

    assert!(sources.iter().all(|p| !p.exists()));
    assert!(!ws.source.join("album").exists());
    assert!(ws.source.exists());
    assert!(ws.library.join("Artist/Record/01 - One.mp3").exists());
}

#[tokio::test]
async fn test_without_library_files_stay_in_place() {
    let ws = Workspace::new();
    let db = TestDb::new().await;
    let sources = write_album(&ws.source.join("album"), "Artist", "Record", &["One", "Two"]);

    let config = ImportConfig {
        library_dir: None,
        operation: FileOperation::None,
        ..ws.config()
    };
    let mut session = session(&db, config, FakeSource::default()).with_choices(as_is());
    session.run(&[ws.source.clone()]).await.unwrap();

    let mut paths: Vec<PathBuf> = db
        .catalog
        .items()
        .await
        .unwrap()
        .into_iter()
        .map(|i: Item| i.path)
        .collect();
    paths.sort();
    assert_eq!(paths, sources);
    assert_eq!(fs::read_dir(&ws.library).unwrap().count(), 0);
}

#[tokio::test]
async fn test_skip_leaves_catalog_empty() {
    let ws = Workspace::new();
    let db = TestDb::new().await;
    write_album(&ws.source.join("album"), "Artist", "Record", &["One"]);

    // Nothing strong to apply, so the default fallback skips
    let mut session = session(&db, ws.config(), FakeSource::default());
    let summary = session.run(&[ws.source.clone()]).await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert!(db.catalog.items().await.unwrap().is_empty());
}
