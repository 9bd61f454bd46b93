//! Tag reading and writing with lofty

use lofty::{Accessor, AudioFile, ItemKey, Probe, Tag, TagExt, TaggedFileExt};
use shelf_core::types::ItemMetadata;
use shelf_core::{ShelfError, TagCodec};
use std::path::Path;

/// [`TagCodec`] backed by lofty
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTagCodec;

impl LoftyTagCodec {
    pub fn new() -> Self {
        Self
    }
}

impl TagCodec for LoftyTagCodec {
    fn read(&self, path: &Path) -> shelf_core::Result<ItemMetadata> {
        let tagged_file = Probe::open(path)
            .map_err(|e| ShelfError::metadata(format!("Failed to open file: {e}")))?
            .read()
            .map_err(|e| ShelfError::metadata(format!("Failed to read file: {e}")))?;

        let properties = tagged_file.properties();
        let mut meta = ItemMetadata {
            length_seconds: Some(properties.duration().as_secs_f64()),
            bitrate: properties.audio_bitrate(),
            format: path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_lowercase),
            ..ItemMetadata::default()
        };

        // Prefer ID3v2 for MP3, Vorbis for OGG/FLAC
        if let Some(tag) = tagged_file.primary_tag().or(tagged_file.first_tag()) {
            meta.title = tag.title().map(|s| s.to_string());
            meta.artist = tag.artist().map(|s| s.to_string());
            meta.album = tag.album().map(|s| s.to_string());
            meta.genre = tag.genre().map(|s| s.to_string());
            meta.track_number = tag.track();
            meta.track_total = tag.track_total();
            meta.disc_number = tag.disk();
            meta.disc_total = tag.disk_total();
            meta.year = tag.year().and_then(|y| i32::try_from(y).ok());

            let text = |key: &ItemKey| tag.get_string(key).map(str::to_string);
            meta.album_artist = text(&ItemKey::AlbumArtist);
            meta.media = text(&ItemKey::OriginalMediaType);
            meta.mb_track_id = text(&ItemKey::MusicBrainzRecordingId);
            meta.mb_album_id = text(&ItemKey::MusicBrainzReleaseId);
            meta.mb_artist_id = text(&ItemKey::MusicBrainzArtistId);
            meta.mb_album_artist_id = text(&ItemKey::MusicBrainzReleaseArtistId);
            meta.compilation = text(&ItemKey::FlagCompilation)
                .is_some_and(|v| v.trim() == "1" || v.eq_ignore_ascii_case("true"));
        }

        // Fall back to the filename when the title tag is missing
        if meta.title.is_none() {
            meta.title = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string);
        }

        Ok(meta)
    }

    fn write(&self, path: &Path, meta: &ItemMetadata) -> shelf_core::Result<()> {
        let mut tagged_file = Probe::open(path)
            .map_err(|e| ShelfError::metadata(format!("Failed to open file: {e}")))?
            .read()
            .map_err(|e| ShelfError::metadata(format!("Failed to read file: {e}")))?;

        let tag_type = tagged_file.primary_tag_type();
        if tagged_file.tag(tag_type).is_none() {
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let Some(tag) = tagged_file.tag_mut(tag_type) else {
            return Err(ShelfError::metadata(format!(
                "No writable tag for {}",
                path.display()
            )));
        };

        set_text(tag, ItemKey::TrackTitle, meta.title.as_deref());
        set_text(tag, ItemKey::TrackArtist, meta.artist.as_deref());
        set_text(tag, ItemKey::AlbumTitle, meta.album.as_deref());
        set_text(tag, ItemKey::AlbumArtist, meta.album_artist.as_deref());
        set_text(tag, ItemKey::Genre, meta.genre.as_deref());
        set_text(tag, ItemKey::OriginalMediaType, meta.media.as_deref());
        set_text(tag, ItemKey::MusicBrainzRecordingId, meta.mb_track_id.as_deref());
        set_text(tag, ItemKey::MusicBrainzReleaseId, meta.mb_album_id.as_deref());
        set_text(tag, ItemKey::MusicBrainzArtistId, meta.mb_artist_id.as_deref());
        set_text(
            tag,
            ItemKey::MusicBrainzReleaseArtistId,
            meta.mb_album_artist_id.as_deref(),
        );
        set_text(
            tag,
            ItemKey::FlagCompilation,
            meta.compilation.then_some("1"),
        );

        match meta.track_number {
            Some(n) => tag.set_track(n),
            None => tag.remove_track(),
        }
        match meta.track_total {
            Some(n) => tag.set_track_total(n),
            None => tag.remove_track_total(),
        }
        match meta.disc_number {
            Some(n) => tag.set_disk(n),
            None => tag.remove_disk(),
        }
        match meta.disc_total {
            Some(n) => tag.set_disk_total(n),
            None => tag.remove_disk_total(),
        }
        match meta.year.and_then(|y| u32::try_from(y).ok()) {
            Some(y) => tag.set_year(y),
            None => tag.remove_year(),
        }

        tag.save_to_path(path)
            .map_err(|e| ShelfError::metadata(format!("Failed to write tags: {e}")))?;

        tracing::debug!("Wrote tags to {:?}", path);
        Ok(())
    }
}

fn set_text(tag: &mut Tag, key: ItemKey, value: Option<&str>) {
    match value.filter(|v| !v.is_empty()) {
        Some(value) => {
            tag.insert_text(key, value.to_string());
        }
        None => tag.remove_key(&key),
    }
}
