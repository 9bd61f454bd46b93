/// Metadata source used when no online lookup is configured
use async_trait::async_trait;
use shelf_core::types::{AlbumInfo, Item, TrackInfo};
use shelf_core::{MetadataSource, Result};

/// Finds no candidates; every task falls back to the configured choice
pub struct OfflineSource;

#[async_trait]
impl MetadataSource for OfflineSource {
    async fn album_candidates(
        &self,
        _items: &[Item],
        artist: &str,
        album: &str,
    ) -> Result<Vec<AlbumInfo>> {
        tracing::debug!(%artist, %album, "Offline: no release search");
        Ok(Vec::new())
    }

    async fn item_candidates(
        &self,
        _item: &Item,
        _artist: &str,
        _title: &str,
    ) -> Result<Vec<TrackInfo>> {
        Ok(Vec::new())
    }

    async fn album_for_id(&self, id: &str) -> Result<Option<AlbumInfo>> {
        tracing::warn!(%id, "Offline: cannot fetch release by id");
        Ok(None)
    }

    async fn track_for_id(&self, id: &str) -> Result<Option<TrackInfo>> {
        tracing::warn!(%id, "Offline: cannot fetch recording by id");
        Ok(None)
    }
}
