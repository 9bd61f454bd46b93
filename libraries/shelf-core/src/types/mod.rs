mod album;
mod candidate;
mod item;
mod query;

pub use album::{Album, AlbumId};
pub use candidate::{AlbumInfo, TrackInfo};
pub use item::{Item, ItemId, ItemMetadata, ITEM_FIELDS};
pub use query::FieldQuery;
