//! Shelf Core
//!
//! Domain types, collaborator traits, and error handling shared by the
//! Shelf library manager crates.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Domain Types**: `Item`, `Album`, `ItemMetadata`, and the candidate
//!   records (`AlbumInfo`, `TrackInfo`) returned by metadata sources
//! - **Core Traits**: `TagCodec`, `MetadataSource`, `Catalog`
//! - **Error Handling**: Unified `ShelfError` and `Result` types
//!
//! # Example
//!
//! ```rust
//! use shelf_core::types::{Item, ItemMetadata};
//! use std::path::PathBuf;
//!
//! let mut meta = ItemMetadata::default();
//! meta.set_field("title", "Intro");
//! meta.set_field("track", "1");
//!
//! let item = Item::new(PathBuf::from("/music/intro.flac"), meta);
//! assert_eq!(item.meta.get_field("title").as_deref(), Some("Intro"));
//! assert_eq!(item.meta.track_number, Some(1));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Result, ShelfError};
pub use traits::{Catalog, MetadataSource, TagCodec};

pub use types::{
    Album, AlbumId, AlbumInfo, FieldQuery, Item, ItemId, ItemMetadata, TrackInfo,
};
