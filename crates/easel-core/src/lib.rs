//! Core types and traits for the easel art-reposting bot.
//!
//! This crate provides the domain model and the capability traits shared
//! by the repost detector backends, the entity cache, and the durable
//! store. Provider scrapers and the Discord front end consume these
//! traits; they never depend on a concrete backend.

pub mod cache;
pub mod error;
pub mod repost;
pub mod store;

pub use cache::StoreCache;
pub use error::{CacheError, DetectorError, StoreError};
pub use repost::{repost_key, RepostDetector, RepostRecord};
pub use store::{
    ArtStore, Artwork, ArtworkFilter, ArtworkLookup, ArtworkOrder, Bookmark, Guild, NewArtwork,
    RepostMode, User,
};
