//! Durable persistence for guilds, users, artworks, and bookmarks.
//!
//! [`SqliteStore`] is the authoritative backend; [`CachedStore`] wraps any
//! [`easel_core::ArtStore`] with a process-local cache, serving reads
//! cache-first and refreshing entries on every successful write. The
//! durable store is always the durability boundary; losing the cache only
//! forces a re-fetch.

pub mod cached;
pub mod sqlite;

pub use cached::CachedStore;
pub use sqlite::SqliteStore;
