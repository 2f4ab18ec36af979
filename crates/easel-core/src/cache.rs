use crate::error::CacheError;
use crate::store::{Artwork, Guild};
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, CacheError>;

/// Process-local cache for guild and artwork projections.
///
/// Entries always reflect the last durable-store value this process
/// observed; the cache is never the source of truth and losing it only
/// forces a re-fetch. Implementations are keyed by `"guilds:<id>"` and
/// `"artworks:<id>"`.
#[async_trait]
pub trait StoreCache: Send + Sync + 'static {
    /// Returns the cached guild, or `Ok(None)` on a miss.
    async fn guild(&self, guild_id: &str) -> Result<Option<Guild>>;

    /// Overwrites the cached guild entry.
    async fn set_guild(&self, guild: Guild) -> Result<()>;

    /// Drops the cached guild entry. Not an error if absent.
    async fn remove_guild(&self, guild_id: &str) -> Result<()>;

    /// Returns the cached artwork, or `Ok(None)` on a miss.
    async fn artwork(&self, id: i64) -> Result<Option<Artwork>>;

    /// Overwrites the cached artwork entry.
    async fn set_artwork(&self, artwork: Artwork) -> Result<()>;

    /// Drops the cached artwork entry. Not an error if absent.
    async fn remove_artwork(&self, id: i64) -> Result<()>;
}

/// Cache key for a guild entry.
pub fn guild_key(guild_id: &str) -> String {
    format!("guilds:{guild_id}")
}

/// Cache key for an artwork entry.
pub fn artwork_key(id: i64) -> String {
    format!("artworks:{id}")
}
