use async_trait::async_trait;
use easel_core::cache::{artwork_key, guild_key};
use easel_core::{Artwork, CacheError, Guild, StoreCache};
use moka::future::Cache;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Type alias for cache results.
pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Clone)]
enum CachedEntity {
    Guild(Arc<Guild>),
    Artwork(Arc<Artwork>),
}

/// An in-memory implementation of [`StoreCache`] using Moka.
///
/// One unbounded cache holds both guild and artwork projections under
/// `"guilds:<id>"` / `"artworks:<id>"` keys. Entries carry no TTL and are
/// only replaced or removed by store writes; guild/artwork cardinality is
/// bounded by real-world scale, so the missing capacity bound is an
/// explicit ceiling rather than an oversight.
#[derive(Debug, Clone)]
pub struct MokaStoreCache {
    cache: Cache<String, CachedEntity>,
}

impl MokaStoreCache {
    /// Creates a new unbounded entity cache.
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().build(),
        }
    }

    /// Number of live entries, pending housekeeping.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for MokaStoreCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreCache for MokaStoreCache {
    async fn guild(&self, guild_id: &str) -> Result<Option<Guild>> {
        let key = guild_key(guild_id);
        match self.cache.get(&key).await {
            Some(CachedEntity::Guild(guild)) => {
                trace!(key = %key, "guild cache hit");
                Ok(Some((*guild).clone()))
            }
            Some(_) => {
                warn!(key = %key, "cache entry has wrong entity kind");
                Err(CacheError::InvalidData(format!(
                    "entry under '{key}' is not a guild"
                )))
            }
            None => {
                trace!(key = %key, "guild cache miss");
                Ok(None)
            }
        }
    }

    async fn set_guild(&self, guild: Guild) -> Result<()> {
        let key = guild_key(&guild.guild_id);
        self.cache
            .insert(key.clone(), CachedEntity::Guild(Arc::new(guild)))
            .await;
        debug!(key = %key, "cached guild");
        Ok(())
    }

    async fn remove_guild(&self, guild_id: &str) -> Result<()> {
        let key = guild_key(guild_id);
        self.cache.invalidate(&key).await;
        debug!(key = %key, "removed cached guild");
        Ok(())
    }

    async fn artwork(&self, id: i64) -> Result<Option<Artwork>> {
        let key = artwork_key(id);
        match self.cache.get(&key).await {
            Some(CachedEntity::Artwork(artwork)) => {
                trace!(key = %key, "artwork cache hit");
                Ok(Some((*artwork).clone()))
            }
            Some(_) => {
                warn!(key = %key, "cache entry has wrong entity kind");
                Err(CacheError::InvalidData(format!(
                    "entry under '{key}' is not an artwork"
                )))
            }
            None => {
                trace!(key = %key, "artwork cache miss");
                Ok(None)
            }
        }
    }

    async fn set_artwork(&self, artwork: Artwork) -> Result<()> {
        let key = artwork_key(artwork.id);
        self.cache
            .insert(key.clone(), CachedEntity::Artwork(Arc::new(artwork)))
            .await;
        debug!(key = %key, "cached artwork");
        Ok(())
    }

    async fn remove_artwork(&self, id: i64) -> Result<()> {
        let key = artwork_key(id);
        self.cache.invalidate(&key).await;
        debug!(key = %key, "removed cached artwork");
        Ok(())
    }
}
