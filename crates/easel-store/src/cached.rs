use async_trait::async_trait;
use easel_core::store::Result;
use easel_core::{
    ArtStore, Artwork, ArtworkFilter, ArtworkLookup, ArtworkOrder, Bookmark, Guild, NewArtwork,
    StoreCache, User,
};
use tracing::{trace, warn};

/// A store decorator that adds a process-local cache.
///
/// Composes any [`ArtStore`] with any [`StoreCache`]: reads check the
/// cache first and populate it on a miss; writes go to the inner store
/// first and only refresh the cache once the store confirmed them. The
/// cache is write-through, never write-back — losing it never loses data,
/// it only forces a re-fetch. Cache read failures degrade to an inner
/// fetch instead of failing the operation.
///
/// No cross-key consistency is provided: concurrent writers to different
/// guilds never interfere, and the cache converges on the last store
/// value this process observed rather than being linearizable.
#[derive(Debug, Clone)]
pub struct CachedStore<S, C> {
    inner: S,
    cache: C,
}

impl<S: ArtStore, C: StoreCache> CachedStore<S, C> {
    /// Creates a new caching decorator around `inner`.
    pub fn new(inner: S, cache: C) -> Self {
        Self { inner, cache }
    }

    /// Returns a reference to the inner store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a reference to the cache.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    async fn refresh_guild(&self, guild: Guild) {
        let guild_id = guild.guild_id.clone();
        if let Err(e) = self.cache.set_guild(guild).await {
            warn!(guild_id = %guild_id, error = %e, "failed to refresh cached guild");
            // A stale entry is worse than no entry.
            if let Err(e) = self.cache.remove_guild(&guild_id).await {
                warn!(guild_id = %guild_id, error = %e, "failed to drop cached guild");
            }
        }
    }

    async fn refresh_artwork(&self, artwork: Artwork) {
        let id = artwork.id;
        if let Err(e) = self.cache.set_artwork(artwork).await {
            warn!(artwork_id = id, error = %e, "failed to refresh cached artwork");
            if let Err(e) = self.cache.remove_artwork(id).await {
                warn!(artwork_id = id, error = %e, "failed to drop cached artwork");
            }
        }
    }

    /// Re-reads a guild from the inner store and refreshes its entry.
    ///
    /// Used after in-place writes (channel-list updates) that do not
    /// return the stored value.
    async fn reload_guild(&self, guild_id: &str) -> Result<()> {
        match self.inner.guild(guild_id).await? {
            Some(guild) => self.refresh_guild(guild).await,
            None => {
                if let Err(e) = self.cache.remove_guild(guild_id).await {
                    warn!(guild_id = %guild_id, error = %e, "failed to drop cached guild");
                }
            }
        }
        Ok(())
    }
}

fn sort_artworks(artworks: &mut Vec<Artwork>, order: ArtworkOrder, descending: bool) {
    match order {
        ArtworkOrder::Time => artworks.sort_by_key(|art| (art.created_at, art.id)),
        ArtworkOrder::Popularity => artworks.sort_by_key(|art| (art.favourites, art.id)),
    }
    if descending {
        artworks.reverse();
    }
}

#[async_trait]
impl<S: ArtStore, C: StoreCache> ArtStore for CachedStore<S, C> {
    async fn guild(&self, guild_id: &str) -> Result<Option<Guild>> {
        match self.cache.guild(guild_id).await {
            Ok(Some(guild)) => return Ok(Some(guild)),
            Ok(None) => trace!(guild_id = %guild_id, "guild not cached"),
            Err(e) => warn!(guild_id = %guild_id, error = %e, "cache read failed, falling back"),
        }

        match self.inner.guild(guild_id).await? {
            Some(guild) => {
                self.refresh_guild(guild.clone()).await;
                Ok(Some(guild))
            }
            None => Ok(None),
        }
    }

    async fn create_guild(&self, guild: Guild) -> Result<Guild> {
        let created = self.inner.create_guild(guild).await?;
        self.refresh_guild(created.clone()).await;
        Ok(created)
    }

    async fn update_guild(&self, guild: Guild) -> Result<Guild> {
        let updated = self.inner.update_guild(guild).await?;
        self.refresh_guild(updated.clone()).await;
        Ok(updated)
    }

    async fn delete_guild(&self, guild_id: &str) -> Result<bool> {
        let deleted = self.inner.delete_guild(guild_id).await?;
        if let Err(e) = self.cache.remove_guild(guild_id).await {
            warn!(guild_id = %guild_id, error = %e, "failed to drop cached guild");
        }
        Ok(deleted)
    }

    async fn add_art_channels(&self, guild_id: &str, channels: &[String]) -> Result<bool> {
        let changed = self.inner.add_art_channels(guild_id, channels).await?;
        if changed {
            self.reload_guild(guild_id).await?;
        }
        Ok(changed)
    }

    async fn delete_art_channels(&self, guild_id: &str, channels: &[String]) -> Result<bool> {
        let changed = self.inner.delete_art_channels(guild_id, channels).await?;
        if changed {
            self.reload_guild(guild_id).await?;
        }
        Ok(changed)
    }

    async fn artwork(&self, lookup: ArtworkLookup) -> Result<Option<Artwork>> {
        // The cache is keyed by ID; URL lookups always go inward.
        if let ArtworkLookup::Id(id) = lookup {
            match self.cache.artwork(id).await {
                Ok(Some(artwork)) => return Ok(Some(artwork)),
                Ok(None) => trace!(artwork_id = id, "artwork not cached"),
                Err(e) => warn!(artwork_id = id, error = %e, "cache read failed, falling back"),
            }
        }

        match self.inner.artwork(lookup).await? {
            Some(artwork) => {
                self.refresh_artwork(artwork.clone()).await;
                Ok(Some(artwork))
            }
            None => Ok(None),
        }
    }

    async fn create_artwork(&self, artwork: NewArtwork) -> Result<Artwork> {
        let created = self.inner.create_artwork(artwork).await?;
        self.refresh_artwork(created.clone()).await;
        Ok(created)
    }

    async fn search_artworks(&self, filter: ArtworkFilter) -> Result<Vec<Artwork>> {
        let ArtworkFilter {
            ids,
            author,
            order,
            descending,
            limit,
        } = filter;

        let Some(ids) = ids else {
            // Unfiltered searches cannot be answered from per-ID entries.
            return self
                .inner
                .search_artworks(ArtworkFilter {
                    ids: None,
                    author,
                    order,
                    descending,
                    limit,
                })
                .await;
        };

        let mut merged = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            match self.cache.artwork(id).await {
                Ok(Some(artwork)) => merged.push(artwork),
                Ok(None) => missing.push(id),
                Err(e) => {
                    warn!(artwork_id = id, error = %e, "cache read failed, falling back");
                    missing.push(id);
                }
            }
        }

        if !missing.is_empty() {
            trace!(
                cached = merged.len(),
                missing = missing.len(),
                "batch artwork fetch"
            );
            let fetched = self
                .inner
                .search_artworks(ArtworkFilter {
                    ids: Some(missing),
                    author: None,
                    order,
                    descending,
                    limit: None,
                })
                .await?;
            for artwork in fetched {
                self.refresh_artwork(artwork.clone()).await;
                merged.push(artwork);
            }
        }

        if let Some(author) = &author {
            merged.retain(|art| &art.author == author);
        }

        // Sort after merging so cache/store origin never affects ordering.
        sort_artworks(&mut merged, order, descending);
        if let Some(limit) = limit {
            merged.truncate(limit);
        }
        Ok(merged)
    }

    async fn user(&self, user_id: &str) -> Result<Option<User>> {
        self.inner.user(user_id).await
    }

    async fn create_user(&self, user: User) -> Result<User> {
        self.inner.create_user(user).await
    }

    async fn update_user(&self, user: User) -> Result<User> {
        self.inner.update_user(user).await
    }

    async fn add_bookmark(&self, user_id: &str, artwork_id: i64, nsfw: bool) -> Result<bool> {
        let added = self.inner.add_bookmark(user_id, artwork_id, nsfw).await?;
        if added {
            // The favourite counter changed; the stale entry must go.
            if let Err(e) = self.cache.remove_artwork(artwork_id).await {
                warn!(artwork_id, error = %e, "failed to drop cached artwork");
            }
        }
        Ok(added)
    }

    async fn delete_bookmark(&self, user_id: &str, artwork_id: i64) -> Result<bool> {
        let deleted = self.inner.delete_bookmark(user_id, artwork_id).await?;
        if deleted {
            if let Err(e) = self.cache.remove_artwork(artwork_id).await {
                warn!(artwork_id, error = %e, "failed to drop cached artwork");
            }
        }
        Ok(deleted)
    }

    async fn bookmarks(&self, user_id: &str) -> Result<Vec<Bookmark>> {
        self.inner.bookmarks(user_id).await
    }
}
