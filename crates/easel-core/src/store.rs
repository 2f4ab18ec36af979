use crate::error::StoreError;
use async_trait::async_trait;
use jiff::Timestamp;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, StoreError>;

/// How reposted links are handled in a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepostMode {
    /// Duplicates are flagged but still posted.
    #[default]
    Enabled,
    /// No duplicate detection.
    Disabled,
    /// Duplicates are dropped entirely.
    Strict,
}

impl RepostMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepostMode::Enabled => "enabled",
            RepostMode::Disabled => "disabled",
            RepostMode::Strict => "strict",
        }
    }

    pub fn parse(s: &str) -> Option<RepostMode> {
        match s {
            "enabled" => Some(RepostMode::Enabled),
            "disabled" => Some(RepostMode::Disabled),
            "strict" => Some(RepostMode::Strict),
            _ => None,
        }
    }
}

impl std::fmt::Display for RepostMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-guild configuration.
///
/// One row per guild, created lazily with defaults on the guild's first
/// interaction (creating it is the caller's responsibility, not the
/// store's) and mutated field-by-field afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Guild {
    pub guild_id: String,
    pub prefix: String,
    /// Maximum number of images reposted per message.
    pub limit: i64,
    pub nsfw: bool,
    pub pixiv: bool,
    pub twitter: bool,
    pub deviant: bool,
    pub crosspost: bool,
    pub repost: RepostMode,
    /// Lifetime of repost records in seconds. `0` means they never expire.
    pub repost_expiration_secs: i64,
    /// Channels artworks are crossposted into.
    pub art_channels: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Guild {
    pub const DEFAULT_PREFIX: &'static str = "e!";
    pub const DEFAULT_LIMIT: i64 = 10;
    pub const DEFAULT_REPOST_EXPIRATION: Duration = Duration::from_secs(24 * 60 * 60);

    /// A guild row with default settings, as created on first interaction.
    pub fn with_defaults(guild_id: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self {
            guild_id: guild_id.into(),
            prefix: Self::DEFAULT_PREFIX.to_string(),
            limit: Self::DEFAULT_LIMIT,
            nsfw: false,
            pixiv: true,
            twitter: true,
            deviant: true,
            crosspost: true,
            repost: RepostMode::Enabled,
            repost_expiration_secs: Self::DEFAULT_REPOST_EXPIRATION.as_secs() as i64,
            art_channels: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The TTL to apply to repost records created in this guild.
    ///
    /// `None` means records never expire.
    pub fn repost_ttl(&self) -> Option<Duration> {
        (self.repost_expiration_secs > 0)
            .then(|| Duration::from_secs(self.repost_expiration_secs as u64))
    }
}

/// A stored artwork.
///
/// Creation-time fields are immutable; `favourites` is a derived counter
/// that always equals the number of live bookmarks referencing this
/// artwork, maintained transactionally by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Artwork {
    /// Store-assigned, strictly increasing integer ID.
    pub id: i64,
    pub title: String,
    pub author: String,
    /// Natural alternate key.
    pub url: String,
    pub images: Vec<String>,
    pub favourites: i64,
    pub created_at: Timestamp,
}

/// Creation-time fields of an artwork; the store assigns the ID.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArtwork {
    pub title: String,
    pub author: String,
    pub url: String,
    pub images: Vec<String>,
}

/// A user's saved reference to an artwork.
///
/// Unique per `(user, artwork)`; creating and deleting one atomically
/// adjusts the artwork's favourite counter.
#[derive(Debug, Clone, PartialEq)]
pub struct Bookmark {
    pub user_id: String,
    pub artwork_id: i64,
    pub nsfw: bool,
    pub created_at: Timestamp,
}

/// Per-user configuration, created lazily like guilds.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub user_id: String,
    /// Receive bookmarked artworks via DM.
    pub dm: bool,
    pub crosspost: bool,
    pub created_at: Timestamp,
}

impl User {
    pub fn with_defaults(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            dm: true,
            crosspost: true,
            created_at: Timestamp::now(),
        }
    }
}

/// Artwork lookup key: either the store-assigned ID or the natural URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtworkLookup {
    Id(i64),
    Url(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtworkOrder {
    #[default]
    Time,
    Popularity,
}

/// Filter and ordering for [`ArtStore::search_artworks`].
#[derive(Debug, Clone, PartialEq)]
pub struct ArtworkFilter {
    /// Restrict to these artwork IDs.
    pub ids: Option<Vec<i64>>,
    /// Restrict to a single author.
    pub author: Option<String>,
    pub order: ArtworkOrder,
    pub descending: bool,
    pub limit: Option<usize>,
}

impl Default for ArtworkFilter {
    fn default() -> Self {
        Self {
            ids: None,
            author: None,
            order: ArtworkOrder::Time,
            descending: true,
            limit: None,
        }
    }
}

impl ArtworkFilter {
    pub fn by_ids(ids: Vec<i64>) -> Self {
        Self {
            ids: Some(ids),
            ..Self::default()
        }
    }
}

/// Authoritative persistence for guilds, users, artworks, and bookmarks.
///
/// Implementations are shared by all concurrent request-handling tasks.
/// Every operation is bounded by the store's configured timeout; exceeding
/// it surfaces [`StoreError::Timeout`]. Dropping the returned future
/// cancels the operation and rolls back any open transaction.
#[async_trait]
pub trait ArtStore: Send + Sync + 'static {
    /// Fetches a guild's configuration. `Ok(None)` if the guild is unknown.
    async fn guild(&self, guild_id: &str) -> Result<Option<Guild>>;

    /// Inserts a new guild row. `Conflict` if the guild already exists.
    async fn create_guild(&self, guild: Guild) -> Result<Guild>;

    /// Replaces a guild's mutable settings, returning the stored value.
    async fn update_guild(&self, guild: Guild) -> Result<Guild>;

    /// Removes a guild row (bot kicked). `Ok(false)` if it was absent.
    async fn delete_guild(&self, guild_id: &str) -> Result<bool>;

    /// Adds channels to the guild's art-channel whitelist.
    ///
    /// `Ok(false)` no-op when every channel is already tracked or the
    /// guild is unknown.
    async fn add_art_channels(&self, guild_id: &str, channels: &[String]) -> Result<bool>;

    /// Removes channels from the guild's art-channel whitelist.
    ///
    /// `Ok(false)` no-op when none of the channels were tracked.
    async fn delete_art_channels(&self, guild_id: &str, channels: &[String]) -> Result<bool>;

    /// Fetches an artwork by ID or URL.
    async fn artwork(&self, lookup: ArtworkLookup) -> Result<Option<Artwork>>;

    /// Inserts an artwork, assigning the next ID from the counter sequence
    /// in the same transaction. `Conflict` if the URL is already stored.
    async fn create_artwork(&self, artwork: NewArtwork) -> Result<Artwork>;

    /// Filtered, ordered artwork search.
    async fn search_artworks(&self, filter: ArtworkFilter) -> Result<Vec<Artwork>>;

    /// Fetches a user's configuration. `Ok(None)` if unknown.
    async fn user(&self, user_id: &str) -> Result<Option<User>>;

    /// Inserts a new user row. `Conflict` if the user already exists.
    async fn create_user(&self, user: User) -> Result<User>;

    /// Replaces a user's settings, returning the stored value.
    async fn update_user(&self, user: User) -> Result<User>;

    /// Bookmarks an artwork for a user and increments its favourite count,
    /// atomically. `Ok(false)` no-op if the bookmark already exists.
    async fn add_bookmark(&self, user_id: &str, artwork_id: i64, nsfw: bool) -> Result<bool>;

    /// Removes a bookmark and decrements the favourite count, atomically.
    /// `Ok(false)` no-op if there was no such bookmark.
    async fn delete_bookmark(&self, user_id: &str, artwork_id: i64) -> Result<bool>;

    /// All bookmarks of a user, newest first.
    async fn bookmarks(&self, user_id: &str) -> Result<Vec<Bookmark>>;
}
