use async_trait::async_trait;
use easel_core::store::Result;
use easel_core::{
    ArtStore, Artwork, ArtworkFilter, ArtworkLookup, ArtworkOrder, Bookmark, Guild, NewArtwork,
    RepostMode, StoreError, User,
};
use jiff::Timestamp;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, trace};

/// SQLite implementation of the durable store contract.
///
/// Counter-mutating operations (bookmarks, artwork ID allocation) run in
/// single transactions; the engine serializes conflicting writers, so a
/// reader never observes a bookmark without its counter change. A dropped
/// operation future rolls the open transaction back.
///
/// Every operation is bounded by `op_timeout`; exceeding it surfaces
/// [`StoreError::Timeout`] and aborts the operation.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    op_timeout: Duration,
}

fn now_unix_seconds() -> i64 {
    Timestamp::now().as_second()
}

fn parse_timestamp(seconds: i64, column: &str) -> Result<Timestamp> {
    Timestamp::from_second(seconds)
        .map_err(|e| StoreError::InvalidData(format!("invalid {column} timestamp '{seconds}': {e}")))
}

fn decode_string_list(raw: &str, column: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw)
        .map_err(|e| StoreError::InvalidData(format!("invalid {column} list '{raw}': {e}")))
}

fn encode_string_list(values: &[String]) -> Result<String> {
    serde_json::to_string(values)
        .map_err(|e| StoreError::InvalidData(format!("failed to encode list: {e}")))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StoreError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StoreError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StoreError::InvalidData(message),
        _ => StoreError::Query(message),
    }
}

/// Commit failures are concurrency conflicts, not plain query errors.
fn map_commit_error(err: sqlx::Error) -> StoreError {
    let message = err.to_string();
    if message.to_ascii_lowercase().contains("locked")
        || message.to_ascii_lowercase().contains("busy")
    {
        StoreError::TransactionAborted(message)
    } else {
        map_sqlx_error(err)
    }
}

fn guild_from_row(row: &SqliteRow) -> Result<Guild> {
    let repost_raw: String = row.try_get("repost").map_err(map_sqlx_error)?;
    let repost = RepostMode::parse(&repost_raw)
        .ok_or_else(|| StoreError::InvalidData(format!("unknown repost mode '{repost_raw}'")))?;
    let art_channels_raw: String = row.try_get("art_channels").map_err(map_sqlx_error)?;
    let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;
    let updated_at: i64 = row.try_get("updated_at").map_err(map_sqlx_error)?;

    Ok(Guild {
        guild_id: row.try_get("guild_id").map_err(map_sqlx_error)?,
        prefix: row.try_get("prefix").map_err(map_sqlx_error)?,
        limit: row.try_get("post_limit").map_err(map_sqlx_error)?,
        nsfw: row.try_get("nsfw").map_err(map_sqlx_error)?,
        pixiv: row.try_get("pixiv").map_err(map_sqlx_error)?,
        twitter: row.try_get("twitter").map_err(map_sqlx_error)?,
        deviant: row.try_get("deviant").map_err(map_sqlx_error)?,
        crosspost: row.try_get("crosspost").map_err(map_sqlx_error)?,
        repost,
        repost_expiration_secs: row
            .try_get("repost_expiration_secs")
            .map_err(map_sqlx_error)?,
        art_channels: decode_string_list(&art_channels_raw, "art_channels")?,
        created_at: parse_timestamp(created_at, "created_at")?,
        updated_at: parse_timestamp(updated_at, "updated_at")?,
    })
}

fn artwork_from_row(row: &SqliteRow) -> Result<Artwork> {
    let images_raw: String = row.try_get("images").map_err(map_sqlx_error)?;
    let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;

    Ok(Artwork {
        id: row.try_get("artwork_id").map_err(map_sqlx_error)?,
        title: row.try_get("title").map_err(map_sqlx_error)?,
        author: row.try_get("author").map_err(map_sqlx_error)?,
        url: row.try_get("url").map_err(map_sqlx_error)?,
        images: decode_string_list(&images_raw, "images")?,
        favourites: row.try_get("favourites").map_err(map_sqlx_error)?,
        created_at: parse_timestamp(created_at, "created_at")?,
    })
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;

    Ok(User {
        user_id: row.try_get("user_id").map_err(map_sqlx_error)?,
        dm: row.try_get("dm").map_err(map_sqlx_error)?,
        crosspost: row.try_get("crosspost").map_err(map_sqlx_error)?,
        created_at: parse_timestamp(created_at, "created_at")?,
    })
}

fn bookmark_from_row(row: &SqliteRow) -> Result<Bookmark> {
    let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;

    Ok(Bookmark {
        user_id: row.try_get("user_id").map_err(map_sqlx_error)?,
        artwork_id: row.try_get("artwork_id").map_err(map_sqlx_error)?,
        nsfw: row.try_get("nsfw").map_err(map_sqlx_error)?,
        created_at: parse_timestamp(created_at, "created_at")?,
    })
}

const GUILD_COLUMNS: &str = "guild_id, prefix, post_limit, nsfw, pixiv, twitter, deviant, \
     crosspost, repost, repost_expiration_secs, art_channels, created_at, updated_at";

const ARTWORK_COLUMNS: &str = "artwork_id, title, author, url, images, favourites, created_at";

impl SqliteStore {
    pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a store from an existing connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_timeout(pool, Self::DEFAULT_OP_TIMEOUT)
    }

    /// Creates a store whose operations are bounded by `op_timeout`.
    pub fn with_timeout(pool: SqlitePool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    /// Creates a store by opening a new pool against `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(map_sqlx_error)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Applies the embedded schema migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("migration failed: {e}")))?;
        debug!("store migrations applied");
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn timed<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(format!(
                "{operation}: deadline of {:?} exceeded",
                self.op_timeout
            ))),
        }
    }
}

#[async_trait]
impl ArtStore for SqliteStore {
    async fn guild(&self, guild_id: &str) -> Result<Option<Guild>> {
        trace!(guild_id = %guild_id, "fetching guild");
        self.timed("fetch guild", async {
            let row = sqlx::query(&format!(
                "SELECT {GUILD_COLUMNS} FROM guilds WHERE guild_id = ?"
            ))
            .bind(guild_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            row.as_ref().map(guild_from_row).transpose()
        })
        .await
    }

    async fn create_guild(&self, guild: Guild) -> Result<Guild> {
        trace!(guild_id = %guild.guild_id, "creating guild");
        self.timed("create guild", async {
            let art_channels = encode_string_list(&guild.art_channels)?;

            let result = sqlx::query(&format!(
                "INSERT INTO guilds ({GUILD_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(&guild.guild_id)
            .bind(&guild.prefix)
            .bind(guild.limit)
            .bind(guild.nsfw)
            .bind(guild.pixiv)
            .bind(guild.twitter)
            .bind(guild.deviant)
            .bind(guild.crosspost)
            .bind(guild.repost.as_str())
            .bind(guild.repost_expiration_secs)
            .bind(&art_channels)
            .bind(guild.created_at.as_second())
            .bind(guild.updated_at.as_second())
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => Ok(guild),
                Err(err) if is_unique_violation(&err) => {
                    Err(StoreError::Conflict(guild.guild_id.clone()))
                }
                Err(err) => Err(map_sqlx_error(err)),
            }
        })
        .await
    }

    async fn update_guild(&self, mut guild: Guild) -> Result<Guild> {
        trace!(guild_id = %guild.guild_id, "updating guild");
        self.timed("update guild", async {
            guild.updated_at = Timestamp::now();
            let art_channels = encode_string_list(&guild.art_channels)?;

            // Upsert: guilds are created lazily, so an update may be the
            // first write this guild ever sees.
            sqlx::query(&format!(
                "INSERT INTO guilds ({GUILD_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (guild_id) DO UPDATE SET
                     prefix = excluded.prefix,
                     post_limit = excluded.post_limit,
                     nsfw = excluded.nsfw,
                     pixiv = excluded.pixiv,
                     twitter = excluded.twitter,
                     deviant = excluded.deviant,
                     crosspost = excluded.crosspost,
                     repost = excluded.repost,
                     repost_expiration_secs = excluded.repost_expiration_secs,
                     art_channels = excluded.art_channels,
                     updated_at = excluded.updated_at"
            ))
            .bind(&guild.guild_id)
            .bind(&guild.prefix)
            .bind(guild.limit)
            .bind(guild.nsfw)
            .bind(guild.pixiv)
            .bind(guild.twitter)
            .bind(guild.deviant)
            .bind(guild.crosspost)
            .bind(guild.repost.as_str())
            .bind(guild.repost_expiration_secs)
            .bind(&art_channels)
            .bind(guild.created_at.as_second())
            .bind(guild.updated_at.as_second())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            Ok(guild)
        })
        .await
    }

    async fn delete_guild(&self, guild_id: &str) -> Result<bool> {
        trace!(guild_id = %guild_id, "deleting guild");
        self.timed("delete guild", async {
            let result = sqlx::query("DELETE FROM guilds WHERE guild_id = ?")
                .bind(guild_id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn add_art_channels(&self, guild_id: &str, channels: &[String]) -> Result<bool> {
        trace!(guild_id = %guild_id, count = channels.len(), "adding art channels");
        self.timed("add art channels", async {
            let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

            let row = sqlx::query("SELECT art_channels FROM guilds WHERE guild_id = ?")
                .bind(guild_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            let Some(row) = row else {
                return Ok(false);
            };

            let raw: String = row.try_get("art_channels").map_err(map_sqlx_error)?;
            let mut tracked = decode_string_list(&raw, "art_channels")?;
            let mut changed = false;
            for channel in channels {
                if !tracked.contains(channel) {
                    tracked.push(channel.clone());
                    changed = true;
                }
            }
            if !changed {
                return Ok(false);
            }

            sqlx::query("UPDATE guilds SET art_channels = ?, updated_at = ? WHERE guild_id = ?")
                .bind(encode_string_list(&tracked)?)
                .bind(now_unix_seconds())
                .bind(guild_id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

            tx.commit().await.map_err(map_commit_error)?;
            Ok(true)
        })
        .await
    }

    async fn delete_art_channels(&self, guild_id: &str, channels: &[String]) -> Result<bool> {
        trace!(guild_id = %guild_id, count = channels.len(), "deleting art channels");
        self.timed("delete art channels", async {
            let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

            let row = sqlx::query("SELECT art_channels FROM guilds WHERE guild_id = ?")
                .bind(guild_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            let Some(row) = row else {
                return Ok(false);
            };

            let raw: String = row.try_get("art_channels").map_err(map_sqlx_error)?;
            let tracked = decode_string_list(&raw, "art_channels")?;
            let remaining: Vec<String> = tracked
                .iter()
                .filter(|channel| !channels.contains(channel))
                .cloned()
                .collect();
            if remaining.len() == tracked.len() {
                return Ok(false);
            }

            sqlx::query("UPDATE guilds SET art_channels = ?, updated_at = ? WHERE guild_id = ?")
                .bind(encode_string_list(&remaining)?)
                .bind(now_unix_seconds())
                .bind(guild_id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

            tx.commit().await.map_err(map_commit_error)?;
            Ok(true)
        })
        .await
    }

    async fn artwork(&self, lookup: ArtworkLookup) -> Result<Option<Artwork>> {
        self.timed("fetch artwork", async {
            let sql = match &lookup {
                ArtworkLookup::Id(_) => {
                    format!("SELECT {ARTWORK_COLUMNS} FROM artworks WHERE artwork_id = ?")
                }
                ArtworkLookup::Url(_) => {
                    format!("SELECT {ARTWORK_COLUMNS} FROM artworks WHERE url = ?")
                }
            };
            let query = match &lookup {
                ArtworkLookup::Id(id) => {
                    trace!(artwork_id = id, "fetching artwork by id");
                    sqlx::query(&sql).bind(*id)
                }
                ArtworkLookup::Url(url) => {
                    trace!(url = %url, "fetching artwork by url");
                    sqlx::query(&sql).bind(url.as_str())
                }
            };

            let row = query
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            row.as_ref().map(artwork_from_row).transpose()
        })
        .await
    }

    async fn create_artwork(&self, artwork: NewArtwork) -> Result<Artwork> {
        trace!(url = %artwork.url, "creating artwork");
        self.timed("create artwork", async {
            let images = encode_string_list(&artwork.images)?;
            // Second precision, matching what the row stores.
            let created_at = parse_timestamp(now_unix_seconds(), "created_at")?;

            let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

            // Allocate the next ID inside the insert transaction, so an
            // aborted insert also rolls the counter back and IDs stay
            // gapless and strictly increasing.
            sqlx::query(
                "INSERT INTO counters (name, value) VALUES ('artworks', 0)
                 ON CONFLICT (name) DO NOTHING",
            )
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            let id: i64 = sqlx::query_scalar(
                "UPDATE counters SET value = value + 1 WHERE name = 'artworks' RETURNING value",
            )
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            let result = sqlx::query(
                "INSERT INTO artworks (artwork_id, title, author, url, images, favourites, created_at)
                 VALUES (?, ?, ?, ?, ?, 0, ?)",
            )
            .bind(id)
            .bind(&artwork.title)
            .bind(&artwork.author)
            .bind(&artwork.url)
            .bind(&images)
            .bind(created_at.as_second())
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) => {}
                Err(err) if is_unique_violation(&err) => {
                    return Err(StoreError::Conflict(artwork.url.clone()));
                }
                Err(err) => return Err(map_sqlx_error(err)),
            }

            tx.commit().await.map_err(map_commit_error)?;
            debug!(artwork_id = id, url = %artwork.url, "created artwork");

            Ok(Artwork {
                id,
                title: artwork.title,
                author: artwork.author,
                url: artwork.url,
                images: artwork.images,
                favourites: 0,
                created_at,
            })
        })
        .await
    }

    async fn search_artworks(&self, filter: ArtworkFilter) -> Result<Vec<Artwork>> {
        self.timed("search artworks", async {
            if let Some(ids) = &filter.ids {
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
            }

            let mut sql = format!("SELECT {ARTWORK_COLUMNS} FROM artworks");
            let mut clauses = Vec::new();
            if let Some(ids) = &filter.ids {
                let placeholders = vec!["?"; ids.len()].join(", ");
                clauses.push(format!("artwork_id IN ({placeholders})"));
            }
            if filter.author.is_some() {
                clauses.push("author = ?".to_string());
            }
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }

            let direction = if filter.descending { "DESC" } else { "ASC" };
            let order_column = match filter.order {
                ArtworkOrder::Time => "created_at",
                ArtworkOrder::Popularity => "favourites",
            };
            sql.push_str(&format!(
                " ORDER BY {order_column} {direction}, artwork_id {direction}"
            ));
            if filter.limit.is_some() {
                sql.push_str(" LIMIT ?");
            }

            let mut query = sqlx::query(&sql);
            if let Some(ids) = &filter.ids {
                for id in ids {
                    query = query.bind(*id);
                }
            }
            if let Some(author) = &filter.author {
                query = query.bind(author.as_str());
            }
            if let Some(limit) = filter.limit {
                query = query.bind(limit as i64);
            }

            let rows = query.fetch_all(&self.pool).await.map_err(map_sqlx_error)?;
            rows.iter().map(artwork_from_row).collect()
        })
        .await
    }

    async fn user(&self, user_id: &str) -> Result<Option<User>> {
        trace!(user_id = %user_id, "fetching user");
        self.timed("fetch user", async {
            let row = sqlx::query("SELECT user_id, dm, crosspost, created_at FROM users WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            row.as_ref().map(user_from_row).transpose()
        })
        .await
    }

    async fn create_user(&self, user: User) -> Result<User> {
        trace!(user_id = %user.user_id, "creating user");
        self.timed("create user", async {
            let result =
                sqlx::query("INSERT INTO users (user_id, dm, crosspost, created_at) VALUES (?, ?, ?, ?)")
                    .bind(&user.user_id)
                    .bind(user.dm)
                    .bind(user.crosspost)
                    .bind(user.created_at.as_second())
                    .execute(&self.pool)
                    .await;

            match result {
                Ok(_) => Ok(user),
                Err(err) if is_unique_violation(&err) => {
                    Err(StoreError::Conflict(user.user_id.clone()))
                }
                Err(err) => Err(map_sqlx_error(err)),
            }
        })
        .await
    }

    async fn update_user(&self, user: User) -> Result<User> {
        trace!(user_id = %user.user_id, "updating user");
        self.timed("update user", async {
            sqlx::query(
                "INSERT INTO users (user_id, dm, crosspost, created_at) VALUES (?, ?, ?, ?)
                 ON CONFLICT (user_id) DO UPDATE SET
                     dm = excluded.dm,
                     crosspost = excluded.crosspost",
            )
            .bind(&user.user_id)
            .bind(user.dm)
            .bind(user.crosspost)
            .bind(user.created_at.as_second())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            Ok(user)
        })
        .await
    }

    async fn add_bookmark(&self, user_id: &str, artwork_id: i64, nsfw: bool) -> Result<bool> {
        trace!(user_id = %user_id, artwork_id, "adding bookmark");
        self.timed("add bookmark", async {
            let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

            let existing: Option<i64> = sqlx::query_scalar(
                "SELECT 1 FROM bookmarks WHERE user_id = ? AND artwork_id = ?",
            )
            .bind(user_id)
            .bind(artwork_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
            if existing.is_some() {
                return Ok(false);
            }

            // Also verifies the artwork exists; zero rows means there is
            // nothing to bookmark.
            let updated = sqlx::query(
                "UPDATE artworks SET favourites = favourites + 1 WHERE artwork_id = ?",
            )
            .bind(artwork_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();
            if updated == 0 {
                return Ok(false);
            }

            sqlx::query(
                "INSERT INTO bookmarks (user_id, artwork_id, nsfw, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(user_id)
            .bind(artwork_id)
            .bind(nsfw)
            .bind(now_unix_seconds())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            tx.commit().await.map_err(map_commit_error)?;
            debug!(user_id = %user_id, artwork_id, "added bookmark");
            Ok(true)
        })
        .await
    }

    async fn delete_bookmark(&self, user_id: &str, artwork_id: i64) -> Result<bool> {
        trace!(user_id = %user_id, artwork_id, "deleting bookmark");
        self.timed("delete bookmark", async {
            let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

            let deleted = sqlx::query("DELETE FROM bookmarks WHERE user_id = ? AND artwork_id = ?")
                .bind(user_id)
                .bind(artwork_id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?
                .rows_affected();
            if deleted == 0 {
                return Ok(false);
            }

            sqlx::query("UPDATE artworks SET favourites = favourites - 1 WHERE artwork_id = ?")
                .bind(artwork_id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

            tx.commit().await.map_err(map_commit_error)?;
            debug!(user_id = %user_id, artwork_id, "deleted bookmark");
            Ok(true)
        })
        .await
    }

    async fn bookmarks(&self, user_id: &str) -> Result<Vec<Bookmark>> {
        trace!(user_id = %user_id, "listing bookmarks");
        self.timed("list bookmarks", async {
            let rows = sqlx::query(
                "SELECT user_id, artwork_id, nsfw, created_at FROM bookmarks
                 WHERE user_id = ?
                 ORDER BY created_at DESC, artwork_id DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            rows.iter().map(bookmark_from_row).collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    async fn setup_store() -> SqliteStore {
        // A single connection keeps every pooled handle on the same
        // in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteStore::new(pool);
        store.run_migrations().await.unwrap();
        store
    }

    fn new_artwork(url_tag: &str) -> NewArtwork {
        NewArtwork {
            title: format!("artwork {url_tag}"),
            author: "someone".to_string(),
            url: format!("https://example.com/art/{url_tag}"),
            images: vec![format!("https://example.com/art/{url_tag}.png")],
        }
    }

    #[tokio::test]
    async fn guild_round_trip() {
        let store = setup_store().await;

        let guild = store.create_guild(Guild::with_defaults("g1")).await.unwrap();
        let fetched = store.guild("g1").await.unwrap().unwrap();

        assert_eq!(fetched.guild_id, guild.guild_id);
        assert_eq!(fetched.prefix, guild.prefix);
        assert_eq!(fetched.repost, RepostMode::Enabled);
        assert_eq!(fetched.repost_expiration_secs, 86_400);
        assert!(fetched.art_channels.is_empty());
    }

    #[tokio::test]
    async fn unknown_guild_is_none() {
        let store = setup_store().await;

        assert!(store.guild("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_guild_is_conflict() {
        let store = setup_store().await;

        store.create_guild(Guild::with_defaults("g1")).await.unwrap();
        let err = store
            .create_guild(Guild::with_defaults("g1"))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_guild_replaces_settings() {
        let store = setup_store().await;

        let mut guild = store.create_guild(Guild::with_defaults("g1")).await.unwrap();
        guild.prefix = "!".to_string();
        guild.repost = RepostMode::Strict;
        let updated = store.update_guild(guild).await.unwrap();

        let fetched = store.guild("g1").await.unwrap().unwrap();
        assert_eq!(fetched.prefix, "!");
        assert_eq!(fetched.repost, RepostMode::Strict);
        assert_eq!(fetched.updated_at.as_second(), updated.updated_at.as_second());
    }

    #[tokio::test]
    async fn update_unknown_guild_upserts() {
        let store = setup_store().await;

        let mut guild = Guild::with_defaults("g1");
        guild.nsfw = true;
        store.update_guild(guild).await.unwrap();

        assert!(store.guild("g1").await.unwrap().unwrap().nsfw);
    }

    #[tokio::test]
    async fn delete_guild_round_trip() {
        let store = setup_store().await;

        store.create_guild(Guild::with_defaults("g1")).await.unwrap();
        assert!(store.delete_guild("g1").await.unwrap());
        assert!(store.guild("g1").await.unwrap().is_none());
        assert!(!store.delete_guild("g1").await.unwrap());
    }

    #[tokio::test]
    async fn art_channels_add_and_delete() {
        let store = setup_store().await;

        store.create_guild(Guild::with_defaults("g1")).await.unwrap();

        let channels = vec!["c1".to_string(), "c2".to_string()];
        assert!(store.add_art_channels("g1", &channels).await.unwrap());
        // All already tracked.
        assert!(!store.add_art_channels("g1", &channels).await.unwrap());

        let fetched = store.guild("g1").await.unwrap().unwrap();
        assert_eq!(fetched.art_channels, channels);

        assert!(store
            .delete_art_channels("g1", &["c1".to_string()])
            .await
            .unwrap());
        assert!(!store
            .delete_art_channels("g1", &["c1".to_string()])
            .await
            .unwrap());

        let fetched = store.guild("g1").await.unwrap().unwrap();
        assert_eq!(fetched.art_channels, vec!["c2".to_string()]);
    }

    #[tokio::test]
    async fn art_channels_on_unknown_guild_is_noop() {
        let store = setup_store().await;

        assert!(!store
            .add_art_channels("missing", &["c1".to_string()])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn artwork_ids_are_sequential() {
        let store = setup_store().await;

        let first = store.create_artwork(new_artwork("a")).await.unwrap();
        let second = store.create_artwork(new_artwork("b")).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.favourites, 0);
    }

    #[tokio::test]
    async fn duplicate_url_is_conflict_and_rolls_back_the_counter() {
        let store = setup_store().await;

        store.create_artwork(new_artwork("a")).await.unwrap();
        let err = store.create_artwork(new_artwork("a")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // The failed insert must not consume an ID.
        let next = store.create_artwork(new_artwork("b")).await.unwrap();
        assert_eq!(next.id, 2);
    }

    #[tokio::test]
    async fn artwork_lookup_by_id_and_url() {
        let store = setup_store().await;

        let created = store.create_artwork(new_artwork("a")).await.unwrap();

        let by_id = store
            .artwork(ArtworkLookup::Id(created.id))
            .await
            .unwrap()
            .unwrap();
        let by_url = store
            .artwork(ArtworkLookup::Url(created.url.clone()))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(by_id, created);
        assert_eq!(by_url, created);
        assert!(store
            .artwork(ArtworkLookup::Id(999))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn concurrent_artwork_creation_yields_unique_increasing_ids() {
        let store = Arc::new(setup_store().await);
        let mut handles = vec![];

        for i in 0..10u64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.create_artwork(new_artwork(&format!("cc-{i}"))).await
            }));
        }

        let mut ids = vec![];
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }

        ids.sort_unstable();
        assert_eq!(ids, (1..=10).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn search_by_ids() {
        let store = setup_store().await;

        let a = store.create_artwork(new_artwork("a")).await.unwrap();
        let _b = store.create_artwork(new_artwork("b")).await.unwrap();
        let c = store.create_artwork(new_artwork("c")).await.unwrap();

        let found = store
            .search_artworks(ArtworkFilter::by_ids(vec![a.id, c.id]))
            .await
            .unwrap();

        // Default order: newest first.
        assert_eq!(
            found.iter().map(|art| art.id).collect::<Vec<_>>(),
            vec![c.id, a.id]
        );
    }

    #[tokio::test]
    async fn search_empty_id_list_is_empty() {
        let store = setup_store().await;

        store.create_artwork(new_artwork("a")).await.unwrap();

        let found = store
            .search_artworks(ArtworkFilter::by_ids(vec![]))
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn search_by_popularity() {
        let store = setup_store().await;

        let a = store.create_artwork(new_artwork("a")).await.unwrap();
        let b = store.create_artwork(new_artwork("b")).await.unwrap();
        store.add_bookmark("u1", b.id, false).await.unwrap();
        store.add_bookmark("u2", b.id, false).await.unwrap();
        store.add_bookmark("u1", a.id, false).await.unwrap();

        let found = store
            .search_artworks(ArtworkFilter {
                order: ArtworkOrder::Popularity,
                descending: true,
                ..ArtworkFilter::default()
            })
            .await
            .unwrap();

        assert_eq!(
            found.iter().map(|art| (art.id, art.favourites)).collect::<Vec<_>>(),
            vec![(b.id, 2), (a.id, 1)]
        );
    }

    #[tokio::test]
    async fn search_respects_author_and_limit() {
        let store = setup_store().await;

        for i in 0..3 {
            store.create_artwork(new_artwork(&format!("x{i}"))).await.unwrap();
        }
        let mut other = new_artwork("y");
        other.author = "else".to_string();
        store.create_artwork(other).await.unwrap();

        let found = store
            .search_artworks(ArtworkFilter {
                author: Some("someone".to_string()),
                limit: Some(2),
                descending: false,
                ..ArtworkFilter::default()
            })
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|art| art.author == "someone"));
        assert_eq!(found[0].id, 1);
    }

    #[tokio::test]
    async fn double_bookmark_is_a_noop() {
        let store = setup_store().await;

        let artwork = store.create_artwork(new_artwork("a")).await.unwrap();

        assert!(store.add_bookmark("u1", artwork.id, false).await.unwrap());
        assert!(!store.add_bookmark("u1", artwork.id, false).await.unwrap());

        let fetched = store
            .artwork(ArtworkLookup::Id(artwork.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.favourites, 1);
        assert_eq!(store.bookmarks("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_bookmark_round_trip() {
        let store = setup_store().await;

        let artwork = store.create_artwork(new_artwork("a")).await.unwrap();
        store.add_bookmark("u1", artwork.id, false).await.unwrap();

        assert!(store.delete_bookmark("u1", artwork.id).await.unwrap());
        assert!(!store.delete_bookmark("u1", artwork.id).await.unwrap());

        let fetched = store
            .artwork(ArtworkLookup::Id(artwork.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.favourites, 0);
        assert!(store.bookmarks("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bookmark_unknown_artwork_is_a_noop() {
        let store = setup_store().await;

        assert!(!store.add_bookmark("u1", 42, false).await.unwrap());
        assert!(!store.delete_bookmark("u1", 42).await.unwrap());
    }

    #[tokio::test]
    async fn favourites_match_live_bookmarks_under_concurrency() {
        let store = Arc::new(setup_store().await);
        let artwork = store.create_artwork(new_artwork("a")).await.unwrap();

        let mut handles = vec![];
        for i in 0..8u64 {
            let store = Arc::clone(&store);
            let id = artwork.id;
            handles.push(tokio::spawn(async move {
                let user = format!("user-{i}");
                store.add_bookmark(&user, id, false).await.unwrap();
                if i % 2 == 0 {
                    store.delete_bookmark(&user, id).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let favourites = store
            .artwork(ArtworkLookup::Id(artwork.id))
            .await
            .unwrap()
            .unwrap()
            .favourites;
        let live: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookmarks WHERE artwork_id = ?")
            .bind(artwork.id)
            .fetch_one(store.pool())
            .await
            .unwrap();

        assert_eq!(favourites, live);
        assert_eq!(favourites, 4);
    }

    #[tokio::test]
    async fn concurrent_duplicate_bookmarks_count_once() {
        let store = Arc::new(setup_store().await);
        let artwork = store.create_artwork(new_artwork("a")).await.unwrap();

        let mut handles = vec![];
        for _ in 0..2 {
            let store = Arc::clone(&store);
            let id = artwork.id;
            handles.push(tokio::spawn(
                async move { store.add_bookmark("u1", id, false).await },
            ));
        }

        let mut outcomes = vec![];
        for handle in handles {
            outcomes.push(handle.await.unwrap().unwrap());
        }

        // Exactly one call inserted the bookmark.
        assert_eq!(outcomes.iter().filter(|added| **added).count(), 1);
        let favourites = store
            .artwork(ArtworkLookup::Id(artwork.id))
            .await
            .unwrap()
            .unwrap()
            .favourites;
        assert_eq!(favourites, 1);
    }

    #[tokio::test]
    async fn user_round_trip() {
        let store = setup_store().await;

        let user = store.create_user(User::with_defaults("u1")).await.unwrap();
        assert!(user.dm);

        let err = store
            .create_user(User::with_defaults("u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let mut updated = user.clone();
        updated.dm = false;
        store.update_user(updated).await.unwrap();
        assert!(!store.user("u1").await.unwrap().unwrap().dm);
    }

    #[tokio::test]
    async fn operations_respect_the_deadline() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteStore::new(pool);
        store.run_migrations().await.unwrap();

        let strict = SqliteStore::with_timeout(store.pool().clone(), Duration::from_nanos(1));
        let err = strict.guild("g1").await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
    }
}
