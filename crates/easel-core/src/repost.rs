use crate::error::DetectorError;
use async_trait::async_trait;
use jiff::Timestamp;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, DetectorError>;

/// A short-lived marker proving an artwork was already posted in a channel.
///
/// Records are created once per successful repost and never mutated. They
/// disappear when their TTL elapses or when the backend drops them; a
/// record with `expires_at: None` never expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepostRecord {
    /// Provider-assigned artwork identifier.
    pub artwork_id: String,
    /// Source URL of the artwork.
    pub url: String,
    pub guild_id: String,
    pub channel_id: String,
    /// The message that originally posted the artwork.
    pub message_id: String,
    /// Absolute expiry. `None` means the record never expires.
    pub expires_at: Option<Timestamp>,
}

impl RepostRecord {
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Timestamp::now() >= expires_at)
    }

    /// The local dedup key for this record.
    pub fn key(&self) -> String {
        repost_key(&self.channel_id, &self.artwork_id)
    }
}

/// Derives the dedup key for a `(channel, artwork)` pair.
///
/// Distributed backends namespace this further; the semantics are
/// identical across backends.
pub fn repost_key(channel_id: &str, artwork_id: &str) -> String {
    format!("{channel_id}:{artwork_id}")
}

/// Duplicate detection for reposted artworks.
///
/// Two interchangeable backends implement this contract: an in-process
/// map for single-instance deployments and a Redis backend for
/// multi-instance deployments. The backend is selected at startup by
/// configuration, never by type-switching at call sites.
#[async_trait]
pub trait RepostDetector: Send + Sync + 'static {
    /// Stores a repost record with the given time-to-live.
    ///
    /// Sets `expires_at = now + ttl` (`None` keeps the record forever) and
    /// overwrites any existing record under the same `(channel, artwork)`
    /// key. Fails only when the backend is unreachable.
    async fn create(&self, record: RepostRecord, ttl: Option<Duration>) -> Result<()>;

    /// Returns the record for `(channel, artwork)` if present and unexpired.
    ///
    /// `Ok(None)` covers both "never seen" and "TTL elapsed". Backends with
    /// a lazy sweep may briefly retain an expired entry internally, but
    /// `find` always re-validates `expires_at` before returning it.
    async fn find(&self, channel_id: &str, artwork_id: &str) -> Result<Option<RepostRecord>>;

    /// Releases backend resources (stops sweepers, drops connections).
    async fn close(&self) -> Result<()>;
}
