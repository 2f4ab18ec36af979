use thiserror::Error;

/// Errors surfaced by repost detector backends.
///
/// "Not found" is a normal negative result and never appears here; the
/// detector reports it as `Ok(None)`. Whether a backend failure is treated
/// as "assume not a repost" or "assume repost" is the caller's policy.
#[derive(Debug, Clone, Error)]
pub enum DetectorError {
    #[error("repost backend unavailable: {0}")]
    Unavailable(String),
    #[error("repost operation timed out: {0}")]
    Timeout(String),
    #[error("repost record is invalid: {0}")]
    InvalidData(String),
    #[error("repost operation failed: {0}")]
    Operation(String),
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation timed out: {0}")]
    Timeout(String),
    #[error("cache value is invalid: {0}")]
    InvalidData(String),
    #[error("cache operation failed: {0}")]
    Operation(String),
}

/// Errors surfaced by the durable store.
///
/// Absent guilds, artworks, and bookmarks are reported as `Ok(None)` or a
/// boolean no-op, not as errors. Duplicate-key collisions on a natural key
/// (an artwork URL) map to [`StoreError::Conflict`].
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("store backend unavailable: {0}")]
    Unavailable(String),
    #[error("store operation timed out: {0}")]
    Timeout(String),
    #[error("store query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("store operation failed: {0}")]
    Operation(String),
}
