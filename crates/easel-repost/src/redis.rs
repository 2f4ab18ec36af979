use async_trait::async_trait;
use easel_core::{DetectorError, RepostDetector, RepostRecord};
use jiff::{SignedDuration, Timestamp};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Type alias for detector results.
pub type Result<T> = std::result::Result<T, DetectorError>;

/// Redis-based implementation of [`RepostDetector`] for multi-instance
/// deployments.
///
/// Each record is one hash under `channel:<channel>:artwork:<artwork>`,
/// with the TTL applied as an absolute `EXPIREAT` on the whole key.
/// `create` sets fields and expiry in a single MULTI/EXEC pipeline so a
/// half-written record is never observed; `find` pipelines the existence
/// check, field fetch, and expiry fetch into one round trip. The key can
/// still expire between pipeline dispatch and the read on the server,
/// which is why `find` re-validates the reconstructed `expires_at`.
#[derive(Debug, Clone)]
pub struct RedisDetector {
    conn: redis::aio::MultiplexedConnection,
    op_timeout: Option<Duration>,
}

fn map_redis_error(operation: &str, err: redis::RedisError) -> DetectorError {
    let message = format!("{operation}: {err}");
    let lower = message.to_ascii_lowercase();
    if lower.contains("timed out") {
        DetectorError::Timeout(message)
    } else if lower.contains("connection") || lower.contains("broken pipe") {
        DetectorError::Unavailable(message)
    } else {
        DetectorError::Operation(message)
    }
}

impl RedisDetector {
    /// Creates a detector over an existing multiplexed connection.
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self {
            conn,
            op_timeout: None,
        }
    }

    /// Creates a detector whose operations are bounded by `op_timeout`.
    ///
    /// Exceeding the deadline aborts the operation and surfaces
    /// [`DetectorError::Timeout`].
    pub fn with_timeout(conn: redis::aio::MultiplexedConnection, op_timeout: Duration) -> Self {
        Self {
            conn,
            op_timeout: Some(op_timeout),
        }
    }

    /// Opens a new connection to `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| DetectorError::Unavailable(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| map_redis_error("failed to connect to redis", e))?;
        Ok(Self::new(conn))
    }

    /// Opens a new connection with a per-operation deadline.
    pub async fn connect_with_timeout(url: &str, op_timeout: Duration) -> Result<Self> {
        let mut detector = Self::connect(url).await?;
        detector.op_timeout = Some(op_timeout);
        Ok(detector)
    }

    /// Generates the namespaced dedup key for a `(channel, artwork)` pair.
    fn detector_key(channel_id: &str, artwork_id: &str) -> String {
        format!("channel:{channel_id}:artwork:{artwork_id}")
    }

    async fn run<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match self.op_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, fut).await {
                Ok(result) => result.map_err(|e| map_redis_error(operation, e)),
                Err(_) => Err(DetectorError::Timeout(format!(
                    "{operation}: deadline of {deadline:?} exceeded"
                ))),
            },
            None => fut.await.map_err(|e| map_redis_error(operation, e)),
        }
    }
}

fn hash_field(fields: &HashMap<String, String>, name: &str, key: &str) -> Result<String> {
    fields.get(name).cloned().ok_or_else(|| {
        DetectorError::InvalidData(format!("missing field '{name}' for key '{key}'"))
    })
}

#[async_trait]
impl RepostDetector for RedisDetector {
    async fn create(&self, record: RepostRecord, ttl: Option<Duration>) -> Result<()> {
        let key = Self::detector_key(&record.channel_id, &record.artwork_id);
        trace!(key = %key, "storing repost record in redis");

        let expires_at = match ttl {
            Some(ttl) => {
                let ttl = SignedDuration::try_from(ttl)
                    .map_err(|e| DetectorError::InvalidData(format!("invalid ttl: {e}")))?;
                Some(Timestamp::now() + ttl)
            }
            None => None,
        };

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("HSET")
            .arg(&key)
            .arg("artwork_id")
            .arg(&record.artwork_id)
            .arg("url")
            .arg(&record.url)
            .arg("guild_id")
            .arg(&record.guild_id)
            .arg("channel_id")
            .arg(&record.channel_id)
            .arg("message_id")
            .arg(&record.message_id)
            .ignore();
        match expires_at {
            Some(expires_at) => {
                pipe.cmd("EXPIREAT").arg(&key).arg(expires_at.as_second()).ignore();
            }
            None => {
                // Overwriting an existing key would otherwise inherit its TTL.
                pipe.cmd("PERSIST").arg(&key).ignore();
            }
        }

        let mut conn = self.conn.clone();
        self.run("failed to store repost record", pipe.query_async::<()>(&mut conn))
            .await?;

        debug!(key = %key, "stored repost record in redis");
        Ok(())
    }

    async fn find(&self, channel_id: &str, artwork_id: &str) -> Result<Option<RepostRecord>> {
        let key = Self::detector_key(channel_id, artwork_id);
        trace!(key = %key, "fetching repost record from redis");

        let mut pipe = redis::pipe();
        pipe.cmd("EXISTS")
            .arg(&key)
            .cmd("HGETALL")
            .arg(&key)
            .cmd("EXPIRETIME")
            .arg(&key);

        let mut conn = self.conn.clone();
        let (exists, fields, expire_time): (bool, HashMap<String, String>, i64) = self
            .run("failed to fetch repost record", pipe.query_async(&mut conn))
            .await?;

        if !exists || fields.is_empty() {
            trace!(key = %key, "no repost record in redis");
            return Ok(None);
        }

        // EXPIRETIME reports -1 for keys without expiry, -2 if the key
        // vanished between pipeline steps.
        let expires_at = if expire_time > 0 {
            Some(Timestamp::from_second(expire_time).map_err(|e| {
                DetectorError::InvalidData(format!(
                    "invalid expire time {expire_time} for key '{key}': {e}"
                ))
            })?)
        } else if expire_time == -2 {
            trace!(key = %key, "repost record expired mid-fetch");
            return Ok(None);
        } else {
            None
        };

        let record = RepostRecord {
            artwork_id: hash_field(&fields, "artwork_id", &key)?,
            url: hash_field(&fields, "url", &key)?,
            guild_id: hash_field(&fields, "guild_id", &key)?,
            channel_id: hash_field(&fields, "channel_id", &key)?,
            message_id: hash_field(&fields, "message_id", &key)?,
            expires_at,
        };

        // The pipeline is one round trip, not an atomic snapshot; the key
        // may have expired on the server after EXISTS answered.
        if record.is_expired() {
            warn!(key = %key, "repost record expired between pipeline steps");
            return Ok(None);
        }

        Ok(Some(record))
    }

    async fn close(&self) -> Result<()> {
        // The multiplexed connection is closed when its last clone drops.
        debug!("redis repost detector closed");
        Ok(())
    }
}
