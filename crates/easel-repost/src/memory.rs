use async_trait::async_trait;
use dashmap::DashMap;
use easel_core::{repost_key, DetectorError, RepostDetector, RepostRecord};
use jiff::{SignedDuration, Timestamp};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Type alias for detector results.
pub type Result<T> = std::result::Result<T, DetectorError>;

/// In-process implementation of [`RepostDetector`] using DashMap.
///
/// Expired entries are dropped lazily on `find` and by a periodic sweep
/// task, so an expired entry may linger internally within the sweep
/// granularity; `find` re-validates `expires_at` and never returns one.
///
/// DashMap uses sharded locks, so concurrent request-handling tasks on
/// different keys do not contend.
#[derive(Debug)]
pub struct MemoryDetector {
    records: Arc<DashMap<String, RepostRecord>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryDetector {
    /// Interval between passive expiry sweeps.
    pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

    /// Creates a detector sweeping at [`Self::DEFAULT_SWEEP_INTERVAL`].
    pub fn new() -> Self {
        Self::with_sweep_interval(Self::DEFAULT_SWEEP_INTERVAL)
    }

    /// Creates a detector with a custom sweep interval.
    pub fn with_sweep_interval(interval: Duration) -> Self {
        let records: Arc<DashMap<String, RepostRecord>> = Arc::new(DashMap::new());
        let sweeper = tokio::spawn(Self::sweep_loop(Arc::clone(&records), interval));
        Self {
            records,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    async fn sweep_loop(records: Arc<DashMap<String, RepostRecord>>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so a sweep never races
        // record creation during startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let before = records.len();
            records.retain(|_, record| !record.is_expired());
            // Concurrent inserts during the sweep can push len past `before`.
            let swept = before.saturating_sub(records.len());
            if swept > 0 {
                debug!(swept, "swept expired repost records");
            }
        }
    }
}

impl Default for MemoryDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryDetector {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.abort();
        }
    }
}

#[async_trait]
impl RepostDetector for MemoryDetector {
    async fn create(&self, mut record: RepostRecord, ttl: Option<Duration>) -> Result<()> {
        record.expires_at = match ttl {
            Some(ttl) => {
                let ttl = SignedDuration::try_from(ttl)
                    .map_err(|e| DetectorError::InvalidData(format!("invalid ttl: {e}")))?;
                Some(Timestamp::now() + ttl)
            }
            None => None,
        };

        let key = record.key();
        trace!(key = %key, "storing repost record in memory");
        self.records.insert(key, record);
        Ok(())
    }

    async fn find(&self, channel_id: &str, artwork_id: &str) -> Result<Option<RepostRecord>> {
        let key = repost_key(channel_id, artwork_id);

        let Some(record) = self.records.get(&key) else {
            trace!(key = %key, "no repost record");
            return Ok(None);
        };

        if record.is_expired() {
            drop(record);
            self.records.remove(&key);
            trace!(key = %key, "repost record expired");
            return Ok(None);
        }

        Ok(Some(record.clone()))
    }

    async fn close(&self) -> Result<()> {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.abort();
        }
        self.records.clear();
        debug!("memory repost detector closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(channel_id: &str, artwork_id: &str) -> RepostRecord {
        RepostRecord {
            artwork_id: artwork_id.to_string(),
            url: format!("https://example.com/art/{artwork_id}"),
            guild_id: "g1".to_string(),
            channel_id: channel_id.to_string(),
            message_id: "m1".to_string(),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn create_then_find() {
        let detector = MemoryDetector::new();

        detector
            .create(record("c1", "123"), Some(Duration::from_secs(10)))
            .await
            .unwrap();

        let found = detector.find("c1", "123").await.unwrap().unwrap();
        assert_eq!(found.artwork_id, "123");
        assert_eq!(found.channel_id, "c1");
        assert_eq!(found.url, "https://example.com/art/123");
        assert!(found.expires_at.is_some());
    }

    #[tokio::test]
    async fn find_unknown_pair() {
        let detector = MemoryDetector::new();

        assert!(detector.find("c1", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_after_ttl_elapsed() {
        let detector = MemoryDetector::new();

        detector
            .create(record("c1", "123"), Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert!(detector.find("c1", "123").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(detector.find("c1", "123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn no_ttl_never_expires() {
        let detector = MemoryDetector::new();

        detector.create(record("c1", "123"), None).await.unwrap();

        let found = detector.find("c1", "123").await.unwrap().unwrap();
        assert_eq!(found.expires_at, None);
    }

    #[tokio::test]
    async fn create_overwrites_same_key() {
        let detector = MemoryDetector::new();

        detector
            .create(record("c1", "123"), Some(Duration::from_secs(10)))
            .await
            .unwrap();

        let mut replacement = record("c1", "123");
        replacement.message_id = "m2".to_string();
        detector
            .create(replacement, Some(Duration::from_secs(10)))
            .await
            .unwrap();

        let found = detector.find("c1", "123").await.unwrap().unwrap();
        assert_eq!(found.message_id, "m2");
    }

    #[tokio::test]
    async fn same_artwork_different_channels() {
        let detector = MemoryDetector::new();

        detector
            .create(record("c1", "123"), Some(Duration::from_secs(10)))
            .await
            .unwrap();

        assert!(detector.find("c1", "123").await.unwrap().is_some());
        assert!(detector.find("c2", "123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sweeper_drops_expired_entries() {
        let detector = MemoryDetector::with_sweep_interval(Duration::from_millis(50));

        detector
            .create(record("c1", "123"), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        detector.create(record("c1", "456"), None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;

        // The expired record is gone without any find touching it.
        assert_eq!(detector.records.len(), 1);
        assert!(detector.find("c1", "456").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn close_releases_records() {
        let detector = MemoryDetector::new();

        detector.create(record("c1", "123"), None).await.unwrap();
        detector.close().await.unwrap();

        assert!(detector.records.is_empty());
    }

    #[tokio::test]
    async fn concurrent_create_and_find() {
        let detector = Arc::new(MemoryDetector::new());
        let mut handles = vec![];

        for i in 0..10u64 {
            let detector = Arc::clone(&detector);
            handles.push(tokio::spawn(async move {
                let r = record("c1", &format!("art-{i:03}"));
                detector.create(r, Some(Duration::from_secs(10))).await.unwrap();
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..10u64 {
            let found = detector
                .find("c1", &format!("art-{i:03}"))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(found.artwork_id, format!("art-{i:03}"));
        }
    }
}
