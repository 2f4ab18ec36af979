use crate::config::{Config, RepostBackend};
use anyhow::Context;
use easel_cache::MokaStoreCache;
use easel_core::RepostDetector;
use easel_repost::{MemoryDetector, RedisDetector};
use easel_store::{CachedStore, SqliteStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// The assembled bot core: one detector and one cached store, shared by
/// every request-handling task.
///
/// All components are explicit, constructor-injected instances created
/// here at startup and torn down by [`Service::close`]; nothing in the
/// workspace holds ambient global state.
pub struct Service {
    detector: Arc<dyn RepostDetector>,
    store: Arc<CachedStore<SqliteStore, MokaStoreCache>>,
}

impl Service {
    /// Connects the configured backends and runs store migrations.
    pub async fn init(config: &Config) -> anyhow::Result<Self> {
        let base = SqliteStore::connect(&config.store.url)
            .await
            .context("failed to connect to the durable store")?;
        let store = SqliteStore::with_timeout(
            base.pool().clone(),
            Duration::from_secs(config.store.op_timeout_secs),
        );
        store
            .run_migrations()
            .await
            .context("failed to run store migrations")?;

        let detector: Arc<dyn RepostDetector> = match config.repost.backend {
            RepostBackend::Memory => {
                info!("using in-memory repost detector");
                Arc::new(MemoryDetector::with_sweep_interval(Duration::from_secs(
                    config.repost.sweep_interval_secs,
                )))
            }
            RepostBackend::Redis => {
                let url = config
                    .repost
                    .redis_url
                    .as_deref()
                    .context("repost.redis_url is required for the redis backend")?;
                info!(url = %url, "using redis repost detector");
                Arc::new(
                    RedisDetector::connect_with_timeout(
                        url,
                        Duration::from_secs(config.repost.op_timeout_secs),
                    )
                    .await
                    .context("failed to connect to the repost backend")?,
                )
            }
        };

        Ok(Self {
            detector,
            store: Arc::new(CachedStore::new(store, MokaStoreCache::new())),
        })
    }

    /// The shared repost detector.
    pub fn detector(&self) -> Arc<dyn RepostDetector> {
        Arc::clone(&self.detector)
    }

    /// The shared cached store.
    pub fn store(&self) -> Arc<CachedStore<SqliteStore, MokaStoreCache>> {
        Arc::clone(&self.store)
    }

    /// Releases backend resources.
    pub async fn close(self) -> anyhow::Result<()> {
        self.detector
            .close()
            .await
            .context("failed to close the repost detector")?;
        info!("service closed");
        Ok(())
    }
}
