//! In-process cache implementation using moka

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use once_cell::sync::OnceCell;
use tracing::warn;

use crate::domain::DomainError;
use crate::domain::cache::{CacheBackend, CacheValue};

/// Store shared by every `InMemoryCache::shared` handle in the process
static SHARED_STORE: OnceCell<MokaCache<String, CacheValue>> = OnceCell::new();

/// Configuration for in-memory cache
#[derive(Debug, Clone)]
pub struct InMemoryCacheConfig {
    /// Maximum number of entries
    pub max_capacity: u64,
    /// Time to idle - entries not accessed for this duration are evicted
    pub time_to_idle: Option<Duration>,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            time_to_idle: None,
        }
    }
}

impl InMemoryCacheConfig {
    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }

    pub fn with_time_to_idle(mut self, tti: Duration) -> Self {
        self.time_to_idle = Some(tti);
        self
    }

    fn build_store(&self) -> MokaCache<String, CacheValue> {
        let mut builder = MokaCache::builder().max_capacity(self.max_capacity);

        if let Some(tti) = self.time_to_idle {
            builder = builder.time_to_idle(tti);
        }

        builder.build()
    }
}

/// Single-process cache.
///
/// Entries live in this process only, so several instances of a deployment
/// would each see their own copy. Suitable for development and tests.
#[derive(Debug, Clone)]
pub struct InMemoryCache {
    store: MokaCache<String, CacheValue>,
}

impl InMemoryCache {
    /// Handle on the process-wide store.
    ///
    /// The first call decides the store's capacity; later configs are ignored.
    pub fn shared(config: &InMemoryCacheConfig) -> Self {
        let store = SHARED_STORE.get_or_init(|| config.build_store()).clone();
        Self { store }
    }

    /// Cache backed by a private store, not visible to other handles
    pub fn isolated(config: &InMemoryCacheConfig) -> Self {
        Self {
            store: config.build_store(),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::shared(&InMemoryCacheConfig::default())
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    fn name(&self) -> &'static str {
        "InMemoryCache"
    }

    async fn initialise(&self) -> Result<(), DomainError> {
        warn!("InMemoryCache is not suitable for production, use with caution");
        Ok(())
    }

    async fn get(&self, key: &str) -> Option<CacheValue> {
        self.store.get(key).await
    }

    async fn set(&self, key: &str, value: CacheValue) {
        self.store.insert(key.to_string(), value).await;
    }

    async fn has(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    async fn delete(&self, key: &str) -> bool {
        self.store.remove(key).await.is_some()
    }
}
