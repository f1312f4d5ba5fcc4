//! Two-level read-through / write-through cache

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::domain::DomainError;
use crate::domain::cache::{CacheBackend, CacheValue};

use super::factory::{CacheConfig, CacheFactory};
use super::no_cache::NoCache;

/// Tier selector used when wiring backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    L1,
    L2,
}

impl TryFrom<u8> for CacheTier {
    type Error = DomainError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            1 => Ok(Self::L1),
            2 => Ok(Self::L2),
            _ => Err(DomainError::configuration(format!(
                "Invalid cache level {}, only 1 and 2 are supported",
                level
            ))),
        }
    }
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::L1 => write!(f, "l1"),
            Self::L2 => write!(f, "l2"),
        }
    }
}

/// Composes a close, cheap L1 with a shared L2.
///
/// Reads check L1, then L2 (promoting hits into L1), then the loader.
/// Fresh values are written to L2 first, then L1. Holds serialized
/// snapshots only, never live records.
#[derive(Debug, Clone)]
pub struct TwoLevelCache {
    l1: Arc<dyn CacheBackend>,
    l2: Arc<dyn CacheBackend>,
}

impl Default for TwoLevelCache {
    fn default() -> Self {
        Self::new(Arc::new(NoCache::new()), Arc::new(NoCache::new()))
    }
}

impl TwoLevelCache {
    pub fn new(l1: Arc<dyn CacheBackend>, l2: Arc<dyn CacheBackend>) -> Self {
        Self { l1, l2 }
    }

    /// Builds and initialises both tiers from configuration
    pub async fn from_config(config: &CacheConfig) -> Result<Self, DomainError> {
        let factory = CacheFactory::new();
        let l1 = factory.create(&config.l1)?;
        let l2 = factory.create(&config.l2)?;

        l1.initialise().await?;
        l2.initialise().await?;

        info!(l1 = l1.name(), l2 = l2.name(), "Two-level cache ready");
        Ok(Self::new(l1, l2))
    }

    /// Replaces the backend of tier `level` (1 or 2)
    pub fn set_tier(&mut self, level: u8, backend: Arc<dyn CacheBackend>) -> Result<(), DomainError> {
        match CacheTier::try_from(level)? {
            CacheTier::L1 => self.l1 = backend,
            CacheTier::L2 => self.l2 = backend,
        }
        Ok(())
    }

    pub fn l1(&self) -> &Arc<dyn CacheBackend> {
        &self.l1
    }

    pub fn l2(&self) -> &Arc<dyn CacheBackend> {
        &self.l2
    }

    /// L1 then L2 lookup; an L2 hit is copied into L1
    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        let started = Instant::now();

        if let Some(value) = self.l1.get(key).await {
            debug!(
                backend = self.l1.name(),
                tier = "l1",
                key = %key,
                elapsed = started.elapsed().as_secs_f64(),
                "Cache hit"
            );
            return Some(value);
        }

        if let Some(value) = self.l2.get(key).await {
            self.l1.set(key, value.clone()).await;
            debug!(
                backend = self.l2.name(),
                tier = "l2",
                key = %key,
                elapsed = started.elapsed().as_secs_f64(),
                "Cache hit"
            );
            return Some(value);
        }

        None
    }

    /// Writes a fresh value through both tiers
    pub async fn set(&self, key: &str, value: CacheValue) {
        self.l2.set(key, value.clone()).await;
        self.l1.set(key, value).await;
    }

    /// Read-through lookup.
    ///
    /// On a full miss the loader runs without any cache side effect; a value
    /// it returns is written through both tiers. Loader errors propagate and
    /// nothing is cached.
    pub async fn get_or_load<F, Fut>(
        &self,
        key: &str,
        loader: F,
    ) -> Result<Option<CacheValue>, DomainError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<CacheValue>, DomainError>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(Some(value));
        }

        let started = Instant::now();
        let loaded = loader().await?;

        if let Some(value) = &loaded {
            self.set(key, value.clone()).await;
        }

        debug!(
            backend = self.l2.name(),
            key = %key,
            elapsed = started.elapsed().as_secs_f64(),
            "Cache miss"
        );
        Ok(loaded)
    }

    /// Removes `key` from both tiers
    pub async fn invalidate(&self, key: &str) {
        if self.l1.delete(key).await {
            debug!(backend = self.l1.name(), tier = "l1", key = %key, "Cache delete");
        }
        if self.l2.delete(key).await {
            debug!(backend = self.l2.name(), tier = "l2", key = %key, "Cache delete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::cache::factory::{CacheEngine, CacheTierConfig};
    use crate::infrastructure::cache::in_memory::{InMemoryCache, InMemoryCacheConfig};
    use crate::infrastructure::cache::recording::{CallMethod, RecordingCache};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn isolated() -> Arc<InMemoryCache> {
        Arc::new(InMemoryCache::isolated(&InMemoryCacheConfig::default()))
    }

    #[tokio::test]
    async fn test_l1_hit_skips_l2() {
        let l1 = isolated();
        let l2 = Arc::new(RecordingCache::new());
        let cache = TwoLevelCache::new(l1.clone(), l2.clone());

        l1.set("user.Dylan", json!({"id": "u1"})).await;

        assert_eq!(cache.get("user.Dylan").await, Some(json!({"id": "u1"})));
        l2.assert_not_called(CallMethod::Get, &[]);
    }

    #[tokio::test]
    async fn test_l2_hit_populates_l1() {
        let l1 = isolated();
        let l2 = isolated();
        let cache = TwoLevelCache::new(l1.clone(), l2.clone());

        l2.set("user.Dylan", json!({"id": "u1"})).await;
        assert!(l1.get("user.Dylan").await.is_none());

        assert_eq!(cache.get("user.Dylan").await, Some(json!({"id": "u1"})));
        assert_eq!(l1.get("user.Dylan").await, Some(json!({"id": "u1"})));
    }

    #[tokio::test]
    async fn test_loader_result_written_through_both_tiers() {
        let l1 = isolated();
        let l2 = isolated();
        let cache = TwoLevelCache::new(l1.clone(), l2.clone());
        let loads = AtomicUsize::new(0);

        for _ in 0..2 {
            let value = cache
                .get_or_load("user.Dylan", || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(json!({"id": "u1"})))
                })
                .await
                .unwrap();
            assert_eq!(value, Some(json!({"id": "u1"})));
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(l1.get("user.Dylan").await, Some(json!({"id": "u1"})));
        assert_eq!(l2.get("user.Dylan").await, Some(json!({"id": "u1"})));
    }

    #[tokio::test]
    async fn test_absent_loader_result_is_not_cached() {
        let recording = Arc::new(RecordingCache::new());
        let cache = TwoLevelCache::new(recording.clone(), Arc::new(NoCache::new()));

        let value = cache
            .get_or_load("user.Nobody", || async { Ok(None) })
            .await
            .unwrap();

        assert!(value.is_none());
        recording.assert_called_once(CallMethod::Get, &[json!("user.Nobody")]);
        recording.assert_not_called(CallMethod::Set, &[]);
    }

    #[tokio::test]
    async fn test_loader_error_propagates() {
        let cache = TwoLevelCache::default();
        let result = cache
            .get_or_load("k", || async { Err(DomainError::storage("down")) })
            .await;
        assert!(matches!(result, Err(DomainError::Storage { .. })));
    }

    #[tokio::test]
    async fn test_invalidate_hits_both_tiers() {
        let l1 = Arc::new(RecordingCache::new());
        let l2 = Arc::new(RecordingCache::new());
        let cache = TwoLevelCache::new(l1.clone(), l2.clone());

        cache.invalidate("user.Dylan").await;

        l1.assert_called_once(CallMethod::Delete, &[json!("user.Dylan")]);
        l2.assert_called_once(CallMethod::Delete, &[json!("user.Dylan")]);
    }

    #[test]
    fn test_set_tier() {
        let mut cache = TwoLevelCache::default();

        cache.set_tier(1, Arc::new(RecordingCache::new())).unwrap();
        assert_eq!(cache.l1().name(), "RecordingCache");
        assert_eq!(cache.l2().name(), "NoCache");

        cache.set_tier(2, Arc::new(RecordingCache::new())).unwrap();
        assert_eq!(cache.l2().name(), "RecordingCache");

        let result = cache.set_tier(3, Arc::new(NoCache::new()));
        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_from_config() {
        let config = CacheConfig {
            l1: CacheTierConfig::new(CacheEngine::ScopeLocal),
            l2: CacheTierConfig::default(),
        };

        let cache = TwoLevelCache::from_config(&config).await.unwrap();
        assert_eq!(cache.l1().name(), "ScopeLocalCache");
        assert_eq!(cache.l2().name(), "NoCache");
    }
}
