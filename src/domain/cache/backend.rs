//! Cache backend contract

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::DomainError;

/// Opaque serializable blob stored under a cache key
pub type CacheValue = serde_json::Value;

/// Uniform capability implemented by every cache tier.
///
/// Transport faults never escape `get`/`set`/`has`/`delete`: a failed read is
/// reported as absent and a failed write is dropped, so business operations
/// never depend on cache availability. Only `initialise` may fail.
#[async_trait]
pub trait CacheBackend: Send + Sync + Debug {
    /// Human readable backend name used in log lines
    fn name(&self) -> &'static str;

    /// One-time setup such as opening pooled connections. Idempotent.
    async fn initialise(&self) -> Result<(), DomainError>;

    /// Returns the stored value or `None`
    async fn get(&self, key: &str) -> Option<CacheValue>;

    /// Stores a value, overwriting any previous one. Best effort.
    async fn set(&self, key: &str, value: CacheValue);

    /// Existence check
    async fn has(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// Removes a key, returning whether anything was removed
    async fn delete(&self, key: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct MapOnlyBackend {
        entries: Mutex<HashMap<String, CacheValue>>,
    }

    #[async_trait]
    impl CacheBackend for MapOnlyBackend {
        fn name(&self) -> &'static str {
            "MapOnlyBackend"
        }

        async fn initialise(&self) -> Result<(), DomainError> {
            Ok(())
        }

        async fn get(&self, key: &str) -> Option<CacheValue> {
            self.entries.lock().unwrap().get(key).cloned()
        }

        async fn set(&self, key: &str, value: CacheValue) {
            self.entries.lock().unwrap().insert(key.to_string(), value);
        }

        async fn delete(&self, key: &str) -> bool {
            self.entries.lock().unwrap().remove(key).is_some()
        }
    }

    #[tokio::test]
    async fn test_default_has_uses_get() {
        let backend = MapOnlyBackend::default();
        assert!(!backend.has("user.Dylan").await);

        backend.set("user.Dylan", json!({"last_name": "Dylan"})).await;
        assert!(backend.has("user.Dylan").await);
    }
}
