//! Cache backend that stores nothing

use async_trait::async_trait;

use crate::domain::DomainError;
use crate::domain::cache::{CacheBackend, CacheValue};

/// Discards every write; every read misses
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl NoCache {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheBackend for NoCache {
    fn name(&self) -> &'static str {
        "NoCache"
    }

    async fn initialise(&self) -> Result<(), DomainError> {
        Ok(())
    }

    async fn get(&self, _key: &str) -> Option<CacheValue> {
        None
    }

    async fn set(&self, _key: &str, _value: CacheValue) {}

    async fn has(&self, _key: &str) -> bool {
        false
    }

    async fn delete(&self, _key: &str) -> bool {
        false
    }
}
