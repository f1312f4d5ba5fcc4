//! Cache bound to one logical execution scope
//!
//! The map lives in a tokio task-local that is only present while a future
//! runs inside [`ScopeLocalCache::scope`] (typically one inbound request).
//! Outside such a scope every operation is a no-op.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;

use crate::domain::DomainError;
use crate::domain::cache::{CacheBackend, CacheValue};

tokio::task_local! {
    static SCOPE_STORE: RefCell<HashMap<String, CacheValue>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScopeLocalCache;

impl ScopeLocalCache {
    pub fn new() -> Self {
        Self
    }

    /// Runs `fut` with a fresh, empty scope cache
    pub async fn scope<F: Future>(fut: F) -> F::Output {
        SCOPE_STORE.scope(RefCell::new(HashMap::new()), fut).await
    }

    /// Whether the current task runs inside a scope
    pub fn in_scope() -> bool {
        SCOPE_STORE.try_with(|_| ()).is_ok()
    }
}

#[async_trait]
impl CacheBackend for ScopeLocalCache {
    fn name(&self) -> &'static str {
        "ScopeLocalCache"
    }

    async fn initialise(&self) -> Result<(), DomainError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Option<CacheValue> {
        SCOPE_STORE
            .try_with(|store| store.borrow().get(key).cloned())
            .ok()
            .flatten()
    }

    async fn set(&self, key: &str, value: CacheValue) {
        let _ = SCOPE_STORE.try_with(|store| {
            store.borrow_mut().insert(key.to_string(), value);
        });
    }

    async fn has(&self, key: &str) -> bool {
        SCOPE_STORE
            .try_with(|store| store.borrow().contains_key(key))
            .unwrap_or(false)
    }

    async fn delete(&self, key: &str) -> bool {
        SCOPE_STORE
            .try_with(|store| store.borrow_mut().remove(key).is_some())
            .unwrap_or(false)
    }
}
