//! Late-bound handle to the configured document store

use std::sync::{Arc, RwLock};

use crate::domain::DomainError;
use crate::domain::storage::DocumentStore;

/// Shared handle that model code holds before storage is wired.
///
/// Cloning shares the slot, so configuring any clone configures them all.
#[derive(Debug, Clone, Default)]
pub struct Database {
    store: Arc<RwLock<Option<Arc<dyn DocumentStore>>>>,
}

impl Database {
    /// Creates an unconfigured handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a handle already bound to `store`
    pub fn with_store(store: Arc<dyn DocumentStore>) -> Self {
        let database = Self::new();
        database.configure(store);
        database
    }

    /// Binds the handle to a store, replacing any previous one
    pub fn configure(&self, store: Arc<dyn DocumentStore>) {
        match self.store.write() {
            Ok(mut slot) => *slot = Some(store),
            Err(poisoned) => *poisoned.into_inner() = Some(store),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.store.read().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Returns the configured store
    pub fn meta(&self) -> Result<Arc<dyn DocumentStore>, DomainError> {
        let slot = self
            .store
            .read()
            .map_err(|e| DomainError::storage(format!("Failed to acquire read lock: {}", e)))?;

        slot.clone().ok_or_else(|| {
            DomainError::configuration("Database is not configured, call configure() first")
        })
    }
}
