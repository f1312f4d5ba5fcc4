//! Docmodel
//!
//! A document-model layer on top of a document store with:
//! - Two-level read-through caching over interchangeable backends
//! - Coordinated cache invalidation on every mutation
//! - Referential integrity with raise, cascade and detach destroy policies
//! - Submodel families dispatched on a stored discriminator
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use docmodel::domain::model::{FieldDescriptor, SchemaBuilder};
//! use docmodel::infrastructure::cache::TwoLevelCache;
//! use docmodel::infrastructure::models::{ModelRegistry, ModelStore};
//! use docmodel::infrastructure::storage::{Database, InMemoryDocumentStore};
//!
//! # async fn run() -> Result<(), docmodel::DomainError> {
//! let registry = Arc::new(ModelRegistry::new());
//! let user = registry.register(
//!     SchemaBuilder::new("User")
//!         .key_field("last_name")
//!         .field(FieldDescriptor::string("last_name"))
//!         .build()?,
//! )?;
//!
//! let database = Database::with_store(Arc::new(InMemoryDocumentStore::new()));
//! let store = ModelStore::new(database, registry, TwoLevelCache::default());
//!
//! let mut attrs = serde_json::Map::new();
//! attrs.insert("last_name".into(), "Dylan".into());
//! let mut record = store.create(&user, attrs)?;
//! store.save(&mut record).await?;
//!
//! let cached = store.cache_get(&user, Some("Dylan")).await?;
//! assert!(cached.is_some());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::DomainError;
pub use infrastructure::cache::{CacheConfig, TwoLevelCache};
pub use infrastructure::models::{CounterService, ModelRegistry, ModelStore, SaveOptions};
pub use infrastructure::storage::{Database, StorageConfig};

/// Loads configuration, installs logging and wires a model store
pub async fn bootstrap(registry: std::sync::Arc<ModelRegistry>) -> Result<ModelStore, DomainError> {
    let config = AppConfig::load()
        .map_err(|e| DomainError::configuration(format!("Failed to load configuration: {}", e)))?;

    infrastructure::logging::init_logging(&config.logging);
    ModelStore::from_config(&config, registry).await
}
