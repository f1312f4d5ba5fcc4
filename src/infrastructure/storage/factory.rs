//! Storage factory for runtime storage selection

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::domain::DomainError;
use crate::domain::storage::DocumentStore;

use super::in_memory::InMemoryDocumentStore;
use super::postgres::{PostgresConfig, PostgresDocumentStore};

/// Supported storage types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum StorageType {
    /// In-memory storage (for testing/development)
    #[default]
    InMemory,
    /// PostgreSQL storage
    Postgres,
}

impl StorageType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" | "in_memory" => Some(Self::InMemory),
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            _ => None,
        }
    }
}

impl TryFrom<String> for StorageType {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value).ok_or_else(|| {
            DomainError::configuration(format!(
                "Unknown storage type: {}. Valid types: in_memory, postgres",
                value
            ))
        })
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageType,
    /// Only read when `backend` is postgres
    pub postgres: PostgresConfig,
}

impl StorageConfig {
    /// Creates an in-memory storage configuration
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Creates a PostgreSQL storage configuration
    pub fn postgres(config: PostgresConfig) -> Self {
        Self {
            backend: StorageType::Postgres,
            postgres: config,
        }
    }

    /// Creates a PostgreSQL configuration from a URL
    pub fn postgres_url(url: impl Into<String>) -> Self {
        Self::postgres(PostgresConfig::new(url))
    }

    /// Returns the storage type
    pub fn storage_type(&self) -> StorageType {
        self.backend
    }
}

/// Factory for creating document stores
#[derive(Debug)]
pub struct StorageFactory;

impl StorageFactory {
    /// Creates a document store based on the configuration
    pub async fn create(config: &StorageConfig) -> Result<Arc<dyn DocumentStore>, DomainError> {
        let store: Arc<dyn DocumentStore> = match config.backend {
            StorageType::InMemory => Arc::new(InMemoryDocumentStore::new()),
            StorageType::Postgres => Arc::new(PostgresDocumentStore::connect(&config.postgres).await?),
        };

        info!(backend = ?config.backend, "Document store created");
        Ok(store)
    }

    /// Creates an in-memory document store
    pub fn create_in_memory() -> Arc<InMemoryDocumentStore> {
        Arc::new(InMemoryDocumentStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_storage_type_from_str() {
        assert_eq!(StorageType::from_str("memory"), Some(StorageType::InMemory));
        assert_eq!(StorageType::from_str("in-memory"), Some(StorageType::InMemory));
        assert_eq!(StorageType::from_str("postgres"), Some(StorageType::Postgres));
        assert_eq!(StorageType::from_str("pg"), Some(StorageType::Postgres));
        assert_eq!(StorageType::from_str("unknown"), None);
    }

    #[test]
    fn test_storage_config_types() {
        let in_memory = StorageConfig::in_memory();
        assert_eq!(in_memory.storage_type(), StorageType::InMemory);

        let postgres = StorageConfig::postgres_url("postgres://localhost/test");
        assert_eq!(postgres.storage_type(), StorageType::Postgres);
        assert_eq!(postgres.postgres.url, "postgres://localhost/test");
    }

    #[test]
    fn test_storage_config_deserialize() {
        let config: StorageConfig = serde_json::from_value(json!({
            "backend": "postgresql",
            "postgres": {"url": "postgres://db/models", "max_connections": 4}
        }))
        .unwrap();

        assert_eq!(config.backend, StorageType::Postgres);
        assert_eq!(config.postgres.url, "postgres://db/models");
        assert_eq!(config.postgres.max_connections, 4);
        assert_eq!(config.postgres.min_connections, 1);

        let invalid: Result<StorageConfig, _> = serde_json::from_value(json!({"backend": "mongo"}));
        assert!(invalid.is_err());
    }

    #[tokio::test]
    async fn test_create_in_memory() {
        let store = StorageFactory::create(&StorageConfig::in_memory()).await.unwrap();
        assert_eq!(
            store.count("anything", &crate::domain::storage::Query::new()).await.unwrap(),
            0
        );
    }
}
