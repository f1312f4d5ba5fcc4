//! Redis-protocol cache node

use std::fmt;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::sync::OnceCell;
use tracing::info;

use crate::domain::DomainError;

use super::node::{CacheNode, NodeAddress};

/// Cache node speaking RESP, connected lazily.
///
/// The connection manager reconnects on its own; each call clones the
/// manager handle, which is cheap.
pub struct RedisNode {
    address: NodeAddress,
    connection: OnceCell<ConnectionManager>,
}

impl fmt::Debug for RedisNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisNode")
            .field("address", &self.address)
            .field("connected", &self.connection.initialized())
            .finish()
    }
}

impl RedisNode {
    pub fn new(address: NodeAddress) -> Self {
        Self {
            address,
            connection: OnceCell::new(),
        }
    }

    fn url(&self) -> String {
        format!("redis://{}", self.address)
    }

    async fn connection(&self) -> Result<ConnectionManager, DomainError> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                let client = Client::open(self.url()).map_err(|e| {
                    DomainError::cache(format!("Failed to create cache client: {}", e))
                })?;
                let manager = ConnectionManager::new(client).await.map_err(|e| {
                    DomainError::cache(format!(
                        "Failed to connect to cache node {}: {}",
                        self.address, e
                    ))
                })?;
                info!(node = %self.address, "Connected to cache node");
                Ok::<_, DomainError>(manager)
            })
            .await?;

        Ok(connection.clone())
    }
}

#[async_trait]
impl CacheNode for RedisNode {
    fn address(&self) -> String {
        self.address.to_string()
    }

    async fn connect(&self) -> Result<(), DomainError> {
        self.connection().await.map(|_| ())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DomainError> {
        let mut conn = self.connection().await?;

        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| DomainError::cache(format!("Failed to get key '{}': {}", key, e)))?;

        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), DomainError> {
        let mut conn = self.connection().await?;

        let _: () = conn
            .set(key, value)
            .await
            .map_err(|e| DomainError::cache(format!("Failed to set key '{}': {}", key, e)))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        let mut conn = self.connection().await?;

        let deleted: i64 = conn.del(key).await.map_err(|e| {
            DomainError::cache(format!("Failed to delete key '{}': {}", key, e))
        })?;

        Ok(deleted > 0)
    }
}
