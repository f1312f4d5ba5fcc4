//! Distributed cache sharded over a fixed list of remote nodes

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::domain::DomainError;
use crate::domain::cache::{CacheBackend, CacheValue};

use super::node::{CacheNode, NodeAddress};
use super::redis::RedisNode;
use super::retry::Rerouter;

/// Cache spread over remote nodes by CRC32 placement.
///
/// Values are JSON-encoded before transmission. Reads and writes go to the
/// node selected for the key and are re-routed on failure; deletes go to
/// every node since placement may have changed since the value was written.
pub struct ShardedCache {
    nodes: Vec<Arc<dyn CacheNode>>,
    rerouter: Rerouter,
}

impl fmt::Debug for ShardedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addresses: Vec<String> = self.nodes.iter().map(|n| n.address()).collect();
        f.debug_struct("ShardedCache")
            .field("nodes", &addresses)
            .field("rerouter", &self.rerouter)
            .finish()
    }
}

impl ShardedCache {
    /// Builds RESP nodes from `host[:port]` specs
    pub fn from_specs(specs: &[String]) -> Result<Self, DomainError> {
        let nodes = specs
            .iter()
            .map(|spec| {
                let address: NodeAddress = spec.parse()?;
                Ok(Arc::new(RedisNode::new(address)) as Arc<dyn CacheNode>)
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        Ok(Self::with_nodes(nodes))
    }

    pub fn with_nodes(nodes: Vec<Arc<dyn CacheNode>>) -> Self {
        Self {
            nodes,
            rerouter: Rerouter::default(),
        }
    }

    pub fn with_rerouter(mut self, rerouter: Rerouter) -> Self {
        self.rerouter = rerouter;
        self
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, DomainError> {
        self.rerouter
            .run(key, self.nodes.len(), |index| {
                let node = Arc::clone(&self.nodes[index]);
                async move { node.get(key).await }
            })
            .await
    }

    async fn set_raw(&self, key: &str, data: Vec<u8>) -> Result<(), DomainError> {
        self.rerouter
            .run(key, self.nodes.len(), |index| {
                let node = Arc::clone(&self.nodes[index]);
                let data = data.clone();
                async move { node.set(key, data).await }
            })
            .await
    }
}

#[async_trait]
impl CacheBackend for ShardedCache {
    fn name(&self) -> &'static str {
        "ShardedCache"
    }

    async fn initialise(&self) -> Result<(), DomainError> {
        let results = join_all(self.nodes.iter().map(|node| node.connect())).await;

        for (node, result) in self.nodes.iter().zip(results) {
            if let Err(e) = result {
                warn!(node = %node.address(), error = %e, "Cache node unavailable at startup");
            }
        }

        info!(nodes = self.nodes.len(), "Sharded cache initialised");
        Ok(())
    }

    async fn get(&self, key: &str) -> Option<CacheValue> {
        if self.nodes.is_empty() {
            return None;
        }

        let data = match self.get_raw(key).await {
            Ok(data) => data?,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache get failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice(&data) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key = %key, error = %e, "Undecodable cache value, treating as miss");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: CacheValue) {
        if self.nodes.is_empty() {
            return;
        }

        let data = match serde_json::to_vec(&value) {
            Ok(data) => data,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode cache value");
                return;
            }
        };

        if let Err(e) = self.set_raw(key, data).await {
            warn!(key = %key, error = %e, "Cache set failed, value dropped");
        }
    }

    async fn delete(&self, key: &str) -> bool {
        let results = join_all(self.nodes.iter().map(|node| node.delete(key))).await;

        let mut deleted = false;
        for (node, result) in self.nodes.iter().zip(results) {
            match result {
                Ok(true) => deleted = true,
                Ok(false) => {}
                Err(e) => {
                    warn!(node = %node.address(), key = %key, error = %e, "Cache delete failed");
                }
            }
        }
        deleted
    }
}
