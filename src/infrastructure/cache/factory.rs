//! Cache factory for runtime selection

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::domain::DomainError;
use crate::domain::cache::CacheBackend;

use super::in_memory::{InMemoryCache, InMemoryCacheConfig};
use super::no_cache::NoCache;
use super::recording::RecordingCache;
use super::scope_local::ScopeLocalCache;
use super::sharded::ShardedCache;

/// Supported cache engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum CacheEngine {
    /// Stores nothing
    #[default]
    None,
    /// One map shared by the whole process
    InProcess,
    /// One map per execution scope
    ScopeLocal,
    /// Remote nodes with CRC32 placement
    Distributed,
    /// Records calls for test assertions
    Recording,
}

impl std::fmt::Display for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheEngine::None => write!(f, "none"),
            CacheEngine::InProcess => write!(f, "in_process"),
            CacheEngine::ScopeLocal => write!(f, "scope_local"),
            CacheEngine::Distributed => write!(f, "distributed"),
            CacheEngine::Recording => write!(f, "recording"),
        }
    }
}

impl std::str::FromStr for CacheEngine {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "no_cache" => Ok(CacheEngine::None),
            "in_process" | "simple" => Ok(CacheEngine::InProcess),
            "scope_local" | "request_local" => Ok(CacheEngine::ScopeLocal),
            "distributed" | "memcached" => Ok(CacheEngine::Distributed),
            "recording" | "trace" => Ok(CacheEngine::Recording),
            _ => Err(DomainError::configuration(format!(
                "Unknown cache engine: {}. Valid engines: none, in_process, scope_local, distributed, recording",
                s
            ))),
        }
    }
}

impl TryFrom<String> for CacheEngine {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Configuration of one cache tier
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheTierConfig {
    pub engine: CacheEngine,
    /// `host[:port]` specs for the distributed engine
    pub nodes: Vec<String>,
    /// Entry cap for the in-process engine
    pub max_capacity: u64,
}

impl Default for CacheTierConfig {
    fn default() -> Self {
        Self {
            engine: CacheEngine::None,
            nodes: Vec::new(),
            max_capacity: 10_000,
        }
    }
}

impl CacheTierConfig {
    pub fn new(engine: CacheEngine) -> Self {
        Self {
            engine,
            ..Default::default()
        }
    }

    pub fn distributed<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            engine: CacheEngine::Distributed,
            nodes: nodes.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }
}

/// Both cache tiers. L1 is the close, cheap one; L2 the shared one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub l1: CacheTierConfig,
    pub l2: CacheTierConfig,
}

/// Factory for creating cache backends
#[derive(Debug, Default)]
pub struct CacheFactory;

impl CacheFactory {
    pub fn new() -> Self {
        Self
    }

    /// Instantiates the backend selected by the tier configuration
    pub fn create(&self, config: &CacheTierConfig) -> Result<Arc<dyn CacheBackend>, DomainError> {
        let backend: Arc<dyn CacheBackend> = match config.engine {
            CacheEngine::None => Arc::new(NoCache::new()),
            CacheEngine::InProcess => {
                let in_memory_config =
                    InMemoryCacheConfig::default().with_max_capacity(config.max_capacity);
                Arc::new(InMemoryCache::shared(&in_memory_config))
            }
            CacheEngine::ScopeLocal => Arc::new(ScopeLocalCache::new()),
            CacheEngine::Distributed => {
                if config.nodes.is_empty() {
                    return Err(DomainError::configuration(
                        "At least one node is required for the distributed cache engine",
                    ));
                }
                Arc::new(ShardedCache::from_specs(&config.nodes)?)
            }
            CacheEngine::Recording => Arc::new(RecordingCache::new()),
        };

        info!(engine = %config.engine, backend = backend.name(), "Cache backend created");
        Ok(backend)
    }
}
