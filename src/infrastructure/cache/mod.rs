//! Cache infrastructure - backends and the two-level manager

mod factory;
mod in_memory;
mod no_cache;
mod node;
mod recording;
mod redis;
mod retry;
mod scope_local;
mod sharded;
mod two_level;

pub use factory::{CacheConfig, CacheEngine, CacheFactory, CacheTierConfig};
pub use in_memory::{InMemoryCache, InMemoryCacheConfig};
pub use no_cache::NoCache;
pub use node::{CacheNode, NodeAddress, DEFAULT_NODE_PORT};
pub use recording::{Call, CallMethod, RecordingCache};
pub use redis::RedisNode;
pub use retry::{placement_hash, server_hash, Rerouter, MAX_RETRIES};
pub use scope_local::ScopeLocalCache;
pub use sharded::ShardedCache;
pub use two_level::{CacheTier, TwoLevelCache};
